//! Audit trail of every request/response exchanged with the exchange.
//!
//! The REST client reports through an [`AuditLog`] it is handed at construction
//! instead of writing to a global logger, so tests can capture the exact
//! sequence of attempts. Entries never contain the API secret or the request
//! signature.

use std::sync::{Mutex, PoisonError};

use reqwest::{Method, StatusCode};

/// Bodies longer than this are cut before being recorded.
pub const MAX_BODY_CHARS: usize = 500;

#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuditEntry {
    Request {
        attempt: u32,
        method: Method,
        path: String,
        /// Canonical parameters, without `signature`.
        params: String,
    },
    Response {
        attempt: u32,
        status: StatusCode,
        body: String,
    },
    /// A success status whose body could not be decoded; carries the full body.
    Malformed { attempt: u32, path: String, body: String },
    Failure { attempt: u32, error: String },
}

impl AuditEntry {
    #[must_use]
    pub fn attempt(&self) -> u32 {
        match self {
            AuditEntry::Request { attempt, .. }
            | AuditEntry::Response { attempt, .. }
            | AuditEntry::Malformed { attempt, .. }
            | AuditEntry::Failure { attempt, .. } => *attempt,
        }
    }

    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(self, AuditEntry::Request { .. })
    }
}

pub trait AuditLog: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Forwards entries to `tracing`, which the binary routes to the rotating log file.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: AuditEntry) {
        match entry {
            AuditEntry::Request {
                attempt,
                method,
                path,
                params,
            } => tracing::info!(attempt, %method, %path, %params, "request"),
            AuditEntry::Response {
                attempt,
                status,
                body,
            } if status.is_success() => {
                tracing::info!(attempt, status = status.as_u16(), "response");
                tracing::debug!(attempt, %body, "response body");
            }
            AuditEntry::Response {
                attempt,
                status,
                body,
            } => tracing::warn!(attempt, status = status.as_u16(), %body, "error response"),
            AuditEntry::Malformed {
                attempt,
                path,
                body,
            } => tracing::error!(attempt, %path, %body, "malformed response"),
            AuditEntry::Failure { attempt, error } => {
                tracing::error!(attempt, %error, "request failed");
            }
        }
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests that were put on the wire.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.is_request())
            .count()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

pub(crate) fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        body.to_owned()
    } else {
        let mut cut: String = body.chars().take(MAX_BODY_CHARS).collect();
        cut.push_str("...");
        cut
    }
}
