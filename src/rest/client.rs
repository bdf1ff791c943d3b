use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::audit::{self, AuditEntry, AuditLog, TracingAuditLog};
use crate::auth::{self, Credentials, Params, Signer};
use crate::error::{Api, Configuration, Error, MalformedResponse};
use crate::rest::{HttpRequest, HttpResponse, ReqwestTransport, RetryPolicy, Transport};
use crate::settings::Settings;
use crate::types::ErrorBody;
use crate::{Result, Timestamp};

/// Default `recvWindow`: how long after `timestamp` the exchange still accepts a request.
pub const DEFAULT_RECV_WINDOW: u64 = 5000;

/// Authenticated REST client.
///
/// Every call goes through [`RestClient::send`] (or [`RestClient::send_public`]
/// for unsigned endpoints), which re-signs with a fresh timestamp on each
/// attempt and retries transport failures and retryable statuses according to
/// its [`RetryPolicy`].
#[derive(Clone)]
pub struct RestClient {
    base_url: Url,
    credentials: Credentials,
    signer: Signer,
    recv_window: u64,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    audit: Arc<dyn AuditLog>,
}

impl RestClient {
    /// Builds a client from loaded settings, with a `reqwest` transport and a
    /// `tracing`-backed audit log.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let transport = ReqwestTransport::new(settings.request_timeout)?;
        let policy = RetryPolicy::builder()
            .max_attempts(settings.max_attempts)
            .build();

        Ok(Self::new(
            settings.base_url.clone(),
            settings.credentials.clone(),
            Arc::new(transport),
            Arc::new(TracingAuditLog),
        )
        .with_policy(policy)
        .with_recv_window(settings.recv_window))
    }

    #[must_use]
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let signer = credentials.signer();
        Self {
            base_url,
            credentials,
            signer,
            recv_window: DEFAULT_RECV_WINDOW,
            policy: RetryPolicy::default(),
            transport,
            audit,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_recv_window(mut self, recv_window: u64) -> Self {
        self.recv_window = recv_window;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends a signed request and decodes the JSON response into `T`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<T> {
        self.send_with_retry(method, path, params, true).await
    }

    /// Sends an unsigned request to a public endpoint.
    pub async fn send_public<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<T> {
        self.send_with_retry(method, path, params, false).await
    }

    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &Params,
        signed: bool,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt::<T>(attempt, &method, path, params, signed).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    self.audit.record(AuditEntry::Failure {
                        attempt,
                        error: err.to_string(),
                    });

                    if !self.policy.is_retryable(&err) || !self.policy.has_attempts_left(attempt) {
                        return Err(err.with_attempts(attempt));
                    }

                    let delay = self.policy.delay(attempt);
                    tracing::warn!(attempt, ?delay, %path, "retrying after failure");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        attempt: u32,
        method: &Method,
        path: &str,
        params: &Params,
        signed: bool,
    ) -> Result<T> {
        let mut params = params.clone();
        let mut headers = HeaderMap::new();
        let mut url = self.endpoint(path)?;

        if signed {
            params.insert(auth::TIMESTAMP, now_millis());
            params.insert(auth::RECV_WINDOW, self.recv_window);
            let signed_query = self.signer.sign(&params)?;
            url.set_query(Some(&signed_query.to_query_string()));

            let mut key = HeaderValue::from_str(self.credentials.key())?;
            key.set_sensitive(true);
            headers.insert(auth::API_KEY_HEADER, key);
        } else if !params.is_empty() {
            url.set_query(Some(&params.to_query_string()));
        }

        self.audit.record(AuditEntry::Request {
            attempt,
            method: method.clone(),
            path: path.to_owned(),
            params: params.to_query_string(),
        });

        let request = HttpRequest {
            method: method.clone(),
            url,
            headers,
        };
        let HttpResponse { status, body } = self.transport.execute(request).await?;

        self.audit.record(AuditEntry::Response {
            attempt,
            status,
            body: audit::truncate(&body),
        });

        if !status.is_success() {
            return Err(api_error(status, method, path, &body).into());
        }

        decode(path, &body).inspect_err(|_| {
            self.audit.record(AuditEntry::Malformed {
                attempt,
                path: path.to_owned(),
                body: body.clone(),
            });
        })
    }

    /// Appends `path` to the base URL, keeping any path prefix the base carries.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Configuration::Invalid {
                key: "BASE_URL",
                reason: format!("`{}` cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(path.trim_start_matches('/').split('/'));
        Ok(url)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .field("recv_window", &self.recv_window)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// Turns a non-2xx response into an [`Api`] error, using the exchange's own
/// code and message when the body carries them.
fn api_error(status: StatusCode, method: &Method, path: &str, body: &str) -> Api {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { code, msg }) => Api::new(status, method.clone(), path, code, msg),
        Err(_) => {
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_owned()
            } else {
                audit::truncate(body.trim())
            };
            Api::new(
                status,
                method.clone(),
                path,
                i64::from(status.as_u16()),
                message,
            )
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T> {
    let deserializer = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(deserializer).map_err(|e| {
        Error::from(MalformedResponse {
            path: path.to_owned(),
            location: e.path().to_string(),
            reason: e.inner().to_string(),
            body: body.to_owned(),
        })
    })
}
