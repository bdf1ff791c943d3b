//! Request authentication.
//!
//! Signed endpoints take the canonical query string of the request parameters,
//! an HMAC-SHA256 of that string keyed with the API secret, hex-encoded and
//! appended as the final `signature` parameter. The API key travels in the
//! `X-MBX-APIKEY` header; the secret never leaves the process.

use std::collections::BTreeMap;
use std::fmt;

use hmac::{Hmac, Mac as _};
use secrecy::{ExposeSecret as _, SecretString};
use sha2::Sha256;

use crate::Result;
use crate::error::Error;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";
pub const SIGNATURE: &str = "signature";
pub const TIMESTAMP: &str = "timestamp";
pub const RECV_WINDOW: &str = "recvWindow";

#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new<K: Into<String>>(key: K, secret: SecretString) -> Self {
        Self {
            key: key.into(),
            secret,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn signer(&self) -> Signer {
        Signer::new(self.secret.clone())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &mask(&self.key))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Keeps the first and last four characters of long identifiers.
fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "[REDACTED]".to_owned();
    }
    let head: String = chars.iter().take(4).collect();
    let tail: String = chars.iter().skip(chars.len() - 4).collect();
    format!("{head}...{tail}")
}

/// Request parameters in canonical (lexicographic key) order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<V: fmt::Display>(mut self, key: &str, value: V) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_opt<V: fmt::Display>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    pub fn insert<V: fmt::Display>(&mut self, key: &str, value: V) {
        self.0.insert(key.to_owned(), value.to_string());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `k1=v1&k2=v2...` with form-encoded values, keys in sorted order.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

/// A canonical query string and the signature computed over it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedQuery {
    query: String,
    signature: String,
}

impl SignedQuery {
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The query string to send: the signed parameters followed by `signature`.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        if self.query.is_empty() {
            format!("{SIGNATURE}={}", self.signature)
        } else {
            format!("{}&{SIGNATURE}={}", self.query, self.signature)
        }
    }
}

#[derive(Clone)]
pub struct Signer {
    secret: SecretString,
}

impl Signer {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Hex-encoded HMAC-SHA256 of `message` keyed with the secret.
    pub fn signature(&self, message: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| Error::internal(format!("unable to key HMAC: {e}")))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Signs the canonical form of `params`.
    ///
    /// The parameter set must not already contain a `signature` entry.
    pub fn sign(&self, params: &Params) -> Result<SignedQuery> {
        if params.contains(SIGNATURE) {
            return Err(Error::internal(
                "refusing to sign a parameter set that already carries a signature",
            ));
        }

        let query = params.to_query_string();
        let signature = self.signature(&query)?;
        Ok(SignedQuery { query, signature })
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
