use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;

use crate::types::{OrderType, PriceField};

#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    /// Order parameters were rejected locally. Nothing was sent.
    Validation,
    /// Timeout, refused connection, reset, or any other transport-level failure.
    Network,
    /// The exchange answered with a non-2xx status.
    Api,
    /// A 2xx response whose body did not have the expected shape.
    MalformedResponse,
    /// Missing or unusable settings.
    Config,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    attempts: u32,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            attempts: 1,
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Number of attempts made before this error was surfaced.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    /// The exchange rejection behind this error, if there is one.
    #[must_use]
    pub fn api(&self) -> Option<&Api> {
        self.downcast_ref::<Api>()
    }

    /// The locally violated constraint behind this error, if there is one.
    #[must_use]
    pub fn validation(&self) -> Option<&Validation> {
        self.downcast_ref::<Validation>()
    }

    pub fn network<S: Into<String>>(reason: S) -> Self {
        Network {
            reason: reason.into(),
        }
        .into()
    }

    pub fn internal<S: Into<String>>(reason: S) -> Self {
        Self::with_source(Kind::Internal, Internal(reason.into()))
    }

    #[must_use]
    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {src}", self.kind)?,
            None => write!(f, "{:?}", self.kind)?,
        }
        if self.attempts > 1 {
            write!(f, " (after {} attempts)", self.attempts)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A constraint on order parameters that was violated before any request was built.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Validation {
    #[error("invalid symbol `{symbol}`: {reason}")]
    InvalidSymbol { symbol: String, reason: &'static str },
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),
    #[error("{order_type} orders require a positive {field}")]
    MissingPrice {
        order_type: OrderType,
        field: PriceField,
    },
    #[error("{field} is not accepted for {order_type} orders")]
    ExtraneousPrice {
        order_type: OrderType,
        field: PriceField,
    },
    #[error("leverage must be between 1 and {max}, got {leverage}")]
    InvalidLeverage { leverage: u32, max: u32 },
    #[error("invalid side `{0}`; expected one of: BUY|SELL")]
    InvalidSide(String),
    #[error("invalid order type `{0}`; expected one of: MARKET|LIMIT|STOP_LIMIT")]
    InvalidOrderType(String),
    #[error("{field} {value} has {scale} decimal places; at most {max} are allowed")]
    ExcessPrecision {
        field: &'static str,
        value: Decimal,
        scale: u32,
        max: u32,
    },
    #[error("an order id is required")]
    MissingOrderId,
    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: u32, max: u32 },
    #[error("invalid asset `{0}`")]
    InvalidAsset(String),
}

/// A rejection reported by the exchange, with its code and message kept verbatim.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{method} {path} failed with {status}: [{code}] {message}")]
pub struct Api {
    pub status: StatusCode,
    pub method: Method,
    pub path: String,
    pub code: i64,
    pub message: String,
}

impl Api {
    #[must_use]
    pub fn new<P: Into<String>, M: Into<String>>(
        status: StatusCode,
        method: Method,
        path: P,
        code: i64,
        message: M,
    ) -> Self {
        Self {
            status,
            method,
            path: path.into(),
            code,
            message: message.into(),
        }
    }

    /// Plain-language explanation for well-known exchange codes.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        let hint = match self.code {
            -1021 => "Request timestamp is outside the receive window; check the system clock.",
            -1022 => "Signature rejected; check API_SECRET.",
            -1100 => "Invalid character in request parameter.",
            -1101 => "Too many parameters in request.",
            -1102 => "Missing required parameter.",
            -1103 => "Unknown parameter in request.",
            -1104 => "Duplicate parameter in request.",
            -1105 => "Empty parameter value.",
            -2010 => "Insufficient balance for this order.",
            -2011 => "Unknown order sent.",
            -2012 => "Order is already cancelled.",
            -2013 => "Order does not exist.",
            -2014 => "API key format invalid.",
            -2015 => "Invalid API key, IP, or permission.",
            -2019 => "Margin is insufficient.",
            -2026 => "Order cost exceeds account balance.",
            -4000 => "Invalid price or quantity precision.",
            -4001 => "Price is not within valid range.",
            -4002 => "Quantity is below minimum.",
            -4003 => "Quantity exceeds maximum.",
            -4004 => "Invalid order type.",
            -4005 => "Invalid side parameter.",
            -4014 => "Price is too high or too low.",
            -4015 => "Stop price is too high or too low.",
            -4046 => "No need to change leverage (already set).",
            -4061 => "Order type requires stop price.",
            -4062 => "Stop price invalid.",
            _ => return None,
        };
        Some(hint)
    }

    /// The exchange reports the requested leverage is already in effect.
    #[must_use]
    pub fn is_leverage_unchanged(&self) -> bool {
        self.code == -4046
    }
}

/// A 2xx body that could not be decoded into the expected shape.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unexpected response from {path} at `{location}`: {reason}")]
pub struct MalformedResponse {
    pub path: String,
    pub location: String,
    pub reason: String,
    pub body: String,
}

#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("network failure: {reason}")]
pub struct Network {
    pub reason: String,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Configuration {
    #[error("{0} is not set; export it or add it to the config file")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Internal(String);

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<Api> for Error {
    fn from(err: Api) -> Self {
        Error::with_source(Kind::Api, err)
    }
}

impl From<MalformedResponse> for Error {
    fn from(err: MalformedResponse) -> Self {
        Error::with_source(Kind::MalformedResponse, err)
    }
}

impl From<Network> for Error {
    fn from(err: Network) -> Self {
        Error::with_source(Kind::Network, err)
    }
}

impl From<Configuration> for Error {
    fn from(err: Configuration) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Configuration::Source(err).into()
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Error::with_source(Kind::Internal, err)
        } else {
            Error::with_source(Kind::Network, err)
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Config, err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(Kind::Internal, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reports_attempts_only_after_retries() {
        let err = Error::network("connection reset");
        assert_eq!(err.to_string(), "Network: network failure: connection reset");

        let err = err.with_attempts(3);
        assert_eq!(
            err.to_string(),
            "Network: network failure: connection reset (after 3 attempts)"
        );
        assert_eq!(err.attempts(), 3);
    }

    #[test]
    fn api_errors_keep_exchange_code_and_message() {
        let err: Error = Api::new(
            StatusCode::BAD_REQUEST,
            Method::POST,
            "/fapi/v1/order",
            -2019,
            "Margin is insufficient.",
        )
        .into();

        assert_eq!(err.kind(), Kind::Api);
        let api = err.api().expect("api source");
        assert_eq!(api.code, -2019);
        assert_eq!(api.message, "Margin is insufficient.");
        assert_eq!(api.hint(), Some("Margin is insufficient."));
        assert!(
            err.to_string().contains("[-2019] Margin is insufficient."),
            "display should carry the verbatim message"
        );
    }

    #[test]
    fn unknown_codes_have_no_hint() {
        let api = Api::new(
            StatusCode::BAD_REQUEST,
            Method::GET,
            "/fapi/v1/order",
            -9999,
            "???",
        );
        assert_eq!(api.hint(), None);
        assert!(!api.is_leverage_unchanged(), "-9999 is not -4046");
    }

    #[test]
    fn validation_downcasts() {
        let err: Error = Validation::InvalidQuantity(Decimal::ZERO).into();
        assert_eq!(err.kind(), Kind::Validation);
        assert_eq!(
            err.validation(),
            Some(&Validation::InvalidQuantity(Decimal::ZERO))
        );
        assert!(err.api().is_none(), "validation errors carry no api source");
    }
}
