//! Client for a USDT-M futures testnet.
//!
//! - [`rest::RestClient`] signs requests with HMAC-SHA256 and retries
//!   transient failures
//! - [`validation`] checks order input before anything is sent
//! - [`OrderManager`] places, cancels, and queries orders, positions, and
//!   balances on top of the client
//!
//! Settings come from the environment (optionally layered over a TOML file),
//! see [`settings::Settings`].

pub mod audit;
pub mod auth;
pub mod error;
pub mod logging;
pub mod orders;
pub mod rest;
pub mod settings;
pub mod types;
pub mod validation;

pub use error::{Error, Kind};
pub use orders::OrderManager;
pub use rest::RestClient;

pub type Result<T> = std::result::Result<T, Error>;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
