//! Signed REST access to the exchange.
//!
//! - [`RestClient`] signs, sends, decodes, and retries
//! - [`RetryPolicy`] decides what is retried and how long to wait
//! - [`Transport`] is the seam between the client and the network

mod client;
mod policy;
mod transport;

pub use client::{DEFAULT_RECV_WINDOW, RestClient};
pub use policy::{RetryPolicy, retry_on_server_error};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
