use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, StatusCode};
use url::Url;

use crate::Result;

/// A fully built request: the URL already carries the signed query string.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new<B: Into<String>>(status: StatusCode, body: B) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Puts one request on the wire.
///
/// Implementations report transport failures (timeouts, refused or reset
/// connections) as [`crate::Kind::Network`] errors and hand back every HTTP
/// response, successful or not, as an [`HttpResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest` with a per-request timeout.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: ReqwestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            mut headers,
        } = request;
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}
