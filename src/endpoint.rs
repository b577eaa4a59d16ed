//! Purpose: Client side of the external counting endpoint (GET reads, POST increments).
//! Exports: `CountingEndpoint`, `HttpEndpoint`, `parse_count`.
//! Role: Async seam between the visitor counter and the network.
//! Invariants: Responses are plain-text integers; anything else is a `Request` error.
//! Invariants: One call per operation; no retries and no default timeout.
//! Invariants: The configured URL path is used verbatim (stage prefixes differ per deployment).
#![allow(clippy::result_large_err)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::core::error::{Error, ErrorKind};

type EndpointResult<T> = Result<T, Error>;

/// The remote service that owns the authoritative visitor count.
pub trait CountingEndpoint {
    /// Count this visitor and return the new total.
    fn increment(&self) -> impl Future<Output = EndpointResult<u64>> + Send;

    /// Return the current total without changing it.
    fn read(&self) -> impl Future<Output = EndpointResult<u64>> + Send;
}

#[derive(Clone)]
pub struct HttpEndpoint {
    inner: Arc<HttpEndpointInner>,
}

struct HttpEndpointInner {
    url: Url,
    agent: ureq::Agent,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl HttpEndpoint {
    pub fn new(url: impl AsRef<str>) -> EndpointResult<Self> {
        let url = parse_endpoint_url(url.as_ref())?;
        Ok(Self {
            inner: Arc::new(HttpEndpointInner {
                url,
                agent: ureq::AgentBuilder::new().build(),
            }),
        })
    }

    /// Bound each request; without this the transport defaults apply.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            inner: Arc::new(HttpEndpointInner {
                url: self.inner.url.clone(),
                agent,
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    async fn call(&self, method: Method) -> EndpointResult<u64> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.request_count(method))
            .await
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("counting request task failed")
                    .with_source(err)
            })?
    }
}

impl HttpEndpointInner {
    fn request_count(&self, method: Method) -> EndpointResult<u64> {
        tracing::debug!(method = method.as_str(), url = %self.url, "counting request");
        let response = self
            .agent
            .request(method.as_str(), self.url.as_str())
            .set("Accept", "text/plain")
            .call();

        match response {
            Ok(resp) => {
                let body = resp.into_string().map_err(|err| {
                    Error::new(ErrorKind::Request)
                        .with_message("failed to read counting response")
                        .with_source(err)
                })?;
                parse_count(&body)
            }
            Err(ureq::Error::Status(code, _resp)) => Err(Error::new(ErrorKind::Request)
                .with_message(format!("{} {} was rejected", method.as_str(), self.url))
                .with_status(code)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Request)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

impl CountingEndpoint for HttpEndpoint {
    async fn increment(&self) -> EndpointResult<u64> {
        self.call(Method::Post).await
    }

    async fn read(&self) -> EndpointResult<u64> {
        self.call(Method::Get).await
    }
}

/// Parse a counting response body such as `"42"` or `"42\n"`.
pub fn parse_count(body: &str) -> EndpointResult<u64> {
    let trimmed = body.trim();
    trimmed.parse::<u64>().map_err(|err| {
        Error::new(ErrorKind::Request)
            .with_message(format!("counting response is not a count: {trimmed:?}"))
            .with_source(err)
    })
}

fn parse_endpoint_url(input: &str) -> EndpointResult<Url> {
    let url = Url::parse(input.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid counting endpoint url: {input}"))
            .with_source(err)
    })?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported endpoint scheme: {scheme}"))
                .with_hint("Use an http:// or https:// URL."));
        }
    }
    if url.host_str().is_none() {
        return Err(Error::new(ErrorKind::Usage).with_message("counting endpoint url has no host"));
    }
    Ok(url)
}
