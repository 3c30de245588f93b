//! Dependency liveness checks used by probes.
//!
//! # Responsibilities
//! - Define the `Ping` contract: one cheap, cancellable reachability test
//! - TCP ping: can we open a connection?
//! - HTTP ping: does a GET answer with 2xx?
//!
//! # Design Decisions
//! - Every ping carries its own timeout so a hung dependency cannot stall a probe
//! - Cancellation is dropping the future; pings hold no state across calls

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Uri};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;

/// Default per-attempt timeout for the provided pings.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a ping attempt failed.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),
}

/// A dependency handle that can be tested for reachability.
///
/// The returned future may be dropped at any await point; implementations
/// must tolerate that.
pub trait Ping: Send + Sync + 'static {
    fn ping(&self) -> BoxFuture<'_, Result<(), PingError>>;
}

/// Reachability by TCP connect.
#[derive(Debug, Clone)]
pub struct TcpPing {
    address: String,
    timeout: Duration,
}

impl TcpPing {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

impl Ping for TcpPing {
    fn ping(&self) -> BoxFuture<'_, Result<(), PingError>> {
        Box::pin(async move {
            match time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
                Ok(Ok(_stream)) => Ok(()),
                Ok(Err(e)) => Err(PingError::Connect(e)),
                Err(_) => Err(PingError::Timeout(self.timeout)),
            }
        })
    }
}

/// Reachability by HTTP GET; any 2xx counts as alive.
#[derive(Clone)]
pub struct HttpPing {
    uri: Uri,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl HttpPing {
    pub fn new(uri: Uri, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            uri,
            timeout,
            client,
        }
    }
}

impl Ping for HttpPing {
    fn ping(&self) -> BoxFuture<'_, Result<(), PingError>> {
        Box::pin(async move {
            let request = Request::builder()
                .method("GET")
                .uri(self.uri.clone())
                .header("user-agent", "service-shell-health-check")
                .body(Body::empty())
                .map_err(|e| PingError::Request(e.to_string()))?;

            match time::timeout(self.timeout, self.client.request(request)).await {
                Ok(Ok(response)) if response.status().is_success() => Ok(()),
                Ok(Ok(response)) => Err(PingError::Status(response.status().as_u16())),
                Ok(Err(e)) => Err(PingError::Request(e.to_string())),
                Err(_) => Err(PingError::Timeout(self.timeout)),
            }
        })
    }
}
