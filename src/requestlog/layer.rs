//! Request-log middleware.
//!
//! Captures the request side of an [`Entry`] before the inner handler runs and
//! finishes it once the response body has been sent, so the byte count is
//! what actually went out.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use chrono::Local;
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::requestlog::{Entry, RequestLogger};

/// Middleware for `axum::middleware::from_fn_with_state`.
pub async fn log_requests(
    State(logger): State<Arc<dyn RequestLogger>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let mut entry = request_entry(&request);

    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    entry.status = parts.status.as_u16();
    let body = LoggedBody {
        inner: body,
        bytes: 0,
        pending: Some(Pending {
            entry,
            started,
            logger,
        }),
    };
    Response::from_parts(parts, Body::new(body))
}

fn request_entry(request: &Request) -> Entry {
    let remote_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let request_url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().to_string());

    Entry {
        remote_ip,
        received_time: Local::now().fixed_offset(),
        request_method: request.method().to_string(),
        request_url,
        proto: format!("{:?}", request.version()),
        status: 0,
        response_body_size: 0,
        referer: header_bytes(request.headers(), header::REFERER),
        user_agent: header_bytes(request.headers(), header::USER_AGENT),
        latency: Duration::ZERO,
    }
}

fn header_bytes(headers: &HeaderMap, name: HeaderName) -> Vec<u8> {
    headers
        .get(name)
        .map(|v| v.as_bytes().to_vec())
        .unwrap_or_default()
}

struct Pending {
    entry: Entry,
    started: Instant,
    logger: Arc<dyn RequestLogger>,
}

/// Response body that counts data bytes and logs its entry when dropped.
struct LoggedBody {
    inner: Body,
    bytes: u64,
    pending: Option<Pending>,
}

impl HttpBody for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                this.bytes += data.len() as u64;
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for LoggedBody {
    fn drop(&mut self) {
        if let Some(Pending {
            mut entry,
            started,
            logger,
        }) = self.pending.take()
        {
            entry.response_body_size = self.bytes;
            entry.latency = started.elapsed();
            logger.log(&entry);
        }
    }
}
