//! Request identity.
//!
//! # Responsibilities
//! - Generate unique request IDs from a monotonic clock
//! - Capture the per-request trace context handlers can extract
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Generated IDs are nanoseconds since the Unix epoch, bumped past the
//!   previous ID so concurrent requests never share one

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{header, request::Parts, HeaderName, StatusCode},
};

/// Correlation header, read from requests and echoed on responses.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Issues strictly increasing, timestamp-derived request IDs.
#[derive(Debug)]
pub struct RequestIdGenerator {
    /// Wall clock at construction, in nanoseconds since the epoch.
    epoch_nanos: u64,
    /// Monotonic anchor taken together with `epoch_nanos`.
    anchor: Instant,
    last: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        let epoch_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX / 2))
            .unwrap_or_default();
        Self {
            epoch_nanos,
            anchor: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    /// Next ID. Never equal to, and always greater than, any previous one.
    pub fn next_id(&self) -> u64 {
        let elapsed = u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let now = self.epoch_nanos.saturating_add(elapsed);

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(x) => prev = x,
            }
        }
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlation identity of one request.
///
/// Bound to the request's extensions by the tracing middleware and dropped
/// with the request. Handlers can take it as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    request_id: String,
    method: String,
    path: String,
    remote_addr: String,
    user_agent: String,
}

impl TraceContext {
    pub fn new(request_id: impl Into<String>, request: &Request) -> Self {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            request_id: request_id.into(),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            remote_addr,
            user_agent,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl<S> FromRequestParts<S> for TraceContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TraceContext>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
