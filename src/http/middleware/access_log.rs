//! Access logging middleware.
//!
//! One record per request, written from a drop guard so it is emitted whether
//! the inner handler returns, panics, or is cancelled.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::http::request::TraceContext;
use crate::observability::metrics;

/// Log target of access records.
pub const ACCESS_LOG_TARGET: &str = "access_log";

/// The structured access record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub requester_id: String,
    pub request_method: String,
    pub url_path: String,
    pub remote_addr: String,
    pub user_agent: String,
}

impl From<&TraceContext> for AccessRecord {
    fn from(context: &TraceContext) -> Self {
        Self {
            requester_id: context.request_id().to_string(),
            request_method: context.method().to_string(),
            url_path: context.path().to_string(),
            remote_addr: context.remote_addr().to_string(),
            user_agent: context.user_agent().to_string(),
        }
    }
}

impl AccessRecord {
    /// Record for a request that reached the logger without a trace context.
    fn untraced(request: &Request) -> Self {
        let context = TraceContext::new("unknown", request);
        Self::from(&context)
    }
}

/// Sink for access records. Must not block.
pub trait AccessLogger: Send + Sync + 'static {
    fn record(&self, record: &AccessRecord);
}

/// Writes each record as a JSON line at info level under [`ACCESS_LOG_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessLogger;

impl AccessLogger for TracingAccessLogger {
    fn record(&self, record: &AccessRecord) {
        match serde_json::to_string(record) {
            Ok(line) => tracing::info!(target: ACCESS_LOG_TARGET, "{}", line),
            Err(e) => tracing::warn!(error = %e, "Failed to encode access record"),
        }
    }
}

pub type SharedAccessLogger = Arc<dyn AccessLogger>;

struct AccessLogGuard {
    logger: SharedAccessLogger,
    record: Option<AccessRecord>,
}

impl Drop for AccessLogGuard {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.logger.record(&record);
        }
    }
}

pub async fn access_log(
    State(logger): State<SharedAccessLogger>,
    request: Request,
    next: Next,
) -> Response {
    let record = request
        .extensions()
        .get::<TraceContext>()
        .map(AccessRecord::from)
        .unwrap_or_else(|| AccessRecord::untraced(&request));
    let method = record.request_method.clone();
    let start = Instant::now();

    let _guard = AccessLogGuard {
        logger,
        record: Some(record),
    };

    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AccessRecord>>);

    impl AccessLogger for Collect {
        fn record(&self, record: &AccessRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let record = AccessRecord {
            requester_id: "abc123".into(),
            request_method: "GET".into(),
            url_path: "/".into(),
            remote_addr: "127.0.0.1:1".into(),
            user_agent: "t".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["requester_id"], "abc123");
        assert_eq!(json["request_method"], "GET");
        assert_eq!(json["url_path"], "/");
    }

    #[tokio::test]
    async fn untraced_requests_are_logged_as_unknown() {
        let collect = Arc::new(Collect::default());
        let logger: SharedAccessLogger = collect.clone();
        let app = Router::new()
            .route("/", get(|| async { StatusCode::ACCEPTED }))
            .layer(middleware::from_fn_with_state(logger, access_log));

        let response = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let records = collect.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].requester_id, "unknown");
        assert_eq!(records[0].url_path, "/");
    }

    #[test]
    fn guard_logs_once() {
        let collect = Arc::new(Collect::default());
        let guard = AccessLogGuard {
            logger: collect.clone(),
            record: Some(AccessRecord::from(&TraceContext::new(
                "1",
                &axum::http::Request::builder().uri("/x").body(Body::empty()).unwrap(),
            ))),
        };
        drop(guard);
        assert_eq!(collect.0.lock().unwrap().len(), 1);
    }
}
