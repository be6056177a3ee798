//! Middleware pipeline.
//!
//! Interceptors always run in this order, outermost first:
//!
//! ```text
//! Tracing → AccessLog → WriteTimeout → router
//! ```
//!
//! Tracing has to come first so the access log can read the trace context.
//! The builder accepts interceptors in any order and sorts them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use tower_http::timeout::TimeoutLayer;

use crate::http::middleware::{access_log, trace_request, SharedAccessLogger};
use crate::http::request::RequestIdGenerator;

/// One request interceptor.
#[derive(Clone)]
pub enum Interceptor {
    /// Binds the trace context and echoes the request ID.
    Tracing(Arc<RequestIdGenerator>),
    /// Emits one access record per request.
    AccessLog(SharedAccessLogger),
    /// Answers 408 when the handler does not respond in time.
    WriteTimeout(Duration),
}

impl Interceptor {
    fn rank(&self) -> u8 {
        match self {
            Interceptor::Tracing(_) => 0,
            Interceptor::AccessLog(_) => 1,
            Interceptor::WriteTimeout(_) => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interceptor::Tracing(_) => "tracing",
            Interceptor::AccessLog(_) => "access_log",
            Interceptor::WriteTimeout(_) => "write_timeout",
        }
    }

    #[allow(deprecated)]
    fn apply(&self, router: Router) -> Router {
        match self {
            Interceptor::Tracing(ids) => {
                router.layer(middleware::from_fn_with_state(Arc::clone(ids), trace_request))
            }
            Interceptor::AccessLog(logger) => {
                router.layer(middleware::from_fn_with_state(Arc::clone(logger), access_log))
            }
            Interceptor::WriteTimeout(timeout) => router.layer(TimeoutLayer::new(*timeout)),
        }
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interceptor::WriteTimeout(timeout) => write!(f, "WriteTimeout({:?})", timeout),
            other => f.write_str(other.name()),
        }
    }
}

/// Ordered interceptors, outermost first.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    interceptors: Vec<Interceptor>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Interceptors in execution order.
    pub fn interceptors(&self) -> &[Interceptor] {
        &self.interceptors
    }

    /// Wrap `router` so the first interceptor is the outermost.
    pub fn wrap(&self, router: Router) -> Router {
        self.interceptors
            .iter()
            .rev()
            .fold(router, |router, interceptor| interceptor.apply(router))
    }
}

#[derive(Debug, Default)]
pub struct PipelineBuilder {
    interceptors: Vec<Interceptor>,
}

impl PipelineBuilder {
    pub fn tracing(self, ids: Arc<RequestIdGenerator>) -> Self {
        self.with(Interceptor::Tracing(ids))
    }

    pub fn access_log(self, logger: SharedAccessLogger) -> Self {
        self.with(Interceptor::AccessLog(logger))
    }

    pub fn write_timeout(self, timeout: Duration) -> Self {
        self.with(Interceptor::WriteTimeout(timeout))
    }

    /// Add an interceptor, replacing any earlier one of the same kind.
    pub fn with(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.retain(|i| i.rank() != interceptor.rank());
        self.interceptors.push(interceptor);
        self
    }

    pub fn build(mut self) -> Pipeline {
        self.interceptors.sort_by_key(Interceptor::rank);
        Pipeline {
            interceptors: self.interceptors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::{AccessLogger, AccessRecord};
    use crate::http::request::X_REQUEST_ID;
    use axum::{body::Body, http::StatusCode, routing::get};
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
    fn order_is_fixed_regardless_of_insertion() {
        let pipeline = Pipeline::builder()
            .write_timeout(Duration::from_secs(1))
            .access_log(Arc::new(Collect::default()))
            .tracing(Arc::new(RequestIdGenerator::new()))
            .build();

        let names: Vec<_> = pipeline.interceptors().iter().map(Interceptor::name).collect();
        assert_eq!(names, vec!["tracing", "access_log", "write_timeout"]);
    }

    #[test]
    fn same_kind_replaces() {
        let pipeline = Pipeline::builder()
            .write_timeout(Duration::from_secs(1))
            .write_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(pipeline.interceptors().len(), 1);
        assert!(matches!(
            pipeline.interceptors()[0],
            Interceptor::WriteTimeout(t) if t == Duration::from_secs(5)
        ));
    }

    #[tokio::test]
    async fn access_log_sees_trace_context() {
        let collect = Arc::new(Collect::default());
        let app = Pipeline::builder()
            .access_log(collect.clone())
            .tracing(Arc::new(RequestIdGenerator::new()))
            .build()
            .wrap(Router::new().route("/", get(|| async { "ok" })));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], "abc123");
        assert_eq!(collect.0.lock().unwrap()[0].requester_id, "abc123");
    }

    #[tokio::test]
    async fn slow_handlers_time_out() {
        let app = Pipeline::builder()
            .write_timeout(Duration::from_millis(50))
            .build()
            .wrap(Router::new().route(
                "/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            ));

        let response = app
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
