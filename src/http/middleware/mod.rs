//! Request interceptors.
//!
//! - trace.rs: binds the [`TraceContext`](crate::http::TraceContext), echoes `X-Request-Id`
//! - access_log.rs: one structured record per request

pub mod access_log;
pub mod trace;

pub use access_log::{access_log, AccessLogger, AccessRecord, SharedAccessLogger, TracingAccessLogger};
pub use trace::trace_request;
