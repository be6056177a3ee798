//! HTTP request handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper-util auto builder, idle and drain handling)
//!     → pipeline.rs (fixed interceptor order)
//!         → middleware/trace.rs (request ID, TraceContext, span)
//!         → middleware/access_log.rs (one record per request)
//!         → write timeout
//!     → application router or /healthz
//! ```

pub mod middleware;
pub mod pipeline;
pub mod request;
pub mod server;

pub use middleware::{AccessLogger, AccessRecord, SharedAccessLogger, TracingAccessLogger};
pub use pipeline::{Interceptor, Pipeline, PipelineBuilder};
pub use request::{RequestIdGenerator, TraceContext, X_REQUEST_ID};
pub use server::{HttpServer, ServerTimeouts};
