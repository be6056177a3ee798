//! Correlation-ID middleware.
//!
//! Binds a [`TraceContext`] to every request and echoes its ID on the response.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::http::request::{RequestIdGenerator, TraceContext, X_REQUEST_ID};

/// Reuse the client's `X-Request-Id` or generate one, then run the rest of the stack.
pub async fn trace_request(
    State(ids): State<Arc<RequestIdGenerator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let inbound = request
        .headers()
        .get(&X_REQUEST_ID)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.to_str().ok().map(|id| (id.to_string(), value.clone())));

    let (request_id, echoed) = match inbound {
        Some(pair) => pair,
        None => {
            let id = ids.next_id();
            (id.to_string(), HeaderValue::from(id))
        }
    };

    let context = TraceContext::new(request_id, &request);
    let span = tracing::info_span!(
        "request",
        request_id = %context.request_id(),
        method = %context.method(),
        path = %context.path(),
    );
    request.extensions_mut().insert(context);

    let mut response = next.run(request).instrument(span).await;
    response.headers_mut().insert(X_REQUEST_ID, echoed);
    response
}
