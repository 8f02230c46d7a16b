//! Request correlation ids.
//!
//! A well-formed `x-request-id` from the proxy is kept; anything else is
//! replaced with a fresh UUID. The id travels as a [`RequestId`] extension,
//! is recorded on the trace span and Sentry scope, and is echoed back.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_INBOUND_LENGTH: usize = 128;

/// Correlation id of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Accept printable ASCII ids of sane length.
    fn from_header(value: &HeaderValue) -> Option<Self> {
        let id = value.to_str().ok()?.trim();
        let usable = !id.is_empty()
            && id.len() <= MAX_INBOUND_LENGTH
            && id.bytes().all(|b| b.is_ascii_graphic());
        usable.then(|| Self(id.to_string()))
    }

    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Attach a request id to the request, the span, Sentry and the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(RequestId::from_header)
        .unwrap_or_else(RequestId::generate);

    tracing::Span::current().record("request_id", id.0.as_str());
    sentry::configure_scope(|scope| scope.set_tag("request_id", &id.0));

    let header = HeaderValue::from_str(&id.0).ok();
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Some(header) = header {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
    response
}
