use reqwest::{Method, StatusCode};

use crate::CoursehubError;

/// Immutable request snapshot handed to lifecycle hooks.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    /// Value of the `X-Request-ID` header for this logical request.
    pub request_id: String,
    /// Transient retries already spent; 0 on the initial send.
    pub attempt: usize,
}

/// Observability callbacks around the request lifecycle.
///
/// Hooks observe only — they cannot alter headers, retries, or the result.
/// `on_request` fires once per attempt, `on_response` on the successful
/// attempt, `on_error` once per logical request when it fails terminally.
pub trait Hooks: Send + Sync {
    fn on_request(&self, _info: &RequestInfo) {}
    fn on_response(&self, _info: &RequestInfo, _status: StatusCode) {}
    fn on_error(&self, _info: &RequestInfo, _error: &CoursehubError) {}
}
