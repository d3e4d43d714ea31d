use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

/// Per-call request tuning.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Extra headers, merged after client-level headers.
    pub headers: HashMap<String, String>,
    /// Overrides the generated `X-Request-ID` value.
    pub request_id: Option<String>,
    /// Aborts the in-flight attempt when triggered. Cancellation is
    /// terminal; it is never treated as a retryable failure.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
