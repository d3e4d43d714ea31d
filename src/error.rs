/// Error type returned by this crate.
///
/// Every failure crossing the client boundary is normalized to one of these
/// variants with a human-readable message; callers never see raw transport
/// errors. Retries and token refresh happen before an error is surfaced.
#[derive(Debug, thiserror::Error)]
pub enum CoursehubError {
    /// HTTP 401 after auth recovery is exhausted (or not configured).
    #[error("authentication required, please log in again")]
    AuthenticationRequired,
    /// HTTP 403.
    #[error("you do not have permission to perform this action")]
    PermissionDenied,
    /// HTTP 404.
    #[error("resource not found")]
    NotFound,
    /// HTTP 429.
    #[error("too many requests, please try again later")]
    RateLimited,
    /// HTTP 5xx once the retry budget is spent.
    #[error("server error (status {status}), please try again later")]
    Server { status: u16 },
    /// Other 4xx, carrying the server-supplied message when one was found.
    #[error("{message}")]
    Request { status: u16, message: String },
    /// The out-of-band token refresh failed.
    #[error("token refresh failed: {0}")]
    Refresh(String),
    /// No HTTP response was received once the retry budget is spent.
    #[error("no response received from server, please check your connection")]
    NoResponse(#[source] reqwest::Error),
    /// The caller's cancellation token fired while the request was in flight.
    #[error("request cancelled")]
    Cancelled,
    /// The request could not be constructed (bad header, unserializable body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Success response body failed to decode.
    #[error("decode error: {0}")]
    Decode(String),
}
