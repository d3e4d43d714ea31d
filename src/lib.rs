//! `coursehub-http` is the authenticated async HTTP client for the
//! Coursehub API.
//!
//! Every outbound call goes through one pipeline:
//! - bearer-token injection via an injected getter
//! - `Idempotency-Key` (POST/PATCH) and `X-Request-ID` header injection
//! - single-flight token refresh on 401, queuing concurrent requests
//! - bounded exponential-backoff retry with jitter for transient failures
//!
//! Credentials are injected capabilities ([`AuthOptions`]), never ambient
//! state; failures surface as a normalized [`CoursehubError`].

mod auth;
mod body;
mod client;
mod error;
mod extract;
mod hooks;
mod options;
mod request;

pub use auth::{
    AuthOptions, AuthRefresh, HeaderSupplier, RefreshError, RefreshedToken, TokenGetter,
};
pub use body::Multipart;
pub use client::CoursehubClient;
pub use error::CoursehubError;
pub use hooks::{Hooks, RequestInfo};
pub use options::ClientOptions;
pub use request::RequestOptions;

pub type Result<T> = std::result::Result<T, CoursehubError>;
