use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::sleep;
use uuid::Uuid;

use crate::{
    auth::{AuthOptions, AuthRefresh, GateRole, HeaderSupplier, RefreshError, RefreshGate, TokenGetter},
    body::{Multipart, Payload},
    extract::error_message,
    hooks::{Hooks, RequestInfo},
    ClientOptions, CoursehubError, RequestOptions, Result,
};

/// Authenticated HTTP client for the Coursehub API.
///
/// Wraps every outbound call with bearer-token injection, idempotency and
/// tracing headers, single-flight token refresh on 401 (concurrent requests
/// queue behind one refresh), and bounded exponential-backoff retry for
/// transient failures. All recovery is internal: callers see one resolved
/// result per call, or a normalized [`CoursehubError`].
#[derive(Clone)]
pub struct CoursehubClient {
    http: reqwest::Client,
    base_url: String,
    get_token: Option<TokenGetter>,
    auth_refresh: Option<Arc<dyn AuthRefresh>>,
    get_headers: Option<HeaderSupplier>,
    hooks: Option<Arc<dyn Hooks>>,
    gate: Arc<RefreshGate>,
    options: ClientOptions,
}

impl fmt::Debug for CoursehubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoursehubClient")
            .field("base_url", &self.base_url)
            .field("bearer", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

/// One attempt's outcome before classification.
enum SendError {
    Transport(reqwest::Error),
    Cancelled,
    Invalid(String),
}

impl CoursehubClient {
    /// Creates a client against `base_url` with injected auth capabilities.
    ///
    /// Configuration is immutable after construction. The refresh gate is
    /// per instance and shared across clones, so cloned handles still
    /// coordinate on a single refresh.
    pub fn new(base_url: impl Into<String>, auth: AuthOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            get_token: auth.get_token,
            auth_refresh: auth.auth_refresh,
            get_headers: auth.get_headers,
            hooks: auth.hooks,
            gate: Arc::new(RefreshGate::default()),
            options: ClientOptions::default(),
        }
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with(path, RequestOptions::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<T> {
        let body = self.send(Method::GET, path, Payload::Empty, &opts).await?;
        decode_json(&body)
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_with(path, body, RequestOptions::default()).await
    }

    pub async fn post_with<T, B>(&self, path: &str, body: &B, opts: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let payload = json_payload(body)?;
        let body = self.send(Method::POST, path, payload, &opts).await?;
        decode_json(&body)
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.patch_with(path, body, RequestOptions::default()).await
    }

    pub async fn patch_with<T, B>(&self, path: &str, body: &B, opts: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let payload = json_payload(body)?;
        let body = self.send(Method::PATCH, path, payload, &opts).await?;
        decode_json(&body)
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.put_with(path, body, RequestOptions::default()).await
    }

    pub async fn put_with<T, B>(&self, path: &str, body: &B, opts: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let payload = json_payload(body)?;
        let body = self.send(Method::PUT, path, payload, &opts).await?;
        decode_json(&body)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.delete_with(path, RequestOptions::default()).await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<T> {
        let body = self
            .send(Method::DELETE, path, Payload::Empty, &opts)
            .await?;
        decode_json(&body)
    }

    /// POSTs a multipart form (file uploads). The owned parts are rebuilt
    /// into a fresh wire form for every attempt.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Multipart,
    ) -> Result<T> {
        self.post_multipart_with(path, form, RequestOptions::default())
            .await
    }

    pub async fn post_multipart_with<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Multipart,
        opts: RequestOptions,
    ) -> Result<T> {
        let body = self
            .send(Method::POST, path, Payload::Multipart(form), &opts)
            .await?;
        decode_json(&body)
    }

    /// Fetches an opaque binary payload through the same pipeline.
    pub async fn download(&self, path: &str) -> Result<Bytes> {
        self.download_with(path, RequestOptions::default()).await
    }

    pub async fn download_with(&self, path: &str, opts: RequestOptions) -> Result<Bytes> {
        self.send(Method::GET, path, Payload::Empty, &opts).await
    }

    /// Runs one logical request through the pipeline: header injection, the
    /// bounded retry loop, and at most one auth recovery via the shared
    /// refresh gate. Returns the raw success body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        opts: &RequestOptions,
    ) -> Result<Bytes> {
        let request_id = opts
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        // One key per logical call, stable across retries, so server-side
        // dedup can drop duplicate submissions caused by our own retries.
        let idempotency_key = (method == Method::POST || method == Method::PATCH)
            .then(|| Uuid::new_v4().to_string());
        let mut bearer = self.get_token.as_ref().and_then(|get| get());

        let mut attempt = 0usize;
        let mut auth_retried = false;
        loop {
            let info = RequestInfo {
                method: method.clone(),
                path: path.to_owned(),
                request_id: request_id.clone(),
                attempt,
            };
            let outcome = self
                .send_once(
                    &method,
                    path,
                    &payload,
                    opts,
                    bearer.as_deref(),
                    &request_id,
                    idempotency_key.as_deref(),
                    &info,
                )
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if let Some(hooks) = &self.hooks {
                            hooks.on_response(&info, status);
                        }
                        return response.bytes().await.map_err(CoursehubError::NoResponse);
                    }
                    let body = response.text().await.unwrap_or_default();

                    // Auth recovery comes first and is mutually exclusive
                    // with the transient branch. A request recovers at most
                    // once; a second 401 falls through to classification.
                    if status == StatusCode::UNAUTHORIZED
                        && !auth_retried
                        && self.auth_refresh.is_some()
                    {
                        auth_retried = true;
                        match self.refreshed_token().await {
                            Ok(token) => {
                                bearer = Some(token);
                                continue;
                            }
                            Err(err) => return Err(self.fail(&info, err)),
                        }
                    }

                    if status.is_server_error() && attempt < self.options.max_retries {
                        attempt += 1;
                        self.wait_before_retry(attempt).await;
                        continue;
                    }

                    return Err(self.fail(&info, classify_status(status, &body)));
                }
                Err(SendError::Cancelled) => {
                    return Err(self.fail(&info, CoursehubError::Cancelled))
                }
                Err(SendError::Transport(err)) => {
                    if attempt < self.options.max_retries {
                        attempt += 1;
                        self.wait_before_retry(attempt).await;
                        continue;
                    }
                    return Err(self.fail(&info, CoursehubError::NoResponse(err)));
                }
                Err(SendError::Invalid(message)) => {
                    return Err(self.fail(&info, CoursehubError::InvalidRequest(message)))
                }
            }
        }
    }

    /// Builds and sends a single attempt, racing the caller's cancellation
    /// token against the in-flight request.
    #[allow(clippy::too_many_arguments)]
    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        payload: &Payload,
        opts: &RequestOptions,
        bearer: Option<&str>,
        request_id: &str,
        idempotency_key: Option<&str>,
        info: &RequestInfo,
    ) -> std::result::Result<reqwest::Response, SendError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .timeout(Duration::from_millis(self.options.timeout_ms));

        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        request = request.header("X-Request-ID", request_id);
        if let Some(get_headers) = &self.get_headers {
            for (name, value) in get_headers() {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        for (name, value) in &opts.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match payload {
            Payload::Empty => request,
            Payload::Json(value) => request.json(value),
            Payload::Multipart(parts) => {
                request.multipart(parts.to_form().map_err(SendError::Invalid)?)
            }
        };

        if let Some(hooks) = &self.hooks {
            hooks.on_request(info);
        }

        let send = async {
            request.send().await.map_err(|err| {
                if err.is_builder() {
                    SendError::Invalid(err.to_string())
                } else {
                    SendError::Transport(err)
                }
            })
        };
        match &opts.cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => Err(SendError::Cancelled),
                outcome = send => outcome,
            },
            None => send.await,
        }
    }

    /// Obtains a fresh bearer token, joining the in-flight refresh when one
    /// is outstanding. Waiters are drained in enqueue order before the
    /// leader resumes, so the new token is visible to every queued request.
    async fn refreshed_token(&self) -> Result<String> {
        let refresher = self
            .auth_refresh
            .as_ref()
            .ok_or(CoursehubError::AuthenticationRequired)?;

        match RefreshGate::join(&self.gate) {
            GateRole::Follower(rx) => match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(err)) => Err(CoursehubError::Refresh(err.to_string())),
                Err(_) => Err(CoursehubError::Refresh("refresh aborted".to_owned())),
            },
            GateRole::Leader(guard) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("starting token refresh");

                let outcome = match refresher.refresh().await {
                    Ok(refreshed) if refreshed.token.trim().is_empty() => {
                        Err(RefreshError("no token returned from refresh".to_owned()))
                    }
                    Ok(refreshed) => Ok(refreshed.token),
                    Err(err) => Err(err),
                };
                guard.settle(&outcome);
                outcome.map_err(|err| CoursehubError::Refresh(err.to_string()))
            }
        }
    }

    /// Waits before retry number `retry` (1-based).
    async fn wait_before_retry(&self, retry: usize) {
        let delay_ms = backoff_delay_ms(&self.options, retry);

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying request after {} ms", delay_ms);

        sleep(Duration::from_millis(delay_ms)).await;
    }

    fn fail(&self, info: &RequestInfo, error: CoursehubError) -> CoursehubError {
        if let Some(hooks) = &self.hooks {
            hooks.on_error(info, &error);
        }
        error
    }
}

/// Exponential backoff with jitter: `min(base * 2^(n-1), cap)` plus a
/// uniform 0-30% of the capped delay.
fn backoff_delay_ms(options: &ClientOptions, retry: usize) -> u64 {
    let exp = retry.saturating_sub(1).min(16) as u32;
    let delay = options
        .retry_base_ms
        .saturating_mul(1u64 << exp)
        .min(options.retry_cap_ms);
    let jitter = rand::thread_rng().gen_range(0.0..0.3);
    delay + (delay as f64 * jitter) as u64
}

fn classify_status(status: StatusCode, body: &str) -> CoursehubError {
    match status {
        StatusCode::UNAUTHORIZED => CoursehubError::AuthenticationRequired,
        StatusCode::FORBIDDEN => CoursehubError::PermissionDenied,
        StatusCode::NOT_FOUND => CoursehubError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => CoursehubError::RateLimited,
        status if status.is_server_error() => CoursehubError::Server {
            status: status.as_u16(),
        },
        status => CoursehubError::Request {
            status: status.as_u16(),
            message: error_message(body).unwrap_or_else(|| "invalid request data".to_owned()),
        },
    }
}

fn json_payload<B: Serialize + ?Sized>(body: &B) -> Result<Payload> {
    let value = serde_json::to_value(body)
        .map_err(|err| CoursehubError::InvalidRequest(format!("unserializable body: {err}")))?;
    Ok(Payload::Json(value))
}

fn decode_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    let text = std::str::from_utf8(body)
        .map_err(|err| CoursehubError::Decode(format!("response is not valid UTF-8: {err}")))?;
    // Some endpoints answer 204-style with an empty body; decode as null so
    // callers expecting `()` or `Option<T>` still succeed.
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|err| {
        CoursehubError::Decode(format!("invalid response JSON: {err}; body: {text}"))
    })
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{backoff_delay_ms, classify_status, decode_json, CoursehubClient};
    use crate::{AuthOptions, ClientOptions, CoursehubError};

    fn options(base: u64, cap: u64) -> ClientOptions {
        ClientOptions {
            retry_base_ms: base,
            retry_cap_ms: cap,
            ..ClientOptions::default()
        }
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter_band() {
        let opts = options(1_000, 10_000);
        for (retry, base) in [(1usize, 1_000u64), (2, 2_000), (3, 4_000)] {
            let delay = backoff_delay_ms(&opts, retry);
            assert!(delay >= base, "retry {retry}: {delay} < {base}");
            assert!(delay <= base + base * 3 / 10, "retry {retry}: {delay} too large");
        }
    }

    #[test]
    fn backoff_is_capped_before_jitter() {
        let opts = options(1_000, 10_000);
        let delay = backoff_delay_ms(&opts, 9);
        assert!(delay >= 10_000);
        assert!(delay <= 13_000);
    }

    #[test]
    fn statuses_map_to_the_error_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            CoursehubError::AuthenticationRequired
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            CoursehubError::PermissionDenied
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            CoursehubError::NotFound
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            CoursehubError::RateLimited
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            CoursehubError::Server { status: 502 }
        ));
    }

    #[test]
    fn validation_errors_surface_the_server_message() {
        let err = classify_status(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"email already registered"}}"#,
        );
        match err {
            CoursehubError::Request { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "email already registered");
            }
            other => panic!("expected request error, got {other:?}"),
        }
    }

    #[test]
    fn empty_bodies_decode_as_unit() {
        let body = bytes::Bytes::new();
        decode_json::<()>(&body).expect("empty body must decode as unit");
    }

    #[test]
    fn debug_redacts_bearer_material() {
        let client = CoursehubClient::new("https://api.test/v1", AuthOptions::default());
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
    }
}
