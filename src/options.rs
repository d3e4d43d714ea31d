/// Configures HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds. A timed-out attempt counts
    /// toward the retry budget.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_base_ms: u64,
    /// Upper bound on a single backoff delay, before jitter.
    pub retry_cap_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            retry_base_ms: 1_000,
            retry_cap_ms: 10_000,
        }
    }
}
