//! Injected auth capabilities and the single-flight refresh coordinator.
//!
//! The client never reaches into ambient application state for credentials.
//! Callers wire a token getter and a refresher in at construction; the
//! `RefreshGate` guarantees at most one refresh is outstanding per client
//! instance, with concurrent 401s parked on a FIFO waiter queue instead of
//! racing the refresh endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::hooks::Hooks;

/// Supplies the current bearer token, if any. Called once per outbound
/// logical request.
pub type TokenGetter = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Supplies additional per-request headers, for server-side contexts that
/// carry credentials in cookies rather than a token getter.
pub type HeaderSupplier = Arc<dyn Fn() -> HashMap<String, String> + Send + Sync>;

/// Token produced by a successful out-of-band refresh.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct RefreshedToken {
    pub token: String,
}

/// Refresh failure. Cloneable so a single failed cycle can reject every
/// queued waiter with the same error.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct RefreshError(pub String);

/// Out-of-band token refresh, typically a cookie-authenticated POST to the
/// auth refresh endpoint, implemented by the application's auth layer.
#[async_trait]
pub trait AuthRefresh: Send + Sync {
    async fn refresh(&self) -> Result<RefreshedToken, RefreshError>;
}

/// Injected capabilities for [`CoursehubClient`](crate::CoursehubClient).
///
/// All fields are optional. Without `auth_refresh`, a 401 is terminal
/// immediately; without `get_token`, no `Authorization` header is sent.
#[derive(Clone, Default)]
pub struct AuthOptions {
    pub get_token: Option<TokenGetter>,
    pub auth_refresh: Option<Arc<dyn AuthRefresh>>,
    pub get_headers: Option<HeaderSupplier>,
    pub hooks: Option<Arc<dyn Hooks>>,
}

type RefreshOutcome = Result<String, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

/// Single-flight refresh state: a `refreshing` flag plus the queue of
/// suspended requests waiting on the outcome.
#[derive(Default)]
pub(crate) struct RefreshGate {
    state: Mutex<GateState>,
}

#[derive(Default)]
struct GateState {
    refreshing: bool,
    waiters: Vec<Waiter>,
}

pub(crate) enum GateRole {
    /// This caller starts the refresh and must settle the cycle.
    Leader(LeaderGuard),
    /// A refresh is already outstanding; await its outcome.
    Follower(oneshot::Receiver<RefreshOutcome>),
}

impl RefreshGate {
    /// Joins the current refresh cycle, starting one if none is outstanding.
    pub(crate) fn join(gate: &Arc<Self>) -> GateRole {
        let mut state = lock_unpoisoned(&gate.state);
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            GateRole::Follower(rx)
        } else {
            state.refreshing = true;
            GateRole::Leader(LeaderGuard {
                gate: Arc::clone(gate),
                settled: false,
            })
        }
    }

    /// Clears the flag and drains waiters in enqueue order with the outcome.
    fn settle(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = lock_unpoisoned(&self.state);
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // A dropped receiver means that request was cancelled meanwhile.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Held by the leader for the duration of its refresh call.
///
/// Dropping the guard without settling (the leader future was cancelled
/// mid-refresh) fails the cycle so queued waiters are rejected rather than
/// left hanging, and a later 401 can start a fresh cycle.
pub(crate) struct LeaderGuard {
    gate: Arc<RefreshGate>,
    settled: bool,
}

impl LeaderGuard {
    pub(crate) fn settle(mut self, outcome: &RefreshOutcome) {
        self.gate.settle(outcome);
        self.settled = true;
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.gate
                .settle(&Err(RefreshError("token refresh aborted".to_owned())));
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{GateRole, RefreshError, RefreshGate};

    #[tokio::test]
    async fn first_joiner_leads_and_later_joiners_follow() {
        let gate = Arc::new(RefreshGate::default());

        let GateRole::Leader(guard) = RefreshGate::join(&gate) else {
            panic!("first joiner must lead");
        };
        let GateRole::Follower(rx) = RefreshGate::join(&gate) else {
            panic!("second joiner must be a follower");
        };

        guard.settle(&Ok("fresh".to_owned()));

        let outcome = rx.await.expect("leader must deliver an outcome");
        assert_eq!(outcome.expect("refresh must succeed"), "fresh");
    }

    #[tokio::test]
    async fn settling_clears_the_flag_for_the_next_cycle() {
        let gate = Arc::new(RefreshGate::default());

        let GateRole::Leader(guard) = RefreshGate::join(&gate) else {
            panic!("first joiner must lead");
        };
        guard.settle(&Err(RefreshError("expired".to_owned())));

        // A new cycle starts fresh: the next joiner leads again.
        assert!(matches!(RefreshGate::join(&gate), GateRole::Leader(_)));
    }

    #[tokio::test]
    async fn waiters_are_drained_in_enqueue_order() {
        let gate = Arc::new(RefreshGate::default());

        let GateRole::Leader(guard) = RefreshGate::join(&gate) else {
            panic!("first joiner must lead");
        };
        let mut receivers = Vec::new();
        for _ in 0..3 {
            match RefreshGate::join(&gate) {
                GateRole::Follower(rx) => receivers.push(rx),
                GateRole::Leader(_) => panic!("refresh is outstanding, must follow"),
            }
        }

        guard.settle(&Ok("fresh".to_owned()));
        for rx in receivers {
            let outcome = rx.await.expect("every waiter must be drained");
            assert_eq!(outcome.expect("refresh succeeded"), "fresh");
        }
    }

    #[tokio::test]
    async fn dropped_leader_rejects_waiters_instead_of_hanging() {
        let gate = Arc::new(RefreshGate::default());

        let leader = RefreshGate::join(&gate);
        let GateRole::Follower(rx) = RefreshGate::join(&gate) else {
            panic!("second joiner must follow");
        };

        drop(leader);

        let outcome = rx.await.expect("dropped leader must still settle");
        let err = outcome.expect_err("an aborted cycle is a failure");
        assert!(err.0.contains("aborted"));
        assert!(matches!(RefreshGate::join(&gate), GateRole::Leader(_)));
    }
}
