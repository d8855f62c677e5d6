use futures::future::BoxFuture;
use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;
use tracing::debug;

/// Result of asking whether a barrier can conclude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalize {
    /// Units still running, or the barrier is not sealed yet.
    Outstanding(usize),
    /// This caller owns finalisation. `Err` carries the first failure.
    Ready(Result<(), String>),
    /// Another caller already concluded.
    AlreadyFired,
}

/// Join point over a fan-out of work units.
///
/// Units are registered before dispatch and complete exactly once each. The
/// barrier concludes only after it is sealed and the outstanding count is
/// zero, and only one caller ever receives `Ready`.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    outstanding: AtomicUsize,
    sealed: AtomicBool,
    fired: AtomicBool,
    first_failure: Mutex<Option<String>>,
    notify: Notify,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// No further units will be registered.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Records one unit's final result. The first failure is kept.
    pub fn complete(&self, result: Result<(), String>) {
        if let Err(message) = result {
            let mut failure = self
                .first_failure
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            failure.get_or_insert(message);
        }
        // Saturate so a stray completion cannot wrap the counter.
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.notify.notify_waiters();
    }

    pub fn try_finalize(&self) -> Finalize {
        let outstanding = self.outstanding();
        if !self.sealed.load(Ordering::SeqCst) || outstanding > 0 {
            return Finalize::Outstanding(outstanding);
        }
        if self.fired.swap(true, Ordering::SeqCst) {
            return Finalize::AlreadyFired;
        }

        let failure = self
            .first_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Finalize::Ready(match failure {
            Some(message) => Err(message),
            None => Ok(()),
        })
    }

    async fn changed(&self, recheck: Duration) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(recheck) => {}
        }
    }
}

pub type Action = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;
pub type FailureAction = Box<dyn FnOnce(String) -> BoxFuture<'static, ()> + Send>;

/// The three terminal actions of a fan-out. Exactly one of `on_success` and
/// `on_failure` runs, then `always`.
pub struct CompletionActions {
    pub on_success: Action,
    pub on_failure: FailureAction,
    pub always: Action,
}

impl CompletionActions {
    pub async fn fire(self, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => (self.on_success)().await,
            Err(message) => (self.on_failure)(message).await,
        }
        (self.always)().await;
    }
}

/// Waits for the barrier and fires `actions` once. Returns `false` when some
/// other caller already concluded the barrier.
pub async fn finalize_when_done(
    barrier: &CompletionBarrier,
    actions: CompletionActions,
    recheck: Duration,
) -> bool {
    loop {
        match barrier.try_finalize() {
            Finalize::Outstanding(n) => {
                debug!(outstanding = n, "Finalization deferred, work still outstanding");
                barrier.changed(recheck).await;
            }
            Finalize::Ready(outcome) => {
                actions.fire(outcome).await;
                return true;
            }
            Finalize::AlreadyFired => return false,
        }
    }
}
