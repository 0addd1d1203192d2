//! Cooperative cancellation for superseded preview runs.
//!
//! Every settings or image change starts a new preview run. The new
//! run supersedes the old one: [`RunGate::begin`] cancels the previous
//! [`RunTicket`]'s token so the old run stops at its next chunk
//! boundary, and [`RunGate::commit`] refuses results from any ticket
//! that is no longer current. A stale run that finishes its
//! computation anyway can therefore never overwrite a newer result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A shared flag checked between chunks of cancellable work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Returned by work that observed its token being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// Identifies one run issued by a [`RunGate`].
#[derive(Debug, Clone)]
pub struct RunTicket {
    generation: u64,
    token: CancellationToken,
}

impl RunTicket {
    /// The generation number of this run.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The token the run should check between chunks.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Issues run tickets and arbitrates which run may publish its result.
#[derive(Debug, Default)]
pub struct RunGate {
    current: AtomicU64,
    active: std::sync::Mutex<Option<CancellationToken>>,
}

impl RunGate {
    /// A gate with no runs issued yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run, cancelling whichever run was active.
    pub fn begin(&self) -> RunTicket {
        let token = CancellationToken::new();
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self.lock_active().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        RunTicket { generation, token }
    }

    /// Cancel the active run without starting another one.
    pub fn cancel_all(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
        if let Some(token) = self.lock_active().take() {
            token.cancel();
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // A poisoned lock only means another run panicked mid-swap; the
        // stored token is still a valid token.
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether `ticket` is still the most recently issued run.
    #[must_use]
    pub fn is_current(&self, ticket: &RunTicket) -> bool {
        !ticket.token.is_cancelled() && self.current.load(Ordering::Acquire) == ticket.generation
    }

    /// Hand `value` to `publish` only if `ticket` is still current.
    ///
    /// Returns `true` if the value was published.
    pub fn commit<T, F>(&self, ticket: &RunTicket, value: T, publish: F) -> bool
    where
        F: FnOnce(T),
    {
        if self.is_current(ticket) {
            publish(value);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled() {
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn new_run_cancels_previous() {
        let gate = RunGate::new();
        let first = gate.begin();
        let second = gate.begin();
        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());
        assert!(!gate.is_current(&first));
        assert!(gate.is_current(&second));
        assert_eq!(second.generation(), first.generation() + 1);
    }

    #[test]
    fn stale_commit_is_refused() {
        let gate = RunGate::new();
        let stale = gate.begin();
        let fresh = gate.begin();

        let mut shown = None;
        assert!(gate.commit(&fresh, "fresh", |v| shown = Some(v)));
        // The stale run finishes afterwards and must not overwrite.
        assert!(!gate.commit(&stale, "stale", |v| shown = Some(v)));
        assert_eq!(shown, Some("fresh"));
    }

    #[test]
    fn cancel_all_invalidates_active_run() {
        let gate = RunGate::new();
        let ticket = gate.begin();
        gate.cancel_all();
        assert!(ticket.token().is_cancelled());
        assert!(!gate.is_current(&ticket));
    }
}
