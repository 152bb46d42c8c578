use crate::reactor::core::Reactor;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as Atomic};
use std::sync::Arc;
use std::time::Instant;

/// Callback invoked with the owning reactor as its argument.
pub type Callback = Box<dyn FnOnce(&mut Reactor)>;

/// A callback scheduled to run at or after a monotonic deadline. Calls are
/// ordered by deadline with submission order breaking ties; cancellation only
/// marks a flag and the call is skipped when its turn comes.
pub struct DelayedCall {
    deadline: Instant,
    seq: u64,
    callback: Option<Callback>,
    cancelled: Arc<AtomicBool>,
}

impl DelayedCall {
    pub(crate) fn new(deadline: Instant, seq: u64, callback: Callback) -> (DelayedCall, TimerHandle) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let call = DelayedCall {
            deadline,
            seq,
            callback: Some(callback),
            cancelled: cancelled.clone(),
        };

        (call, TimerHandle { cancelled })
    }

    /// Wraps a callback submitted from another thread; the cancellation flag
    /// stays shared with the handle already returned to the submitter.
    pub(crate) fn adopted(
        deadline: Instant,
        seq: u64,
        callback: Callback,
        cancelled: Arc<AtomicBool>,
    ) -> DelayedCall {
        DelayedCall {
            deadline,
            seq,
            callback: Some(callback),
            cancelled,
        }
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Atomic::SeqCst)
    }

    /// Runs the callback unless the call has been cancelled in the meantime.
    pub(crate) fn invoke(mut self, reactor: &mut Reactor) {
        if self.is_cancelled() {
            return;
        }
        if let Some(callback) = self.callback.take() {
            callback(reactor);
        }
    }
}

impl std::fmt::Debug for DelayedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedCall")
            .field("deadline", &self.deadline)
            .field("seq", &self.seq)
            .finish()
    }
}

impl PartialEq for DelayedCall {
    /// Closures carry no comparable identity, so structural equality is the
    /// deadline plus the submission sequence.
    fn eq(&self, other: &DelayedCall) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for DelayedCall {}

impl Ord for DelayedCall {
    fn cmp(&self, other: &DelayedCall) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for DelayedCall {
    fn partial_cmp(&self, other: &DelayedCall) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cancellation handle for a scheduled call. The flag is monotonic: once
/// cancelled, the call never runs.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub(crate) fn from_flag(cancelled: Arc<AtomicBool>) -> TimerHandle {
        TimerHandle { cancelled }
    }

    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Atomic::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Atomic::SeqCst)
    }
}
