// Cancellable one-shot timers
//
// Each `TimerSlot` owns at most one pending timer. Arming a slot cancels
// whatever it was holding, so a superseded timer can never fire. Because a
// timer may already be waking up when it is superseded, callbacks receive
// their `TimerId` and must confirm it with `TimerSlot::complete` under the
// same lock that guards the slot before touching shared state.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delay between a threshold crossing and its confirmation
    Debounce,
    /// Stage-arm delay or prediction cooldown; both re-open the admission gate
    Rearm,
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKind::Debounce => write!(f, "debounce"),
            TimerKind::Rearm => write!(f, "rearm"),
        }
    }
}

#[derive(Debug)]
struct PendingTimer {
    id: TimerId,
    token: CancellationToken,
}

#[derive(Debug)]
pub struct TimerSlot {
    kind: TimerKind,
    next_id: TimerId,
    pending: Option<PendingTimer>,
}

impl TimerSlot {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            next_id: 0,
            pending: None,
        }
    }

    /// Schedule `callback` to run once after `delay`, replacing any pending timer.
    pub fn arm<F>(&mut self, runtime: &Handle, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        self.cancel();

        self.next_id += 1;
        let id = self.next_id;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let kind = self.kind;

        runtime.spawn(async move {
            tokio::select! {
                biased;

                _ = cancelled.cancelled() => {
                    trace!(%kind, id, "timer cancelled");
                }

                _ = tokio::time::sleep(delay) => {
                    trace!(%kind, id, "timer elapsed");
                    callback(id);
                }
            }
        });

        self.pending = Some(PendingTimer { id, token });
        id
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(timer) => {
                timer.token.cancel();
                trace!(kind = %self.kind, id = timer.id, "timer superseded");
                true
            }
            None => false,
        }
    }

    /// Claim the firing of timer `id`.
    ///
    /// Returns `false` for a stale id (the timer was cancelled or replaced),
    /// in which case the callback must not act.
    pub fn complete(&mut self, id: TimerId) -> bool {
        match &self.pending {
            Some(timer) if timer.id == id => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_id(&self) -> Option<TimerId> {
        self.pending.as_ref().map(|t| t.id)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<TimerId>>>, impl Fn() -> Box<dyn FnOnce(TimerId) + Send>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let make = move || {
            let sink = Arc::clone(&sink);
            Box::new(move |id| sink.lock().push(id)) as Box<dyn FnOnce(TimerId) + Send>
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (fired, make) = recorder();
        let mut slot = TimerSlot::new(TimerKind::Debounce);

        let id = slot.arm(&Handle::current(), Duration::from_millis(50), make());
        assert_eq!(slot.pending_id(), Some(id));

        tokio::time::sleep(Duration::from_millis(49)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*fired.lock(), vec![id]);
        assert!(slot.complete(id));
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (fired, make) = recorder();
        let mut slot = TimerSlot::new(TimerKind::Rearm);

        slot.arm(&Handle::current(), Duration::from_millis(10), make());
        assert!(slot.cancel());
        assert!(!slot.cancel());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let (fired, make) = recorder();
        let mut slot = TimerSlot::new(TimerKind::Rearm);

        let first = slot.arm(&Handle::current(), Duration::from_millis(10), make());
        let second = slot.arm(&Handle::current(), Duration::from_millis(30), make());
        assert_ne!(first, second);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*fired.lock(), vec![second]);
        assert!(!slot.complete(first));
        assert!(slot.complete(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending() {
        let (fired, make) = recorder();
        {
            let mut slot = TimerSlot::new(TimerKind::Debounce);
            slot.arm(&Handle::current(), Duration::from_millis(10), make());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.lock().is_empty());
    }
}
