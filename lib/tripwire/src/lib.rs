//! A one-shot cancellation signal.
//!
//! `Tripwire::new` returns a `Trigger` and a `Tripwire`. The tripwire is a
//! future which resolves once the trigger is cancelled or dropped, and it can
//! be cloned freely so every task holding one observes the same signal.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct Shared {
    tripped: AtomicBool,

    next_id: AtomicU64,
    wakers: Mutex<HashMap<u64, Waker>>,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);

        let wakers = std::mem::take(
            &mut *self.wakers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        wakers.into_values().for_each(Waker::wake);
    }
}

/// The sending half, dropping it has the same effect as `cancel`.
pub struct Trigger {
    shared: Arc<Shared>,
}

impl Trigger {
    /// Resolve all associated tripwires.
    pub fn cancel(self) {
        drop(self)
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.shared.trip();
    }
}

pub struct Tripwire {
    shared: Arc<Shared>,
    id: u64,
}

impl Tripwire {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Trigger, Tripwire) {
        let shared = Arc::new(Shared::default());

        (
            Trigger {
                shared: Arc::clone(&shared),
            },
            Tripwire {
                id: shared.next_id(),
                shared,
            },
        )
    }

    /// Non-blocking check, useful between units of work.
    pub fn is_tripped(&self) -> bool {
        self.shared.tripped.load(Ordering::SeqCst)
    }
}

impl Clone for Tripwire {
    fn clone(&self) -> Self {
        let shared = Arc::clone(&self.shared);
        let id = shared.next_id();

        Self { shared, id }
    }
}

impl Drop for Tripwire {
    fn drop(&mut self) {
        self.shared
            .wakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl Future for Tripwire {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.is_tripped() {
            return Poll::Ready(());
        }

        self.shared
            .wakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.id, cx.waker().clone());

        // the trigger may have fired between the check and the insert
        if self.is_tripped() {
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    macro_rules! assert_pending {
        ($var:expr) => {
            assert!(futures::poll!(&mut $var).is_pending());
        };
    }

    macro_rules! assert_ready {
        ($var:expr) => {
            assert!(futures::poll!(&mut $var).is_ready());
        };
    }

    #[tokio::test]
    async fn cancel_resolves() {
        let (trigger, mut tripwire) = Tripwire::new();
        assert_pending!(tripwire);
        assert!(!tripwire.is_tripped());

        trigger.cancel();
        assert_ready!(tripwire);
        assert_ready!(tripwire);
        assert!(tripwire.is_tripped());
    }

    #[tokio::test]
    async fn drop_resolves() {
        let (trigger, mut tripwire) = Tripwire::new();
        assert_pending!(tripwire);

        drop(trigger);
        assert_ready!(tripwire);
    }

    #[tokio::test]
    async fn cloned_tripwire() {
        let (trigger, mut tw1) = Tripwire::new();
        assert_pending!(tw1);
        let mut tw2 = tw1.clone();
        assert_pending!(tw2);

        trigger.cancel();

        assert!(tw1.shared.wakers.lock().unwrap().is_empty());
        assert_ready!(tw1);
        assert_ready!(tw2);
    }

    #[tokio::test]
    async fn clone_after_cancel() {
        let (trigger, tripwire) = Tripwire::new();
        trigger.cancel();

        let mut cloned = tripwire.clone();
        assert_ready!(cloned);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wakes_waiting_task() {
        let (trigger, tripwire) = Tripwire::new();

        let waiter = tokio::spawn(async move {
            tokio::time::timeout(Duration::from_secs(5), tripwire)
                .await
                .is_ok()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();

        assert!(waiter.await.unwrap());
    }
}
