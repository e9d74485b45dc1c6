//! Single-flight guard for sync runs.
//!
//! Every trigger targets the same backend pair, so overlapping runs would
//! copy the same objects twice and race on the destination. When enabled,
//! the guard serializes runs: each trigger still reaches the engine, one at
//! a time, in arrival order.

use tokio::sync::{Mutex, MutexGuard};

/// Serializes sync runs when enabled; a no-op otherwise.
#[derive(Debug)]
pub struct SyncGuard {
    lock: Option<Mutex<()>>,
}

/// Held for the duration of one sync run.
#[derive(Debug)]
pub struct SyncPermit<'a> {
    _guard: Option<MutexGuard<'a, ()>>,
}

impl SyncGuard {
    /// Create a guard. With `single_flight` false, [`SyncGuard::acquire`]
    /// returns immediately.
    pub fn new(single_flight: bool) -> Self {
        Self {
            lock: single_flight.then(|| Mutex::new(())),
        }
    }

    pub fn is_single_flight(&self) -> bool {
        self.lock.is_some()
    }

    /// Wait for permission to run.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the guard
    /// untouched.
    pub async fn acquire(&self) -> SyncPermit<'_> {
        let guard = match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        SyncPermit { _guard: guard }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn run_overlapping(guard: Arc<SyncGuard>) -> usize {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let guard = Arc::clone(&guard);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _permit = guard.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }

        max_seen.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_single_flight_serializes() {
        let guard = Arc::new(SyncGuard::new(true));
        assert!(guard.is_single_flight());
        assert_eq!(run_overlapping(guard).await, 1);
    }

    #[tokio::test]
    async fn test_disabled_allows_overlap() {
        let guard = Arc::new(SyncGuard::new(false));
        assert!(!guard.is_single_flight());
        assert_eq!(run_overlapping(guard).await, 3);
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let guard = SyncGuard::new(true);
        drop(guard.acquire().await);

        let second = tokio::time::timeout(Duration::from_millis(100), guard.acquire()).await;
        assert!(second.is_ok());
    }
}
