//! Per-plate serialization.
//!
//! Two frames of the same vehicle can arrive almost together from different
//! cameras. The "is it inside" check and the write that follows must not
//! interleave for one plate, or both frames would register an entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex, one lock per plate string
#[derive(Clone, Default)]
pub struct PlateLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held while a plate's access state is being decided
pub struct PlateGuard {
    plate: String,
    _guard: OwnedMutexGuard<()>,
}

impl PlateGuard {
    pub fn plate(&self) -> &str {
        &self.plate
    }
}

impl PlateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `plate`.
    pub async fn lock(&self, plate: &str) -> PlateGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop locks nobody holds or waits on
            locks.retain(|key, lock| key == plate || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(plate.to_string()).or_default())
        };

        PlateGuard {
            plate: plate.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of plates with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_plate_is_serialized() {
        let locks = PlateLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("ABC123").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_plates_do_not_block() {
        let locks = PlateLocks::new();
        let first = locks.lock("ABC123").await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock("XYZ987"))
            .await
            .expect("other plate should not wait");
        assert_eq!(first.plate(), "ABC123");
        assert_eq!(second.plate(), "XYZ987");
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = PlateLocks::new();
        drop(locks.lock("AAA111").await);
        drop(locks.lock("BBB222").await);
        let _held = locks.lock("CCC333").await;
        // Taking CCC333 pruned the two idle entries
        assert_eq!(locks.len(), 1);
        assert!(!locks.is_empty());
    }
}
