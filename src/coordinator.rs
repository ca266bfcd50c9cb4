//! Serializes every mutation behind one tournament-wide lock and drops
//! redelivered events whose id was handled within the last TTL window.

use std::{collections::HashMap, sync::Mutex, time::Duration};
use tokio::{sync::Mutex as AsyncMutex, time::Instant};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Event ids handled recently, each remembered until its expiry.
pub struct DedupCache {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        DedupCache {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, event_id: &str) -> bool {
        let now = Instant::now();
        let mut guard = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|_, expires_at| *expires_at > now);
        guard.contains_key(event_id)
    }

    pub fn record(&self, event_id: &str) {
        let expires_at = Instant::now() + self.ttl;
        let mut guard = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(event_id.to_string(), expires_at);
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        guard.values().filter(|expires_at| **expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Coordinated<R> {
    Applied(R),
    Duplicate,
}

pub struct Coordinator {
    gate: AsyncMutex<()>,
    dedup: DedupCache,
    lock_timeout: Duration,
}

impl Coordinator {
    pub fn new(lock_timeout: Duration, dedup_ttl: Duration) -> Self {
        Coordinator {
            gate: AsyncMutex::new(()),
            dedup: DedupCache::new(dedup_ttl),
            lock_timeout,
        }
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Runs `op` while holding the tournament lock.
    ///
    /// The id is checked before waiting and again once the lock is held, so two
    /// concurrent deliveries of one event apply it once. It is only remembered
    /// after `op` succeeds; a `Busy` or rejected command may be resent. A blank
    /// id counts as no id.
    pub async fn run<R, F>(&self, event_id: Option<&str>, op: F) -> Result<Coordinated<R>, EngineError>
    where
        F: FnOnce() -> Result<R, EngineError>,
    {
        let event_id = event_id.map(str::trim).filter(|id| !id.is_empty());
        if let Some(id) = event_id {
            if self.dedup.contains(id) {
                debug!("dropping redelivered event {id}");
                return Ok(Coordinated::Duplicate);
            }
        }

        let _guard = match tokio::time::timeout(self.lock_timeout, self.gate.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    "tournament lock not acquired within {}ms",
                    self.lock_timeout.as_millis()
                );
                return Err(EngineError::Busy);
            }
        };

        if let Some(id) = event_id {
            if self.dedup.contains(id) {
                debug!("dropping redelivered event {id} after waiting for the lock");
                return Ok(Coordinated::Duplicate);
            }
        }

        let value = op()?;
        if let Some(id) = event_id {
            self.dedup.record(id);
        }
        Ok(Coordinated::Applied(value))
    }

    #[cfg(test)]
    pub(crate) async fn hold_lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    fn coordinator() -> Coordinator {
        Coordinator::new(Duration::from_millis(200), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_duplicate_event_applies_once() {
        let coordinator = coordinator();
        let applied = AtomicU32::new(0);

        let first = coordinator
            .run(Some("evt-1"), || Ok(applied.fetch_add(1, Ordering::SeqCst)))
            .await
            .unwrap();
        let second = coordinator
            .run(Some("evt-1"), || Ok(applied.fetch_add(1, Ordering::SeqCst)))
            .await
            .unwrap();

        assert_eq!(first, Coordinated::Applied(0));
        assert_eq!(second, Coordinated::Duplicate);
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_event_is_not_remembered() {
        let coordinator = coordinator();

        let err = coordinator
            .run::<(), _>(Some("evt-2"), || Err(EngineError::InningOutOfRange { inning: 9, max: 6 }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InningOutOfRange { .. }));
        assert!(coordinator.dedup().is_empty());

        let retry = coordinator.run(Some("evt-2"), || Ok(7)).await.unwrap();
        assert_eq!(retry, Coordinated::Applied(7));
    }

    #[tokio::test]
    async fn test_events_without_id_always_apply() {
        let coordinator = coordinator();
        for _ in 0..2 {
            let outcome = coordinator.run(None, || Ok(())).await.unwrap();
            assert_eq!(outcome, Coordinated::Applied(()));
        }
        assert!(coordinator.dedup().is_empty());
    }

    #[tokio::test]
    async fn test_blank_event_ids_are_not_deduplicated() {
        let coordinator = coordinator();
        for (id, value) in [("", 1), ("  ", 2), ("", 3)] {
            let outcome = coordinator.run(Some(id), || Ok(value)).await.unwrap();
            assert_eq!(outcome, Coordinated::Applied(value));
        }
        assert!(coordinator.dedup().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_when_lock_is_held() {
        let coordinator = Arc::new(coordinator());
        let guard = coordinator.hold_lock().await;

        let err = coordinator
            .run(Some("evt-3"), || Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Busy));
        assert!(err.is_transient());

        drop(guard);
        let outcome = coordinator.run(Some("evt-3"), || Ok(())).await.unwrap();
        assert_eq!(outcome, Coordinated::Applied(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_entry_expires_after_ttl() {
        let coordinator = Coordinator::new(Duration::from_secs(1), Duration::from_secs(60));
        let applied = AtomicU32::new(0);

        coordinator
            .run(Some("evt-4"), || Ok(applied.fetch_add(1, Ordering::SeqCst)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let within = coordinator
            .run(Some("evt-4"), || Ok(applied.fetch_add(1, Ordering::SeqCst)))
            .await
            .unwrap();
        assert_eq!(within, Coordinated::Duplicate);

        tokio::time::advance(Duration::from_secs(31)).await;
        let after = coordinator
            .run(Some("evt-4"), || Ok(applied.fetch_add(1, Ordering::SeqCst)))
            .await
            .unwrap();
        assert_eq!(after, Coordinated::Applied(1));
        assert_eq!(applied.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_apply_once() {
        let coordinator = Arc::new(coordinator());
        let applied = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let applied = applied.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .run(Some("evt-5"), || {
                        applied.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }
}
