use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

static IMPORT_SEMAPHORE: Lazy<Arc<Semaphore>> = Lazy::new(|| {
    let limit = envmnt::get_parse::<_, usize, _>("IMPORT_CONCURRENCY")
        .ok()
        .filter(|v| *v > 0)
        .unwrap_or(1);
    log::info!("Running up to {limit} supplier imports at once");
    Arc::new(Semaphore::new(limit))
});

pub async fn acquire_import_permit() -> Result<OwnedSemaphorePermit, anyhow::Error> {
    IMPORT_SEMAPHORE
        .clone()
        .acquire_owned()
        .await
        .map_err(|err| anyhow::anyhow!("Unable to acquire import permit: {err}"))
}

/// Keyed async mutex serializing work on one product across concurrent supplier runs.
#[derive(Default, Clone)]
pub struct ProductLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ProductLocks {
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries held only by the map are idle.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Locks every key, in sorted order so overlapping key sets cannot deadlock.
    pub async fn lock_all<I>(&self, keys: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut guards = vec![];
        for key in keys.into_iter().collect::<BTreeSet<_>>() {
            guards.push(self.lock(&key).await);
        }
        guards
    }

    /// Lock of one stored product, taken after its lookup.
    pub async fn lock_product(&self, id: &Uuid) -> OwnedMutexGuard<()> {
        self.lock(&format!("product:{id}")).await
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
