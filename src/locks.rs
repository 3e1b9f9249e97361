use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<PathBuf, Arc<Mutex<()>>>;

/// Serializes read-modify-write sequences per owning file. Unrelated files never
/// wait on each other. Entries live only while someone holds or waits on them.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<StdMutex<LockMap>>,
}

/// Held for the duration of one read-modify-write. Dropping it releases the
/// file and forgets the key once nobody else is queued on it.
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PathBuf,
    locks: Arc<StdMutex<LockMap>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // The map holds one reference; any other means a holder or waiter.
        if locks.get(&self.key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(&self.key);
        }
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, key: &Path) -> KeyGuard {
        let guard = self.entry(key).lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key: key.to_path_buf(),
            locks: self.locks.clone(),
        }
    }

    /// Non-blocking variant for synchronous callers; `None` when the key is busy.
    pub fn try_acquire(&self, key: &Path) -> Option<KeyGuard> {
        let guard = self.entry(key).try_lock_owned().ok()?;
        Some(KeyGuard {
            guard: Some(guard),
            key: key.to_path_buf(),
            locks: self.locks.clone(),
        })
    }

    pub fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
