//! Per-identity writer locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One exclusive lock per identifier. Tree mutations, profile creation and
/// state transitions hold the guard for their whole critical section.
#[derive(Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, identifier: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(identifier.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
