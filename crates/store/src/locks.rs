use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// Per-order async mutexes. Reconciliations of one order run one at a time
/// inside a process; different orders never wait on each other.
#[derive(Clone, Default)]
pub struct OrderLocks {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

pub struct OrderGuard {
    _guard: OwnedMutexGuard<()>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, order_id: &str) -> OrderGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() >= PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(order_id.to_string()).or_default().clone()
        };
        OrderGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of orders with a lock slot, held or idle.
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
