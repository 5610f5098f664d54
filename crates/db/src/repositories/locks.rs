use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use careline_core::ConversationId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Serializes chat mutations per conversation id: two concurrent chat calls
/// on the same conversation would otherwise interleave their turn reads and
/// writes and could double-create an issue. Calls on distinct conversations
/// proceed independently.
#[derive(Default)]
pub struct ConversationLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("conversation lock map is poisoned");
            Arc::clone(map.entry(id.0).or_default())
        };
        lock.lock_owned().await
    }
}
