//! Pending invoke bookkeeping
//!
//! Every command that expects a `_result` is recorded under its transaction
//! id until the reply arrives. Some servers echo a different id, so lookup
//! falls back to the command name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Mutex;

use crate::error::InvokeError;

/// Transaction-id counter plus the table of unanswered commands
///
/// Thread-safe: the counter is atomic and the table sits behind a `Mutex`.
pub struct InvokeRegistry {
    /// Last id handed out; the first call to `next_transaction_id` yields 1
    last_id: AtomicU32,

    /// Pending commands keyed by transaction id
    pending: Mutex<HashMap<u32, String>>,
}

impl InvokeRegistry {
    pub fn new() -> Self {
        Self {
            last_id: AtomicU32::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next transaction id
    pub fn next_transaction_id(&self) -> u32 {
        self.last_id.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Record a command awaiting its reply
    pub async fn register(&self, id: u32, command: &str) -> Result<(), InvokeError> {
        if command.is_empty() {
            return Err(InvokeError::EmptyCommand);
        }

        let mut pending = self.pending.lock().await;
        if pending.contains_key(&id) {
            return Err(InvokeError::DuplicateId(id));
        }
        pending.insert(id, command.to_string());

        tracing::debug!(transaction_id = id, command = command, "Invoke registered");
        Ok(())
    }

    /// Remove and return the command a reply belongs to
    ///
    /// Tries the id first, then the first entry whose name equals `hint`.
    pub async fn resolve(&self, id: u32, hint: &str) -> Result<String, InvokeError> {
        let mut pending = self.pending.lock().await;

        if let Some(command) = pending.remove(&id) {
            return Ok(command);
        }

        let by_name = pending
            .iter()
            .find(|(_, command)| !hint.is_empty() && command.as_str() == hint)
            .map(|(&found, _)| found);

        match by_name.and_then(|found| pending.remove(&found)) {
            Some(command) => {
                tracing::debug!(
                    transaction_id = id,
                    command = %command,
                    "Invoke resolved by name"
                );
                Ok(command)
            }
            None => Err(InvokeError::NotFound(id)),
        }
    }

    /// Number of commands still awaiting a reply
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

impl Default for InvokeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_start_at_one() {
        let registry = InvokeRegistry::new();
        assert_eq!(registry.next_transaction_id(), 1);
        assert_eq!(registry.next_transaction_id(), 2);
        assert_eq!(registry.next_transaction_id(), 3);
    }

    #[tokio::test]
    async fn test_register_and_resolve_by_id() {
        let registry = InvokeRegistry::new();
        registry.register(1, "connect").await.unwrap();
        registry.register(2, "createStream").await.unwrap();

        assert_eq!(registry.resolve(2, "").await.unwrap(), "createStream");
        assert_eq!(registry.pending().await, 1);
        assert_eq!(registry.resolve(1, "").await.unwrap(), "connect");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_resolve_removes_entry() {
        let registry = InvokeRegistry::new();
        registry.register(5, "connect").await.unwrap();
        registry.resolve(5, "").await.unwrap();
        assert_eq!(registry.resolve(5, "").await, Err(InvokeError::NotFound(5)));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_name() {
        let registry = InvokeRegistry::new();
        registry.register(3, "createStream").await.unwrap();

        assert_eq!(registry.resolve(9, "createStream").await.unwrap(), "createStream");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_hint_does_not_match() {
        let registry = InvokeRegistry::new();
        registry.register(3, "connect").await.unwrap();
        assert_eq!(registry.resolve(4, "").await, Err(InvokeError::NotFound(4)));
        assert_eq!(registry.pending().await, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_and_duplicate() {
        let registry = InvokeRegistry::new();
        assert_eq!(registry.register(1, "").await, Err(InvokeError::EmptyCommand));

        registry.register(1, "connect").await.unwrap();
        assert_eq!(
            registry.register(1, "play").await,
            Err(InvokeError::DuplicateId(1))
        );
        assert_eq!(registry.resolve(1, "").await.unwrap(), "connect");
    }

    #[tokio::test]
    async fn test_concurrent_ids_are_unique() {
        let registry = Arc::new(InvokeRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..100 {
                    let id = registry.next_transaction_id();
                    registry.register(id, "call").await.unwrap();
                    ids.push(id);
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(registry.pending().await, 800);
    }
}
