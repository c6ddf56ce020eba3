use crate::{paginate, SearchKind, SearchQuery, Storage, StorageError};
use async_trait::async_trait;
use message::{Message, MessageId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Keeps every message in process memory; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStorage {
    messages: RwLock<Vec<Arc<Message>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, message: Arc<Message>) -> Result<MessageId, StorageError> {
        let id = message.id.clone();
        self.messages.write().push(message);
        Ok(id)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.messages.read().len())
    }

    async fn list(&self, start: usize, limit: usize) -> Result<Vec<Arc<Message>>, StorageError> {
        let messages = self.messages.read().clone();
        Ok(paginate(messages, start, limit).0)
    }

    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        start: usize,
        limit: usize,
    ) -> Result<(Vec<Arc<Message>>, usize), StorageError> {
        let query = SearchQuery::new(kind, query)?;
        let matched = self
            .messages
            .read()
            .iter()
            .filter(|msg| query.matches(msg))
            .cloned()
            .collect();
        Ok(paginate(matched, start, limit))
    }

    async fn load(&self, id: &MessageId) -> Result<Arc<Message>, StorageError> {
        self.messages
            .read()
            .iter()
            .find(|msg| &msg.id == id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.clone()))
    }

    async fn delete_one(&self, id: &MessageId) -> Result<(), StorageError> {
        let mut messages = self.messages.write();
        let before = messages.len();
        messages.retain(|msg| &msg.id != id);
        if messages.len() == before {
            return Err(StorageError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StorageError> {
        self.messages.write().clear();
        Ok(())
    }
}
