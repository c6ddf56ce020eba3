use crate::{paginate, SearchKind, SearchQuery, Storage, StorageError};
use async_trait::async_trait;
use data_encoding::HEXLOWER;
use message::{Message, MessageId};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Stores each message as a JSON document in `<path>/data`.
/// Documents are written to `<path>/new` first and then renamed into
/// place, so a reader never observes a partially written message.
pub struct LocalDiskStorage {
    path: PathBuf,
    flush: bool,
}

impl LocalDiskStorage {
    pub fn new(path: &Path, flush: bool) -> Result<Self, StorageError> {
        Self::create_dir_structure(path)?;
        Self::cleanup_new(path);

        Ok(Self {
            path: path.to_path_buf(),
            flush,
        })
    }

    fn create_dir_structure(path: &Path) -> Result<(), StorageError> {
        std::fs::create_dir_all(path.join("new"))?;
        std::fs::create_dir_all(path.join("data"))?;
        Ok(())
    }

    /// Remove temporary files left behind by an interrupted store
    fn cleanup_new(path: &Path) {
        let Ok(entries) = std::fs::read_dir(path.join("new")) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove {path:?}: {err:#}");
            }
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.path.join("data")
    }

    fn compute_path(data_dir: &Path, id: &MessageId) -> PathBuf {
        data_dir.join(format!("{}.json", HEXLOWER.encode(id.as_str().as_bytes())))
    }

    fn load_all(data_dir: &Path) -> Result<Vec<Arc<Message>>, StorageError> {
        let mut messages = vec![];
        for entry in std::fs::read_dir(data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read(&path) {
                Ok(data) => match serde_json::from_slice::<Message>(&data) {
                    Ok(msg) => messages.push(Arc::new(msg)),
                    Err(err) => tracing::error!("{} is corrupt: {err:#}", path.display()),
                },
                // Deleted concurrently
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(messages)
    }

    async fn with_all<F, T>(&self, func: F) -> Result<T, StorageError>
    where
        F: FnOnce(Vec<Arc<Message>>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let data_dir = self.data_dir();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            Ok(func(Self::load_all(&data_dir)?))
        })
        .await?
    }
}

#[async_trait]
impl Storage for LocalDiskStorage {
    async fn store(&self, message: Arc<Message>) -> Result<MessageId, StorageError> {
        let path = Self::compute_path(&self.data_dir(), &message.id);
        let new_dir = self.path.join("new");
        let flush = self.flush;
        tokio::task::spawn_blocking(move || -> Result<MessageId, StorageError> {
            let data = serde_json::to_vec(&*message)?;
            let mut temp = NamedTempFile::new_in(new_dir)?;
            temp.write_all(&data)?;
            if flush {
                temp.as_file_mut().sync_data()?;
            }
            temp.persist(&path).map_err(|err| err.error)?;
            tracing::trace!("stored {} in {path:?}", message.id);
            Ok(message.id.clone())
        })
        .await?
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let data_dir = self.data_dir();
        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let mut count = 0;
            for entry in std::fs::read_dir(data_dir)? {
                if entry?.path().extension().and_then(|ext| ext.to_str()) == Some("json") {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await?
    }

    async fn list(&self, start: usize, limit: usize) -> Result<Vec<Arc<Message>>, StorageError> {
        self.with_all(move |messages| paginate(messages, start, limit).0)
            .await
    }

    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        start: usize,
        limit: usize,
    ) -> Result<(Vec<Arc<Message>>, usize), StorageError> {
        let query = SearchQuery::new(kind, query)?;
        self.with_all(move |messages| {
            let matched = messages
                .into_iter()
                .filter(|msg| query.matches(msg))
                .collect();
            paginate(matched, start, limit)
        })
        .await
    }

    async fn load(&self, id: &MessageId) -> Result<Arc<Message>, StorageError> {
        let path = Self::compute_path(&self.data_dir(), id);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Arc::new(serde_json::from_slice(&data)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_one(&self, id: &MessageId) -> Result<(), StorageError> {
        let path = Self::compute_path(&self.data_dir(), id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_all(&self) -> Result<(), StorageError> {
        let data_dir = self.data_dir();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            for entry in std::fs::read_dir(data_dir)? {
                let path = entry?.path();
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(())
        })
        .await?
    }
}
