use async_trait::async_trait;
use message::{Message, MessageId};
use regex::bytes::{Regex, RegexBuilder};
use std::sync::Arc;
use thiserror::Error;

pub mod local_disk;
pub mod memory;

pub use local_disk::LocalDiskStorage;
pub use memory::MemoryStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("invalid search query: {0}")]
    InvalidQuery(#[from] regex::Error),
    #[error("unknown search kind {0:?}; expected to, from or containing")]
    InvalidSearchKind(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Which part of the raw transaction a search query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// Any of the envelope recipients
    To,
    /// The envelope sender
    From,
    /// The raw DATA payload
    Containing,
}

impl std::str::FromStr for SearchKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to" => Ok(Self::To),
            "from" => Ok(Self::From),
            "containing" => Ok(Self::Containing),
            other => Err(StorageError::InvalidSearchKind(other.to_string())),
        }
    }
}

/// A compiled search: `kind` plus the case-insensitive pattern.
pub struct SearchQuery {
    kind: SearchKind,
    pattern: Regex,
}

impl SearchQuery {
    pub fn new(kind: SearchKind, query: &str) -> Result<Self, StorageError> {
        let pattern = RegexBuilder::new(query).case_insensitive(true).build()?;
        Ok(Self { kind, pattern })
    }

    pub fn matches(&self, message: &Message) -> bool {
        match self.kind {
            SearchKind::To => message
                .raw
                .to
                .iter()
                .any(|to| self.pattern.is_match(to.as_bytes())),
            SearchKind::From => self.pattern.is_match(message.raw.from.as_bytes()),
            SearchKind::Containing => self.pattern.is_match(&message.raw.data),
        }
    }
}

/// Persistence for accepted messages. Implementations are shared by
/// every session and must tolerate concurrent use.
///
/// Listings and search results are ordered newest first.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist the message and return the id under which it was stored
    async fn store(&self, message: Arc<Message>) -> Result<MessageId, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;

    /// Return up to `limit` messages, skipping the `start` newest
    async fn list(&self, start: usize, limit: usize) -> Result<Vec<Arc<Message>>, StorageError>;

    /// Return a page of the messages matching the query, along with
    /// the total number of matches
    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        start: usize,
        limit: usize,
    ) -> Result<(Vec<Arc<Message>>, usize), StorageError>;

    async fn load(&self, id: &MessageId) -> Result<Arc<Message>, StorageError>;

    async fn delete_one(&self, id: &MessageId) -> Result<(), StorageError>;

    async fn delete_all(&self) -> Result<(), StorageError>;
}

/// Sort newest first and apply the page window.
/// Returns the page along with the number of candidates.
pub(crate) fn paginate(
    mut messages: Vec<Arc<Message>>,
    start: usize,
    limit: usize,
) -> (Vec<Arc<Message>>, usize) {
    messages.sort_by(|a, b| b.created.cmp(&a.created));
    let total = messages.len();
    let page = messages.into_iter().skip(start).take(limit).collect();
    (page, total)
}


#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal;

    #[test]
    fn search_kind_parse() {
        assert_equal!("to".parse::<SearchKind>().unwrap(), SearchKind::To);
        assert_equal!("from".parse::<SearchKind>().unwrap(), SearchKind::From);
        assert_equal!(
            "containing".parse::<SearchKind>().unwrap(),
            SearchKind::Containing
        );
        assert_equal!(
            "subject".parse::<SearchKind>().unwrap_err().to_string(),
            "unknown search kind \"subject\"; expected to, from or containing"
        );
    }

    #[test]
    fn query_is_case_insensitive() {
        let msg = test_util::message(0, "Alice@Example.com", "bob@example.net", "Hello World");
        assert!(SearchQuery::new(SearchKind::From, "alice@")
            .unwrap()
            .matches(&msg));
        assert!(SearchQuery::new(SearchKind::To, "BOB")
            .unwrap()
            .matches(&msg));
        assert!(SearchQuery::new(SearchKind::Containing, "hello world")
            .unwrap()
            .matches(&msg));
        assert!(!SearchQuery::new(SearchKind::To, "alice")
            .unwrap()
            .matches(&msg));
    }

    #[test]
    fn invalid_query() {
        assert!(matches!(
            SearchQuery::new(SearchKind::To, "(unclosed"),
            Err(StorageError::InvalidQuery(_))
        ));
    }
}
