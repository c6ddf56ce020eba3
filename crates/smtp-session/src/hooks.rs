use crate::Notifier;
use async_trait::async_trait;
use chaos::FaultInjector;
use message::{MessageId, SmtpMessage};
use rfc5321::{Authenticator, MessageSink, RecipientValidator, Reply, SenderValidator};
use std::net::SocketAddr;
use std::sync::Arc;
use storage::Storage;
use tracing::debug;

/// The session's side of the protocol hooks: completed transactions go
/// to storage and the notifier, and every validation defers to the
/// fault injector when one is configured.
pub struct SessionHooks {
    hostname: String,
    peer: SocketAddr,
    storage: Arc<dyn Storage>,
    notifier: Notifier,
    fault_injector: Option<Arc<dyn FaultInjector>>,
}

impl SessionHooks {
    pub fn new(
        hostname: String,
        peer: SocketAddr,
        storage: Arc<dyn Storage>,
        notifier: Notifier,
        fault_injector: Option<Arc<dyn FaultInjector>>,
    ) -> Self {
        Self {
            hostname,
            peer,
            storage,
            notifier,
            fault_injector,
        }
    }
}

#[async_trait]
impl MessageSink for SessionHooks {
    /// The message is published whether or not the store succeeded,
    /// so subscribers may hear about a message that was never persisted.
    async fn message_received(&self, raw: SmtpMessage) -> anyhow::Result<MessageId> {
        let message = Arc::new(raw.parse(&self.hostname));
        debug!(
            "Storing message {} from {} ({} bytes)",
            message.id,
            self.peer,
            message.raw.data.len()
        );
        let stored = self.storage.store(message.clone()).await;
        self.notifier.publish(message).await;
        Ok(stored?)
    }
}

impl SenderValidator for SessionHooks {
    fn validate_sender(&self, from: &str) -> bool {
        match &self.fault_injector {
            Some(injector) => injector.valid_mail(from),
            None => true,
        }
    }
}

impl RecipientValidator for SessionHooks {
    fn validate_recipient(&self, to: &str) -> bool {
        match &self.fault_injector {
            Some(injector) => injector.valid_rcpt(to),
            None => true,
        }
    }
}

impl Authenticator for SessionHooks {
    fn validate_authentication(&self, mechanism: &str, args: &[String]) -> Result<(), Reply> {
        match &self.fault_injector {
            Some(injector) if !injector.valid_auth(mechanism, args) => {
                Err(Reply::unrecognised_command())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal;
    use storage::MemoryStorage;

    struct RejectEverything;

    impl FaultInjector for RejectEverything {
        fn link_speed(&self) -> Option<u64> {
            None
        }
        fn disconnect(&self) -> bool {
            false
        }
        fn valid_mail(&self, _address: &str) -> bool {
            false
        }
        fn valid_rcpt(&self, _address: &str) -> bool {
            false
        }
        fn valid_auth(&self, _mechanism: &str, _args: &[String]) -> bool {
            false
        }
    }

    fn peer() -> SocketAddr {
        "198.51.100.7:50000".parse().unwrap()
    }

    fn hooks(fault_injector: Option<Arc<dyn FaultInjector>>) -> SessionHooks {
        let (notifier, _rx) = Notifier::channel(1);
        SessionHooks::new(
            "mx.example.com".to_string(),
            peer(),
            Arc::new(MemoryStorage::new()),
            notifier,
            fault_injector,
        )
    }

    #[test]
    fn everything_is_valid_without_injector() {
        let hooks = hooks(None);
        assert!(hooks.validate_sender("a@example.com"));
        assert!(hooks.validate_recipient("b@example.com"));
        assert_equal!(hooks.validate_authentication("PLAIN", &[]), Ok(()));
    }

    #[test]
    fn injector_decides() {
        let hooks = hooks(Some(Arc::new(RejectEverything)));
        assert!(!hooks.validate_sender("a@example.com"));
        assert!(!hooks.validate_recipient("b@example.com"));
        assert_equal!(
            hooks.validate_authentication("PLAIN", &["dGVzdA==".to_string()]),
            Err(Reply::unrecognised_command())
        );
    }

    #[tokio::test]
    async fn received_message_is_stored_and_published() {
        let storage = Arc::new(MemoryStorage::new());
        let (notifier, mut rx) = Notifier::channel(1);
        let hooks = SessionHooks::new(
            "mx.example.com".to_string(),
            peer(),
            storage.clone(),
            notifier,
            None,
        );

        let id = hooks
            .message_received(SmtpMessage {
                helo: "client".to_string(),
                from: "a@example.com".to_string(),
                to: vec!["b@example.com".to_string()],
                data: b"Subject: hi\r\n\r\nbody\r\n".to_vec(),
            })
            .await
            .unwrap();

        assert!(id.as_str().ends_with("@mx.example.com"));
        let stored = storage.load(&id).await.unwrap();
        assert_equal!(stored.content.header("Subject"), Some("hi"));
        assert_equal!(rx.recv().await.unwrap().id, id);
    }
}
