//! The seam between a connection driver and the SMTP command state
//! machine. The driver owns the socket and feeds received text into a
//! [Protocol]; the protocol calls back into the driver through the
//! capability traits in [ProtocolHooks] whenever a decision or side
//! effect lives outside of the grammar.
use crate::Reply;
use async_trait::async_trait;
use message::{MessageId, SmtpMessage};
use std::sync::Arc;

/// Receives each mail transaction that completes the DATA phase.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn message_received(&self, message: SmtpMessage) -> anyhow::Result<MessageId>;
}

pub trait SenderValidator: Send + Sync {
    /// Returns false to reject the reverse-path given to MAIL FROM
    fn validate_sender(&self, from: &str) -> bool;
}

pub trait RecipientValidator: Send + Sync {
    /// Returns false to reject the forward-path given to RCPT TO
    fn validate_recipient(&self, to: &str) -> bool;
}

pub trait Authenticator: Send + Sync {
    /// On failure, yields the reply that the protocol relays to the peer
    fn validate_authentication(&self, mechanism: &str, args: &[String]) -> Result<(), Reply>;
}

/// The set of callbacks handed to a [Protocol] at construction.
#[derive(Clone)]
pub struct ProtocolHooks {
    pub message_sink: Arc<dyn MessageSink>,
    pub sender_validator: Arc<dyn SenderValidator>,
    pub recipient_validator: Arc<dyn RecipientValidator>,
    pub authenticator: Arc<dyn Authenticator>,
}

impl ProtocolHooks {
    /// Wire all four hooks to a single handler
    pub fn from_handler<H>(handler: Arc<H>) -> Self
    where
        H: MessageSink + SenderValidator + RecipientValidator + Authenticator + 'static,
    {
        Self {
            message_sink: handler.clone(),
            sender_validator: handler.clone(),
            recipient_validator: handler.clone(),
            authenticator: handler,
        }
    }
}

impl std::fmt::Debug for ProtocolHooks {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("ProtocolHooks").finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// The name the protocol announces in its greeting and EHLO reply
    pub hostname: String,
    /// SASL mechanisms advertised in the EHLO reply
    pub auth_mechanisms: Vec<String>,
}

#[async_trait]
pub trait Protocol: Send {
    fn new(config: ProtocolConfig, hooks: ProtocolHooks) -> Self
    where
        Self: Sized;

    fn hostname(&self) -> &str;

    /// The greeting to send as soon as the connection is established
    fn start(&mut self) -> Reply;

    /// Consume complete commands from the front of `buffer`.
    /// Returns the unconsumed remainder and the reply, if any, that
    /// must be sent to the peer before anything else is parsed.
    /// The buffer holds the bytes exactly as received; DATA content
    /// need not be UTF-8.
    async fn parse(&mut self, buffer: Vec<u8>) -> (Vec<u8>, Option<Reply>);
}
