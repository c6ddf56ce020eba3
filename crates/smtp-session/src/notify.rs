use message::Message;
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tracing::warn;

/// Announces accepted messages to whoever holds the receiving end,
/// such as a UI feed.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: Sender<Arc<Message>>,
}

impl Notifier {
    pub fn new(sender: Sender<Arc<Message>>) -> Self {
        Self { sender }
    }

    /// Create a notifier along with its bounded receiving end
    pub fn channel(capacity: usize) -> (Self, Receiver<Arc<Message>>) {
        let (sender, receiver) = channel(capacity);
        (Self::new(sender), receiver)
    }

    /// Waits for room in the channel. A closed channel is logged and
    /// otherwise ignored.
    pub async fn publish(&self, message: Arc<Message>) {
        if let Err(err) = self.sender.send(message).await {
            warn!(
                "message {} was not published: nobody is listening",
                err.0.id
            );
        }
    }
}
