pub mod id;
pub mod message;
pub mod path;

pub use crate::id::MessageId;
pub use crate::message::{Content, Message, SmtpMessage};
pub use crate::path::Path;
