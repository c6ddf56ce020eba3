//! Drives SMTP conversations for a mail capture server. Each accepted
//! connection gets a [Session] that frames input into lines for a
//! [Protocol](rfc5321::Protocol), writes its replies, hands finished
//! messages to storage and subscribers, and applies whatever faults
//! the configured [FaultInjector](chaos::FaultInjector) asks for.
use std::fmt::Debug;
use tokio::io::{AsyncRead, AsyncWrite};

mod config;
mod hooks;
mod notify;
mod server;
mod session;
#[cfg(test)]
mod test_protocol;

pub use config::{ConfigError, ServerConfig, SessionConfig};
pub use hooks::SessionHooks;
pub use notify::Notifier;
pub use server::Listener;
pub use session::Session;

pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Debug + Unpin + Send {}
impl<T> AsyncReadAndWrite for T where T: AsyncRead + AsyncWrite + Debug + Unpin + Send {}

pub type BoxedAsyncReadAndWrite = Box<dyn AsyncReadAndWrite>;
