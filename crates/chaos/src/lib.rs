//! Deterministic-when-seeded fault injection for SMTP sessions.
//!
//! A [FaultInjector] is consulted at fixed points in the life of a
//! session: when the connection is accepted, when the link is set up,
//! after every read, and whenever the protocol validates a sender,
//! recipient or authentication attempt. [ChaosMonkey] is the stock
//! implementation that makes each decision at random according to a
//! [ChaosConfig].
use std::net::SocketAddr;

mod monkey;

pub use monkey::{ChaosConfig, ChaosError, ChaosMonkey};

pub trait FaultInjector: Send + Sync {
    /// Whether to accept a new connection from `peer` at all
    fn accept(&self, _peer: SocketAddr) -> bool {
        true
    }

    /// If set, the connection is throttled to this many bytes per second
    fn link_speed(&self) -> Option<u64>;

    /// Polled after every successful read; true drops the connection
    fn disconnect(&self) -> bool;

    fn valid_mail(&self, address: &str) -> bool;

    fn valid_rcpt(&self, address: &str) -> bool;

    fn valid_auth(&self, mechanism: &str, args: &[String]) -> bool;
}
