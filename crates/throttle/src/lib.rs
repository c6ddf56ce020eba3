//! This crate simulates a slow network link. A [Link] holds a shared
//! bandwidth budget expressed in bytes per second, and [Throttled]
//! wraps any async stream so that both directions of traffic draw
//! from that budget.
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

mod stream;

pub use stream::Throttled;

/// Upper bound on how much a single read or write may move at once,
/// so that fast links still pace in reasonably small steps.
const MAX_CHUNK: u64 = 16 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("link speed must be at least 1 byte per second")]
    ZeroSpeed,
}

#[derive(Debug)]
pub struct Link {
    bytes_per_second: u64,
    /// The point in time at which all previously transferred bytes
    /// have been paid for
    next_free: Mutex<Instant>,
}

impl Link {
    pub fn new(bytes_per_second: u64) -> Result<Arc<Self>, Error> {
        if bytes_per_second == 0 {
            return Err(Error::ZeroSpeed);
        }
        Ok(Arc::new(Self {
            bytes_per_second,
            next_free: Mutex::new(Instant::now()),
        }))
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    /// The largest transfer that should be attempted in a single step
    pub fn chunk_size(&self) -> usize {
        self.bytes_per_second.min(MAX_CHUNK) as usize
    }

    /// How long it takes to move `bytes` across the link
    pub fn transfer_time(&self, bytes: usize) -> Duration {
        let nanos = bytes as u128 * 1_000_000_000 / self.bytes_per_second as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Account for `bytes` having been moved across the link.
    /// Returns the instant before which the link must not be used
    /// again.
    pub fn consume(&self, bytes: usize) -> Instant {
        let now = Instant::now();
        let mut next_free = self.next_free.lock();
        let start = (*next_free).max(now);
        *next_free = start + self.transfer_time(bytes);
        *next_free
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_speed_is_rejected() {
        assert_eq!(Link::new(0).unwrap_err(), Error::ZeroSpeed);
    }

    #[test]
    fn chunk_size() {
        assert_eq!(Link::new(1).unwrap().chunk_size(), 1);
        assert_eq!(Link::new(1024).unwrap().chunk_size(), 1024);
        assert_eq!(
            Link::new(10 * 1024 * 1024).unwrap().chunk_size(),
            MAX_CHUNK as usize
        );
    }

    #[tokio::test(start_paused = true)]
    async fn consumption_accumulates() {
        let link = Link::new(10).unwrap();
        let start = Instant::now();
        assert_eq!(link.consume(5), start + Duration::from_millis(500));
        assert_eq!(link.consume(10), start + Duration::from_millis(1500));

        // Idle time is not banked as credit
        tokio::time::advance(Duration::from_secs(5)).await;
        let now = Instant::now();
        assert_eq!(link.consume(1), now + Duration::from_millis(100));
    }
}
