pub mod protocol;
pub mod reply;

pub use protocol::*;
pub use reply::*;
