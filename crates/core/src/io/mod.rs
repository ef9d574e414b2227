pub mod discord;
pub mod input;
pub mod memory;
pub mod transport;

pub use transport::{ChatTransport, TransportError};
