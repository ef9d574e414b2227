//! Message dispatch: one handling path per inbound message.

pub mod router;

pub use router::{Accepted, Dispatcher, Pending};
