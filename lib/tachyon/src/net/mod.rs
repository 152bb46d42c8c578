//! Connection plumbing beneath the application protocol: buffering, socket
//! ownership, and the accept/listen factory.

pub mod buffer;
pub mod factory;
pub mod protocol;
pub mod transport;
