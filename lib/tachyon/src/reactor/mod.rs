//! Non-blocking reactor: readiness dispatch over an edge-triggered poller,
//! immediate and delayed callbacks, thread-safe submission, and a small
//! executor for offloading blocking work.

pub mod core;
pub mod delayed;
pub mod executor;

pub use self::core::{EventHandler, Reactor, RemoteHandle, DEFAULT_TIMEOUT};
pub use self::delayed::{DelayedCall, TimerHandle};
