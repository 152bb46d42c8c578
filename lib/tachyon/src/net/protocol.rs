use crate::net::transport::Transport;
use crate::reactor::Reactor;
use crate::support::ErrorType;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DropReason {
    /// Peer closed, or the poller raised HUP/ERR.
    Closed,
    /// Torn down locally: quit acknowledgement, factory close or a framing
    /// abort requested by the protocol.
    Shutdown,
    /// Fatal transport error.
    Error(ErrorType),
}

/// Application layer of a single connection. Implementations own their
/// transport; the factory's connection handler drives the callbacks and
/// reaches the transport only through `transport()`.
pub trait Protocol {
    /// Called once, right after the connection has been accepted and
    /// registered on the poller.
    fn connection_made(&mut self, reactor: &mut Reactor);

    /// Called with every chunk drained off the socket.
    fn data_received(&mut self, reactor: &mut Reactor, data: &[u8]);

    /// Called once at end of life, before the transport is aborted.
    /// Idempotence is guaranteed by the caller.
    fn connection_lost(&mut self, reactor: &mut Reactor, reason: DropReason);

    /// The transport owned by this protocol.
    fn transport(&mut self) -> &mut Transport;
}
