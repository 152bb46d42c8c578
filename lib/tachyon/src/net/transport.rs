use crate::net::buffer::Buffer;
use crate::support::NetworkResult;
use ion::logging;
use mio::net::TcpStream;
use std::net::Shutdown;

/// Per-connection socket ownership and buffering. The transport never talks
/// to the application directly; the owning connection drives it off
/// readiness events and hands drained chunks to the protocol.
pub struct Transport {
    token: mio::Token,
    stream: Option<TcpStream>,
    in_buffer: Buffer,
    out_buffer: Buffer,
    closed: bool,
    log: logging::Logger,
}

impl Transport {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        token: mio::Token,
        stream: TcpStream,
        log: L,
    ) -> Transport {
        let transport_log = match log.into() {
            Some(log) => log.new(logging::o!("token" => token.0)),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        Transport {
            token,
            stream: Some(stream),
            in_buffer: Buffer::new(),
            out_buffer: Buffer::new(),
            closed: false,
            log: transport_log,
        }
    }

    #[inline]
    pub fn token(&self) -> mio::Token {
        self.token
    }

    /// True once the transport has been closed or marked for teardown.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Requests teardown. The owning connection aborts the transport once
    /// the current dispatch completes; queued output is flushed best-effort
    /// first.
    #[inline]
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Queues bytes for transmission. Never writes to the socket directly;
    /// data leaves on `flush` or on writable readiness.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.closed || self.stream.is_none() {
            return;
        }
        self.out_buffer.write(bytes);
    }

    /// Registers the socket with the edge-triggered connection mask.
    pub fn register(&self, poller: &mio::Poll) -> NetworkResult<()> {
        let stream = self.stream.as_ref().expect("Transport must have a stream to register");

        poller
            .register(
                stream,
                self.token,
                mio::Ready::readable() | mio::Ready::writable(),
                mio::PollOpt::edge(),
            )
            .map_err(Into::into)
    }

    /// Drains the socket until it would block; everything received lands in
    /// the inbound buffer.
    pub(crate) fn drain_ingress(&mut self) -> NetworkResult<usize> {
        let stream = self.stream.as_ref().expect("Transport must have a stream to read");
        let received = self.in_buffer.ingress(stream)?;

        logging::trace!(self.log, "drained socket"; "context" => "ingress", "count" => received);

        Ok(received)
    }

    /// Hands over everything received since the last call.
    #[inline]
    pub(crate) fn take_chunk(&mut self) -> Vec<u8> {
        self.in_buffer.take()
    }

    /// Pushes buffered output to the socket until the kernel would block.
    /// Anything unaccepted stays queued for the next writable event.
    pub fn flush(&mut self) -> NetworkResult<usize> {
        if self.out_buffer.is_empty() {
            return Ok(0);
        }

        let stream = match self.stream.as_ref() {
            Some(stream) => stream,
            None => return Ok(0),
        };

        let sent = self.out_buffer.egress(stream)?;

        logging::trace!(self.log, "flushed output"; "context" => "egress", "count" => sent);

        Ok(sent)
    }

    /// Deregisters and closes the socket. Idempotent.
    pub(crate) fn abort(&mut self, poller: &mio::Poll) {
        self.closed = true;

        if let Some(stream) = self.stream.take() {
            drop(poller.deregister(&stream));
            drop(stream.shutdown(Shutdown::Both));

            logging::debug!(self.log, "transport aborted"; "context" => "abort");
        }
    }
}
