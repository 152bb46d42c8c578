use crate::net::protocol::{DropReason, Protocol};
use crate::net::transport::Transport;
use crate::reactor::{EventHandler, Reactor};
use crate::support::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
use indexmap::IndexMap;
use ion::logging;
use mio::net::TcpListener;
use mio::unix::UnixReady;
use net2::TcpBuilder;
use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};

/// Listen backlog.
const MAX_CONN: i32 = 5;

pub type ProtocolRef = Rc<RefCell<dyn Protocol>>;

/// Builds the application protocol for a freshly accepted connection. The
/// factory hands over the transport, a weak handle back to itself and a
/// per-connection logger.
pub type ProtocolBuilder =
    Box<dyn Fn(Transport, Weak<RefCell<Factory>>, logging::Logger) -> ProtocolRef>;

/// Owns the listening socket and the set of active protocols. Accepting a
/// connection wires up the transport, the protocol and the reactor
/// registration; closing tears all of it down again.
pub struct Factory {
    listener: Option<TcpListener>,
    token: mio::Token,
    local_addr: SocketAddr,
    clients: IndexMap<mio::Token, ProtocolRef>,
    builder: ProtocolBuilder,
    weak_self: Weak<RefCell<Factory>>,
    log: logging::Logger,
}

impl Factory {
    /// Binds `host:port` (`SO_REUSEADDR`, backlog 5, non-blocking),
    /// registers for accept readiness and returns the shared factory handle.
    pub fn listen(
        reactor: &mut Reactor,
        host: &str,
        port: u16,
        builder: ProtocolBuilder,
        log: &logging::Logger,
    ) -> NetworkResult<Rc<RefCell<Factory>>> {
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpBuilder::new_v4(),
            SocketAddr::V6(_) => TcpBuilder::new_v6(),
        }?;

        let std_listener = socket.reuse_address(true)?.bind(&addr)?.listen(MAX_CONN)?;
        std_listener.set_nonblocking(true)?;

        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;
        let token = reactor.next_token();

        reactor
            .poller()
            .register(&listener, token, mio::Ready::readable(), mio::PollOpt::level())?;

        let factory = Rc::new(RefCell::new(Factory {
            listener: Some(listener),
            token,
            local_addr,
            clients: IndexMap::new(),
            builder,
            weak_self: Weak::new(),
            log: log.new(logging::o!("listen" => local_addr.to_string())),
        }));

        factory.borrow_mut().weak_self = Rc::downgrade(&factory);
        reactor.set_handler(token, factory.clone());

        logging::info!(factory.borrow().log, "listening"; "context" => "listen");

        Ok(factory)
    }

    /// Address the listener actually bound to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live client connections.
    #[inline]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// The protocol registered under `token`.
    #[inline]
    pub fn client(&self, token: mio::Token) -> Option<ProtocolRef> {
        self.clients.get(&token).cloned()
    }

    /// Snapshot of the current client list. Handlers may mutate the live set
    /// while iterating the snapshot.
    pub fn clients(&self) -> Vec<(mio::Token, ProtocolRef)> {
        self.clients
            .iter()
            .map(|(&token, protocol)| (token, protocol.clone()))
            .collect()
    }

    pub(crate) fn remove_client(&mut self, token: mio::Token) -> Option<ProtocolRef> {
        self.clients.shift_remove(&token)
    }

    fn accept_ready(&mut self, reactor: &mut Reactor) {
        let (stream, addr) = {
            let listener = match self.listener.as_ref() {
                Some(listener) => listener,
                None => return,
            };

            match listener.accept() {
                Ok(pair) => pair,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    logging::warn!(self.log, "accept failed"; "context" => "accept", "error" => %err);
                    return;
                }
            }
        };

        let token = reactor.next_token();
        let conn_log = self.log.new(logging::o!("peer" => addr.to_string()));
        let transport = Transport::new(token, stream, &conn_log);
        let protocol = (self.builder)(transport, self.weak_self.clone(), conn_log);

        {
            let mut current = protocol.borrow_mut();
            if current.transport().register(reactor.poller()).has_failed() {
                logging::warn!(self.log, "registration failed, dropping connection";
                               "context" => "accept");
                return;
            }
        }

        self.clients.insert(token, protocol.clone());
        reactor.set_handler(
            token,
            Rc::new(RefCell::new(Conn::new(protocol.clone(), self.weak_self.clone()))),
        );

        protocol.borrow_mut().connection_made(reactor);

        logging::debug!(self.log, "client accepted";
                        "context" => "accept",
                        "clients" => self.clients.len());
    }

    /// Unregisters and closes the listening socket, then closes every client
    /// with a best-effort final flush first. `except` exempts the connection
    /// driving the shutdown; its own teardown completes after dispatch.
    pub fn close(&mut self, reactor: &mut Reactor, except: Option<mio::Token>) {
        if let Some(listener) = self.listener.take() {
            drop(reactor.poller().deregister(&listener));
            reactor.remove_handler(self.token);

            logging::info!(self.log, "listener closed"; "context" => "close");
        }

        for (token, protocol) in self.clients.drain(..) {
            if Some(token) == except {
                continue;
            }

            let mut current = protocol.borrow_mut();
            drop(current.transport().flush());
            current.connection_lost(reactor, DropReason::Shutdown);
            current.transport().abort(reactor.poller());
            reactor.remove_handler(token);
        }
    }
}

impl EventHandler for Factory {
    fn ready(&mut self, reactor: &mut Reactor, ready: mio::Ready) {
        let unix = UnixReady::from(ready);
        if unix.is_hup() || unix.is_error() {
            logging::warn!(self.log, "listener readiness error"; "context" => "ready");
            return;
        }

        if ready.is_readable() {
            self.accept_ready(reactor);
        }
    }
}

/// Readiness handler for one accepted connection: drives the transport off
/// the poller and the protocol off the transport.
pub(crate) struct Conn {
    protocol: ProtocolRef,
    factory: Weak<RefCell<Factory>>,
    lost: bool,
}

impl Conn {
    pub(crate) fn new(protocol: ProtocolRef, factory: Weak<RefCell<Factory>>) -> Conn {
        Conn {
            protocol,
            factory,
            lost: false,
        }
    }

    /// Tears the connection down exactly once: best-effort flush of any
    /// farewell still buffered, protocol notification, transport abort, and
    /// removal from both the handler table and the factory's client list.
    fn finalize(&mut self, reactor: &mut Reactor, reason: DropReason) {
        if self.lost {
            return;
        }
        self.lost = true;

        let token = {
            let mut current = self.protocol.borrow_mut();
            let token = current.transport().token();

            drop(current.transport().flush());
            current.connection_lost(reactor, reason);
            current.transport().abort(reactor.poller());

            token
        };

        reactor.remove_handler(token);
        if let Some(factory) = self.factory.upgrade() {
            factory.borrow_mut().remove_client(token);
        }
    }

    /// Flushes buffered output, tearing the connection down on fatal errors.
    fn flush(&mut self, reactor: &mut Reactor) {
        let result = self.protocol.borrow_mut().transport().flush();

        match result {
            Ok(_) | Err(NetworkError::Wait) => (),
            Err(NetworkError::Fatal(err)) => self.finalize(reactor, DropReason::Error(err)),
        }
    }
}

impl EventHandler for Conn {
    fn ready(&mut self, reactor: &mut Reactor, ready: mio::Ready) {
        if self.lost {
            return;
        }

        let unix = UnixReady::from(ready);
        if unix.is_hup() || unix.is_error() {
            self.finalize(reactor, DropReason::Closed);
            return;
        }

        if ready.is_readable() {
            let drained = self.protocol.borrow_mut().transport().drain_ingress();

            match drained {
                Ok(_) => {
                    let chunk = self.protocol.borrow_mut().transport().take_chunk();
                    if !chunk.is_empty() {
                        self.protocol.borrow_mut().data_received(reactor, &chunk);
                        self.flush(reactor);
                    }
                }
                Err(NetworkError::Wait) => (),
                Err(NetworkError::Fatal(ErrorType::Closed)) => {
                    // Deliver whatever arrived ahead of the shutdown first.
                    let chunk = self.protocol.borrow_mut().transport().take_chunk();
                    if !chunk.is_empty() {
                        self.protocol.borrow_mut().data_received(reactor, &chunk);
                    }
                    self.finalize(reactor, DropReason::Closed);
                }
                Err(NetworkError::Fatal(err)) => self.finalize(reactor, DropReason::Error(err)),
            }
        }

        if self.lost {
            return;
        }

        if ready.is_writable() {
            self.flush(reactor);
        }

        if self.lost {
            return;
        }

        // Teardown requested by the protocol during dispatch (quit, finish,
        // framing violation).
        let closed = self.protocol.borrow_mut().transport().is_closed();
        if closed {
            self.finalize(reactor, DropReason::Shutdown);
        }
    }
}
