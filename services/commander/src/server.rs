use crate::commands::{self, cmd};
use ion::logging;
use ion::session;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tachyon::net::factory::{Factory, ProtocolBuilder, ProtocolRef};
use tachyon::net::protocol::{DropReason, Protocol};
use tachyon::net::transport::Transport;
use tachyon::reactor::{Reactor, TimerHandle};
use tachyon::wire::feeder::Feeder;
use tachyon::wire::field::ValidationError;
use tachyon::wire::packet::Packet;

/// Delay before a DELAYED reply is written back to the originator.
pub const DELAY_REPLY: Duration = Duration::from_secs(5);

/// Server side of the command protocol, one instance per accepted
/// connection. Pings are answered directly, connect/quit/finish are
/// broadcast with the originator's session, and DELAY is deferred through
/// the reactor's timer queue.
pub struct CommandProtocol {
    transport: Transport,
    factory: Weak<RefCell<Factory>>,
    session: String,
    feeder: Option<Feeder>,
    delayed: Vec<TimerHandle>,
    log: logging::Logger,
}

impl CommandProtocol {
    pub fn new(
        transport: Transport,
        factory: Weak<RefCell<Factory>>,
        log: logging::Logger,
    ) -> CommandProtocol {
        CommandProtocol {
            transport,
            factory,
            session: String::new(),
            feeder: None,
            delayed: Vec::new(),
            log,
        }
    }

    /// Protocol builder handed to `Factory::listen`.
    pub fn builder() -> ProtocolBuilder {
        Box::new(|transport, factory, log| {
            Rc::new(RefCell::new(CommandProtocol::new(transport, factory, log))) as ProtocolRef
        })
    }

    /// Session assigned to this connection.
    #[inline]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Writes `bytes` to every live client, the originator included. The
    /// iteration runs over a snapshot so handlers may mutate the client set
    /// mid-broadcast.
    fn send_to_all(&mut self, bytes: &[u8]) {
        let clients = match self.factory.upgrade() {
            Some(factory) => factory.borrow().clients(),
            None => return,
        };

        for (token, client) in clients {
            if token == self.transport.token() {
                self.transport.write(bytes);
            } else {
                let mut peer = client.borrow_mut();
                peer.transport().write(bytes);
                drop(peer.transport().flush());
            }
        }
    }

    fn dispatch(&mut self, reactor: &mut Reactor, packet: &Packet) -> Result<(), ValidationError> {
        logging::debug!(self.log, "dispatching command";
                        "context" => "dispatch",
                        "packet" => packet.name(),
                        "session" => %self.session);

        match packet.command() {
            cmd::CONNECT => self.connect(),
            cmd::PING => self.ping(),
            cmd::PINGD => self.pingd(packet),
            cmd::DELAY => self.delay(reactor, packet),
            cmd::QUIT => self.quit(),
            cmd::FINISH => self.finish(reactor),
            other => {
                logging::warn!(self.log, "unhandled command, dropping";
                               "context" => "dispatch",
                               "command" => other);
                Ok(())
            }
        }
    }

    fn connect(&mut self) -> Result<(), ValidationError> {
        let reply = commands::connected(&self.session)?.pack();
        self.send_to_all(&reply);
        Ok(())
    }

    fn ping(&mut self) -> Result<(), ValidationError> {
        self.transport.write(&commands::pong().pack());
        Ok(())
    }

    fn pingd(&mut self, packet: &Packet) -> Result<(), ValidationError> {
        let data = packet.str_field("data").unwrap_or("");
        self.transport.write(&commands::pongd(data)?.pack());
        Ok(())
    }

    fn delay(&mut self, reactor: &mut Reactor, packet: &Packet) -> Result<(), ValidationError> {
        let data = packet.str_field("data").unwrap_or("");
        let reply = commands::delayed(data)?.pack();
        let token = self.transport.token();

        let target = self
            .factory
            .upgrade()
            .and_then(|factory| factory.borrow().client(token))
            .map(|client| Rc::downgrade(&client));

        let target = match target {
            Some(target) => target,
            None => return Ok(()),
        };

        let handle = reactor.call_later(DELAY_REPLY, move |_reactor| {
            // The originator may be long gone by the time the timer fires.
            if let Some(client) = target.upgrade() {
                let mut client = client.borrow_mut();
                client.transport().write(&reply);
                drop(client.transport().flush());
            }
        });

        self.delayed.push(handle);
        Ok(())
    }

    fn quit(&mut self) -> Result<(), ValidationError> {
        let reply = commands::ackquit(&self.session)?.pack();
        self.send_to_all(&reply);

        // The connection handler aborts the transport once dispatch returns;
        // the queued acknowledgement is flushed best-effort first.
        self.transport.close();
        Ok(())
    }

    fn finish(&mut self, reactor: &mut Reactor) -> Result<(), ValidationError> {
        self.send_to_all(&commands::ackfinish().pack());

        if let Some(factory) = self.factory.upgrade() {
            factory
                .borrow_mut()
                .close(reactor, Some(self.transport.token()));
        }

        self.transport.close();
        reactor.stop();
        Ok(())
    }
}

impl Protocol for CommandProtocol {
    fn connection_made(&mut self, _reactor: &mut Reactor) {
        self.session = session::fresh_session();
        self.feeder = Some(Feeder::new(commands::registry(), &self.log));

        logging::info!(self.log, "client connected";
                       "context" => "connection_made",
                       "session" => %self.session);
    }

    fn data_received(&mut self, reactor: &mut Reactor, data: &[u8]) {
        let mut feeder = match self.feeder.take() {
            Some(feeder) => feeder,
            None => return,
        };

        let mut next = feeder.feed(data);
        loop {
            match next {
                Ok(Some(packet)) => {
                    if let Err(err) = self.dispatch(reactor, &packet) {
                        logging::warn!(self.log, "dropping frame";
                                       "context" => "data_received",
                                       "error" => ?err);
                    }
                    if self.transport.is_closed() {
                        break;
                    }
                    next = feeder.poll();
                }
                Ok(None) => break,
                Err(err) => {
                    logging::warn!(self.log, "framing violation, aborting connection";
                                   "context" => "data_received",
                                   "error" => ?err);
                    self.transport.close();
                    break;
                }
            }
        }

        self.feeder = Some(feeder);
    }

    fn connection_lost(&mut self, _reactor: &mut Reactor, reason: DropReason) {
        for handle in self.delayed.drain(..) {
            handle.cancel();
        }

        logging::info!(self.log, "client disconnected";
                       "context" => "connection_lost",
                       "reason" => ?reason,
                       "session" => %self.session);
    }

    fn transport(&mut self) -> &mut Transport {
        &mut self.transport
    }
}
