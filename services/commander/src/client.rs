use crate::commands::{self, cmd};
use ion::logging;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tachyon::wire::feeder::Feeder;
use tachyon::wire::packet::Packet;

/// Socket timeout applied to connect, send and receive.
pub const TIMEOUT: Duration = Duration::from_secs(10);

const CHUNK_SIZE: usize = 1024;

/// A digested server reply, ready for presentation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reply {
    Connected { session: String },
    Pong,
    PongD { data: String },
    Delayed { data: String },
    AckQuit { session: String },
    AckFinish,
    Unknown(u8),
}

impl Reply {
    /// True for the acknowledgements that end the session.
    pub fn is_final(&self) -> bool {
        match self {
            Reply::AckQuit { .. } | Reply::AckFinish => true,
            _ => false,
        }
    }
}

/// Synchronous command client: one packet out, then block until one whole
/// reply frame has been assembled and dispatched.
pub struct CommandClient {
    socket: TcpStream,
    feeder: Feeder,
    session: Option<String>,
    done: bool,
    log: logging::Logger,
}

impl CommandClient {
    /// Connects with `TIMEOUT` applied to the connection attempt and to all
    /// subsequent reads and writes.
    pub fn connect<'a, L: Into<Option<&'a logging::Logger>>>(
        host: &str,
        port: u16,
        log: L,
    ) -> io::Result<CommandClient> {
        let client_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let addr = resolve(host, port)?;
        let socket = TcpStream::connect_timeout(&addr, TIMEOUT)?;
        socket.set_read_timeout(Some(TIMEOUT))?;
        socket.set_write_timeout(Some(TIMEOUT))?;

        logging::info!(client_log, "connected"; "context" => "connect", "addr" => %addr);

        Ok(CommandClient {
            socket,
            feeder: Feeder::new(commands::registry(), &client_log),
            session: None,
            done: false,
            log: client_log,
        })
    }

    /// Session learned from the last CONNECTED reply.
    #[inline]
    pub fn session(&self) -> Option<&str> {
        self.session.as_ref().map(String::as_str)
    }

    /// True once a final acknowledgement or the end of stream was seen.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Sends one request packet.
    pub fn send(&mut self, packet: &Packet) -> io::Result<()> {
        self.socket.write_all(&packet.pack())
    }

    /// Blocks until one whole reply frame has been assembled, then digests
    /// it. The end of stream marks the client done and surfaces as
    /// `UnexpectedEof`.
    pub fn recv_reply(&mut self) -> io::Result<Reply> {
        loop {
            if let Some(packet) = self.feeder.poll().map_err(framing_error)? {
                return Ok(self.digest(&packet));
            }

            let mut chunk = [0u8; CHUNK_SIZE];
            let count = self.socket.read(&mut chunk)?;
            if count == 0 {
                self.done = true;
                return Err(io::ErrorKind::UnexpectedEof.into());
            }

            if let Some(packet) = self.feeder.feed(&chunk[..count]).map_err(framing_error)? {
                return Ok(self.digest(&packet));
            }
        }
    }

    fn digest(&mut self, packet: &Packet) -> Reply {
        logging::debug!(self.log, "reply received";
                        "context" => "digest",
                        "packet" => packet.name());

        match packet.command() {
            cmd::CONNECTED => {
                let session = packet.str_field("session").unwrap_or("").to_owned();
                self.session = Some(session.clone());
                Reply::Connected { session }
            }
            cmd::PONG => Reply::Pong,
            cmd::PONGD => Reply::PongD {
                data: packet.str_field("data").unwrap_or("").to_owned(),
            },
            cmd::DELAYED => Reply::Delayed {
                data: packet.str_field("data").unwrap_or("").to_owned(),
            },
            cmd::ACKQUIT => {
                self.done = true;
                Reply::AckQuit {
                    session: packet.str_field("session").unwrap_or("").to_owned(),
                }
            }
            cmd::ACKFINISH => {
                self.done = true;
                Reply::AckFinish
            }
            other => Reply::Unknown(other),
        }
    }

    /// Closes the socket. Idempotent.
    pub fn shutdown(&mut self) {
        self.done = true;
        drop(self.socket.shutdown(Shutdown::Both));

        logging::info!(self.log, "socket closed"; "context" => "shutdown");
    }
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address for host"))
}

fn framing_error(err: tachyon::wire::feeder::FramingError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", err))
}

/// Turns one REPL line into a request packet: `1` CONNECT, `2` PING,
/// `3 <data>` PINGD, `4 <data>` DELAY, `5` QUIT, `6` FINISH.
pub fn packet_from_input(line: &str) -> Option<Packet> {
    let mut words = line.split_whitespace();
    let code = words.next()?;
    let data = words.collect::<Vec<_>>().join(" ");

    match code {
        "1" => Some(commands::connect()),
        "2" => Some(commands::ping()),
        "3" => commands::pingd(&data).ok(),
        "4" => commands::delay(&data).ok(),
        "5" => Some(commands::quit()),
        "6" => Some(commands::finish()),
        _ => None,
    }
}
