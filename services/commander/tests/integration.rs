use commander::commands::{self, cmd};
use commander::server::CommandProtocol;
use ion::logging;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tachyon::net::factory::Factory;
use tachyon::reactor::Reactor;

fn start_server() -> (SocketAddr, JoinHandle<()>) {
    let (addr_tx, addr_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let log = logging::Logger::root(logging::Discard, logging::o!());
        let mut reactor = Reactor::new(&log).expect("reactor");
        let factory =
            Factory::listen(&mut reactor, "127.0.0.1", 0, CommandProtocol::builder(), &log)
                .expect("listen");

        addr_tx.send(factory.borrow().local_addr()).expect("addr");
        reactor.run();
    });

    let addr = addr_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("server did not start");

    (addr, handle)
}

fn connect(addr: &SocketAddr) -> TcpStream {
    let socket = TcpStream::connect(addr).expect("connect");
    socket
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    socket
}

/// Reads one whole `len || payload` frame and returns the payload.
fn read_frame(socket: &mut TcpStream) -> Vec<u8> {
    let mut prefix = [0u8; 4];
    socket.read_exact(&mut prefix).expect("length prefix");

    let length = u32::from_le_bytes(prefix) as usize;
    let mut payload = vec![0u8; length];
    socket.read_exact(&mut payload).expect("payload");

    payload
}

fn send(socket: &mut TcpStream, frame: &[u8]) {
    socket.write_all(frame).expect("send");
}

/// Registers the socket with the server by running a CONNECT round trip, and
/// returns the session echoed back.
fn register(socket: &mut TcpStream) -> String {
    send(socket, &commands::connect().pack());
    let payload = read_frame(socket);

    assert_eq!(payload[0], cmd::CONNECTED);
    String::from_utf8(payload[5..].to_vec()).expect("session utf8")
}

fn finish_server(addr: &SocketAddr, handle: JoinHandle<()>) {
    let mut socket = connect(addr);
    send(&mut socket, &commands::finish().pack());

    let payload = read_frame(&mut socket);
    assert_eq!(payload, vec![cmd::ACKFINISH]);

    handle.join().expect("server thread");
}

#[test]
fn test_ping_pong_bytes() {
    let (addr, handle) = start_server();
    let mut socket = connect(&addr);

    // Ping is a bare command: frame `01 00 00 00 || 02`.
    send(&mut socket, &[1, 0, 0, 0, 2]);

    let payload = read_frame(&mut socket);
    assert_eq!(payload, vec![cmd::PONG]);

    finish_server(&addr, handle);
}

#[test]
fn test_connect_broadcast_reaches_all_clients() {
    let (addr, handle) = start_server();

    let mut first = connect(&addr);
    let first_session = register(&mut first);

    assert_eq!(first_session.len(), 32);
    assert!(first_session.bytes().all(|byte| byte.is_ascii_hexdigit()));

    // The second client is registered before the broadcast under test.
    let mut second = connect(&addr);
    let second_session = register(&mut second);
    assert_ne!(first_session, second_session);

    // The first client also saw the second client's CONNECTED broadcast.
    let broadcast = read_frame(&mut first);
    assert_eq!(broadcast[0], cmd::CONNECTED);
    assert_eq!(&broadcast[5..], second_session.as_bytes());

    // A fresh CONNECT from the first client reaches both, tagged with the
    // originator's session.
    send(&mut first, &commands::connect().pack());

    let to_first = read_frame(&mut first);
    let to_second = read_frame(&mut second);

    assert_eq!(to_first, to_second);
    assert_eq!(to_first[0], cmd::CONNECTED);
    assert_eq!(&to_first[5..], first_session.as_bytes());

    finish_server(&addr, handle);
}

#[test]
fn test_pingd_echoes_to_originator_only() {
    let (addr, handle) = start_server();

    let mut bystander = connect(&addr);
    register(&mut bystander);

    let mut socket = connect(&addr);
    // PingD("hi"): payload `03 || 02 00 00 00 || 68 69`, framed under a
    // 7-byte length prefix.
    send(&mut socket, &[7, 0, 0, 0, 3, 2, 0, 0, 0, 0x68, 0x69]);

    let payload = read_frame(&mut socket);
    assert_eq!(payload, vec![cmd::PONGD, 2, 0, 0, 0, 0x68, 0x69]);

    // The bystander got nothing; its next frame is the final ACKFINISH.
    send(&mut socket, &commands::finish().pack());
    let ack = read_frame(&mut bystander);
    assert_eq!(ack, vec![cmd::ACKFINISH]);

    handle.join().expect("server thread");
}

#[test]
fn test_delay_replies_after_five_seconds() {
    let (addr, handle) = start_server();
    let mut socket = connect(&addr);

    let started = Instant::now();
    send(&mut socket, &commands::delay("x").unwrap().pack());

    let payload = read_frame(&mut socket);
    let elapsed = started.elapsed();

    assert_eq!(payload, vec![cmd::DELAYED, 1, 0, 0, 0, 0x78]);
    assert!(elapsed >= Duration::from_millis(4500), "arrived at {:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(7), "arrived at {:?}", elapsed);

    finish_server(&addr, handle);
}

#[test]
fn test_quit_broadcasts_and_closes_originator() {
    let (addr, handle) = start_server();

    let mut survivor = connect(&addr);
    register(&mut survivor);

    let mut quitter = connect(&addr);
    send(&mut quitter, &commands::quit().pack());

    let to_quitter = read_frame(&mut quitter);
    let to_survivor = read_frame(&mut survivor);

    assert_eq!(to_quitter[0], cmd::ACKQUIT);
    assert_eq!(to_quitter, to_survivor);

    // The originator's socket is closed after the acknowledgement.
    let mut scratch = [0u8; 1];
    let count = quitter.read(&mut scratch).unwrap_or(0);
    assert_eq!(count, 0);

    // Survivors stay connected and serviced.
    send(&mut survivor, &commands::ping().pack());
    assert_eq!(read_frame(&mut survivor), vec![cmd::PONG]);

    finish_server(&addr, handle);
}

#[test]
fn test_finish_stops_the_server_within_a_second() {
    let (addr, handle) = start_server();

    let mut bystander = connect(&addr);
    register(&mut bystander);

    let mut socket = connect(&addr);
    send(&mut socket, &commands::finish().pack());

    assert_eq!(read_frame(&mut socket), vec![cmd::ACKFINISH]);
    assert_eq!(read_frame(&mut bystander), vec![cmd::ACKFINISH]);

    let started = Instant::now();
    handle.join().expect("server thread");
    assert!(started.elapsed() <= Duration::from_secs(1));

    // All sockets are closed.
    let mut scratch = [0u8; 1];
    assert_eq!(socket.read(&mut scratch).unwrap_or(0), 0);
    assert_eq!(bystander.read(&mut scratch).unwrap_or(0), 0);
}

#[test]
fn test_unknown_command_frame_is_skipped() {
    let (addr, handle) = start_server();
    let mut socket = connect(&addr);

    // A well-framed body carrying an unregistered command byte, followed by
    // a Ping in the same burst. The bad frame is consumed, the stream stays
    // synchronized.
    let mut burst = vec![1, 0, 0, 0, 99];
    burst.extend(commands::ping().pack());
    send(&mut socket, &burst);

    assert_eq!(read_frame(&mut socket), vec![cmd::PONG]);

    finish_server(&addr, handle);
}

#[test]
fn test_oversize_frame_aborts_the_connection() {
    let (addr, handle) = start_server();
    let mut socket = connect(&addr);

    // Length prefix of 2 MiB, twice the design ceiling.
    let oversize = (2 * 1024 * 1024u32).to_le_bytes();
    send(&mut socket, &oversize);

    let mut scratch = [0u8; 1];
    let count = socket.read(&mut scratch).unwrap_or(0);
    assert_eq!(count, 0);

    // The listener survives the abort.
    finish_server(&addr, handle);
}

#[test]
fn test_split_frame_reassembly_across_writes() {
    let (addr, handle) = start_server();
    let mut socket = connect(&addr);

    // PingD("hi") split at the length-prefix boundary: 3 bytes, then the
    // rest, with a pause between the two writes.
    let frame = commands::pingd("hi").unwrap().pack();

    send(&mut socket, &frame[..3]);
    thread::sleep(Duration::from_millis(50));
    send(&mut socket, &frame[3..]);

    let payload = read_frame(&mut socket);
    assert_eq!(payload, vec![cmd::PONGD, 2, 0, 0, 0, 0x68, 0x69]);

    finish_server(&addr, handle);
}
