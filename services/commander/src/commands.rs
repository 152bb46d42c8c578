use lazy_static::lazy_static;
use tachyon::wire::field::{FieldDef, FieldKind, FieldValue, ValidationError};
use tachyon::wire::packet::{Packet, PacketType};
use tachyon::wire::registry::{Registry, SchemaError};

/// Stable one-byte command identifiers.
pub mod cmd {
    pub const CONNECT: u8 = 1;
    pub const PING: u8 = 2;
    pub const PINGD: u8 = 3;
    pub const DELAY: u8 = 4;
    pub const QUIT: u8 = 5;
    pub const FINISH: u8 = 6;
    pub const CONNECTED: u8 = 7;
    pub const PONG: u8 = 8;
    pub const PONGD: u8 = 9;
    pub const DELAYED: u8 = 10;
    pub const ACKQUIT: u8 = 11;
    pub const ACKFINISH: u8 = 12;
}

/// Upper bound on the byte length of string fields.
pub const MAX_STR: usize = 256;

const CMD_FIELD: FieldDef = FieldDef::new("cmd", FieldKind::Command);
const DATA_FIELD: FieldDef = FieldDef::new("data", FieldKind::Str { maxsize: MAX_STR });
const SESSION_FIELD: FieldDef = FieldDef::new("session", FieldKind::Str { maxsize: MAX_STR });

fn build_registry() -> Result<Registry, SchemaError> {
    let connect = PacketType::new("Connect", cmd::CONNECT, &[CMD_FIELD]);
    let ping = PacketType::new("Ping", cmd::PING, &[CMD_FIELD]);
    let pingd = PacketType::new("PingD", cmd::PINGD, &[CMD_FIELD, DATA_FIELD]);
    // Delay carries the same shape as PingD and Delayed the same as PongD;
    // only the command id differs.
    let delay = pingd.extend("Delay", cmd::DELAY, &[]);
    let quit = PacketType::new("Quit", cmd::QUIT, &[CMD_FIELD]);
    let finish = PacketType::new("Finish", cmd::FINISH, &[CMD_FIELD]);

    let connected = PacketType::new("Connected", cmd::CONNECTED, &[CMD_FIELD, SESSION_FIELD]);
    let pong = PacketType::new("Pong", cmd::PONG, &[CMD_FIELD]);
    let pongd = PacketType::new("PongD", cmd::PONGD, &[CMD_FIELD, DATA_FIELD]);
    let delayed = pongd.extend("Delayed", cmd::DELAYED, &[]);
    let ackquit = PacketType::new("AckQuit", cmd::ACKQUIT, &[CMD_FIELD, SESSION_FIELD]);
    let ackfinish = PacketType::new("AckFinish", cmd::ACKFINISH, &[CMD_FIELD]);

    Registry::build(vec![
        connect, ping, pingd, delay, quit, finish, connected, pong, pongd, delayed, ackquit,
        ackfinish,
    ])
}

lazy_static! {
    static ref REGISTRY: Registry =
        build_registry().expect("Packet schema must validate at startup");
}

/// The process-wide packet registry. Forced before `listen` so that schema
/// errors abort the process before it ever serves.
#[inline]
pub fn registry() -> &'static Registry {
    &REGISTRY
}

fn bare(command: u8) -> Packet {
    let ty = registry().lookup(command).expect("Command must be registered");
    Packet::build(ty, &[]).expect("Bare packets have no required fields")
}

fn with_str(command: u8, field: &'static str, value: &str) -> Result<Packet, ValidationError> {
    let ty = registry().lookup(command).expect("Command must be registered");
    Packet::build(ty, &[(field, FieldValue::Str(value.to_owned()))])
}

// Client -> server requests.

#[inline]
pub fn connect() -> Packet {
    bare(cmd::CONNECT)
}

#[inline]
pub fn ping() -> Packet {
    bare(cmd::PING)
}

#[inline]
pub fn pingd(data: &str) -> Result<Packet, ValidationError> {
    with_str(cmd::PINGD, "data", data)
}

#[inline]
pub fn delay(data: &str) -> Result<Packet, ValidationError> {
    with_str(cmd::DELAY, "data", data)
}

#[inline]
pub fn quit() -> Packet {
    bare(cmd::QUIT)
}

#[inline]
pub fn finish() -> Packet {
    bare(cmd::FINISH)
}

// Server -> client replies.

#[inline]
pub fn connected(session: &str) -> Result<Packet, ValidationError> {
    with_str(cmd::CONNECTED, "session", session)
}

#[inline]
pub fn pong() -> Packet {
    bare(cmd::PONG)
}

#[inline]
pub fn pongd(data: &str) -> Result<Packet, ValidationError> {
    with_str(cmd::PONGD, "data", data)
}

#[inline]
pub fn delayed(data: &str) -> Result<Packet, ValidationError> {
    with_str(cmd::DELAYED, "data", data)
}

#[inline]
pub fn ackquit(session: &str) -> Result<Packet, ValidationError> {
    with_str(cmd::ACKQUIT, "session", session)
}

#[inline]
pub fn ackfinish() -> Packet {
    bare(cmd::ACKFINISH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENGTH: usize = 4;

    fn roundtrip(packet: &Packet) -> Packet {
        registry().unpack(&packet.pack()[LENGTH..]).unwrap()
    }

    #[test]
    fn test_connect() {
        let packet = connect();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_ping() {
        let packet = ping();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_pingd() {
        let packet = pingd("test_data").unwrap();
        let unpacked = roundtrip(&packet);

        assert_eq!(unpacked.str_field("data"), Some("test_data"));
        assert_eq!(unpacked, packet);
    }

    #[test]
    fn test_delay() {
        let packet = delay("later").unwrap();
        let unpacked = roundtrip(&packet);

        assert_eq!(unpacked.command(), cmd::DELAY);
        assert_eq!(unpacked.str_field("data"), Some("later"));
    }

    #[test]
    fn test_quit() {
        let packet = quit();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_finish() {
        let packet = finish();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_connected() {
        let packet = connected("test_session").unwrap();
        let unpacked = roundtrip(&packet);

        assert_eq!(unpacked.str_field("session"), Some("test_session"));
        assert_eq!(unpacked, packet);
    }

    #[test]
    fn test_pong() {
        let packet = pong();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_pongd() {
        let packet = pongd("test_data").unwrap();
        let unpacked = roundtrip(&packet);

        assert_eq!(unpacked.str_field("data"), Some("test_data"));
        assert_eq!(unpacked, packet);
    }

    #[test]
    fn test_ackquit() {
        let packet = ackquit("test_session").unwrap();
        let unpacked = roundtrip(&packet);

        assert_eq!(unpacked.str_field("session"), Some("test_session"));
        assert_eq!(unpacked, packet);
    }

    #[test]
    fn test_ackfinish() {
        let packet = ackfinish();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_connected_wire_layout() {
        let frame = connected("abcd").unwrap().pack();

        assert_eq!(
            frame,
            vec![9, 0, 0, 0, 7, 4, 0, 0, 0, 0x61, 0x62, 0x63, 0x64]
        );
    }

    #[test]
    fn test_data_maxsize_boundary() {
        let exact = "x".repeat(MAX_STR);
        assert!(pingd(&exact).is_ok());

        let oversize = "x".repeat(MAX_STR + 1);
        assert!(pingd(&oversize).is_err());
    }

    #[test]
    fn test_inheritance() {
        let pingd_ty = registry().lookup(cmd::PINGD).unwrap();
        let delay_ty = registry().lookup(cmd::DELAY).unwrap();

        assert_eq!(delay_ty.fields(), pingd_ty.fields());
        assert_eq!(delay_ty.command(), cmd::DELAY);

        let pongd_ty = registry().lookup(cmd::PONGD).unwrap();
        let delayed_ty = registry().lookup(cmd::DELAYED).unwrap();

        assert_eq!(delayed_ty.fields(), pongd_ty.fields());
        assert_eq!(delayed_ty.command(), cmd::DELAYED);
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let duplicate = Registry::build(vec![
            PacketType::new("Connected", cmd::CONNECTED, &[CMD_FIELD, SESSION_FIELD]),
            PacketType::new("Clash", cmd::CONNECTED, &[CMD_FIELD, DATA_FIELD]),
        ]);

        assert_eq!(
            duplicate.err().unwrap(),
            SchemaError::DuplicateCommand {
                name: "Clash",
                command: cmd::CONNECTED
            }
        );
    }

    #[test]
    fn test_without_fields_rejected() {
        let empty = Registry::build(vec![PacketType::new("Empty", 13, &[])]);

        assert_eq!(empty.err().unwrap(), SchemaError::NoFields("Empty"));
    }

    #[test]
    fn test_without_cmd_rejected() {
        let headless = Registry::build(vec![PacketType::new("Headless", 13, &[DATA_FIELD])]);

        assert_eq!(headless.err().unwrap(), SchemaError::CommandNotFirst("Headless"));
    }

    #[test]
    fn test_registry_is_complete() {
        assert_eq!(registry().len(), 12);
        for command in 1..=12 {
            assert!(registry().lookup(command).is_some());
        }
    }
}
