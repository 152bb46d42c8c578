use crate::wire::field::INT_SIZE;
use crate::wire::packet::Packet;
use crate::wire::registry::Registry;
use byteorder::{ByteOrder, LittleEndian};
use ion::logging;

/// Design ceiling on a single frame's payload size. A length prefix above
/// this is a framing violation and the stream can no longer be trusted.
pub const MAX_FRAME: usize = 1024 * 1024;

/// Raised when the length prefix itself is invalid. Unlike a bad payload the
/// frame cannot be skipped; the owning connection must be aborted.
#[derive(Debug, Eq, PartialEq)]
pub enum FramingError {
    FrameOversize(usize),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum FeedState {
    AwaitingLength,
    AwaitingBody(usize),
}

/// Streaming deframer: consumes arbitrary byte chunks and emits whole
/// packets. At most one packet is produced per call so the caller decides
/// pacing; residual bytes are retained for the next call.
pub struct Feeder {
    registry: &'static Registry,
    buffer: Vec<u8>,
    state: FeedState,
    log: logging::Logger,
}

impl Feeder {
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        registry: &'static Registry,
        log: L,
    ) -> Feeder {
        let feeder_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        Feeder {
            registry,
            buffer: Vec::new(),
            state: FeedState::AwaitingLength,
            log: feeder_log,
        }
    }

    /// Appends `chunk` to the internal buffer and tries to produce the next
    /// packet. A frame that fails to decode is consumed whole (the length
    /// prefix is trusted, so framing stays synchronized) and reported as no
    /// packet.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Packet>, FramingError> {
        self.buffer.extend_from_slice(chunk);
        self.advance()
    }

    /// Tries to produce the next packet from already-buffered bytes.
    #[inline]
    pub fn poll(&mut self) -> Result<Option<Packet>, FramingError> {
        self.advance()
    }

    /// Number of residual bytes awaiting completion of the next frame.
    #[inline]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn advance(&mut self) -> Result<Option<Packet>, FramingError> {
        loop {
            match self.state {
                FeedState::AwaitingLength => {
                    if self.buffer.len() < INT_SIZE {
                        return Ok(None);
                    }

                    let length = LittleEndian::read_u32(&self.buffer[..INT_SIZE]) as usize;
                    self.buffer.drain(..INT_SIZE);

                    if length > MAX_FRAME {
                        return Err(FramingError::FrameOversize(length));
                    }

                    self.state = FeedState::AwaitingBody(length);
                }
                FeedState::AwaitingBody(length) => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }

                    let body: Vec<u8> = self.buffer.drain(..length).collect();
                    self.state = FeedState::AwaitingLength;

                    match self.registry.unpack(&body) {
                        Ok(packet) => return Ok(Some(packet)),
                        Err(err) => {
                            logging::warn!(self.log, "dropping undecodable frame";
                                           "context" => "feed",
                                           "length" => length,
                                           "error" => ?err);
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::field::{FieldDef, FieldKind, FieldValue};
    use crate::wire::packet::PacketType;

    const CMD: FieldDef = FieldDef::new("cmd", FieldKind::Command);
    const DATA: FieldDef = FieldDef::new("data", FieldKind::Str { maxsize: 16 });

    fn test_registry() -> &'static Registry {
        let registry = Registry::build(vec![
            PacketType::new("Echo", 1, &[CMD, DATA]),
            PacketType::new("Nop", 2, &[CMD]),
        ])
        .unwrap();

        Box::leak(Box::new(registry))
    }

    fn echo(registry: &'static Registry, data: &str) -> Packet {
        let ty = registry.lookup(1).unwrap();
        Packet::build(ty, &[("data", FieldValue::Str(data.to_owned()))]).unwrap()
    }

    fn nop(registry: &'static Registry) -> Packet {
        Packet::build(registry.lookup(2).unwrap(), &[]).unwrap()
    }

    #[test]
    fn test_whole_frame() {
        let registry = test_registry();
        let mut feeder = Feeder::new(registry, None);

        let packet = feeder.feed(&echo(registry, "hi").pack()).unwrap().unwrap();

        assert_eq!(packet.str_field("data"), Some("hi"));
        assert_eq!(feeder.pending(), 0);
    }

    #[test]
    fn test_single_byte_splits() {
        let registry = test_registry();
        let mut feeder = Feeder::new(registry, None);

        let frames: Vec<u8> = echo(registry, "abc")
            .pack()
            .into_iter()
            .chain(nop(registry).pack())
            .collect();

        let mut emitted = Vec::new();
        for byte in frames {
            if let Some(packet) = feeder.feed(&[byte]).unwrap() {
                emitted.push(packet);
            }
        }

        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].str_field("data"), Some("abc"));
        assert_eq!(emitted[1].command(), 2);
        assert_eq!(feeder.pending(), 0);
    }

    #[test]
    fn test_split_at_length_prefix_boundary() {
        let registry = test_registry();
        let mut feeder = Feeder::new(registry, None);

        let frame = nop(registry).pack();

        assert_eq!(feeder.feed(&frame[..3]).unwrap(), None);
        let packet = feeder.feed(&frame[3..]).unwrap().unwrap();

        assert_eq!(packet.command(), 2);
    }

    #[test]
    fn test_multiple_frames_one_per_call() {
        let registry = test_registry();
        let mut feeder = Feeder::new(registry, None);

        let frames: Vec<u8> = nop(registry)
            .pack()
            .into_iter()
            .chain(echo(registry, "x").pack())
            .collect();

        let first = feeder.feed(&frames).unwrap().unwrap();
        assert_eq!(first.command(), 2);

        let second = feeder.poll().unwrap().unwrap();
        assert_eq!(second.str_field("data"), Some("x"));

        assert_eq!(feeder.poll().unwrap(), None);
    }

    #[test]
    fn test_bad_frame_is_consumed() {
        let registry = test_registry();
        let mut feeder = Feeder::new(registry, None);

        // Well-framed body carrying an unregistered command byte.
        let mut stream = vec![1, 0, 0, 0, 99];
        stream.extend(nop(registry).pack());

        assert_eq!(feeder.feed(&stream).unwrap(), None);

        // The stream is still synchronized on the next frame.
        let packet = feeder.poll().unwrap().unwrap();
        assert_eq!(packet.command(), 2);
    }

    #[test]
    fn test_oversize_frame_is_rejected_before_buffering() {
        let registry = test_registry();
        let mut feeder = Feeder::new(registry, None);

        let length = (MAX_FRAME + 1) as u32;
        let prefix = length.to_le_bytes();

        assert_eq!(
            feeder.feed(&prefix).unwrap_err(),
            FramingError::FrameOversize(MAX_FRAME + 1)
        );
    }

    #[test]
    fn test_no_residue_after_exact_frames() {
        let registry = test_registry();
        let mut feeder = Feeder::new(registry, None);

        let mut stream = Vec::new();
        for data in &["one", "two", "three"] {
            stream.extend(echo(registry, data).pack());
        }

        let mut collected = Vec::new();
        let mut next = feeder.feed(&stream).unwrap();
        while let Some(packet) = next {
            collected.push(packet.str_field("data").unwrap().to_owned());
            next = feeder.poll().unwrap();
        }

        assert_eq!(collected, vec!["one", "two", "three"]);
        assert_eq!(feeder.pending(), 0);
    }
}
