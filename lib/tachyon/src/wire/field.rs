use byteorder::{ByteOrder, LittleEndian};
use std::str;

/// Byte width of an integer field, and of every length prefix.
pub const INT_SIZE: usize = 4;

/// Wire primitive carried by a single packet field. All integers are
/// little-endian and unsigned.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FieldKind {
    /// One byte command identifier; always the first field of a packet.
    Command,
    /// Four byte unsigned integer.
    Integer,
    /// Length-prefixed UTF-8 string with an upper bound on the byte length.
    Str { maxsize: usize },
}

/// A single value slot in a packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FieldValue {
    Command(u8),
    Integer(u32),
    Str(String),
}

impl FieldValue {
    /// The contained string, if this is a string value.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(data) => Some(data),
            _ => None,
        }
    }
}

/// Named field in a packet type's ordered field list.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    #[inline]
    pub const fn new(name: &'static str, kind: FieldKind) -> FieldDef {
        FieldDef { name, kind }
    }
}

/// Raised on bad field values or undecodable packet payloads. The offending
/// frame is dropped and the connection carries on.
#[derive(Debug, Eq, PartialEq)]
pub enum ValidationError {
    UnknownCommand(u8),
    MissingField(&'static str),
    TypeMismatch(&'static str),
    Oversize {
        field: &'static str,
        size: usize,
        maxsize: usize,
    },
    Encoding(&'static str),
    Truncated(&'static str),
    TrailingData(usize),
}

impl FieldKind {
    /// Validates a value against this kind. Runs on assignment and, for
    /// strings, again on deserialization.
    pub fn check(&self, field: &'static str, value: &FieldValue) -> Result<(), ValidationError> {
        match (self, value) {
            (FieldKind::Command, FieldValue::Command(_)) => Ok(()),
            (FieldKind::Integer, FieldValue::Integer(_)) => Ok(()),
            (FieldKind::Str { maxsize }, FieldValue::Str(data)) => {
                if data.len() > *maxsize {
                    return Err(ValidationError::Oversize {
                        field,
                        size: data.len(),
                        maxsize: *maxsize,
                    });
                }
                Ok(())
            }
            _ => Err(ValidationError::TypeMismatch(field)),
        }
    }

    /// Appends the wire encoding of `value` to `out`. The value must have
    /// passed `check` for this kind.
    pub fn serialize(&self, value: &FieldValue, out: &mut Vec<u8>) {
        match value {
            FieldValue::Command(id) => out.push(*id),
            FieldValue::Integer(num) => {
                let mut raw = [0u8; INT_SIZE];
                LittleEndian::write_u32(&mut raw, *num);
                out.extend_from_slice(&raw);
            }
            FieldValue::Str(data) => {
                let mut raw = [0u8; INT_SIZE];
                LittleEndian::write_u32(&mut raw, data.len() as u32);
                out.extend_from_slice(&raw);
                out.extend_from_slice(data.as_bytes());
            }
        }
    }

    /// Decodes one value of this kind off the front of `data`, returning the
    /// value and the number of bytes consumed. Never reads past what it
    /// reports.
    pub fn deserialize(
        &self,
        field: &'static str,
        data: &[u8],
    ) -> Result<(FieldValue, usize), ValidationError> {
        match self {
            FieldKind::Command => match data.first() {
                Some(&id) => Ok((FieldValue::Command(id), 1)),
                None => Err(ValidationError::Truncated(field)),
            },
            FieldKind::Integer => {
                if data.len() < INT_SIZE {
                    return Err(ValidationError::Truncated(field));
                }
                Ok((FieldValue::Integer(LittleEndian::read_u32(data)), INT_SIZE))
            }
            FieldKind::Str { maxsize } => {
                if data.len() < INT_SIZE {
                    return Err(ValidationError::Truncated(field));
                }

                let length = LittleEndian::read_u32(data) as usize;
                if length > *maxsize {
                    return Err(ValidationError::Oversize {
                        field,
                        size: length,
                        maxsize: *maxsize,
                    });
                }
                if data.len() < INT_SIZE + length {
                    return Err(ValidationError::Truncated(field));
                }

                match str::from_utf8(&data[INT_SIZE..INT_SIZE + length]) {
                    Ok(text) => Ok((FieldValue::Str(text.to_owned()), INT_SIZE + length)),
                    Err(_) => Err(ValidationError::Encoding(field)),
                }
            }
        }
    }
}
