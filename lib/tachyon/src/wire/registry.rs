use crate::wire::field::{FieldKind, ValidationError};
use crate::wire::packet::{Packet, PacketType};
use hashbrown::HashMap;

/// Raised while the packet table is being populated. Schema errors are fatal
/// at startup: the process must not begin serving with a broken table.
#[derive(Debug, Eq, PartialEq)]
pub enum SchemaError {
    NoFields(&'static str),
    CommandNotFirst(&'static str),
    DuplicateCommand { name: &'static str, command: u8 },
}

/// Process-wide table mapping command ids to packet types. Built once before
/// the listener opens and read-only afterwards.
pub struct Registry {
    types: Vec<PacketType>,
    index: HashMap<u8, usize>,
}

impl Registry {
    /// Validates and indexes the given packet types: every type must declare
    /// a command as its first field and no two types may share a command id.
    pub fn build(types: Vec<PacketType>) -> Result<Registry, SchemaError> {
        let mut index = HashMap::with_capacity(types.len());

        for (slot, ty) in types.iter().enumerate() {
            match ty.fields().first() {
                None => return Err(SchemaError::NoFields(ty.name())),
                Some(def) if def.kind != FieldKind::Command => {
                    return Err(SchemaError::CommandNotFirst(ty.name()));
                }
                Some(_) => (),
            }

            if index.insert(ty.command(), slot).is_some() {
                return Err(SchemaError::DuplicateCommand {
                    name: ty.name(),
                    command: ty.command(),
                });
            }
        }

        Ok(Registry { types, index })
    }

    /// Number of registered packet types.
    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// The packet type registered under the given command id.
    #[inline]
    pub fn lookup(&self, command: u8) -> Option<&PacketType> {
        self.index.get(&command).map(move |&slot| &self.types[slot])
    }

    /// Decodes one packet payload (the bytes after the length prefix): looks
    /// up the type by the leading command byte, then consumes every field in
    /// order. Bytes left over after the last field are an error.
    pub fn unpack(&'static self, payload: &[u8]) -> Result<Packet, ValidationError> {
        let first = *payload.first().ok_or(ValidationError::Truncated("cmd"))?;
        let ty = self
            .lookup(first)
            .ok_or(ValidationError::UnknownCommand(first))?;

        let mut values = Vec::with_capacity(ty.fields().len());
        let mut offset = 0;

        for def in ty.fields() {
            let (value, used) = def.kind.deserialize(def.name, &payload[offset..])?;
            values.push(value);
            offset += used;
        }

        if offset != payload.len() {
            return Err(ValidationError::TrailingData(payload.len() - offset));
        }

        Ok(Packet::from_parts(ty, values))
    }
}
