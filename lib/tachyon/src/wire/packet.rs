use crate::wire::field::{FieldDef, FieldValue, ValidationError, INT_SIZE};
use byteorder::{ByteOrder, LittleEndian};

/// Wire description of a packet type: the stable one-byte command id plus the
/// ordered field list. The first field is always the command; the order here
/// is the order on the wire.
#[derive(Debug, Clone)]
pub struct PacketType {
    name: &'static str,
    command: u8,
    fields: Vec<FieldDef>,
}

impl PacketType {
    /// Declares a new packet type with the given ordered fields.
    pub fn new(name: &'static str, command: u8, fields: &[FieldDef]) -> PacketType {
        PacketType {
            name,
            command,
            fields: fields.to_vec(),
        }
    }

    /// Derives a new type from an existing one: the parent's fields come
    /// first in declaration order, `extra` is appended, and the command id is
    /// overridden.
    pub fn extend(&self, name: &'static str, command: u8, extra: &[FieldDef]) -> PacketType {
        let mut fields = self.fields.clone();
        fields.extend_from_slice(extra);

        PacketType { name, command, fields }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn command(&self) -> u8 {
        self.command
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }
}

/// A single decoded (or to-be-encoded) packet: the owning type plus one value
/// per field, in field order.
#[derive(Debug, Clone)]
pub struct Packet {
    ty: &'static PacketType,
    values: Vec<FieldValue>,
}

impl Packet {
    /// Constructs a packet from `(field name, value)` assignments. Every
    /// non-command field must be present and well-typed; the command value is
    /// always taken from the type, never from the caller. Surplus
    /// assignments are ignored.
    pub fn build(
        ty: &'static PacketType,
        assigns: &[(&str, FieldValue)],
    ) -> Result<Packet, ValidationError> {
        let mut values = Vec::with_capacity(ty.fields().len());
        values.push(FieldValue::Command(ty.command()));

        for def in &ty.fields()[1..] {
            let value = assigns
                .iter()
                .find(|(name, _)| *name == def.name)
                .map(|(_, value)| value.clone())
                .ok_or(ValidationError::MissingField(def.name))?;

            def.kind.check(def.name, &value)?;
            values.push(value);
        }

        Ok(Packet { ty, values })
    }

    #[inline]
    pub(crate) fn from_parts(ty: &'static PacketType, values: Vec<FieldValue>) -> Packet {
        Packet { ty, values }
    }

    #[inline]
    pub fn ty(&self) -> &'static PacketType {
        self.ty
    }

    #[inline]
    pub fn command(&self) -> u8 {
        self.ty.command()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.ty.name()
    }

    /// Value of the named field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.ty
            .fields()
            .iter()
            .position(|def| def.name == name)
            .map(|slot| &self.values[slot])
    }

    /// String content of the named field, if present and a string.
    #[inline]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    /// Serializes to a complete frame: the payload (command byte followed by
    /// every field in order) prefixed with its u32le byte length. The prefix
    /// does not count itself.
    pub fn pack(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        for (def, value) in self.ty.fields().iter().zip(self.values.iter()) {
            def.kind.serialize(value, &mut payload);
        }

        let mut prefix = [0u8; INT_SIZE];
        LittleEndian::write_u32(&mut prefix, payload.len() as u32);

        let mut frame = Vec::with_capacity(INT_SIZE + payload.len());
        frame.extend_from_slice(&prefix);
        frame.extend_from_slice(&payload);
        frame
    }
}

impl PartialEq for Packet {
    /// Two packets are equal when they are of the same type and carry equal
    /// field values.
    fn eq(&self, other: &Packet) -> bool {
        std::ptr::eq(self.ty, other.ty) && self.values == other.values
    }
}

impl Eq for Packet {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::field::FieldKind;

    const CMD: FieldDef = FieldDef::new("cmd", FieldKind::Command);
    const DATA: FieldDef = FieldDef::new("data", FieldKind::Str { maxsize: 8 });
    const NUM: FieldDef = FieldDef::new("num", FieldKind::Integer);

    fn leak(ty: PacketType) -> &'static PacketType {
        Box::leak(Box::new(ty))
    }

    #[test]
    fn test_build_sets_command_from_type() {
        let ty = leak(PacketType::new("Bare", 3, &[CMD]));

        let packet = Packet::build(ty, &[]).unwrap();

        assert_eq!(packet.command(), 3);
        assert_eq!(packet.get("cmd"), Some(&FieldValue::Command(3)));
    }

    #[test]
    fn test_build_missing_field() {
        let ty = leak(PacketType::new("Echo", 4, &[CMD, DATA]));

        assert_eq!(
            Packet::build(ty, &[]).unwrap_err(),
            ValidationError::MissingField("data")
        );
    }

    #[test]
    fn test_build_wrong_type() {
        let ty = leak(PacketType::new("Echo", 5, &[CMD, DATA]));

        assert_eq!(
            Packet::build(ty, &[("data", FieldValue::Integer(1))]).unwrap_err(),
            ValidationError::TypeMismatch("data")
        );
    }

    #[test]
    fn test_build_ignores_surplus_assignments() {
        let ty = leak(PacketType::new("Bare", 6, &[CMD]));

        let packet = Packet::build(ty, &[("bogus", FieldValue::Integer(1))]).unwrap();
        assert_eq!(packet.command(), 6);
    }

    #[test]
    fn test_pack_layout() {
        let ty = leak(PacketType::new("Echo", 7, &[CMD, DATA]));
        let packet = Packet::build(ty, &[("data", FieldValue::Str("abcd".to_owned()))]).unwrap();

        let frame = packet.pack();

        assert_eq!(
            frame,
            vec![9, 0, 0, 0, 7, 4, 0, 0, 0, 0x61, 0x62, 0x63, 0x64]
        );
    }

    #[test]
    fn test_pack_is_deterministic() {
        let ty = leak(PacketType::new("Mix", 8, &[CMD, NUM, DATA]));
        let assigns = [
            ("num", FieldValue::Integer(1234)),
            ("data", FieldValue::Str("xy".to_owned())),
        ];

        let first = Packet::build(ty, &assigns).unwrap();
        let second = Packet::build(ty, &assigns).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.pack(), second.pack());
    }

    #[test]
    fn test_extend_appends_fields_and_overrides_command() {
        let parent = PacketType::new("Echo", 9, &[CMD, DATA]);
        let child = parent.extend("EchoNum", 10, &[NUM]);

        assert_eq!(child.command(), 10);
        assert_eq!(child.fields(), &[CMD, DATA, NUM][..]);
        // The parent is untouched.
        assert_eq!(parent.command(), 9);
        assert_eq!(parent.fields(), &[CMD, DATA][..]);
    }
}
