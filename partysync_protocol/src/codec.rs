// Binary codec for `Command`.
//
// Layout: one kind byte (see `CommandKind::wire_value`), then the variant's
// fields in declaration order. Integers and floats are fixed-width
// little-endian, bools are a single `0`/`1` byte, strings are a `u16` byte
// length followed by UTF-8, and lists are a `u16` element count followed by
// the elements. This layout is the wire compatibility boundary between
// peers: reordering or resizing any field breaks the protocol.
//
// Decoding is bounds-checked throughout. Every read goes through
// `WireReader`, which returns `DecodeError::Truncated` instead of indexing
// past the end, and a frame must be consumed exactly: leftover bytes are an
// error rather than silently ignored.

use thiserror::Error;

use crate::command::{Command, CommandKind};
use crate::types::{CreatureRole, CreatureSnapshot, Equipment, MovementType, Vec3};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("unknown command kind {0}")]
    UnknownKind(u8),
    #[error("unknown creature role {0}")]
    UnknownRole(u8),
    #[error("unknown movement type {0}")]
    UnknownMovementType(u8),
    #[error("invalid bool byte {0}")]
    InvalidBool(u8),
    #[error("truncated payload: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("string field is {0} bytes (max {max})", max = u16::MAX)]
    StringTooLong(usize),
    #[error("list field has {0} entries (max {max})", max = u16::MAX)]
    ListTooLong(usize),
}

/// Encode a command into its wire representation.
pub fn encode(command: &Command) -> Result<Vec<u8>, EncodeError> {
    let mut w = WireWriter::new();
    w.put_u8(command.kind().wire_value());
    match command {
        Command::LoadModule { module } => {
            w.put_str(module)?;
        }
        Command::LoadCreature { role, creature } => {
            w.put_u8(role.wire_value());
            w.put_str(&creature.tag)?;
            w.put_u32(creature.appearance);
            w.put_vec3(creature.position);
            w.put_f32(creature.heading);
            w.put_len(creature.equipment.len(), EncodeError::ListTooLong)?;
            for item in &creature.equipment {
                w.put_str(item)?;
            }
        }
        Command::SetPlayerRole { role } => {
            w.put_u8(role.wire_value());
        }
        Command::SetObjectTransform {
            tag,
            position,
            heading,
        } => {
            w.put_str(tag)?;
            w.put_vec3(*position);
            w.put_f32(*heading);
        }
        Command::SetObjectAnimation {
            tag,
            animation,
            flags,
            speed,
        } => {
            w.put_str(tag)?;
            w.put_str(animation)?;
            w.put_u32(*flags);
            w.put_f32(*speed);
        }
        Command::SetCreatureMovementType { tag, movement_type } => {
            w.put_str(tag)?;
            w.put_u8(movement_type.wire_value());
        }
        Command::SetDoorOpen {
            object_id,
            opener,
            open,
        } => {
            w.put_u32(*object_id);
            w.put_str(opener)?;
            w.put_bool(*open);
        }
    }
    Ok(w.into_bytes())
}

/// Decode one command from a complete frame payload.
pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
    let mut r = WireReader::new(bytes);
    let raw_kind = r.u8().map_err(|_| DecodeError::Empty)?;
    let kind = CommandKind::from_wire(raw_kind).ok_or(DecodeError::UnknownKind(raw_kind))?;
    let command = match kind {
        CommandKind::LoadModule => Command::LoadModule { module: r.string()? },
        CommandKind::LoadCreature => {
            let role = r.role()?;
            let tag = r.string()?;
            let appearance = r.u32()?;
            let position = r.vec3()?;
            let heading = r.f32()?;
            let count = r.u16()?;
            let mut equipment = Equipment::new();
            for _ in 0..count {
                equipment.push(r.string()?);
            }
            Command::LoadCreature {
                role,
                creature: CreatureSnapshot {
                    tag,
                    appearance,
                    position,
                    heading,
                    equipment,
                },
            }
        }
        CommandKind::SetPlayerRole => Command::SetPlayerRole { role: r.role()? },
        CommandKind::SetObjectTransform => Command::SetObjectTransform {
            tag: r.string()?,
            position: r.vec3()?,
            heading: r.f32()?,
        },
        CommandKind::SetObjectAnimation => Command::SetObjectAnimation {
            tag: r.string()?,
            animation: r.string()?,
            flags: r.u32()?,
            speed: r.f32()?,
        },
        CommandKind::SetCreatureMovementType => {
            let tag = r.string()?;
            let raw = r.u8()?;
            let movement_type =
                MovementType::from_wire(raw).ok_or(DecodeError::UnknownMovementType(raw))?;
            Command::SetCreatureMovementType { tag, movement_type }
        }
        CommandKind::SetDoorOpen => Command::SetDoorOpen {
            object_id: r.u32()?,
            opener: r.string()?,
            open: r.bool()?,
        },
    };
    r.finish()?;
    Ok(command)
}

// ---------------------------------------------------------------------------
// Primitive writer / reader, shared with `handshake.rs`
// ---------------------------------------------------------------------------

pub(crate) struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::with_capacity(32),
        }
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub(crate) fn put_vec3(&mut self, value: Vec3) {
        self.put_f32(value.x);
        self.put_f32(value.y);
        self.put_f32(value.z);
    }

    pub(crate) fn put_len(
        &mut self,
        len: usize,
        too_long: fn(usize) -> EncodeError,
    ) -> Result<(), EncodeError> {
        let len16 = u16::try_from(len).map_err(|_| too_long(len))?;
        self.buf.extend_from_slice(&len16.to_le_bytes());
        Ok(())
    }

    pub(crate) fn put_str(&mut self, value: &str) -> Result<(), EncodeError> {
        self.put_len(value.len(), EncodeError::StringTooLong)?;
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if needed > remaining {
            return Err(DecodeError::Truncated { needed, remaining });
        }
        let bytes = self.bytes;
        let slice = &bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub(crate) fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }

    pub(crate) fn vec3(&mut self) -> Result<Vec3, DecodeError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    pub(crate) fn role(&mut self) -> Result<CreatureRole, DecodeError> {
        let raw = self.u8()?;
        CreatureRole::from_wire(raw).ok_or(DecodeError::UnknownRole(raw))
    }

    pub(crate) fn string(&mut self) -> Result<String, DecodeError> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }

    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        let leftover = self.bytes.len() - self.pos;
        if leftover == 0 {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes(leftover))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commands() -> Vec<Command> {
        vec![
            Command::LoadModule {
                module: "end_m01aa".into(),
            },
            Command::LoadModule { module: "".into() },
            Command::LoadCreature {
                role: CreatureRole::PartyMember1,
                creature: CreatureSnapshot {
                    tag: "trask".into(),
                    appearance: 91,
                    position: Vec3::new(-3.25, 14.0, 0.0),
                    heading: std::f32::consts::PI,
                    equipment: ["g_w_vbroswrd01", "g_a_class4001"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                },
            },
            Command::LoadCreature {
                role: CreatureRole::PartyLeader,
                creature: CreatureSnapshot::default(),
            },
            Command::SetPlayerRole {
                role: CreatureRole::PartyMember2,
            },
            Command::SetObjectTransform {
                tag: "player".into(),
                position: Vec3::new(f32::MAX, f32::MIN, -0.0),
                heading: f32::EPSILON,
            },
            Command::SetObjectAnimation {
                tag: "player".into(),
                animation: "walk".into(),
                flags: u32::MAX,
                speed: 1.5,
            },
            Command::SetCreatureMovementType {
                tag: "".into(),
                movement_type: MovementType::Run,
            },
            Command::SetDoorOpen {
                object_id: 4_000_000_000,
                opener: "".into(),
                open: true,
            },
        ]
    }

    #[test]
    fn every_variant_survives_the_wire() {
        for command in sample_commands() {
            let bytes = encode(&command).unwrap();
            assert_eq!(decode(&bytes).unwrap(), command, "bytes: {bytes:?}");
        }
    }

    #[test]
    fn layout_is_kind_byte_then_little_endian_fields() {
        let bytes = encode(&Command::SetDoorOpen {
            object_id: 0x0102_0304,
            opener: "ab".into(),
            open: false,
        })
        .unwrap();
        assert_eq!(bytes, vec![7, 0x04, 0x03, 0x02, 0x01, 2, 0, b'a', b'b', 0]);
    }

    #[test]
    fn rejects_empty_payload() {
        assert_eq!(decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn rejects_unknown_kind() {
        assert_eq!(decode(&[0x42, 0, 0]), Err(DecodeError::UnknownKind(0x42)));
    }

    #[test]
    fn rejects_length_prefix_past_end() {
        // LoadModule claiming a 300-byte name with only 3 bytes present.
        let bytes = [1, 0x2C, 0x01, b'a', b'b', b'c'];
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::Truncated {
                needed: 300,
                remaining: 3
            })
        );
    }

    #[test]
    fn rejects_every_truncation_of_a_valid_frame() {
        for command in sample_commands() {
            let bytes = encode(&command).unwrap();
            for cut in 0..bytes.len() {
                assert!(decode(&bytes[..cut]).is_err(), "{command:?} cut at {cut}");
            }
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&Command::SetPlayerRole {
            role: CreatureRole::PartyLeader,
        })
        .unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn rejects_bad_enum_and_bool_bytes() {
        assert_eq!(decode(&[3, 9]), Err(DecodeError::UnknownRole(9)));
        assert_eq!(decode(&[6, 0, 0, 5]), Err(DecodeError::UnknownMovementType(5)));
        assert_eq!(
            decode(&[7, 1, 0, 0, 0, 0, 0, 2]),
            Err(DecodeError::InvalidBool(2))
        );
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(decode(&[1, 2, 0, 0xFF, 0xFE]), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn oversized_string_is_an_encode_error() {
        let err = encode(&Command::LoadModule {
            module: "m".repeat(70_000),
        })
        .unwrap_err();
        assert_eq!(err, EncodeError::StringTooLong(70_000));
    }
}
