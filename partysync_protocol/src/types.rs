// Value types carried by commands.
//
// These are the small enums and structs that appear inside `Command` payloads
// (see `command.rs`) and in the world-facing traits of the session crate.
// Each enum has an explicit wire value; `codec.rs` is the only place that
// converts between the two, so renumbering a variant here is a breaking
// protocol change.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Party slot of a creature. Exactly one live actor holds each role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CreatureRole {
    PartyLeader,
    PartyMember1,
    PartyMember2,
}

impl CreatureRole {
    /// Companion roles in the order the role policy tries them.
    pub const COMPANIONS: [CreatureRole; 2] = [CreatureRole::PartyMember1, CreatureRole::PartyMember2];

    /// All roles in late-join send order.
    pub const ALL: [CreatureRole; 3] = [
        CreatureRole::PartyLeader,
        CreatureRole::PartyMember1,
        CreatureRole::PartyMember2,
    ];

    pub fn wire_value(self) -> u8 {
        match self {
            CreatureRole::PartyLeader => 0,
            CreatureRole::PartyMember1 => 1,
            CreatureRole::PartyMember2 => 2,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(CreatureRole::PartyLeader),
            1 => Some(CreatureRole::PartyMember1),
            2 => Some(CreatureRole::PartyMember2),
            _ => None,
        }
    }
}

impl fmt::Display for CreatureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CreatureRole::PartyLeader => "party-leader",
            CreatureRole::PartyMember1 => "party-member-1",
            CreatureRole::PartyMember2 => "party-member-2",
        };
        f.write_str(name)
    }
}

/// How a creature is currently moving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[default]
    None,
    Walk,
    Run,
}

impl MovementType {
    pub fn wire_value(self) -> u8 {
        match self {
            MovementType::None => 0,
            MovementType::Walk => 1,
            MovementType::Run => 2,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(MovementType::None),
            1 => Some(MovementType::Walk),
            2 => Some(MovementType::Run),
            _ => None,
        }
    }
}

/// World-space position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// A playing animation: name, engine-defined flag bits and playback speed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationState {
    pub name: String,
    pub flags: u32,
    pub speed: f32,
}

/// Equipped item references. Party members rarely carry more than a handful.
pub type Equipment = SmallVec<[String; 8]>;

/// Everything a late joiner needs to instantiate one party creature.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatureSnapshot {
    pub tag: String,
    pub appearance: u32,
    pub position: Vec3,
    pub heading: f32,
    pub equipment: Equipment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_values_are_stable() {
        for role in CreatureRole::ALL {
            assert_eq!(CreatureRole::from_wire(role.wire_value()), Some(role));
        }
        assert_eq!(CreatureRole::PartyLeader.wire_value(), 0);
        assert_eq!(CreatureRole::PartyMember2.wire_value(), 2);
        assert_eq!(CreatureRole::from_wire(3), None);
    }

    #[test]
    fn movement_type_rejects_unknown_values() {
        assert_eq!(MovementType::from_wire(2), Some(MovementType::Run));
        assert_eq!(MovementType::from_wire(200), None);
    }

    #[test]
    fn snapshot_json_dump() {
        let snapshot = CreatureSnapshot {
            tag: "carth".into(),
            appearance: 7,
            position: Vec3::new(1.0, 2.0, 0.5),
            heading: 1.5,
            equipment: ["g_a_clothes01".to_string()].into_iter().collect(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: CreatureSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }
}
