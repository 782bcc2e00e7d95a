// The replication command, the unit of everything a session sends.
//
// A `Command` is built once by the session orchestrator, encoded by
// `codec.rs`, framed by `framing.rs`, and applied on the receiving side. It
// is never mutated after construction and carries everything needed to
// apply it besides the world it mutates.
//
// Addressing: most variants name their target actor by `tag`. Doors are
// addressed by the server-assigned `object_id` because several doors in a
// module may share a tag; the door variant carries the opener's tag instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{CreatureRole, CreatureSnapshot, MovementType, Vec3};

/// A replicated session command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Switch to (or confirm) the named module.
    LoadModule { module: String },
    /// Instantiate a party creature in the current module.
    LoadCreature {
        role: CreatureRole,
        creature: CreatureSnapshot,
    },
    /// The receiving participant now controls the creature holding `role`.
    SetPlayerRole { role: CreatureRole },
    SetObjectTransform {
        tag: String,
        position: Vec3,
        heading: f32,
    },
    SetObjectAnimation {
        tag: String,
        animation: String,
        flags: u32,
        speed: f32,
    },
    SetCreatureMovementType {
        tag: String,
        movement_type: MovementType,
    },
    SetDoorOpen {
        object_id: u32,
        opener: String,
        open: bool,
    },
}

/// Discriminator of a `Command`, as written in the first byte of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    LoadModule,
    LoadCreature,
    SetPlayerRole,
    SetObjectTransform,
    SetObjectAnimation,
    SetCreatureMovementType,
    SetDoorOpen,
}

impl CommandKind {
    pub fn wire_value(self) -> u8 {
        match self {
            CommandKind::LoadModule => 1,
            CommandKind::LoadCreature => 2,
            CommandKind::SetPlayerRole => 3,
            CommandKind::SetObjectTransform => 4,
            CommandKind::SetObjectAnimation => 5,
            CommandKind::SetCreatureMovementType => 6,
            CommandKind::SetDoorOpen => 7,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(CommandKind::LoadModule),
            2 => Some(CommandKind::LoadCreature),
            3 => Some(CommandKind::SetPlayerRole),
            4 => Some(CommandKind::SetObjectTransform),
            5 => Some(CommandKind::SetObjectAnimation),
            6 => Some(CommandKind::SetCreatureMovementType),
            7 => Some(CommandKind::SetDoorOpen),
            _ => None,
        }
    }

    /// Kinds that describe an ongoing change to an existing actor. These are
    /// the only kinds a participant may author.
    pub fn is_actor_update(self) -> bool {
        matches!(
            self,
            CommandKind::SetObjectTransform
                | CommandKind::SetObjectAnimation
                | CommandKind::SetCreatureMovementType
                | CommandKind::SetDoorOpen
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::LoadModule { .. } => CommandKind::LoadModule,
            Command::LoadCreature { .. } => CommandKind::LoadCreature,
            Command::SetPlayerRole { .. } => CommandKind::SetPlayerRole,
            Command::SetObjectTransform { .. } => CommandKind::SetObjectTransform,
            Command::SetObjectAnimation { .. } => CommandKind::SetObjectAnimation,
            Command::SetCreatureMovementType { .. } => CommandKind::SetCreatureMovementType,
            Command::SetDoorOpen { .. } => CommandKind::SetDoorOpen,
        }
    }

    /// Tag of the actor this command asserts something about. For doors that
    /// is the opener, since the door itself is addressed by id.
    pub fn target_tag(&self) -> Option<&str> {
        match self {
            Command::LoadCreature { creature, .. } => Some(&creature.tag),
            Command::SetObjectTransform { tag, .. }
            | Command::SetObjectAnimation { tag, .. }
            | Command::SetCreatureMovementType { tag, .. } => Some(tag),
            Command::SetDoorOpen { opener, .. } => Some(opener),
            Command::LoadModule { .. } | Command::SetPlayerRole { .. } => None,
        }
    }
}
