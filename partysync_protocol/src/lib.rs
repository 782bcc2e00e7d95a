// partysync_protocol: the wire protocol of a partysync session.
//
// This crate defines what peers say to each other and how it is laid out on
// the wire. It is shared by the transport (`partysync_net`) and the session
// orchestrator (`partysync_session`) and has no networking or world code of
// its own.
//
// Module overview:
// - `types.rs`:     Value types inside commands: `CreatureRole`,
//                   `MovementType`, `Vec3`, `AnimationState`,
//                   `CreatureSnapshot`.
// - `command.rs`:   The `Command` enum (one variant per replicated change)
//                   and its `CommandKind` discriminator.
// - `codec.rs`:     Fixed-layout binary encode/decode of `Command`.
// - `handshake.rs`: `Hello` / `Welcome` / `Rejected` exchanged once per
//                   connection before commands flow.
// - `framing.rs`:   Length-delimited framing over any `Read`/`Write` stream:
//                   4-byte big-endian length prefix, then one payload.
//
// Design decisions:
// - **Hand-laid binary codec.** The layout is the compatibility boundary
//   between peers, so it is written out field by field rather than derived.
//   Serde derives on the types exist for JSON dumps and config only.
// - **No async runtime.** Framing uses `std::io::Read`/`Write`, compatible
//   with blocking TCP streams and buffered wrappers.
// - **No version negotiation.** Both ends are assumed to run the same
//   protocol revision.

pub mod codec;
pub mod command;
pub mod framing;
pub mod handshake;
pub mod types;

pub use codec::{DecodeError, EncodeError, decode, encode};
pub use command::{Command, CommandKind};
pub use framing::{FrameError, MAX_FRAME_SIZE, read_command, read_frame, write_command, write_frame};
pub use handshake::Handshake;
pub use types::{AnimationState, CreatureRole, CreatureSnapshot, Equipment, MovementType, Vec3};
