// partysync_session: the session layer of a partysync game.
//
// Sits between the transport (`partysync_net`) and a game simulation. It
// owns the inbound command queue, the module-transition state machine, the
// late-join procedure and the role policy, and talks to the simulation only
// through the traits in `world.rs`.
//
// Module overview:
// - `game.rs`:     `MultiplayerGame`, the orchestrator. Driven by `tick()`.
// - `queue.rs`:    `CommandQueue`, the ordered inbound FIFO.
// - `roles.rs`:    Which party creature a participant controls.
// - `world.rs`:    `Syncable`, `World`, `ModuleLoader`, `Engine` traits.
// - `event.rs`:    `SessionEvent`, what `tick()` reports to its owner.
// - `config.rs`:   `SessionConfig` (JSON) and `open_network`.
// - `headless.rs`: `HeadlessWorld`, an in-memory world for the binary and
//                  tests.
//
// The `partysync` binary (`main.rs`) runs a headless session in any of the
// three modes.
//
// Threading: everything here except `CommandQueue` lives on the simulation
// thread. Network threads only ever reach the session through the transport's
// event channel.

pub mod config;
pub mod event;
pub mod game;
pub mod headless;
pub mod queue;
pub mod roles;
pub mod world;

pub use config::{ConfigError, SessionConfig, open_network};
pub use event::SessionEvent;
pub use game::{MultiplayerGame, Network, SessionMode, SessionState};
pub use headless::{Creature, Door, HeadlessWorld, ModuleLayout, PartyTemplate};
pub use queue::CommandQueue;
pub use world::{Engine, LoadEvent, ModuleLoader, Syncable, World};
