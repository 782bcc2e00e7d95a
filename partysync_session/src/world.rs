// The world as the session layer sees it.
//
// The orchestrator never touches concrete entity types. It reaches actors
// through `Syncable`, a capability interface every replicated actor variant
// implements, and reaches the rest of the simulation through `World` (queries
// and party bookkeeping) and `ModuleLoader` (module transitions). Rendering,
// collision, pathfinding and asset loading stay behind these traits.
//
// Capabilities an actor variant does not have keep the default no-op
// implementation: a door has no animation or controller, a creature cannot
// be opened. Applying a command to an actor lacking the capability is
// therefore harmless.
//
// `Engine` bundles `World + ModuleLoader` into the single context object that
// is handed to every tick.

use partysync_protocol::{AnimationState, CreatureRole, CreatureSnapshot, MovementType, Vec3};

/// A replicated actor.
pub trait Syncable {
    fn tag(&self) -> &str;
    fn object_id(&self) -> u32;

    fn position(&self) -> Vec3;
    fn set_position(&mut self, position: Vec3);
    fn heading(&self) -> f32;
    fn set_heading(&mut self, heading: f32);

    fn animation(&self) -> Option<&AnimationState> {
        None
    }
    fn set_animation(&mut self, _animation: AnimationState) {}

    fn movement_type(&self) -> MovementType {
        MovementType::None
    }
    fn set_movement_type(&mut self, _movement_type: MovementType) {}

    /// Tag of the participant controlling this actor; empty when the actor
    /// is driven by the server or AI.
    fn client_tag(&self) -> &str {
        ""
    }
    fn set_client_tag(&mut self, _client_tag: &str) {}

    fn is_controlled(&self) -> bool {
        !self.client_tag().is_empty()
    }

    /// Open or close this actor. Returns `false` for actors that cannot be
    /// opened.
    fn set_open(&mut self, _open: bool, _opener: &str) -> bool {
        false
    }
}

/// Queries and party bookkeeping provided by the simulation.
pub trait World {
    /// Name of the module currently loaded, if any.
    fn module_name(&self) -> Option<&str>;

    fn find_actor_by_tag(&mut self, tag: &str) -> Option<&mut dyn Syncable>;
    fn find_actor_by_id(&mut self, object_id: u32) -> Option<&mut dyn Syncable>;
    fn find_actor_by_client_tag(&mut self, client_tag: &str) -> Option<&mut dyn Syncable>;

    fn party_member(&self, role: CreatureRole) -> Option<&dyn Syncable>;
    fn party_member_mut(&mut self, role: CreatureRole) -> Option<&mut dyn Syncable>;
    /// What a late joiner needs to instantiate the creature holding `role`.
    fn party_snapshot(&self, role: CreatureRole) -> Option<CreatureSnapshot>;

    /// Instantiate (or replace) the creature holding `role`.
    fn load_creature(&mut self, role: CreatureRole, creature: &CreatureSnapshot);
    /// Make the creature holding `role` the locally controlled player.
    /// Returns `false` if no creature holds it.
    fn set_player_role(&mut self, role: CreatureRole) -> bool;
    /// Tag of the locally controlled player, if any.
    fn player_tag(&self) -> Option<String>;
}

/// Outcome of a module load started with `ModuleLoader::begin_load`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadEvent {
    Loaded {
        module: String,
    },
    Failed {
        module: String,
        reason: String,
        /// Whether the module that was loaded before is still usable.
        previous_intact: bool,
    },
}

/// Loads modules asynchronously relative to the session.
pub trait ModuleLoader {
    /// Start loading `module`, superseding any load still in progress.
    fn begin_load(&mut self, module: &str);
    /// Report a finished load, if one finished since the last call.
    fn poll_load(&mut self) -> Option<LoadEvent>;
}

/// Everything the orchestrator needs from the simulation, as one context.
pub trait Engine: World + ModuleLoader {}

impl<T: World + ModuleLoader> Engine for T {}
