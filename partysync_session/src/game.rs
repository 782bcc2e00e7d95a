// Session orchestrator.
//
// `MultiplayerGame` is the single place where network input meets the
// simulation. It is owned by the simulation thread and driven by `tick()`,
// which takes the world as an explicit `Engine` context:
//
// 1. Pump network events. A participant that connects while a module is
//    running is synchronized immediately. One that disconnects has its
//    actors released. Received commands pass the admissibility check and
//    go to the inbound queue.
// 2. Pump module-loader events. A finished load makes the module current
//    and (on a server) re-synchronizes every participant. A failed load
//    restores the previous module if the loader says it is intact, and then
//    synchronizes anyone who joined while the load was pending.
// 3. Drain the inbound queue in order (see `drain_queue`).
//
// Outbound traffic starts from the `on_*` change notifications the host
// calls when its own simulation changes an actor. The authority filter in
// `should_send_object_updates` decides whether the change is replicated:
// the server replicates everything, a client only its own player.
// Commands applied from the queue never pass through the notifications, so
// applying a replicated change does not echo it back.
//
// Server authority: a participant may only author actor updates, and only
// for the actor it controls. Accepted updates are applied on the server and
// then rebroadcast to every synchronized participant, the originator
// included, so all peers converge on the server's order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use partysync_net::{ClientLink, NetEvent, ServerLink};
use partysync_protocol::{AnimationState, Command, CreatureRole, MovementType, Vec3};
use serde::{Deserialize, Serialize};

use crate::event::SessionEvent;
use crate::queue::CommandQueue;
use crate::roles;
use crate::world::{Engine, LoadEvent, World};

/// How this process takes part in a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Solo,
    Server,
    Client,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionMode::Solo => "solo",
            SessionMode::Server => "server",
            SessionMode::Client => "client",
        })
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solo" => Ok(SessionMode::Solo),
            "server" => Ok(SessionMode::Server),
            "client" => Ok(SessionMode::Client),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}

/// Where module transitions stand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No module has ever finished loading.
    Uninitialized,
    Running(String),
    /// A load of `target` is in progress. `previous` is the module that was
    /// running before, if any.
    TransitioningTo {
        target: String,
        previous: Option<String>,
    },
}

impl SessionState {
    pub fn running_module(&self) -> Option<&str> {
        match self {
            SessionState::Running(module) => Some(module),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running(_))
    }

    /// The module whose content is in the world right now. During a
    /// transition that is still the previous one.
    pub fn current_module(&self) -> Option<&str> {
        match self {
            SessionState::Uninitialized => None,
            SessionState::Running(module) => Some(module),
            SessionState::TransitioningTo { previous, .. } => previous.as_deref(),
        }
    }
}

/// The transport, matching the session mode.
pub enum Network {
    Solo,
    Server(Box<dyn ServerLink>),
    Client(Box<dyn ClientLink>),
}

impl Network {
    pub fn mode(&self) -> SessionMode {
        match self {
            Network::Solo => SessionMode::Solo,
            Network::Server(_) => SessionMode::Server,
            Network::Client(_) => SessionMode::Client,
        }
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Network::{:?}", self.mode())
    }
}

#[derive(Debug)]
pub struct MultiplayerGame {
    network: Network,
    queue: CommandQueue,
    state: SessionState,
    /// Participants whose `Connected` event has been handled, keyed by tag.
    /// The value says whether they hold the current module's sequence.
    participants: BTreeMap<String, bool>,
    events: Vec<SessionEvent>,
}

impl MultiplayerGame {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            queue: CommandQueue::new(),
            state: SessionState::Uninitialized,
            participants: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn solo() -> Self {
        Self::new(Network::Solo)
    }

    pub fn mode(&self) -> SessionMode {
        self.network.mode()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle to the inbound queue. Other threads may push through it.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Ask for a module transition. It goes through the inbound queue, so it
    /// is ordered with respect to every command already waiting there.
    pub fn request_module(&self, module: &str) {
        self.queue.push(Command::LoadModule {
            module: module.to_owned(),
        });
    }

    /// Advance the session by one simulation tick.
    pub fn tick(&mut self, engine: &mut dyn Engine) -> Vec<SessionEvent> {
        self.pump_network(engine);
        self.pump_loader(engine);
        self.drain_queue(engine);
        std::mem::take(&mut self.events)
    }

    // --- network input ---

    fn pump_network(&mut self, engine: &mut dyn Engine) {
        let events = match &mut self.network {
            Network::Solo => return,
            Network::Server(link) => link.poll(),
            Network::Client(link) => link.poll(),
        };
        for event in events {
            match event {
                NetEvent::Connected { peer } => self.on_participant_connected(engine, &peer),
                NetEvent::Disconnected { peer } => self.on_participant_disconnected(engine, &peer),
                NetEvent::Received { peer, command } => self.on_command_received(engine, &peer, command),
            }
        }
    }

    fn on_participant_connected(&mut self, engine: &mut dyn Engine, tag: &str) {
        if !matches!(self.network, Network::Server(_)) {
            return;
        }
        info!("participant {tag} connected");
        self.events.push(SessionEvent::ParticipantJoined { tag: tag.to_owned() });
        let synchronized = *self.participants.entry(tag.to_owned()).or_insert(false);
        if synchronized {
            debug!("{tag} already holds the current module");
        } else if self.state.is_running() {
            self.synchronize_participant(engine, tag);
        } else {
            debug!("{tag} waits for the current module load to finish");
        }
    }

    fn on_participant_disconnected(&mut self, engine: &mut dyn Engine, tag: &str) {
        match self.network {
            Network::Server(_) => {
                self.participants.remove(tag);
                let released = roles::release_participant(engine, tag);
                info!("participant {tag} disconnected, released {released:?}");
                self.events.push(SessionEvent::ParticipantLeft {
                    tag: tag.to_owned(),
                    released,
                });
            }
            Network::Client(_) => {
                warn!("lost connection to server");
                self.events.push(SessionEvent::ServerConnectionLost);
            }
            Network::Solo => {}
        }
    }

    fn on_command_received(&mut self, engine: &mut dyn Engine, from: &str, command: Command) {
        debug!("received {} from {from}", command.kind());
        if matches!(self.network, Network::Server(_)) && !Self::is_admissible(engine, from, &command) {
            warn!("rejected {} from {from}", command.kind());
            self.events.push(SessionEvent::CommandRejected {
                from: from.to_owned(),
                kind: command.kind(),
            });
            return;
        }
        self.queue.push(command);
    }

    /// Whether a server may accept `command` from participant `from`.
    fn is_admissible(world: &mut dyn Engine, from: &str, command: &Command) -> bool {
        if !command.kind().is_actor_update() {
            return false;
        }
        let Some(tag) = command.target_tag() else {
            return false;
        };
        world
            .find_actor_by_tag(tag)
            .is_some_and(|actor| actor.client_tag() == from)
    }

    // --- module loading ---

    fn pump_loader(&mut self, engine: &mut dyn Engine) {
        while let Some(event) = engine.poll_load() {
            match event {
                LoadEvent::Loaded { module } => self.on_module_loaded(engine, &module),
                LoadEvent::Failed {
                    module,
                    reason,
                    previous_intact,
                } => self.on_module_load_failed(engine, &module, &reason, previous_intact),
            }
        }
    }

    /// Completion of the pending load. Stale completions (a load that was
    /// superseded) are ignored.
    pub fn on_module_loaded(&mut self, engine: &mut dyn Engine, module: &str) {
        if !self.is_loading(module) {
            debug!("ignoring completion of superseded load {module}");
            return;
        }
        info!("module {module} loaded");
        self.state = SessionState::Running(module.to_owned());
        self.events.push(SessionEvent::ModuleLoaded {
            module: module.to_owned(),
        });

        // Only participants whose arrival has been handled. Anyone still in
        // the event channel is synchronized when its `Connected` comes in.
        for synchronized in self.participants.values_mut() {
            *synchronized = false;
        }
        self.synchronize_pending(engine);
    }

    /// Failure of the pending load. The previous module becomes current
    /// again only if the loader left it intact. Participants who joined
    /// during the load are then synchronized into it.
    pub fn on_module_load_failed(
        &mut self,
        engine: &mut dyn Engine,
        module: &str,
        reason: &str,
        previous_intact: bool,
    ) {
        if !self.is_loading(module) {
            debug!("ignoring failure of superseded load {module}");
            return;
        }
        let previous = match &self.state {
            SessionState::TransitioningTo { previous, .. } => previous.clone(),
            _ => None,
        };
        self.state = match previous {
            Some(previous) if previous_intact => {
                warn!("module {module} failed to load ({reason}), staying in {previous}");
                SessionState::Running(previous)
            }
            _ => {
                warn!("module {module} failed to load ({reason}), no module running");
                SessionState::Uninitialized
            }
        };
        self.events.push(SessionEvent::ModuleLoadFailed {
            module: module.to_owned(),
            reason: reason.to_owned(),
        });
        self.synchronize_pending(engine);
    }

    /// Synchronize every known participant that does not yet hold the
    /// running module.
    fn synchronize_pending(&mut self, engine: &mut dyn Engine) {
        if !self.state.is_running() {
            return;
        }
        let pending: Vec<String> = self
            .participants
            .iter()
            .filter(|(_, synchronized)| !**synchronized)
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in pending {
            self.synchronize_participant(engine, &tag);
        }
    }

    fn is_loading(&self, module: &str) -> bool {
        matches!(&self.state, SessionState::TransitioningTo { target, .. } if target == module)
    }

    fn begin_transition(&mut self, engine: &mut dyn Engine, module: String) {
        if self.is_loading(&module) {
            debug!("load of {module} already in progress");
            return;
        }
        let previous = match std::mem::replace(&mut self.state, SessionState::Uninitialized) {
            SessionState::Uninitialized => None,
            SessionState::Running(current) => Some(current),
            SessionState::TransitioningTo { previous, .. } => previous,
        };
        info!("loading module {module}");
        engine.begin_load(&module);
        self.state = SessionState::TransitioningTo {
            target: module.clone(),
            previous,
        };
        self.events.push(SessionEvent::ModuleLoadStarted { module });
    }

    // --- queue drain ---

    /// Apply queued commands in arrival order.
    ///
    /// `LoadModule` commands are consumed as they are reached; the last one
    /// naming a module other than the current one becomes the pending
    /// transition. Any other command is applied only while a module is
    /// running and no transition is pending. Otherwise draining stops and the
    /// command, with everything behind it, waits in the queue until the load
    /// completes. Commands are never reordered around this stall.
    fn drain_queue(&mut self, engine: &mut dyn Engine) {
        let mut next_module: Option<String> = None;
        while let Some(command) = self.queue.front() {
            if let Command::LoadModule { module } = command {
                self.queue.pop_front();
                if self.state.current_module() != Some(module.as_str()) {
                    next_module = Some(module);
                } else if next_module.is_some() {
                    // Returning to the current module cancels an earlier
                    // request in the same batch.
                    next_module = None;
                }
                continue;
            }
            if next_module.is_some() || !self.state.is_running() {
                break;
            }
            self.queue.pop_front();
            self.apply(engine, command);
        }
        if let Some(module) = next_module {
            self.begin_transition(engine, module);
        }
    }

    fn apply(&mut self, engine: &mut dyn Engine, command: Command) {
        let applied = match &command {
            Command::LoadModule { .. } => false,
            Command::LoadCreature { role, creature } => {
                engine.load_creature(*role, creature);
                true
            }
            Command::SetPlayerRole { role } => engine.set_player_role(*role),
            Command::SetObjectTransform {
                tag,
                position,
                heading,
            } => match engine.find_actor_by_tag(tag) {
                Some(actor) => {
                    actor.set_position(*position);
                    actor.set_heading(*heading);
                    true
                }
                None => false,
            },
            Command::SetObjectAnimation {
                tag,
                animation,
                flags,
                speed,
            } => match engine.find_actor_by_tag(tag) {
                Some(actor) => {
                    actor.set_animation(AnimationState {
                        name: animation.clone(),
                        flags: *flags,
                        speed: *speed,
                    });
                    true
                }
                None => false,
            },
            Command::SetCreatureMovementType { tag, movement_type } => {
                match engine.find_actor_by_tag(tag) {
                    Some(actor) => {
                        actor.set_movement_type(*movement_type);
                        true
                    }
                    None => false,
                }
            }
            Command::SetDoorOpen {
                object_id,
                opener,
                open,
            } => engine
                .find_actor_by_id(*object_id)
                .is_some_and(|door| door.set_open(*open, opener)),
        };

        if !applied {
            debug!("{} had no target in the current module", command.kind());
            return;
        }
        if let Network::Server(link) = &self.network {
            if command.kind().is_actor_update() {
                link.send_to_all(&command);
            }
        }
    }

    // --- late join ---

    /// Bring one participant up to date with the running module: the module
    /// name, the three party creatures, and the role it controls. The whole
    /// sequence is written as one batch so nothing else can interleave with
    /// it on that connection. If the participant is gone before it could be
    /// delivered, the role assignment is rolled back and nothing is reported.
    ///
    /// Returns whether the sequence was delivered.
    pub fn synchronize_participant(&mut self, engine: &mut dyn Engine, tag: &str) -> bool {
        let Network::Server(link) = &self.network else {
            return false;
        };
        let Some(module) = self.state.running_module() else {
            debug!("not synchronizing {tag}: no module running");
            return false;
        };
        if !link.is_connected(tag) {
            debug!("not synchronizing {tag}: no longer connected");
            return false;
        }

        let mut commands = vec![Command::LoadModule {
            module: module.to_owned(),
        }];
        for role in CreatureRole::ALL {
            match engine.party_snapshot(role) {
                Some(creature) => commands.push(Command::LoadCreature { role, creature }),
                None => debug!("no creature holds {role}"),
            }
        }
        let role = roles::assign_role(engine, tag);
        if let Some(role) = role {
            commands.push(Command::SetPlayerRole { role });
        }

        match link.synchronize(tag, &commands) {
            Ok(()) => {
                self.participants.insert(tag.to_owned(), true);
                match role {
                    Some(role) => info!("synchronized {tag} as {role}"),
                    None => info!("synchronized {tag} as observer"),
                }
                self.events.push(SessionEvent::ParticipantSynchronized {
                    tag: tag.to_owned(),
                    role,
                });
                true
            }
            Err(e) => {
                debug!("synchronization of {tag} aborted: {e}");
                if role.is_some() {
                    roles::release_participant(engine, tag);
                }
                false
            }
        }
    }

    // --- local change notifications ---

    /// Whether a local change to actor `tag` should be replicated.
    pub fn should_send_object_updates<W: World + ?Sized>(&self, world: &W, tag: &str) -> bool {
        if !self.state.is_running() {
            return false;
        }
        match &self.network {
            Network::Solo => false,
            Network::Server(_) => true,
            Network::Client(_) => {
                !tag.is_empty() && world.player_tag().is_some_and(|player| player == tag)
            }
        }
    }

    fn emit(&self, command: Command) -> bool {
        match &self.network {
            Network::Solo => false,
            Network::Server(link) => {
                link.send_to_all(&command);
                true
            }
            Network::Client(link) => match link.send(&command) {
                Ok(()) => true,
                Err(e) => {
                    warn!("failed to send {} to server: {e}", command.kind());
                    false
                }
            },
        }
    }

    pub fn on_object_transform_changed<W: World + ?Sized>(
        &self,
        world: &W,
        tag: &str,
        position: Vec3,
        heading: f32,
    ) -> bool {
        if !self.should_send_object_updates(world, tag) {
            return false;
        }
        self.emit(Command::SetObjectTransform {
            tag: tag.to_owned(),
            position,
            heading,
        })
    }

    pub fn on_object_animation_changed<W: World + ?Sized>(
        &self,
        world: &W,
        tag: &str,
        animation: &AnimationState,
    ) -> bool {
        if !self.should_send_object_updates(world, tag) {
            return false;
        }
        self.emit(Command::SetObjectAnimation {
            tag: tag.to_owned(),
            animation: animation.name.clone(),
            flags: animation.flags,
            speed: animation.speed,
        })
    }

    pub fn on_movement_type_changed<W: World + ?Sized>(
        &self,
        world: &W,
        tag: &str,
        movement_type: MovementType,
    ) -> bool {
        if !self.should_send_object_updates(world, tag) {
            return false;
        }
        self.emit(Command::SetCreatureMovementType {
            tag: tag.to_owned(),
            movement_type,
        })
    }

    /// `opener` is the tag of the actor that opened the door; the authority
    /// filter applies to it rather than to the door.
    pub fn on_door_opened<W: World + ?Sized>(&self, world: &W, object_id: u32, opener: &str) -> bool {
        self.door_changed(world, object_id, opener, true)
    }

    pub fn on_door_closed<W: World + ?Sized>(&self, world: &W, object_id: u32, closer: &str) -> bool {
        self.door_changed(world, object_id, closer, false)
    }

    fn door_changed<W: World + ?Sized>(&self, world: &W, object_id: u32, opener: &str, open: bool) -> bool {
        if !self.should_send_object_updates(world, opener) {
            return false;
        }
        self.emit(Command::SetDoorOpen {
            object_id,
            opener: opener.to_owned(),
            open,
        })
    }
}
