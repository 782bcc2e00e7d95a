// In-memory world for the `partysync` binary and for tests.
//
// `HeadlessWorld` implements `World` and `ModuleLoader` without rendering,
// physics or assets. It knows two actor variants, `Creature` and `Door`,
// which are enough to exercise every command kind.
//
// Module content comes from two places:
//
// - `ModuleLayout` describes what every peer sees after loading a module
//   (doors, in a fixed order so object ids agree across peers).
// - `PartyTemplate` is the authoritative party. Only the world of a server
//   or solo session carries one; a client receives its party over the wire
//   as `LoadCreature` commands.
//
// Loads are "asynchronous" in the cheapest possible way: `begin_load` only
// records the request and the next `poll_load` completes it. Module names in
// the failing set fail instead, which lets tests reach the load-failure path.

use std::collections::{BTreeMap, BTreeSet};

use partysync_protocol::{
    AnimationState, CreatureRole, CreatureSnapshot, Equipment, MovementType, Vec3,
};
use serde::{Deserialize, Serialize};

use crate::world::{LoadEvent, ModuleLoader, Syncable, World};

/// A party or non-party creature.
#[derive(Clone, Debug, PartialEq)]
pub struct Creature {
    pub tag: String,
    pub object_id: u32,
    pub appearance: u32,
    pub position: Vec3,
    pub heading: f32,
    pub animation: Option<AnimationState>,
    pub movement_type: MovementType,
    pub client_tag: String,
    pub equipment: Equipment,
}

impl Creature {
    fn from_snapshot(object_id: u32, snapshot: &CreatureSnapshot) -> Self {
        Self {
            tag: snapshot.tag.clone(),
            object_id,
            appearance: snapshot.appearance,
            position: snapshot.position,
            heading: snapshot.heading,
            animation: None,
            movement_type: MovementType::None,
            client_tag: String::new(),
            equipment: snapshot.equipment.clone(),
        }
    }

    pub fn snapshot(&self) -> CreatureSnapshot {
        CreatureSnapshot {
            tag: self.tag.clone(),
            appearance: self.appearance,
            position: self.position,
            heading: self.heading,
            equipment: self.equipment.clone(),
        }
    }
}

impl Syncable for Creature {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn object_id(&self) -> u32 {
        self.object_id
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn heading(&self) -> f32 {
        self.heading
    }

    fn set_heading(&mut self, heading: f32) {
        self.heading = heading;
    }

    fn animation(&self) -> Option<&AnimationState> {
        self.animation.as_ref()
    }

    fn set_animation(&mut self, animation: AnimationState) {
        self.animation = Some(animation);
    }

    fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    fn set_movement_type(&mut self, movement_type: MovementType) {
        self.movement_type = movement_type;
    }

    fn client_tag(&self) -> &str {
        &self.client_tag
    }

    fn set_client_tag(&mut self, client_tag: &str) {
        client_tag.clone_into(&mut self.client_tag);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Door {
    pub tag: String,
    pub object_id: u32,
    pub position: Vec3,
    pub heading: f32,
    pub open: bool,
    /// Tag of whoever last opened or closed the door.
    pub last_opener: String,
}

impl Syncable for Door {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn object_id(&self) -> u32 {
        self.object_id
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn heading(&self) -> f32 {
        self.heading
    }

    fn set_heading(&mut self, heading: f32) {
        self.heading = heading;
    }

    fn set_open(&mut self, open: bool, opener: &str) -> bool {
        self.open = open;
        opener.clone_into(&mut self.last_opener);
        true
    }
}

/// Static content every peer instantiates when a module loads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleLayout {
    /// Door tags, in object-id order.
    pub doors: Vec<String>,
}

/// The authoritative party spawned when a module loads on a server or solo
/// world. Companions are optional; a missing one simply cannot be assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartyTemplate {
    pub leader: CreatureSnapshot,
    pub member1: Option<CreatureSnapshot>,
    pub member2: Option<CreatureSnapshot>,
}

impl Default for PartyTemplate {
    fn default() -> Self {
        let creature = |tag: &str, appearance: u32, x: f32| CreatureSnapshot {
            tag: tag.to_owned(),
            appearance,
            position: Vec3::new(x, 0.0, 0.0),
            heading: 0.0,
            equipment: Equipment::new(),
        };
        Self {
            leader: creature("player", 1, 0.0),
            member1: Some(creature("companion-1", 2, 1.0)),
            member2: Some(creature("companion-2", 3, -1.0)),
        }
    }
}

impl PartyTemplate {
    fn members(&self) -> impl Iterator<Item = (CreatureRole, &CreatureSnapshot)> {
        [
            (CreatureRole::PartyLeader, Some(&self.leader)),
            (CreatureRole::PartyMember1, self.member1.as_ref()),
            (CreatureRole::PartyMember2, self.member2.as_ref()),
        ]
        .into_iter()
        .filter_map(|(role, snapshot)| snapshot.map(|s| (role, s)))
    }
}

#[derive(Debug, Default)]
pub struct HeadlessWorld {
    module: Option<String>,
    layout: ModuleLayout,
    template: Option<PartyTemplate>,
    creatures: BTreeMap<String, Creature>,
    doors: BTreeMap<u32, Door>,
    party: BTreeMap<CreatureRole, String>,
    player: Option<String>,
    next_object_id: u32,
    pending_load: Option<String>,
    failing_modules: BTreeSet<String>,
}

impl HeadlessWorld {
    /// A world that receives its party from the server.
    pub fn new(layout: ModuleLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// An authoritative world that spawns `template` on every module load.
    pub fn with_party(template: PartyTemplate) -> Self {
        Self {
            template: Some(template),
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: ModuleLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Make every future load of `module` fail.
    pub fn fail_module(&mut self, module: &str) {
        self.failing_modules.insert(module.to_owned());
    }

    pub fn creature(&self, tag: &str) -> Option<&Creature> {
        self.creatures.get(tag)
    }

    pub fn creature_mut(&mut self, tag: &str) -> Option<&mut Creature> {
        self.creatures.get_mut(tag)
    }

    pub fn creatures(&self) -> impl Iterator<Item = &Creature> {
        self.creatures.values()
    }

    pub fn door(&self, object_id: u32) -> Option<&Door> {
        self.doors.get(&object_id)
    }

    pub fn door_by_tag(&self, tag: &str) -> Option<&Door> {
        self.doors.values().find(|door| door.tag == tag)
    }

    pub fn party_tag(&self, role: CreatureRole) -> Option<&str> {
        self.party.get(&role).map(String::as_str)
    }

    /// Despawn the creature holding `role`.
    pub fn remove_party_member(&mut self, role: CreatureRole) {
        if let Some(tag) = self.party.remove(&role) {
            self.creatures.remove(&tag);
            if self.player.as_deref() == Some(tag.as_str()) {
                self.player = None;
            }
        }
    }

    /// Every controlled actor as `(actor tag, controller tag)`.
    pub fn controllers(&self) -> Vec<(String, String)> {
        self.creatures
            .values()
            .filter(|c| !c.client_tag.is_empty())
            .map(|c| (c.tag.clone(), c.client_tag.clone()))
            .collect()
    }

    fn allocate_object_id(&mut self) -> u32 {
        self.next_object_id += 1;
        self.next_object_id
    }

    fn enter_module(&mut self, module: &str) {
        // The party travels between modules; so do its controllers.
        let controllers: BTreeMap<String, String> = self
            .controllers()
            .into_iter()
            .collect();
        self.creatures.clear();
        self.doors.clear();
        self.party.clear();
        self.player = None;
        self.next_object_id = 0;
        self.module = Some(module.to_owned());

        for tag in self.layout.doors.clone() {
            let object_id = self.allocate_object_id();
            self.doors.insert(
                object_id,
                Door {
                    tag,
                    object_id,
                    position: Vec3::ZERO,
                    heading: 0.0,
                    open: false,
                    last_opener: String::new(),
                },
            );
        }

        if let Some(template) = self.template.clone() {
            for (role, snapshot) in template.members() {
                self.load_creature(role, snapshot);
                if let (Some(creature), Some(controller)) = (
                    self.creatures.get_mut(&snapshot.tag),
                    controllers.get(&snapshot.tag),
                ) {
                    controller.clone_into(&mut creature.client_tag);
                }
            }
            self.player = Some(template.leader.tag);
        }
    }
}

impl World for HeadlessWorld {
    fn module_name(&self) -> Option<&str> {
        self.module.as_deref()
    }

    fn find_actor_by_tag(&mut self, tag: &str) -> Option<&mut dyn Syncable> {
        if self.creatures.contains_key(tag) {
            return self
                .creatures
                .get_mut(tag)
                .map(|creature| creature as &mut dyn Syncable);
        }
        self.doors
            .values_mut()
            .find(|door| door.tag == tag)
            .map(|door| door as &mut dyn Syncable)
    }

    fn find_actor_by_id(&mut self, object_id: u32) -> Option<&mut dyn Syncable> {
        if self.doors.contains_key(&object_id) {
            return self
                .doors
                .get_mut(&object_id)
                .map(|door| door as &mut dyn Syncable);
        }
        self.creatures
            .values_mut()
            .find(|creature| creature.object_id == object_id)
            .map(|creature| creature as &mut dyn Syncable)
    }

    fn find_actor_by_client_tag(&mut self, client_tag: &str) -> Option<&mut dyn Syncable> {
        if client_tag.is_empty() {
            return None;
        }
        self.creatures
            .values_mut()
            .find(|creature| creature.client_tag == client_tag)
            .map(|creature| creature as &mut dyn Syncable)
    }

    fn party_member(&self, role: CreatureRole) -> Option<&dyn Syncable> {
        let tag = self.party.get(&role)?;
        self.creatures
            .get(tag)
            .map(|creature| creature as &dyn Syncable)
    }

    fn party_member_mut(&mut self, role: CreatureRole) -> Option<&mut dyn Syncable> {
        let tag = self.party.get(&role)?;
        self.creatures
            .get_mut(tag)
            .map(|creature| creature as &mut dyn Syncable)
    }

    fn party_snapshot(&self, role: CreatureRole) -> Option<CreatureSnapshot> {
        let tag = self.party.get(&role)?;
        self.creatures.get(tag).map(Creature::snapshot)
    }

    fn load_creature(&mut self, role: CreatureRole, snapshot: &CreatureSnapshot) {
        // One live actor per role: whoever held it before is replaced.
        if let Some(previous) = self.party.get(&role).cloned() {
            if previous != snapshot.tag {
                self.creatures.remove(&previous);
            }
        }
        // ...and a creature cannot hold two roles.
        self.party.retain(|r, tag| *r == role || *tag != snapshot.tag);

        let object_id = match self.creatures.get(&snapshot.tag) {
            Some(existing) => existing.object_id,
            None => self.allocate_object_id(),
        };
        let mut creature = Creature::from_snapshot(object_id, snapshot);
        if let Some(existing) = self.creatures.get(&snapshot.tag) {
            existing.client_tag.clone_into(&mut creature.client_tag);
        }
        self.creatures.insert(snapshot.tag.clone(), creature);
        self.party.insert(role, snapshot.tag.clone());
    }

    fn set_player_role(&mut self, role: CreatureRole) -> bool {
        match self.party.get(&role) {
            Some(tag) => {
                self.player = Some(tag.clone());
                true
            }
            None => false,
        }
    }

    fn player_tag(&self) -> Option<String> {
        self.player.clone()
    }
}

impl ModuleLoader for HeadlessWorld {
    fn begin_load(&mut self, module: &str) {
        self.pending_load = Some(module.to_owned());
    }

    fn poll_load(&mut self) -> Option<LoadEvent> {
        let module = self.pending_load.take()?;
        if self.failing_modules.contains(&module) {
            return Some(LoadEvent::Failed {
                reason: format!("module {module} is not available"),
                module,
                previous_intact: self.module.is_some(),
            });
        }
        self.enter_module(&module);
        Some(LoadEvent::Loaded { module })
    }
}
