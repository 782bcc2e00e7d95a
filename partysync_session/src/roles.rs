// Role assignment policy.
//
// Decides which party creature a newly synchronized participant controls.
// Preference order:
//
// 1. a companion this participant already controls (re-synchronization after
//    a module load keeps the assignment stable);
// 2. `PartyMember1`, if present and uncontrolled;
// 3. `PartyMember2`, if present and uncontrolled;
// 4. nothing: the participant observes.
//
// The party leader is never handed out; it belongs to the host. An actor
// controlled by another participant is never reassigned, so at most one
// participant controls any actor at a time.

use log::{debug, warn};
use partysync_protocol::CreatureRole;

use crate::world::World;

/// The companion role `participant` already controls, if any.
pub fn controlled_role<W: World + ?Sized>(world: &W, participant: &str) -> Option<CreatureRole> {
    if participant.is_empty() {
        return None;
    }
    CreatureRole::COMPANIONS.into_iter().find(|role| {
        world
            .party_member(*role)
            .is_some_and(|actor| actor.client_tag() == participant)
    })
}

/// Pick a role for `participant` without changing the world.
pub fn choose_role<W: World + ?Sized>(world: &W, participant: &str) -> Option<CreatureRole> {
    if let Some(role) = controlled_role(world, participant) {
        return Some(role);
    }
    CreatureRole::COMPANIONS.into_iter().find(|role| {
        world
            .party_member(*role)
            .is_some_and(|actor| !actor.is_controlled())
    })
}

/// Pick a role for `participant` and mark its creature as controlled by them.
pub fn assign_role<W: World + ?Sized>(world: &mut W, participant: &str) -> Option<CreatureRole> {
    if participant.is_empty() {
        return None;
    }
    let role = choose_role(&*world, participant)?;
    let actor = world.party_member_mut(role)?;
    actor.set_client_tag(participant);
    debug!("{participant} controls {} as {role}", actor.tag());
    Some(role)
}

/// Clear the controller of every actor `participant` controls. Returns the
/// tags of the released actors.
pub fn release_participant<W: World + ?Sized>(world: &mut W, participant: &str) -> Vec<String> {
    let mut released = Vec::new();
    if participant.is_empty() {
        return released;
    }
    while let Some(actor) = world.find_actor_by_client_tag(participant) {
        actor.set_client_tag("");
        if actor.client_tag() == participant {
            warn!("actor {} refused to drop controller {participant}", actor.tag());
            break;
        }
        released.push(actor.tag().to_owned());
    }
    released
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessWorld, PartyTemplate};
    use crate::world::ModuleLoader;

    fn loaded_world() -> HeadlessWorld {
        let mut world = HeadlessWorld::with_party(PartyTemplate::default());
        world.begin_load("end_m01aa");
        world.poll_load();
        world
    }

    fn controller(world: &HeadlessWorld, role: CreatureRole) -> String {
        world
            .party_member(role)
            .map(|actor| actor.client_tag().to_owned())
            .unwrap_or_default()
    }

    #[test]
    fn fills_member1_then_member2_then_observes() {
        let mut world = loaded_world();
        assert_eq!(assign_role(&mut world, "alice"), Some(CreatureRole::PartyMember1));
        assert_eq!(assign_role(&mut world, "bob"), Some(CreatureRole::PartyMember2));
        assert_eq!(assign_role(&mut world, "carol"), None);

        assert_eq!(controller(&world, CreatureRole::PartyLeader), "");
        assert_eq!(controller(&world, CreatureRole::PartyMember1), "alice");
        assert_eq!(controller(&world, CreatureRole::PartyMember2), "bob");
    }

    #[test]
    fn existing_assignment_is_kept() {
        let mut world = loaded_world();
        assign_role(&mut world, "alice");
        assign_role(&mut world, "bob");
        release_participant(&mut world, "alice");

        // bob re-synchronizes: member1 is free again but bob keeps member2.
        assert_eq!(choose_role(&world, "bob"), Some(CreatureRole::PartyMember2));
        assert_eq!(assign_role(&mut world, "bob"), Some(CreatureRole::PartyMember2));
        assert_eq!(controller(&world, CreatureRole::PartyMember1), "");
    }

    #[test]
    fn missing_companion_is_skipped() {
        let mut world = loaded_world();
        world.remove_party_member(CreatureRole::PartyMember1);
        assert_eq!(assign_role(&mut world, "alice"), Some(CreatureRole::PartyMember2));
    }

    #[test]
    fn release_clears_only_that_participant() {
        let mut world = loaded_world();
        assign_role(&mut world, "alice");
        assign_role(&mut world, "bob");

        let released = release_participant(&mut world, "alice");
        assert_eq!(released, vec!["companion-1".to_string()]);
        assert_eq!(controller(&world, CreatureRole::PartyMember1), "");
        assert_eq!(controller(&world, CreatureRole::PartyMember2), "bob");
        assert!(release_participant(&mut world, "alice").is_empty());
    }

    #[test]
    fn anonymous_participant_gets_nothing() {
        let mut world = loaded_world();
        assert_eq!(assign_role(&mut world, ""), None);
        assert!(release_participant(&mut world, "").is_empty());
    }
}
