// End-to-end integration tests for the session pipeline.
//
// Each test starts a real server session (real `Server`, real
// `MultiplayerGame`, headless world), connects real clients through
// `TestSession`, and checks that every world converges:
// join → late-join sync → role → local change → server → rebroadcast.
//
// These tests exercise the same code paths as the `partysync` binary. The
// only test-specific code is the blocking tick loop in `TestSession`.

use partysync_protocol::{Command, CreatureRole, MovementType, Vec3};
use partysync_session::{SessionEvent, World};
use multiplayer_tests::TestSession;

// ---------------------------------------------------------------------------
// Late join
// ---------------------------------------------------------------------------

/// A late joiner gets the module, the whole party, and the first companion.
#[test]
fn late_joiner_receives_module_party_and_role() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");
    assert_eq!(alice, "alice");

    let peer = session.peer(&alice);
    assert_eq!(peer.world.module_name(), Some("end_m01aa"));
    assert_eq!(peer.world.player_tag().as_deref(), Some("companion-1"));
    for role in CreatureRole::ALL {
        assert_eq!(
            peer.world.party_snapshot(role),
            session.host.world.party_snapshot(role),
            "{role} differs"
        );
    }
    assert_eq!(
        session.host.world.controllers(),
        vec![("companion-1".to_string(), "alice".to_string())]
    );
}

/// Roles fill member1, then member2; the third participant only observes.
#[test]
fn third_participant_observes() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");
    let bob = session.join_synchronized("bob");
    let carol = session.join_synchronized("");

    assert_eq!(carol, "participant-0");
    assert_eq!(session.peer(&alice).world.player_tag().as_deref(), Some("companion-1"));
    assert_eq!(session.peer(&bob).world.player_tag().as_deref(), Some("companion-2"));
    assert_eq!(session.peer(&carol).world.player_tag(), None);
    assert_eq!(session.peer(&carol).world.creatures().count(), 3);
    assert!(session.host.events.contains(&SessionEvent::ParticipantSynchronized {
        tag: carol,
        role: None,
    }));
}

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

/// A participant moving its own creature updates the server and every other
/// participant.
#[test]
fn participant_update_reaches_everyone() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");
    let bob = session.join_synchronized("bob");

    let node = session.peer_mut(&alice);
    let target = Vec3::new(4.0, 2.0, 0.0);
    if let Some(creature) = node.world.creature_mut("companion-1") {
        creature.position = target;
        creature.movement_type = MovementType::Run;
    }
    assert!(node.game.on_object_transform_changed(&node.world, "companion-1", target, 0.25));
    assert!(node.game.on_movement_type_changed(&node.world, "companion-1", MovementType::Run));

    session.tick_until("replicated move", |s| {
        s.host.position_x("companion-1") == Some(4.0)
            && s.peer(&bob).world.creature("companion-1").map(|c| c.movement_type)
                == Some(MovementType::Run)
    });
    assert_eq!(
        session.peer(&bob).world.creature("companion-1").map(|c| c.position),
        Some(target)
    );
    assert_eq!(
        session.host.world.creature("companion-1").map(|c| c.heading),
        Some(0.25)
    );
}

/// A client's local change to a creature it does not control is not sent.
#[test]
fn client_does_not_replicate_foreign_actor() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");

    let node = session.peer(&alice);
    assert!(!node.game.on_object_transform_changed(&node.world, "player", Vec3::ZERO, 1.0));
    assert!(!node.game.on_object_transform_changed(&node.world, "companion-2", Vec3::ZERO, 1.0));
}

/// The server drops updates a participant sends for an actor it does not
/// control, and never rebroadcasts them.
#[test]
fn server_rejects_update_for_foreign_actor() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");

    let mallory = session.connect_raw("mallory");
    session.tick_until("mallory synchronized", |s| {
        s.host.events.iter().any(|e| {
            matches!(e, SessionEvent::ParticipantSynchronized { tag, .. } if tag == "mallory")
        })
    });
    mallory
        .send(&Command::SetObjectTransform {
            tag: "companion-1".into(),
            position: Vec3::new(99.0, 0.0, 0.0),
            heading: 0.0,
        })
        .unwrap();

    session.tick_until("rejection", |s| {
        s.host
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::CommandRejected { from, .. } if from == "mallory"))
    });
    session.tick_all();
    assert_eq!(session.host.position_x("companion-1"), Some(1.0));
    assert_eq!(session.peer(&alice).position_x("companion-1"), Some(1.0));
}

/// The host's own changes are broadcast to every synchronized participant.
#[test]
fn host_update_reaches_participants() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");
    let bob = session.join_synchronized("bob");

    let host = &mut session.host;
    let position = Vec3::new(-3.0, 1.0, 0.0);
    if let Some(leader) = host.world.creature_mut("player") {
        leader.position = position;
    }
    assert!(host.game.on_object_transform_changed(&host.world, "player", position, 0.0));

    session.tick_until("host move", |s| {
        s.peer(&alice).position_x("player") == Some(-3.0)
            && s.peer(&bob).position_x("player") == Some(-3.0)
    });
}

/// Opening a door replicates through the opener's authority.
#[test]
fn door_opened_by_participant_replicates() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");
    let bob = session.join_synchronized("bob");

    let door = session
        .host
        .world
        .door_by_tag("door_cargo")
        .map(|d| d.object_id)
        .unwrap();
    let node = session.peer_mut(&alice);
    if let Some(actor) = node.world.find_actor_by_id(door) {
        actor.set_open(true, "companion-1");
    }
    assert!(node.game.on_door_opened(&node.world, door, "companion-1"));

    session.tick_until("door open", |s| {
        s.host.world.door(door).is_some_and(|d| d.open)
            && s.peer(&bob).world.door(door).is_some_and(|d| d.open)
    });
    assert_eq!(
        session.peer(&bob).world.door(door).map(|d| d.last_opener.clone()),
        Some("companion-1".to_string())
    );
}

// ---------------------------------------------------------------------------
// Departures and module changes
// ---------------------------------------------------------------------------

/// A departing participant frees its creature for the next joiner.
#[test]
fn disconnect_frees_role_for_next_joiner() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");
    session.join_synchronized("bob");

    session.leave(&alice);
    session.tick_until("alice left", |s| {
        s.host.events.contains(&SessionEvent::ParticipantLeft {
            tag: "alice".into(),
            released: vec!["companion-1".into()],
        })
    });

    let dave = session.join_synchronized("dave");
    assert_eq!(session.peer(&dave).world.player_tag().as_deref(), Some("companion-1"));
    assert_eq!(
        session.host.world.controllers(),
        vec![
            ("companion-1".to_string(), "dave".to_string()),
            ("companion-2".to_string(), "bob".to_string()),
        ]
    );
}

/// A tag already in the session is refused.
#[test]
fn duplicate_tag_is_refused() {
    let mut session = TestSession::start("end_m01aa");
    session.join_synchronized("alice");

    let config = partysync_net::ClientConfig {
        client_tag: "alice".into(),
        ..partysync_net::ClientConfig::default()
    };
    let result = partysync_net::NetClient::connect(&session.addr.to_string(), &config);
    assert!(matches!(result, Err(partysync_net::NetError::Rejected(_))));
}

/// A module change on the server moves everyone, and nobody's role changes.
#[test]
fn module_change_resynchronizes_everyone() {
    let mut session = TestSession::start("end_m01aa");
    let bob = session.join_synchronized("bob");
    let alice = session.join_synchronized("alice");

    session.host.game.request_module("ebo_m12aa");
    session.tick_until("everyone in new module", |s| {
        s.peers.values().all(|p| {
            p.world.module_name() == Some("ebo_m12aa")
                && p.game.queue().is_empty()
                && p.world.player_tag().is_some()
        })
    });

    assert_eq!(session.peer(&bob).world.player_tag().as_deref(), Some("companion-1"));
    assert_eq!(session.peer(&alice).world.player_tag().as_deref(), Some("companion-2"));
    assert_eq!(session.peer(&alice).world.creatures().count(), 3);
}

/// A failed module load on the server leaves the session where it was and
/// participants keep playing.
#[test]
fn failed_module_load_keeps_session_running() {
    let mut session = TestSession::start("end_m01aa");
    let alice = session.join_synchronized("alice");
    session.host.world.fail_module("missing_module");

    session.host.game.request_module("missing_module");
    session.tick_until("load failure", |s| {
        s.host
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::ModuleLoadFailed { .. }))
    });
    assert_eq!(session.host.game.state().running_module(), Some("end_m01aa"));

    let node = session.peer_mut(&alice);
    assert!(node.game.on_object_transform_changed(
        &node.world,
        "companion-1",
        Vec3::new(7.0, 0.0, 0.0),
        0.0
    ));
    session.tick_until("move after failed load", |s| {
        s.host.position_x("companion-1") == Some(7.0)
    });
}
