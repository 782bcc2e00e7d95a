// Test-only session harness for multiplayer integration tests.
//
// Wraps real `MultiplayerGame`s over a real `Server` and real `NetClient`s,
// each driving its own `HeadlessWorld`, and ticks all of them from the test
// thread. This exercises the full path:
// client notification → NetClient → server reader thread → admissibility →
// queue → apply → rebroadcast → client queue → client world.
//
// The only test-specific code is the blocking `tick_until` loop. All
// networking and session logic uses the same code paths as the binary.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use partysync_net::{ClientConfig, NetClient, ServerConfig, start_server};
use partysync_session::{
    HeadlessWorld, ModuleLayout, MultiplayerGame, Network, PartyTemplate, SessionEvent,
};

/// Default timeout for blocking tick loops.
const TICK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between tick rounds.
const TICK_INTERVAL: Duration = Duration::from_millis(5);

/// Doors every test module contains.
pub fn test_layout() -> ModuleLayout {
    ModuleLayout {
        doors: vec!["door_bridge".into(), "door_cargo".into()],
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One session participant: a game, its world, and every event it reported.
pub struct TestNode {
    pub game: MultiplayerGame,
    pub world: HeadlessWorld,
    pub events: Vec<SessionEvent>,
}

impl TestNode {
    fn new(network: Network, world: HeadlessWorld) -> Self {
        Self {
            game: MultiplayerGame::new(network),
            world,
            events: Vec::new(),
        }
    }

    pub fn tick(&mut self) {
        let events = self.game.tick(&mut self.world);
        self.events.extend(events);
    }

    pub fn position_x(&self, tag: &str) -> Option<f32> {
        self.world.creature(tag).map(|c| c.position.x)
    }
}

/// A server node plus any number of client nodes keyed by participant tag.
pub struct TestSession {
    pub host: TestNode,
    pub peers: BTreeMap<String, TestNode>,
    pub addr: SocketAddr,
}

impl TestSession {
    /// Start a server on a random port and load `module` on it.
    pub fn start(module: &str) -> Self {
        init_logging();
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let (server, addr) = start_server(config).expect("start_server failed");
        let world = HeadlessWorld::with_party(PartyTemplate::default()).with_layout(test_layout());
        let mut session = Self {
            host: TestNode::new(Network::Server(Box::new(server)), world),
            peers: BTreeMap::new(),
            addr,
        };
        session.host.game.request_module(module);
        session.tick_until("host module load", |s| {
            s.host.game.state().running_module() == Some(module)
        });
        session
    }

    /// Connect a client asking for `tag` (empty for a server-assigned one).
    /// Returns the tag the server granted. Does not wait for synchronization.
    pub fn join(&mut self, tag: &str) -> String {
        let client = self.connect_raw(tag);
        let granted = client.client_tag().to_owned();
        let node = TestNode::new(
            Network::Client(Box::new(client)),
            HeadlessWorld::new(test_layout()),
        );
        self.peers.insert(granted.clone(), node);
        granted
    }

    /// Connect and wait until the late-join sequence has been applied.
    pub fn join_synchronized(&mut self, tag: &str) -> String {
        let granted = self.join(tag);
        let expected = granted.clone();
        self.tick_until("late join", move |s| {
            s.host.events.iter().any(|e| {
                matches!(e, SessionEvent::ParticipantSynchronized { tag, .. } if *tag == expected)
            }) && s.peers[&expected].game.state().is_running()
                && s.peers[&expected].game.queue().is_empty()
        });
        granted
    }

    /// A bare `NetClient` outside any game, for sending arbitrary commands.
    pub fn connect_raw(&self, tag: &str) -> NetClient {
        let config = ClientConfig {
            client_tag: tag.to_owned(),
            ..ClientConfig::default()
        };
        NetClient::connect(&self.addr.to_string(), &config).expect("NetClient::connect failed")
    }

    /// Drop a client node, closing its connection.
    pub fn leave(&mut self, tag: &str) {
        self.peers.remove(tag);
    }

    pub fn peer(&self, tag: &str) -> &TestNode {
        &self.peers[tag]
    }

    pub fn peer_mut(&mut self, tag: &str) -> &mut TestNode {
        self.peers.get_mut(tag).expect("unknown peer")
    }

    /// Tick the host and every peer once.
    pub fn tick_all(&mut self) {
        self.host.tick();
        for peer in self.peers.values_mut() {
            peer.tick();
        }
    }

    /// Tick everyone until `done` holds. Panics after `TICK_TIMEOUT`.
    pub fn tick_until(&mut self, what: &str, mut done: impl FnMut(&TestSession) -> bool) {
        let start = Instant::now();
        loop {
            self.tick_all();
            if done(self) {
                return;
            }
            assert!(start.elapsed() < TICK_TIMEOUT, "timed out waiting for {what}");
            thread::sleep(TICK_INTERVAL);
        }
    }
}
