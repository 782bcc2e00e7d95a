// Events delivered from network threads to the simulation tick.
//
// Every reader thread (server side: one per participant; client side: one
// for the server connection) funnels what it observes into a single bounded
// channel of `NetEvent`s. The simulation tick is the only consumer. Per
// connection the events arrive in wire order: `Connected`, any number of
// `Received`, then `Disconnected`.

use partysync_protocol::Command;

/// Peer name used on the client side for the server connection.
pub const SERVER_PEER: &str = "server";

#[derive(Clone, Debug, PartialEq)]
pub enum NetEvent {
    /// A participant finished the handshake and is registered.
    Connected { peer: String },
    /// A well-formed command arrived from `peer`.
    Received { peer: String, command: Command },
    /// The connection to `peer` is gone and it has left the registry.
    Disconnected { peer: String },
}

impl NetEvent {
    pub fn peer(&self) -> &str {
        match self {
            NetEvent::Connected { peer }
            | NetEvent::Received { peer, .. }
            | NetEvent::Disconnected { peer } => peer,
        }
    }
}
