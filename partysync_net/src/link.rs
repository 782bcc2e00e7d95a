// Transport seams used by the session orchestrator.
//
// The orchestrator talks to "the network" only through these two traits, so
// its protocol logic can be exercised against in-memory fakes. `Server` and
// `NetClient` are the production implementations.

use partysync_protocol::Command;

use crate::client::NetClient;
use crate::error::NetError;
use crate::event::NetEvent;
use crate::server::Server;

/// Server-side view of the network.
pub trait ServerLink {
    /// Send a late-join sequence to one participant as a contiguous batch,
    /// then admit it to broadcasts.
    fn synchronize(&self, peer: &str, commands: &[Command]) -> Result<(), NetError>;
    /// Send to every synchronized participant; returns the recipient count.
    fn send_to_all(&self, command: &Command) -> usize;
    fn poll(&mut self) -> Vec<NetEvent>;
    fn is_connected(&self, peer: &str) -> bool;
}

/// Client-side view of the network: a single connection to the server.
pub trait ClientLink {
    fn send(&self, command: &Command) -> Result<(), NetError>;
    fn poll(&mut self) -> Vec<NetEvent>;
    fn client_tag(&self) -> &str;
}

impl ServerLink for Server {
    fn synchronize(&self, peer: &str, commands: &[Command]) -> Result<(), NetError> {
        Server::synchronize(self, peer, commands)
    }

    fn send_to_all(&self, command: &Command) -> usize {
        Server::send_to_all(self, command)
    }

    fn poll(&mut self) -> Vec<NetEvent> {
        Server::poll(self)
    }

    fn is_connected(&self, peer: &str) -> bool {
        Server::is_connected(self, peer)
    }
}

impl ClientLink for NetClient {
    fn send(&self, command: &Command) -> Result<(), NetError> {
        NetClient::send(self, command)
    }

    fn poll(&mut self) -> Vec<NetEvent> {
        NetClient::poll(self)
    }

    fn client_tag(&self) -> &str {
        NetClient::client_tag(self)
    }
}
