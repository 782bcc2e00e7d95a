// partysync_net: TCP transport for partysync sessions.
//
// Carries encoded `Command`s between one authoritative server and its
// participants over reliable, ordered TCP streams. It knows nothing about the
// world or about what commands mean; the session orchestrator
// (`partysync_session`) decides that.
//
// Module overview:
// - `registry.rs`:   `ClientRegistry`, participant tag → connection, unique
//                    tags, generated tags for anonymous clients.
// - `connection.rs`: One connection's lockable write half and the frame
//                    pump shared by every reader thread.
// - `server.rs`:     Listener, handshake, thread-per-reader, bounded event
//                    channel, unicast / batch / broadcast sends.
// - `client.rs`:     `NetClient`: connect + handshake, background reader,
//                    non-blocking `poll()`.
// - `event.rs`:      `NetEvent`, what reader threads report to the tick.
// - `link.rs`:       `ServerLink` / `ClientLink` traits the orchestrator
//                    depends on instead of the concrete types.
// - `error.rs`:      `NetError`.
//
// Dependencies: `partysync_protocol` for commands and framing, `log` for
// diagnostics. Plain `std::net` threads, no async runtime.

pub mod client;
pub mod connection;
pub mod error;
pub mod event;
pub mod link;
pub mod registry;
pub mod server;

pub use client::{ClientConfig, NetClient};
pub use error::NetError;
pub use event::{NetEvent, SERVER_PEER};
pub use link::{ClientLink, ServerLink};
pub use registry::{ClientRegistry, RegistryError};
pub use server::{Server, ServerConfig, start_server};
