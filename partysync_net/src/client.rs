// TCP client for connecting to a partysync server.
//
// Provides a non-blocking interface for the simulation thread:
// - `connect()` performs TCP connect + `Hello` handshake on the calling
//   thread, then spawns a background reader thread.
// - The reader thread pumps framed commands into a bounded channel as
//   `NetEvent::Received { peer: SERVER_PEER, .. }` and finishes with
//   `NetEvent::Disconnected` when the server goes away.
// - `send()` writes through a mutex-guarded `BufWriter`, so it is safe to
//   call while the reader thread is blocked on the same socket.
// - `poll()` drains the channel without blocking.
//
// The simulation thread never blocks on network reads; writes are small and
// flushed synchronously.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use partysync_protocol::{Command, Handshake, write_command};

use crate::connection;
use crate::error::NetError;
use crate::event::{NetEvent, SERVER_PEER};

/// Options for `NetClient::connect`.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Tag to register under; empty asks the server to assign one.
    pub client_tag: String,
    pub event_capacity: usize,
    pub max_decode_failures: u32,
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_tag: String::new(),
            event_capacity: 1024,
            max_decode_failures: 3,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// TCP client for server communication.
pub struct NetClient {
    control: TcpStream,
    writer: Mutex<BufWriter<TcpStream>>,
    inbox: Receiver<NetEvent>,
    client_tag: String,
    keep_running: Arc<AtomicBool>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl NetClient {
    /// Connect, perform the handshake and spawn the reader thread. Returns
    /// the client; its registered tag is available from `client_tag()`.
    pub fn connect(addr: &str, config: &ClientConfig) -> Result<Self, NetError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(config.handshake_timeout))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream.try_clone()?);

        connection::write_handshake(
            &mut writer,
            &Handshake::Hello {
                client_tag: config.client_tag.clone(),
            },
        )?;
        let client_tag = match connection::read_handshake(&mut reader)? {
            Handshake::Welcome { client_tag } => client_tag,
            Handshake::Rejected { reason } => return Err(NetError::Rejected(reason)),
            other => return Err(NetError::UnexpectedHandshake(format!("{other:?}"))),
        };
        stream.set_read_timeout(None)?;
        info!("connected to {addr} as {client_tag}");

        let (tx, rx) = mpsc::sync_channel(config.event_capacity.max(1));
        let keep_running = Arc::new(AtomicBool::new(true));
        let reader_running = Arc::clone(&keep_running);
        let max_decode_failures = config.max_decode_failures.max(1);
        let reader_thread = thread::Builder::new()
            .name("partysync-client-reader".into())
            .spawn(move || {
                connection::pump_frames(
                    &mut reader,
                    SERVER_PEER,
                    max_decode_failures,
                    &reader_running,
                    |command| {
                        tx.send(NetEvent::Received {
                            peer: SERVER_PEER.to_owned(),
                            command,
                        })
                        .is_ok()
                    },
                );
                info!("connection to server closed");
                let _ = tx.send(NetEvent::Disconnected {
                    peer: SERVER_PEER.to_owned(),
                });
            })?;

        Ok(Self {
            control: stream,
            writer: Mutex::new(writer),
            inbox: rx,
            client_tag,
            keep_running,
            _reader_thread: Some(reader_thread),
        })
    }

    /// The tag the server registered this client under.
    pub fn client_tag(&self) -> &str {
        &self.client_tag
    }

    /// Send one command to the server.
    pub fn send(&self, command: &Command) -> Result<(), NetError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_command(&mut *writer, command).map_err(|e| {
            warn!("send {} to server failed: {e}", command.kind());
            NetError::from(e)
        })
    }

    /// Drain all queued events (non-blocking).
    pub fn poll(&self) -> Vec<NetEvent> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event.
    pub fn wait_event(&self, timeout: Duration) -> Option<NetEvent> {
        self.inbox.recv_timeout(timeout).ok()
    }

    /// Close the connection. The reader thread reports `Disconnected`.
    pub fn disconnect(&self) {
        self.keep_running
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use partysync_protocol::{CreatureRole, Vec3};

    use super::*;
    use crate::server::{ServerConfig, start_server};

    const WAIT: Duration = Duration::from_secs(5);

    fn connect(addr: std::net::SocketAddr, tag: &str) -> Result<NetClient, NetError> {
        NetClient::connect(
            &addr.to_string(),
            &ClientConfig {
                client_tag: tag.into(),
                ..ClientConfig::default()
            },
        )
    }

    #[test]
    fn client_and_server_exchange_commands() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (server, addr) = start_server(ServerConfig {
            port: 0,
            ..ServerConfig::default()
        })
        .unwrap();
        let client = connect(addr, "bastila").unwrap();
        assert_eq!(client.client_tag(), "bastila");
        assert!(matches!(
            server.wait_event(WAIT),
            Some(NetEvent::Connected { .. })
        ));

        let up = Command::SetObjectTransform {
            tag: "bastila".into(),
            position: Vec3::new(1.0, 2.0, 3.0),
            heading: 0.25,
        };
        client.send(&up).unwrap();
        assert_eq!(
            server.wait_event(WAIT),
            Some(NetEvent::Received {
                peer: "bastila".into(),
                command: up
            })
        );

        let down = Command::SetPlayerRole {
            role: CreatureRole::PartyMember2,
        };
        server.send("bastila", std::slice::from_ref(&down)).unwrap();
        assert_eq!(
            client.wait_event(WAIT),
            Some(NetEvent::Received {
                peer: SERVER_PEER.into(),
                command: down
            })
        );

        server.stop();
        assert_eq!(
            client.wait_event(WAIT),
            Some(NetEvent::Disconnected {
                peer: SERVER_PEER.into()
            })
        );
    }

    #[test]
    fn rejected_client_gets_reason() {
        let (server, addr) = start_server(ServerConfig {
            port: 0,
            ..ServerConfig::default()
        })
        .unwrap();
        let _first = connect(addr, "mission").unwrap();
        let err = connect(addr, "mission").err().expect("second connect must fail");
        assert!(matches!(err, NetError::Rejected(ref reason) if reason.contains("mission")));
        server.stop();
    }
}
