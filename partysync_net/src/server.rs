// TCP server: accept loop, per-participant reader threads, outbound sends.
//
// Architecture: thread-per-reader with one bounded `mpsc` channel.
//
// - **Accept thread** (`TcpListener::accept()` loop, non-blocking with a
//   short sleep so it can observe `keep_running`): hands each new socket to
//   its own connection thread.
// - **Connection threads** (one per participant): run the handshake,
//   register the participant, emit `NetEvent::Connected`, then pump frames
//   into `NetEvent::Received`. When the stream ends the thread removes the
//   participant from the registry first and only then emits
//   `NetEvent::Disconnected`, so anyone who sees the event also sees the
//   registry without that participant.
// - **Simulation thread** (the owner of `Server`): drains events with
//   `poll()` and writes with `send` / `synchronize` / `send_to_all`. Writes
//   look the connection up in the registry, release the registry lock, and
//   then take the connection's own write lock.
//
// The channel is bounded (`ServerConfig::event_capacity`): if the simulation
// falls behind, reader threads block and TCP flow control pushes back on the
// senders instead of memory growing without limit.
//
// Broadcasts only reach participants that have received their late-join
// sequence (`synchronize`). Anything sent to a participant before that would
// arrive ahead of the `LoadModule` it depends on and could never be applied.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use partysync_protocol::{Command, Handshake, codec};

use crate::connection::{self, Connection};
use crate::error::NetError;
use crate::event::NetEvent;
use crate::registry::{ClientRegistry, RegistryError};

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration for starting a server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Listen port; 0 lets the OS pick one (see the returned address).
    pub port: u16,
    pub event_capacity: usize,
    pub max_decode_failures: u32,
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 7878,
            event_capacity: 1024,
            max_decode_failures: 3,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

struct Shared {
    registry: Mutex<ClientRegistry<Arc<Connection>>>,
    keep_running: AtomicBool,
    max_decode_failures: u32,
    handshake_timeout: Duration,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, ClientRegistry<Arc<Connection>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A running server. Dropping it stops the accept loop and closes every
/// participant connection.
pub struct Server {
    shared: Arc<Shared>,
    events: Receiver<NetEvent>,
    local_addr: SocketAddr,
    accept_thread: Option<JoinHandle<()>>,
}

/// Bind and start accepting participants on a background thread. Returns the
/// server and the address actually bound.
pub fn start_server(config: ServerConfig) -> io::Result<(Server, SocketAddr)> {
    let listener = TcpListener::bind((config.bind_addr.as_str(), config.port))?;
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let (tx, rx) = mpsc::sync_channel(config.event_capacity.max(1));
    let shared = Arc::new(Shared {
        registry: Mutex::new(ClientRegistry::new()),
        keep_running: AtomicBool::new(true),
        max_decode_failures: config.max_decode_failures.max(1),
        handshake_timeout: config.handshake_timeout,
    });

    let accept_shared = Arc::clone(&shared);
    let accept_thread = thread::Builder::new()
        .name("partysync-accept".into())
        .spawn(move || accept_loop(listener, accept_shared, tx))?;

    info!("server listening on {local_addr}");
    Ok((
        Server {
            shared,
            events: rx,
            local_addr,
            accept_thread: Some(accept_thread),
        },
        local_addr,
    ))
}

impl Server {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Drain every pending network event without blocking.
    pub fn poll(&self) -> Vec<NetEvent> {
        self.events.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event.
    pub fn wait_event(&self, timeout: Duration) -> Option<NetEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn is_connected(&self, peer: &str) -> bool {
        self.shared.registry().contains(peer)
    }

    pub fn participants(&self) -> Vec<String> {
        self.shared.registry().tags()
    }

    fn connection(&self, peer: &str) -> Result<Arc<Connection>, NetError> {
        self.shared
            .registry()
            .get(peer)
            .cloned()
            .ok_or_else(|| NetError::UnknownPeer(peer.to_owned()))
    }

    /// Send `commands` to one participant, contiguously.
    pub fn send(&self, peer: &str, commands: &[Command]) -> Result<(), NetError> {
        let connection = self.connection(peer)?;
        connection.write_commands(commands).inspect_err(|e| {
            debug!("send to {peer} failed: {e}");
            connection.shutdown();
        })
    }

    /// Send a late-join sequence to one participant and, once it is on the
    /// wire, admit the participant to broadcasts.
    pub fn synchronize(&self, peer: &str, commands: &[Command]) -> Result<(), NetError> {
        let connection = self.connection(peer)?;
        connection.set_synchronized(false);
        self.send(peer, commands)?;
        connection.set_synchronized(true);
        Ok(())
    }

    /// Send one command to every synchronized participant. Returns how many
    /// participants it was written to.
    pub fn send_to_all(&self, command: &Command) -> usize {
        let payload = match codec::encode(command) {
            Ok(payload) => payload,
            Err(e) => {
                error!("cannot broadcast {}: {e}", command.kind());
                return 0;
            }
        };
        let recipients = self.shared.registry().snapshot();
        let mut delivered = 0;
        for (tag, connection) in recipients {
            if !connection.is_synchronized() {
                continue;
            }
            match connection.write_payload(&payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("broadcast to {tag} failed: {e}");
                    connection.shutdown();
                }
            }
        }
        delivered
    }

    /// Stop accepting, close every connection and wait for the accept
    /// thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.keep_running.store(false, Ordering::SeqCst);
        for (_, connection) in self.shared.registry().snapshot() {
            connection.shutdown();
        }
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
            info!("server on {} stopped", self.local_addr);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, tx: SyncSender<NetEvent>) {
    while shared.keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(false).ok();
                let shared = Arc::clone(&shared);
                let tx = tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("partysync-peer-{addr}"))
                    .spawn(move || serve_connection(stream, &shared, &tx));
                if let Err(e) = spawned {
                    error!("cannot spawn connection thread for {addr}: {e}");
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!("accept failed, no longer accepting participants: {e}");
                break;
            }
        }
    }
}

/// Whole lifetime of one participant connection.
fn serve_connection(stream: TcpStream, shared: &Shared, tx: &SyncSender<NetEvent>) {
    let addr = stream
        .peer_addr()
        .map_or_else(|_| "<unknown>".to_owned(), |a| a.to_string());
    let (tag, connection, mut reader) = match handshake(stream, shared) {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!("handshake with {addr} failed: {e}");
            return;
        }
    };
    info!("participant {tag} connected from {addr}");
    if tx.send(NetEvent::Connected { peer: tag.clone() }).is_ok() {
        connection::pump_frames(
            &mut reader,
            &tag,
            shared.max_decode_failures,
            &shared.keep_running,
            |command| {
                tx.send(NetEvent::Received {
                    peer: tag.clone(),
                    command,
                })
                .is_ok()
            },
        );
    }

    {
        let mut registry = shared.registry();
        if registry
            .get(&tag)
            .is_some_and(|registered| Arc::ptr_eq(registered, &connection))
        {
            registry.remove(&tag);
        }
    }
    connection.shutdown();
    info!("participant {tag} disconnected");
    let _ = tx.send(NetEvent::Disconnected { peer: tag });
}

/// Read `Hello`, register the participant and answer `Welcome`, or answer
/// `Rejected` and close.
fn handshake(
    stream: TcpStream,
    shared: &Shared,
) -> Result<(String, Arc<Connection>, BufReader<TcpStream>), NetError> {
    stream.set_read_timeout(Some(shared.handshake_timeout))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let requested = match connection::read_handshake(&mut reader)? {
        Handshake::Hello { client_tag } => client_tag,
        other => return Err(NetError::UnexpectedHandshake(format!("{other:?}"))),
    };

    let connection = Arc::new(Connection::new(stream)?);
    // The write lock is taken before registering so that no broadcast can
    // reach the socket ahead of `Welcome`.
    let mut writer = connection.lock_writer();
    let registered = shared.registry().register(&requested, Arc::clone(&connection));
    match registered {
        Ok(tag) => {
            let welcome = Handshake::Welcome {
                client_tag: tag.clone(),
            };
            if let Err(e) = connection::write_handshake(&mut *writer, &welcome) {
                drop(writer);
                shared.registry().remove(&tag);
                connection.shutdown();
                return Err(e);
            }
            drop(writer);
            reader.get_ref().set_read_timeout(None)?;
            Ok((tag, connection, reader))
        }
        Err(RegistryError::TagInUse(tag)) => {
            let reason = format!("client tag {tag:?} is already in use");
            let _ = connection::write_handshake(&mut *writer, &Handshake::Rejected { reason });
            drop(writer);
            connection.shutdown();
            Err(RegistryError::TagInUse(tag).into())
        }
    }
}
