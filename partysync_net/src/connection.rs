// One TCP connection: a lockable write half plus the shared read loop.
//
// Writes may come from the simulation thread (broadcasts, late-join
// sequences) while the connection's own reader thread is blocked in
// `read_frame`; the write half is therefore a separate cloned `TcpStream`
// behind a `Mutex`. Holding that lock for a whole batch is what keeps a
// late-join sequence contiguous on the wire.
//
// `pump_frames` is the read loop shared by the server's per-participant
// threads and the client's server-connection thread. A frame whose payload
// fails to decode is logged and skipped (the framing is still aligned);
// `max_decode_failures` consecutive bad frames are taken as a desynchronized
// stream and end the loop, as does any framing or I/O error.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use partysync_protocol::{Command, Handshake, codec, read_frame, write_command, write_frame};

use crate::error::NetError;

pub struct Connection {
    peer_addr: SocketAddr,
    control: TcpStream,
    writer: Mutex<BufWriter<TcpStream>>,
    synchronized: AtomicBool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let write_half = stream.try_clone()?;
        Ok(Self {
            peer_addr,
            control: stream,
            writer: Mutex::new(BufWriter::new(write_half)),
            synchronized: AtomicBool::new(false),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Lock the write half. A poisoned lock only means another writer
    /// panicked mid-frame; the stream is shut down by then anyway.
    pub fn lock_writer(&self) -> MutexGuard<'_, BufWriter<TcpStream>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `commands` back to back under a single lock acquisition.
    pub fn write_commands(&self, commands: &[Command]) -> Result<(), NetError> {
        let mut writer = self.lock_writer();
        for command in commands {
            write_command(&mut *writer, command)?;
        }
        Ok(())
    }

    /// Write an already-encoded command payload.
    pub fn write_payload(&self, payload: &[u8]) -> io::Result<()> {
        write_frame(&mut *self.lock_writer(), payload)
    }

    /// Whether this participant has received its late-join sequence and may
    /// therefore be sent broadcasts.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::SeqCst)
    }

    pub fn set_synchronized(&self, value: bool) {
        self.synchronized.store(value, Ordering::SeqCst);
    }

    /// Close both directions. The reader thread sees EOF and reports the
    /// disconnect; writers get an error on their next attempt.
    pub fn shutdown(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

/// Write one handshake message straight to a writer.
pub(crate) fn write_handshake<W: Write>(writer: &mut W, message: &Handshake) -> Result<(), NetError> {
    let payload = message.encode()?;
    write_frame(writer, &payload)?;
    Ok(())
}

/// Read one handshake message.
pub(crate) fn read_handshake(reader: &mut BufReader<TcpStream>) -> Result<Handshake, NetError> {
    let payload = read_frame(reader)?;
    Ok(Handshake::decode(&payload)?)
}

/// Read frames until the stream ends, becomes desynchronized, `keep_running`
/// clears, or `deliver` returns `false` (its receiver is gone).
pub(crate) fn pump_frames(
    reader: &mut BufReader<TcpStream>,
    peer: &str,
    max_decode_failures: u32,
    keep_running: &AtomicBool,
    mut deliver: impl FnMut(Command) -> bool,
) {
    let mut consecutive_failures = 0u32;
    while keep_running.load(Ordering::SeqCst) {
        let payload = match read_frame(reader) {
            Ok(payload) => payload,
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    debug!("connection to {peer} ended: {e}");
                }
                return;
            }
        };
        match codec::decode(&payload) {
            Ok(command) => {
                consecutive_failures = 0;
                debug!("received {} from {peer}", command.kind());
                if !deliver(command) {
                    return;
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!("dropping malformed frame from {peer}: {e}");
                if consecutive_failures >= max_decode_failures {
                    warn!(
                        "{consecutive_failures} malformed frames in a row from {peer}, closing connection"
                    );
                    return;
                }
            }
        }
    }
}
