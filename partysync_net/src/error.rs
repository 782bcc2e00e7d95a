// Transport-level errors.
//
// None of these are fatal to a session: the worst outcome of any of them is
// that one connection is closed. Callers log and carry on.

use std::io;

use partysync_protocol::{DecodeError, EncodeError, FrameError};
use thiserror::Error;

use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("cannot encode: {0}")]
    Encode(#[from] EncodeError),
    #[error("malformed handshake: {0}")]
    Handshake(#[from] DecodeError),
    #[error("unexpected handshake message: {0}")]
    UnexpectedHandshake(String),
    #[error("rejected by server: {0}")]
    Rejected(String),
    #[error("no connected participant tagged {0:?}")]
    UnknownPeer(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
