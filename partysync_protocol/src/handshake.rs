// Connection handshake.
//
// Before any `Command` flows, the client introduces itself with `Hello` and
// the server answers `Welcome` (with the tag it registered) or `Rejected`
// (and closes the connection). An empty `client_tag` in `Hello` asks the
// server to generate one.
//
// Handshake messages share the command codec's primitives but use
// discriminators from 0x80 up, outside the `CommandKind` range, so a stray
// handshake frame decodes as `UnknownKind` on the command path and vice versa.

use crate::codec::{DecodeError, EncodeError, WireReader, WireWriter};

const HELLO: u8 = 0x80;
const WELCOME: u8 = 0x81;
const REJECTED: u8 = 0x82;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handshake {
    /// Client → server: the tag this client wants to be known by.
    Hello { client_tag: String },
    /// Server → client: registration accepted under `client_tag`.
    Welcome { client_tag: String },
    /// Server → client: registration refused; the connection closes next.
    Rejected { reason: String },
}

impl Handshake {
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = WireWriter::new();
        match self {
            Handshake::Hello { client_tag } => {
                w.put_u8(HELLO);
                w.put_str(client_tag)?;
            }
            Handshake::Welcome { client_tag } => {
                w.put_u8(WELCOME);
                w.put_str(client_tag)?;
            }
            Handshake::Rejected { reason } => {
                w.put_u8(REJECTED);
                w.put_str(reason)?;
            }
        }
        Ok(w.into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = WireReader::new(bytes);
        let message = match r.u8().map_err(|_| DecodeError::Empty)? {
            HELLO => Handshake::Hello {
                client_tag: r.string()?,
            },
            WELCOME => Handshake::Welcome {
                client_tag: r.string()?,
            },
            REJECTED => Handshake::Rejected {
                reason: r.string()?,
            },
            other => return Err(DecodeError::UnknownKind(other)),
        };
        r.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn hello_welcome_rejected_roundtrip() {
        for msg in [
            Handshake::Hello {
                client_tag: "mission".into(),
            },
            Handshake::Hello {
                client_tag: String::new(),
            },
            Handshake::Welcome {
                client_tag: "participant-3".into(),
            },
            Handshake::Rejected {
                reason: "client tag already in use".into(),
            },
        ] {
            assert_eq!(Handshake::decode(&msg.encode().unwrap()).unwrap(), msg);
        }
    }

    #[test]
    fn handshake_and_command_frames_do_not_overlap() {
        let hello = Handshake::Hello {
            client_tag: "zaalbar".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(codec::decode(&hello), Err(DecodeError::UnknownKind(HELLO)));

        let command = codec::encode(&crate::Command::LoadModule {
            module: "tar_m02aa".into(),
        })
        .unwrap();
        assert_eq!(Handshake::decode(&command), Err(DecodeError::UnknownKind(1)));
    }
}
