// Length-delimited framing over any byte stream.
//
// Wire format: a 4-byte big-endian length prefix followed by exactly that
// many payload bytes. Each payload is one encoded `Command` (see `codec.rs`)
// or, at the start of a connection, one `Handshake` message. Framing keeps
// message boundaries intact across partial TCP reads.
//
// `write_frame` / `read_frame` are format-agnostic. `write_command` /
// `read_command` combine framing with the command codec and separate the
// two failure classes: an `Io` error means the stream itself is unusable,
// while a `Decode` error means one frame was read intact but its payload is
// malformed, so the stream is still aligned and the caller may skip it.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::codec::{self, DecodeError, EncodeError};
use crate::command::Command;

/// Maximum allowed frame size (1 MB). Protects against unbounded allocation
/// from malformed length prefixes. The largest legitimate frame is a
/// `LoadCreature` with a long equipment list, a few kilobytes at most.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("stream error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed command: {0}")]
    Decode(#[from] DecodeError),
    #[error("unencodable command: {0}")]
    Encode(#[from] EncodeError),
}

/// Write a length-delimited frame: 4-byte big-endian length, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len_bytes = (len as u32).to_be_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited frame: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes cleanly before or during a
/// frame. Returns `InvalidData` if the length exceeds `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encode and frame one command.
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<(), FrameError> {
    let payload = codec::encode(command)?;
    write_frame(writer, &payload)?;
    Ok(())
}

/// Read and decode one command.
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command, FrameError> {
    let payload = read_frame(reader)?;
    Ok(codec::decode(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_simple_frame() {
        let original = b"hello, server!";
        let mut buf = Vec::new();
        write_frame(&mut buf, original).unwrap();

        let mut cursor = Cursor::new(&buf);
        let recovered = read_frame(&mut cursor).unwrap();
        assert_eq!(recovered, original);
    }

    #[test]
    fn roundtrip_empty_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"").unwrap();

        let mut cursor = Cursor::new(&buf);
        assert!(read_frame(&mut cursor).unwrap().is_empty());
    }

    #[test]
    fn rejects_oversized_write() {
        let big = vec![0u8; MAX_FRAME_SIZE as usize + 1];
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_oversized_read() {
        let fake_len = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn read_unexpected_eof() {
        // Only 2 bytes when 4 are needed for the length prefix.
        let mut cursor = Cursor::new(vec![0u8, 1]);
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn malformed_frame_leaves_stream_aligned() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[0xEE, 1, 2, 3]).unwrap();
        let good = Command::LoadModule {
            module: "danm13".into(),
        };
        write_command(&mut buf, &good).unwrap();

        let mut cursor = Cursor::new(&buf);
        assert!(matches!(
            read_command(&mut cursor),
            Err(FrameError::Decode(DecodeError::UnknownKind(0xEE)))
        ));
        assert_eq!(read_command(&mut cursor).unwrap(), good);
    }

    #[test]
    fn multiple_commands_in_sequence() {
        let commands: Vec<Command> = ["a", "bb", "ccc"]
            .into_iter()
            .map(|m| Command::LoadModule { module: m.into() })
            .collect();
        let mut buf = Vec::new();
        for cmd in &commands {
            write_command(&mut buf, cmd).unwrap();
        }

        let mut cursor = Cursor::new(&buf);
        for expected in &commands {
            assert_eq!(&read_command(&mut cursor).unwrap(), expected);
        }
        assert!(matches!(read_command(&mut cursor), Err(FrameError::Io(_))));
    }
}
