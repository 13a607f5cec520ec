// Fixed-size record framing over any blocking `Read`/`Write` stream.
//
// There is no length prefix: every record is exactly `MESSAGE_SIZE` bytes, so
// `read_message` is a single `read_exact` and `write_message` a single
// `write_all` + flush. A short read at any point means the peer went away and
// is reported as `FrameError::Closed`, distinct from other I/O failures, so
// callers can map it to an end-of-communication without inspecting
// `io::ErrorKind` themselves.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::message::{MESSAGE_SIZE, Message};

/// Errors produced while encoding, decoding, or moving records.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended before a full record arrived.
    #[error("connection closed by peer")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The record's tag byte names no known message kind.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("text of {len} bytes exceeds the text buffer")]
    TextTooLong { len: usize },
}

/// Write one message as a fixed-size record and flush.
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> Result<(), FrameError> {
    writer.write_all(&msg.encode())?;
    writer.flush()?;
    Ok(())
}

/// Read exactly one record and decode it.
///
/// On `UnknownKind` the full record has been consumed, so the stream stays
/// aligned and the caller may keep reading.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, FrameError> {
    let mut record = [0u8; MESSAGE_SIZE];
    match reader.read_exact(&mut record) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(FrameError::Io(e)),
    }
    Message::decode(&record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Version;
    use std::io::Cursor;

    #[test]
    fn write_produces_one_record() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Message::Ping).unwrap();
        assert_eq!(buf.len(), MESSAGE_SIZE);
    }

    #[test]
    fn multiple_messages_in_sequence() {
        let messages = [
            Message::Version(Version::new(0, 0, 0)),
            Message::text("first").unwrap(),
            Message::Time { seconds_left: 30 },
            Message::EndCommunication,
        ];
        let mut buf = Vec::new();
        for msg in &messages {
            write_message(&mut buf, msg).unwrap();
        }
        assert_eq!(buf.len(), messages.len() * MESSAGE_SIZE);

        let mut cursor = Cursor::new(&buf);
        for expected in &messages {
            assert_eq!(&read_message(&mut cursor).unwrap(), expected);
        }
        assert!(matches!(read_message(&mut cursor), Err(FrameError::Closed)));
    }

    #[test]
    fn empty_stream_is_closed() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(matches!(read_message(&mut cursor), Err(FrameError::Closed)));
    }

    #[test]
    fn partial_record_is_closed() {
        let record = Message::Ping.encode();
        let mut cursor = Cursor::new(record[..MESSAGE_SIZE - 1].to_vec());
        assert!(matches!(read_message(&mut cursor), Err(FrameError::Closed)));
    }

    #[test]
    fn unknown_kind_keeps_stream_aligned() {
        let mut buf = vec![0u8; MESSAGE_SIZE];
        buf[0] = 200;
        write_message(&mut buf, &Message::EndTurn).unwrap();

        let mut cursor = Cursor::new(&buf);
        assert!(matches!(
            read_message(&mut cursor),
            Err(FrameError::UnknownKind(200))
        ));
        assert_eq!(read_message(&mut cursor).unwrap(), Message::EndTurn);
    }
}
