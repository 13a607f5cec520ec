// Protocol messages exchanged between the match server and game clients.
//
// Every message travels as one fixed-size record of `MESSAGE_SIZE` bytes:
// byte 0 is the `MessageKind` tag, the remaining `PAYLOAD_SIZE` bytes are a
// payload area sized to the largest variant (the text buffer). Integers are
// little-endian. Unused payload bytes are written as zero and ignored on
// decode, so both peers always read and write a constant number of bytes and
// no length prefix or delimiter is needed.
//
// `Message` carries its payload inside the variant, which makes "exactly one
// payload, selected by kind" a property of the type rather than a convention.
//
// See `framing.rs` for reading and writing records on a stream.

use std::fmt;

use crate::framing::FrameError;
use crate::types::Version;

/// Size of the payload area, equal to the largest payload (the text buffer).
pub const PAYLOAD_SIZE: usize = 128;

/// Size of one wire record: tag byte plus payload area.
pub const MESSAGE_SIZE: usize = 1 + PAYLOAD_SIZE;

/// Capacity of a `Text` payload in bytes.
pub const TEXT_CAPACITY: usize = PAYLOAD_SIZE;

/// Wire tag of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    EndCommunication = 0,
    Version = 1,
    Text = 2,
    EndTurn = 3,
    Time = 4,
    Ping = 5,
    EncryptKey = 6,
    StartGame = 7,
}

impl MessageKind {
    pub fn from_tag(tag: u8) -> Option<MessageKind> {
        match tag {
            0 => Some(MessageKind::EndCommunication),
            1 => Some(MessageKind::Version),
            2 => Some(MessageKind::Text),
            3 => Some(MessageKind::EndTurn),
            4 => Some(MessageKind::Time),
            5 => Some(MessageKind::Ping),
            6 => Some(MessageKind::EncryptKey),
            7 => Some(MessageKind::StartGame),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Fixed-capacity, NUL-padded text buffer.
///
/// The whole buffer is kept, including anything after the first NUL, so a
/// relayed text record is re-encoded byte-for-byte.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Text([u8; TEXT_CAPACITY]);

impl Text {
    /// Build a text payload. Fails if `text` does not fit the buffer.
    pub fn new(text: &str) -> Result<Self, FrameError> {
        Self::from_bytes(text.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() > TEXT_CAPACITY {
            return Err(FrameError::TextTooLong { len: bytes.len() });
        }
        let mut buf = [0u8; TEXT_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Bytes up to (not including) the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(TEXT_CAPACITY);
        &self.0[..end]
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// The full buffer as it appears on the wire.
    pub fn raw(&self) -> &[u8; TEXT_CAPACITY] {
        &self.0
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Text({:?})", self.to_string_lossy())
    }
}

/// A single protocol message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    /// The sender is leaving; the match ends for both peers.
    EndCommunication,
    /// Handshake: must be the first record a client sends.
    Version(Version),
    /// Chat text, relayed verbatim to the opponent.
    Text(Text),
    /// Server to clients: the active turn is over.
    EndTurn,
    /// Server to clients: seconds left in the current turn.
    Time { seconds_left: u16 },
    /// Latency probe, echoed to the sender. Also the server's
    /// "both players ready" signal after the handshake.
    Ping,
    EncryptKey(u64),
    StartGame,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::EndCommunication => MessageKind::EndCommunication,
            Message::Version(_) => MessageKind::Version,
            Message::Text(_) => MessageKind::Text,
            Message::EndTurn => MessageKind::EndTurn,
            Message::Time { .. } => MessageKind::Time,
            Message::Ping => MessageKind::Ping,
            Message::EncryptKey(_) => MessageKind::EncryptKey,
            Message::StartGame => MessageKind::StartGame,
        }
    }

    /// Convenience constructor for a text message.
    pub fn text(text: &str) -> Result<Self, FrameError> {
        Text::new(text).map(Message::Text)
    }

    /// Encode into one fixed-size wire record.
    pub fn encode(&self) -> [u8; MESSAGE_SIZE] {
        let mut record = [0u8; MESSAGE_SIZE];
        record[0] = self.kind().tag();
        let payload = &mut record[1..];
        match self {
            Message::Version(version) => {
                payload[0] = version.major;
                payload[1] = version.minor;
                payload[2] = version.patch;
            }
            Message::Text(text) => payload.copy_from_slice(text.raw()),
            Message::Time { seconds_left } => {
                payload[..2].copy_from_slice(&seconds_left.to_le_bytes());
            }
            Message::EncryptKey(key) => payload[..8].copy_from_slice(&key.to_le_bytes()),
            Message::EndCommunication | Message::EndTurn | Message::Ping | Message::StartGame => {}
        }
        record
    }

    /// Decode one wire record. Unknown tags are rejected, never guessed.
    pub fn decode(record: &[u8; MESSAGE_SIZE]) -> Result<Self, FrameError> {
        let kind = MessageKind::from_tag(record[0]).ok_or(FrameError::UnknownKind(record[0]))?;
        let payload = &record[1..];
        let message = match kind {
            MessageKind::EndCommunication => Message::EndCommunication,
            MessageKind::Version => {
                Message::Version(Version::new(payload[0], payload[1], payload[2]))
            }
            MessageKind::Text => Message::Text(Text::from_bytes(payload)?),
            MessageKind::EndTurn => Message::EndTurn,
            MessageKind::Time => Message::Time {
                seconds_left: u16::from_le_bytes([payload[0], payload[1]]),
            },
            MessageKind::Ping => Message::Ping,
            MessageKind::EncryptKey => {
                let mut key = [0u8; 8];
                key.copy_from_slice(&payload[..8]);
                Message::EncryptKey(u64::from_le_bytes(key))
            }
            MessageKind::StartGame => Message::StartGame,
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_covers_largest_payload() {
        assert_eq!(MESSAGE_SIZE, 129);
        assert!(PAYLOAD_SIZE >= size_of::<u64>());
        assert!(PAYLOAD_SIZE >= 3);
    }

    #[test]
    fn tags_match_wire_numbering() {
        assert_eq!(MessageKind::EndCommunication.tag(), 0);
        assert_eq!(MessageKind::Version.tag(), 1);
        assert_eq!(MessageKind::Text.tag(), 2);
        assert_eq!(MessageKind::EndTurn.tag(), 3);
        assert_eq!(MessageKind::Time.tag(), 4);
        assert_eq!(MessageKind::Ping.tag(), 5);
        assert_eq!(MessageKind::EncryptKey.tag(), 6);
        assert_eq!(MessageKind::StartGame.tag(), 7);
        for tag in 0..=7u8 {
            assert_eq!(MessageKind::from_tag(tag).map(MessageKind::tag), Some(tag));
        }
        assert_eq!(MessageKind::from_tag(8), None);
    }

    #[test]
    fn version_layout() {
        let record = Message::Version(Version::new(2, 13, 7)).encode();
        assert_eq!(&record[..4], &[1, 2, 13, 7]);
        assert!(record[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn time_is_little_endian() {
        let record = Message::Time { seconds_left: 0x0102 }.encode();
        assert_eq!(&record[..3], &[4, 0x02, 0x01]);
        assert_eq!(
            Message::decode(&record).unwrap(),
            Message::Time { seconds_left: 0x0102 }
        );
    }

    #[test]
    fn encrypt_key_layout() {
        let key = 0x1122_3344_5566_7788u64;
        let record = Message::EncryptKey(key).encode();
        assert_eq!(&record[1..9], &key.to_le_bytes());
        assert_eq!(Message::decode(&record).unwrap(), Message::EncryptKey(key));
    }

    #[test]
    fn text_preserves_full_buffer() {
        let mut record = Message::text("gg").unwrap().encode();
        // Garbage after the terminating NUL must survive a decode/encode pass.
        record[100] = 0xAB;
        let decoded = Message::decode(&record).unwrap();
        match decoded {
            Message::Text(text) => {
                assert_eq!(text.as_bytes(), b"gg");
                assert_eq!(text.to_string_lossy(), "gg");
            }
            other => panic!("expected Text, got {other:?}"),
        }
        assert_eq!(decoded.encode(), record);
    }

    #[test]
    fn text_fills_whole_buffer_without_terminator() {
        let full = "x".repeat(TEXT_CAPACITY);
        let text = Text::new(&full).unwrap();
        assert_eq!(text.as_bytes().len(), TEXT_CAPACITY);
    }

    #[test]
    fn text_too_long_is_rejected() {
        let long = "x".repeat(TEXT_CAPACITY + 1);
        assert!(matches!(
            Text::new(&long),
            Err(FrameError::TextTooLong { len }) if len == TEXT_CAPACITY + 1
        ));
    }

    #[test]
    fn payloadless_kinds_ignore_payload_bytes() {
        let mut record = [0xFFu8; MESSAGE_SIZE];
        record[0] = MessageKind::Ping.tag();
        assert_eq!(Message::decode(&record).unwrap(), Message::Ping);
        record[0] = MessageKind::EndTurn.tag();
        assert_eq!(Message::decode(&record).unwrap(), Message::EndTurn);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut record = [0u8; MESSAGE_SIZE];
        record[0] = 42;
        assert!(matches!(
            Message::decode(&record),
            Err(FrameError::UnknownKind(42))
        ));
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Message::StartGame.kind(), MessageKind::StartGame);
        assert_eq!(
            Message::Time { seconds_left: 3 }.kind(),
            MessageKind::Time
        );
        assert_eq!(Message::EndCommunication.kind(), MessageKind::EndCommunication);
    }
}
