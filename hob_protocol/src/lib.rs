// hob_protocol: wire protocol for the Heap of Battle match server.
//
// This crate defines the message types and record framing used by the match
// server (`hob_server`) and game clients to talk over TCP. It is shared by
// both sides and carries no networking or threading of its own.
//
// Module overview:
// - `types.rs`:    `PlayerSlot` (the two seats of a match), `Version` and the
//                  compiled `PROTOCOL_VERSION`.
// - `message.rs`:  `Message` / `MessageKind` and the fixed-size binary record
//                  encoding (tag byte + 128-byte payload area).
// - `framing.rs`:  Blocking read/write of one record over any `Read`/`Write`
//                  stream, plus the `FrameError` taxonomy.
//
// Design decisions:
// - **Fixed-size records.** Both peers always move `MESSAGE_SIZE` bytes per
//   message; there is no length prefix or delimiter to get out of sync.
// - **No async runtime.** Framing works on `std::io` traits so it fits the
//   server's thread-per-client blocking sockets.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{FrameError, read_message, write_message};
pub use message::{MESSAGE_SIZE, Message, MessageKind, PAYLOAD_SIZE, TEXT_CAPACITY, Text};
pub use types::{PROTOCOL_VERSION, PlayerSlot, Version};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Frame a message, read it back, and compare.
    fn roundtrip(msg: &Message) {
        let mut wire = Vec::new();
        write_message(&mut wire, msg).unwrap();
        assert_eq!(wire.len(), MESSAGE_SIZE);

        let mut cursor = Cursor::new(&wire);
        let recovered = read_message(&mut cursor).unwrap();
        assert_eq!(&recovered, msg);
    }

    #[test]
    fn roundtrip_handshake() {
        roundtrip(&Message::Version(PROTOCOL_VERSION));
    }

    #[test]
    fn roundtrip_chat_text() {
        roundtrip(&Message::text("gg, well played").unwrap());
    }

    #[test]
    fn roundtrip_unicode_text() {
        let msg = Message::text("győzelem ⚔").unwrap();
        roundtrip(&msg);
        match msg {
            Message::Text(text) => assert_eq!(text.to_string_lossy(), "győzelem ⚔"),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn roundtrip_turn_clock() {
        roundtrip(&Message::Time { seconds_left: 30 });
        roundtrip(&Message::Time { seconds_left: 0 });
        roundtrip(&Message::Time {
            seconds_left: u16::MAX,
        });
    }
}
