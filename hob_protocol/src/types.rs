// Core addressing and version types for the match protocol.
//
// `PlayerSlot` names the two seats of a match. The server addresses every
// send/receive by slot, and every use site matches on it exhaustively so a
// third seat can never be mis-indexed. `Version` is the triple a client sends
// in its first record; the server admits it only on an exact match with
// `PROTOCOL_VERSION`.

use std::fmt;

/// One of the two fixed seats a connected client occupies during a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlayerSlot {
    PlayerOne,
    PlayerTwo,
}

impl PlayerSlot {
    /// Both slots, in the order the accept loop fills them.
    pub const ALL: [PlayerSlot; 2] = [PlayerSlot::PlayerOne, PlayerSlot::PlayerTwo];

    /// The opponent's slot.
    pub fn other(self) -> PlayerSlot {
        match self {
            PlayerSlot::PlayerOne => PlayerSlot::PlayerTwo,
            PlayerSlot::PlayerTwo => PlayerSlot::PlayerOne,
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerSlot::PlayerOne => f.write_str("player 1"),
            PlayerSlot::PlayerTwo => f.write_str("player 2"),
        }
    }
}

/// Protocol version triple, compared byte-for-byte during the handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The version this build of the server and client speaks.
pub const PROTOCOL_VERSION: Version = Version::new(0, 0, 0);
