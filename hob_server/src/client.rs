// Client-side socket for talking to the match server.
//
// The game client only needs four operations: connect (which performs the
// `VERSION` handshake), send, receive, and close. `receive_update` mirrors
// the server's behaviour and reports a lost connection as
// `Message::EndCommunication`, so callers handle "opponent left" and
// "connection dropped" through the same message dispatch.
//
// This module lives in the server crate because it is plain std TCP plus the
// protocol framing, which makes it usable by the integration tests without a
// game client.

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use hob_protocol::{FrameError, Message, Version, read_message, write_message};
use log::{debug, info, trace, warn};

/// Blocking TCP connection to a match server.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Connect and send `version` as the first record.
    pub fn connect(addr: impl ToSocketAddrs, version: Version) -> Result<Self, FrameError> {
        let stream = TcpStream::connect(addr)?;
        debug!("Client socket connected to {:?}", stream.peer_addr().ok());
        let client = Self { stream };
        client.send_update(&Message::Version(version))?;
        Ok(client)
    }

    pub fn send_update(&self, msg: &Message) -> Result<(), FrameError> {
        trace!("Client update is being sent ({:?})", msg.kind());
        write_message(&mut &self.stream, msg)
    }

    /// Block for the next message. A lost connection is reported as
    /// `Message::EndCommunication`.
    pub fn receive_update(&self) -> Message {
        match self.try_receive() {
            Ok(msg) => msg,
            Err(FrameError::Closed) => {
                info!("Connection to server was lost");
                Message::EndCommunication
            }
            Err(e) => {
                warn!("Client receive failed: {e}");
                Message::EndCommunication
            }
        }
    }

    /// Receive without mapping errors, for callers that need to tell a
    /// timeout from a disconnect.
    pub fn try_receive(&self) -> Result<Message, FrameError> {
        read_message(&mut &self.stream)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    pub fn close(&self) {
        trace!("Client socket is being closed");
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            warn!("Client socket is already closed: {e}");
        }
    }
}
