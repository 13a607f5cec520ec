// Listening socket with exactly two player slots.
//
// `DualClientSocket` owns one `TcpListener` and up to two accepted client
// connections, one per `PlayerSlot`. `create()` binds, reports the bound
// address through the ready callback, then runs the accept loop:
//
// - Slots are filled strictly in order: player 1, then player 2.
// - The first record on a fresh connection must be `VERSION` with exactly the
//   server's version. Anything else (wrong kind, wrong version, EOF, timeout)
//   gets `END_COMMUNICATION`, the connection is closed, and the same slot is
//   offered to the next connection. A slot already bound is left alone.
// - When both slots pass, both clients receive `PING` and `create()` returns.
// - `accept()` is not re-entered while both slots are bound, so a third
//   client waits in the backlog until the listener is closed.
//
// The listener is built with `socket2` so it can set `SO_REUSEADDR` and
// listen with a backlog of `LISTEN_BACKLOG`.
//
// A connection is only placed in its slot once its `VERSION` has been
// accepted. While being checked it sits in `pending`, so `is_connected()`
// never reports an unvetted peer.
//
// `close()` may be called from any thread. It takes the listener, the pending
// connection, and both slots out of the shared state and shuts them down,
// which makes a blocked `accept()` or `recv()` in another thread return. The
// accept loop then sees the listener gone and reports `SocketError::Aborted`.
//
// Connections are held as `Arc<Connection>` so reads and writes happen
// without the state lock held. Writes to one connection are serialized by a
// per-connection lock because the timer thread and a relay worker may send to
// the same client at once.

use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use hob_protocol::{
    FrameError, Message, MessageKind, PROTOCOL_VERSION, PlayerSlot, Version, read_message,
    write_message,
};
use log::{debug, error, info, trace, warn};
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use thiserror::Error;

/// Pause between retries when `accept()` itself fails.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Pending-connection queue length. Only two players are ever admitted.
const LISTEN_BACKLOG: i32 = 2;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket is already created")]
    AlreadyCreated,
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    /// The listener was closed while waiting for players.
    #[error("listener was closed while waiting for players")]
    Aborted,
}

/// Why a freshly accepted connection was refused.
#[derive(Debug, Error)]
enum HandshakeError {
    #[error("first message is {0:?}, not VERSION")]
    NotVersion(MessageKind),
    #[error("client version {client} does not match server version {server}")]
    Mismatch { client: Version, server: Version },
    #[error("no version received: {0}")]
    Frame(#[from] FrameError),
    #[error("listener closed during handshake")]
    Closed,
}

/// One accepted client connection.
struct Connection {
    stream: TcpStream,
    write_lock: Mutex<()>,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            write_lock: Mutex::new(()),
        }
    }

    fn send(&self, msg: &Message) -> Result<(), FrameError> {
        let _guard = lock(&self.write_lock);
        write_message(&mut &self.stream, msg)
    }

    fn receive(&self) -> Result<Message, FrameError> {
        read_message(&mut &self.stream)
    }

    fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Client stream shutdown reported: {e}");
        }
    }
}

#[derive(Default)]
struct Slots {
    player_one: Option<Arc<Connection>>,
    player_two: Option<Arc<Connection>>,
}

impl Slots {
    fn get(&self, slot: PlayerSlot) -> &Option<Arc<Connection>> {
        match slot {
            PlayerSlot::PlayerOne => &self.player_one,
            PlayerSlot::PlayerTwo => &self.player_two,
        }
    }

    fn get_mut(&mut self, slot: PlayerSlot) -> &mut Option<Arc<Connection>> {
        match slot {
            PlayerSlot::PlayerOne => &mut self.player_one,
            PlayerSlot::PlayerTwo => &mut self.player_two,
        }
    }
}

#[derive(Default)]
struct Inner {
    listener: Option<Arc<TcpListener>>,
    /// Accepted connection whose `VERSION` is still being checked.
    pending: Option<Arc<Connection>>,
    slots: Slots,
}

impl Inner {
    fn is_open(&self) -> bool {
        self.listener.is_some()
            || self.pending.is_some()
            || PlayerSlot::ALL
                .iter()
                .any(|slot| self.slots.get(*slot).is_some())
    }
}

/// Listening socket plus the two player connections of one match.
pub struct DualClientSocket {
    version: Version,
    handshake_timeout: Option<Duration>,
    inner: Mutex<Inner>,
}

impl Default for DualClientSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl DualClientSocket {
    /// A socket that admits clients speaking `PROTOCOL_VERSION`.
    pub fn new() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            handshake_timeout: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Limit how long a new connection may take to send its `VERSION`.
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bind `port`, call `ready` with the bound address, then block until two
    /// clients have passed the version handshake.
    pub fn create<F>(&self, port: u16, ready: F) -> Result<(), SocketError>
    where
        F: FnOnce(SocketAddr),
    {
        debug!("Server socket is being created (port: {port})");
        let (listener, addr) = {
            let mut inner = lock(&self.inner);
            if inner.is_open() {
                error!("Socket is already created");
                return Err(SocketError::AlreadyCreated);
            }

            let bind_error = |source| SocketError::Bind { port, source };
            let listener = bind_listener(port).map_err(bind_error)?;
            let addr = listener.local_addr().map_err(bind_error)?;
            let listener = Arc::new(listener);
            inner.listener = Some(Arc::clone(&listener));
            (listener, addr)
        };

        ready(addr);
        self.wait_for_players(&listener)
    }

    /// Send one message to `slot`. Failures are logged, never returned.
    pub fn send_update(&self, slot: PlayerSlot, msg: &Message) {
        trace!("Update is being sent ({:?} to {slot})", msg.kind());
        let Some(connection) = self.connection(slot) else {
            warn!("Connection is not established ({slot})");
            return;
        };
        if let Err(e) = connection.send(msg) {
            error!("Message failed to be sent ({:?} to {slot}): {e}", msg.kind());
        }
    }

    /// Block until `slot` delivers a message.
    ///
    /// A lost connection or read failure comes back as
    /// `Message::EndCommunication`. Records with an unknown kind are logged
    /// and skipped.
    pub fn receive_update(&self, slot: PlayerSlot) -> Message {
        let Some(connection) = self.connection(slot) else {
            error!("Connection is not established ({slot})");
            return Message::EndCommunication;
        };
        debug!("Waiting for updates to arrive ({slot})");
        loop {
            match connection.receive() {
                Ok(msg) => {
                    debug!("Received an update ({:?} from {slot})", msg.kind());
                    return msg;
                }
                Err(FrameError::UnknownKind(tag)) => {
                    warn!("Dropping record with unknown kind {tag} from {slot}");
                }
                Err(FrameError::Closed) => {
                    info!("Connection was lost ({slot})");
                    return Message::EndCommunication;
                }
                Err(e) => {
                    error!("Receive failed ({slot}): {e}");
                    return Message::EndCommunication;
                }
            }
        }
    }

    /// Shut down the listener and both client connections.
    pub fn close(&self) {
        trace!("Server socket is being closed");
        let (listener, pending, player_one, player_two) = {
            let mut inner = lock(&self.inner);
            (
                inner.listener.take(),
                inner.pending.take(),
                inner.slots.player_one.take(),
                inner.slots.player_two.take(),
            )
        };

        match listener {
            Some(listener) => wake_accept(&listener),
            None => warn!("Server socket is already closed"),
        }
        if let Some(pending) = pending {
            debug!("Connection in handshake is being closed");
            pending.shutdown();
        }
        close_connection(PlayerSlot::PlayerOne, player_one);
        close_connection(PlayerSlot::PlayerTwo, player_two);
    }

    /// Close one client connection and free its slot.
    pub fn close_client(&self, slot: PlayerSlot) {
        let connection = lock(&self.inner).slots.get_mut(slot).take();
        close_connection(slot, connection);
    }

    pub fn is_connected(&self, slot: PlayerSlot) -> bool {
        lock(&self.inner).slots.get(slot).is_some()
    }

    /// Address of the listener, while one is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let inner = lock(&self.inner);
        inner.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    fn connection(&self, slot: PlayerSlot) -> Option<Arc<Connection>> {
        lock(&self.inner).slots.get(slot).clone()
    }

    fn listener_closed(&self) -> bool {
        lock(&self.inner).listener.is_none()
    }

    fn wait_for_players(&self, listener: &TcpListener) -> Result<(), SocketError> {
        info!("Waiting for incoming connections");
        for slot in PlayerSlot::ALL {
            loop {
                let stream = match listener.accept() {
                    Ok((stream, peer)) => {
                        info!("Connection accepted from {peer} ({slot})");
                        stream
                    }
                    Err(e) => {
                        if self.listener_closed() {
                            warn!("Server socket has been closed");
                            return Err(SocketError::Aborted);
                        }
                        error!("Connection failed to be accepted: {e}");
                        thread::sleep(ACCEPT_RETRY_DELAY);
                        continue;
                    }
                };

                match self.handshake(slot, stream) {
                    Ok(()) => break,
                    Err(HandshakeError::Closed) => {
                        warn!("Server socket has been closed");
                        return Err(SocketError::Aborted);
                    }
                    Err(reason) => {
                        error!("Handshake failed ({slot}): {reason}");
                        self.reject_pending(slot);
                    }
                }
            }
        }

        info!("Both players connected");
        for slot in PlayerSlot::ALL {
            self.send_update(slot, &Message::Ping);
        }
        Ok(())
    }

    /// Check the first record of `stream` and, if it carries our version,
    /// bind the connection into `slot`.
    fn handshake(&self, slot: PlayerSlot, stream: TcpStream) -> Result<(), HandshakeError> {
        if let Err(e) = stream.set_read_timeout(self.handshake_timeout) {
            warn!("Handshake timeout could not be set ({slot}): {e}");
        }
        let connection = Arc::new(Connection::new(stream));
        {
            let mut inner = lock(&self.inner);
            if inner.listener.is_none() {
                connection.shutdown();
                return Err(HandshakeError::Closed);
            }
            inner.pending = Some(Arc::clone(&connection));
        }

        let first = connection.receive()?;
        let client = match first {
            Message::Version(client) => client,
            other => return Err(HandshakeError::NotVersion(other.kind())),
        };
        info!("Version message received ({slot}, version: {client})");
        if client != self.version {
            return Err(HandshakeError::Mismatch {
                client,
                server: self.version,
            });
        }

        if let Err(e) = connection.stream.set_read_timeout(None) {
            warn!("Read timeout could not be cleared ({slot}): {e}");
        }

        let mut inner = lock(&self.inner);
        match inner.pending.take() {
            Some(admitted) if inner.listener.is_some() => {
                *inner.slots.get_mut(slot) = Some(admitted);
                Ok(())
            }
            _ => {
                connection.shutdown();
                Err(HandshakeError::Closed)
            }
        }
    }

    /// Tell the connection that failed its handshake to go away.
    fn reject_pending(&self, slot: PlayerSlot) {
        let Some(pending) = lock(&self.inner).pending.take() else {
            warn!("Rejected connection is already closed ({slot})");
            return;
        };
        if let Err(e) = pending.send(&Message::EndCommunication) {
            error!("Message failed to be sent (EndCommunication to {slot}): {e}");
        }
        pending.shutdown();
    }
}

impl Drop for DualClientSocket {
    fn drop(&mut self) {
        let open = lock(&self.inner).is_open();
        if open {
            debug!("Socket is being dropped while open");
            self.close();
        }
    }
}

fn close_connection(slot: PlayerSlot, connection: Option<Arc<Connection>>) {
    match connection {
        Some(connection) => {
            debug!("Client socket is being closed ({slot})");
            connection.shutdown();
        }
        None => warn!("Client socket is already closed ({slot})"),
    }
}

/// Bind a listener on all interfaces with address reuse and a short backlog.
fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

/// Make a thread blocked in `accept()` on `listener` return.
///
/// Shutting down a listening socket wakes `accept()` on Linux. Where that is
/// refused, a throwaway loopback connection does the same.
fn wake_accept(listener: &TcpListener) {
    if let Err(e) = SockRef::from(listener).shutdown(Shutdown::Both) {
        debug!("Listener shutdown failed ({e}), waking accept by connecting");
        wake_accept_by_connecting(listener);
    }
}

fn wake_accept_by_connecting(listener: &TcpListener) {
    let Ok(addr) = listener.local_addr() else {
        return;
    };
    let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port()));
    if let Err(e) = TcpStream::connect_timeout(&loopback, Duration::from_secs(1)) {
        debug!("Wake-up connection failed: {e}");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
