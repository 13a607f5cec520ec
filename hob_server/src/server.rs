// Match orchestrator: accept two players, run the turn clock, relay messages.
//
// Architecture: OS threads with blocking sockets.
//
// - **Run thread** (`run_async`): loops while `keep_running` is set. Each
//   iteration calls `DualClientSocket::create`, which binds, reports the
//   address, and blocks until both players passed the version handshake.
// - **Timer thread**: started once both slots are bound. `TurnClock`
//   broadcasts `TIME` every tick and `END_TURN` on expiry, then rolls into
//   the next turn.
// - **Relay workers**: player 1's worker runs on a scoped thread, player 2's
//   on the run thread itself. Each loops on `receive_update` for its slot:
//   `PING` is echoed to the sender, `TEXT` goes to the opponent, and
//   `END_COMMUNICATION` (sent or synthesized from a lost connection) tears
//   down both connections. Anything else is logged and dropped.
// - When both workers have returned the timer is stopped, and with `rearm`
//   set the loop listens again for a brand-new pair.
//
// Shutdown: `stop()` clears `keep_running`, closes the socket (which unblocks
// `accept()` and both `recv()` calls), and joins the run thread. The ready
// callback re-checks `keep_running` after binding so a `stop()` that lands
// between two matches cannot leave a fresh listener blocked forever.
//
// No error crosses a thread boundary: every thread logs its own failures and
// the only signals between threads are the socket state and `keep_running`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hob_protocol::{Message, PlayerSlot};
use log::{debug, error, info, trace};

use crate::config::ServerConfig;
use crate::socket::{DualClientSocket, SocketError};
use crate::timer::{Timer, TimerHandler};

type ListeningCallback = Arc<dyn Fn(SocketAddr) + Send + Sync>;

/// Timer callbacks that turn countdown events into broadcasts.
struct TurnClock {
    socket: Arc<DualClientSocket>,
    turn_seconds: u16,
}

impl TurnClock {
    fn broadcast(&self, msg: &Message) {
        for slot in PlayerSlot::ALL {
            self.socket.send_update(slot, msg);
        }
    }
}

impl TimerHandler for TurnClock {
    fn on_time_update(&self, seconds_left: u16) {
        trace!("Time updates are being sent (seconds left: {seconds_left})");
        self.broadcast(&Message::Time { seconds_left });
    }

    fn on_times_up(&self, next_seconds: &mut u16) {
        info!("Time is up");
        *next_seconds = self.turn_seconds;
        self.broadcast(&Message::EndTurn);
    }
}

/// State shared between the `Server` handle and its run thread.
struct Shared {
    socket: Arc<DualClientSocket>,
    timer: Timer,
    keep_running: AtomicBool,
    turn_seconds: u16,
    rearm: bool,
}

/// Two-player match server.
pub struct Server {
    shared: Arc<Shared>,
    on_listening: Option<ListeningCallback>,
    run_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let socket = Arc::new(
            DualClientSocket::new().with_handshake_timeout(config.handshake_timeout()),
        );
        let clock = Arc::new(TurnClock {
            socket: Arc::clone(&socket),
            turn_seconds: config.turn_seconds,
        });
        let tick = config.tick_interval().max(Duration::from_millis(1));

        Self {
            shared: Arc::new(Shared {
                socket,
                timer: Timer::with_tick_interval(clock, tick),
                keep_running: AtomicBool::new(false),
                turn_seconds: config.turn_seconds,
                rearm: config.rearm,
            }),
            on_listening: None,
            run_thread: Mutex::new(None),
        }
    }

    /// Register a callback fired with the bound address each time the server
    /// starts listening for a new pair of players.
    pub fn on_listening<F>(mut self, callback: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.on_listening = Some(Arc::new(callback));
        self
    }

    /// Serve matches on a background thread. No-op if already running.
    pub fn run_async(&self, port: u16) {
        info!("Server is running asynchronously (port: {port})");
        let mut run_thread = lock(&self.run_thread);
        if self.shared.keep_running.swap(true, Ordering::SeqCst) {
            error!("Server is already running");
            return;
        }

        // A previous run may have ended on its own (bind failure, no rearm).
        if let Some(finished) = run_thread.take() {
            if finished.join().is_err() {
                error!("Previous run thread panicked");
            }
        }

        let shared = Arc::clone(&self.shared);
        let on_listening = self.on_listening.clone();
        let spawned = thread::Builder::new()
            .name("hob-server".into())
            .spawn(move || shared.run_matches(port, on_listening.as_ref()));
        match spawned {
            Ok(handle) => *run_thread = Some(handle),
            Err(e) => {
                error!("Run thread failed to spawn: {e}");
                self.shared.keep_running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Serve matches on the calling thread until stopped (or, without
    /// `rearm`, until the first match ends). No-op if already running.
    pub fn run_sync(&self, port: u16) {
        if self.shared.keep_running.swap(true, Ordering::SeqCst) {
            error!("Server is already running");
            return;
        }
        self.shared.run_matches(port, self.on_listening.as_ref());
    }

    /// Stop serving, disconnect both players, and wait for the run thread.
    /// Safe to call repeatedly or when nothing is running.
    pub fn stop(&self) {
        debug!("Server is being stopped");
        self.shared.keep_running.store(false, Ordering::SeqCst);
        self.shared.socket.close();

        if let Some(handle) = lock(&self.run_thread).take() {
            debug!("Run thread is being joined");
            if handle.join().is_err() {
                error!("Run thread panicked");
            }
            debug!("Run thread has joined");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.keep_running.load(Ordering::SeqCst)
    }

    /// Address of the listener while waiting for or playing a match.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.socket.local_addr()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn run_matches(&self, port: u16, on_listening: Option<&ListeningCallback>) {
        debug!("Server is running synchronously (port: {port})");
        while self.keep_running.load(Ordering::SeqCst) {
            let ready = |addr: SocketAddr| {
                if !self.keep_running.load(Ordering::SeqCst) {
                    debug!("Stop requested while binding, closing listener");
                    self.socket.close();
                    return;
                }
                info!("Server is listening on {addr}");
                if let Some(callback) = on_listening {
                    callback(addr);
                }
            };

            match self.socket.create(port, ready) {
                Ok(()) => {}
                Err(SocketError::Aborted) => {
                    info!("Waiting for players was aborted");
                    continue;
                }
                Err(e) => {
                    error!("Socket failed to be created: {e}");
                    break;
                }
            }

            self.play_match();

            if !self.rearm {
                break;
            }
            if self.keep_running.load(Ordering::SeqCst) {
                info!("Listening for a new match");
            }
        }
        self.keep_running.store(false, Ordering::SeqCst);
        info!("Server has finished");
    }

    fn play_match(&self) {
        info!("Match is starting");
        self.timer.start(self.turn_seconds);

        thread::scope(|scope| {
            let player_one = thread::Builder::new()
                .name("hob-relay-1".into())
                .spawn_scoped(scope, || self.relay(PlayerSlot::PlayerOne));
            if let Err(e) = &player_one {
                error!("Relay thread failed to spawn: {e}");
                self.socket.close();
            }

            self.relay(PlayerSlot::PlayerTwo);

            if let Ok(handle) = player_one {
                debug!("Relay thread for player 1 is being joined");
                if handle.join().is_err() {
                    error!("Relay thread for player 1 panicked");
                }
            }
        });

        self.timer.stop();
        info!("Match has ended");
    }

    /// Relay worker for one slot. Returns once the match is over.
    fn relay(&self, slot: PlayerSlot) {
        let other = slot.other();
        debug!("Player updates are being received ({slot})");
        loop {
            let msg = self.socket.receive_update(slot);
            match msg {
                Message::Ping => {
                    trace!("Ping is being echoed ({slot})");
                    self.socket.send_update(slot, &msg);
                }
                Message::Text(text) => {
                    trace!("Text is being relayed ({slot} -> {other}): {text:?}");
                    self.socket.send_update(other, &msg);
                }
                Message::EndCommunication => {
                    info!("End communication received ({slot})");
                    self.socket.send_update(other, &Message::EndCommunication);
                    self.socket.close();
                    return;
                }
                Message::Version(_)
                | Message::EndTurn
                | Message::Time { .. }
                | Message::EncryptKey(_)
                | Message::StartGame => {
                    error!("Invalid message received ({:?} from {slot})", msg.kind());
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
