// hob_server: two-player match server for Heap of Battle.
//
// The server is a small authoritative relay: it admits exactly two game
// clients after a protocol-version handshake, forwards chat between them,
// echoes latency probes, and runs the per-turn countdown that forces
// `END_TURN` when a player's time is up. It never runs game logic.
//
// Module overview:
// - `timer.rs`:   `Timer`, a restartable countdown on its own thread driving
//                 a `TimerHandler`. Independent of sockets.
// - `socket.rs`:  `DualClientSocket`, the listener with two player slots,
//                 the accept + version handshake loop, and addressed
//                 blocking send/receive.
// - `server.rs`:  `Server`, which composes the two: accept loop on a
//                 background thread, one relay worker per player, turn clock
//                 broadcasts, re-arming for the next match, and `stop()`.
// - `client.rs`:  `Client`, the client-side socket used by game clients and
//                 the integration tests.
// - `config.rs`:  `ServerConfig` with defaults and JSON loading.
//
// Dependencies: `hob_protocol` (message types and record framing).
//
// The server can run as a standalone binary (`main.rs`) or be embedded in a
// game process via `Server::run_async`.

pub mod client;
pub mod config;
pub mod server;
pub mod socket;
pub mod timer;

pub use client::Client;
pub use config::{ConfigError, ServerConfig};
pub use server::Server;
pub use socket::{DualClientSocket, SocketError};
pub use timer::{Timer, TimerHandler};
