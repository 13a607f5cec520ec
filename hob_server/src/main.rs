// CLI entry point for the Heap of Battle match server.
//
// Starts a server that pairs two game clients per match, then waits for the
// operator to enter `0` on stdin (or for stdin to close) before stopping it.
// See `server.rs` for the threading model and `socket.rs` for the handshake.
//
// Usage:
//   hob-server [PORT] [OPTIONS]
//     PORT                    Listen port (default: 8787)
//     --config <FILE>         JSON config file (see `config.rs`)
//     --turn-seconds <N>      Seconds per turn (default: 30)

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hob_protocol::PROTOCOL_VERSION;
use hob_server::{Server, ServerConfig};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    port: Option<u16>,

    /// JSON config file; command-line values override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds per turn
    #[arg(short, long)]
    turn_seconds: Option<u16>,
}

fn main() -> ExitCode {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => match ServerConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Config {} failed to load: {e}", path.display());
                eprintln!("Failed to load config {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(turn_seconds) = args.turn_seconds {
        config.turn_seconds = turn_seconds;
    }

    println!("Running Heap of Battle server (protocol {PROTOCOL_VERSION})");
    println!("Using port {}", config.port);
    let port = config.port;
    let server = Server::new(config).on_listening(|addr| info!("Waiting for players on {addr}"));
    server.run_async(port);

    wait_for_stop_command();

    println!("Shutting down...");
    server.stop();
    info!("Server instance closed successfully");
    ExitCode::SUCCESS
}

/// Block until the operator enters `0` or stdin closes.
fn wait_for_stop_command() {
    println!("Input \"0\" to stop server");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if line.trim() == "0" => return,
            Ok(_) => println!("Input \"0\" to stop server"),
            Err(e) => {
                error!("Failed to read stdin: {e}");
                return;
            }
        }
    }
}
