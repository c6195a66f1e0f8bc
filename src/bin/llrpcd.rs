//! LLRPC endpoint daemon.
//!
//! Binds a raw socket on the LLRPC protocol number, heartbeats the
//! configured peer once per interval, and logs every inbound message.
//!
//! # Usage
//!
//! ```sh
//! llrpcd --bind 127.0.0.1 --peer 192.168.1.100
//! ```
//!
//! Requires `CAP_NET_RAW` (or root) to open the raw socket.
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: graceful shutdown

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use llrpc::net::{Endpoint, RawSocket, LLRPC_PROTOCOL};
use llrpc::runtime::{Router, RouterConfig};

/// Default heartbeat interval in seconds.
const DEFAULT_INTERVAL_SECS: u64 = 1;

/// Parsed command line options.
struct Options {
    config: RouterConfig,
    /// Single-shot mode: open the socket, close it, exit.
    check: bool,
}

fn main() -> ExitCode {
    llrpc::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("llrpcd: {msg}");
            return ExitCode::FAILURE;
        }
    };

    if options.check {
        return run_check(&options.config);
    }

    run(options.config)
}

/// Single-shot bind check: open the raw endpoint and release it.
fn run_check(config: &RouterConfig) -> ExitCode {
    match RawSocket::open(LLRPC_PROTOCOL, config.bind_addr) {
        Ok(socket) => {
            drop(socket);
            eprintln!("llrpcd: bind check on {} ok", config.bind_addr);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("llrpcd: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Opens the router, wires signal handling, and drives the loop.
fn run(config: RouterConfig) -> ExitCode {
    let router = match Router::open(config) {
        Ok(router) => router,
        Err(e) => {
            eprintln!("llrpcd: {e}");
            return ExitCode::FAILURE;
        }
    };

    // SIGTERM/SIGINT do nothing but store the flag; the loop observes it
    // on its next iteration and exits cleanly.
    let shutdown = router.shutdown_flag();
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            eprintln!("llrpcd: failed to register signal handler: {e}");
            return ExitCode::FAILURE;
        }
    }

    eprintln!("llrpcd: ready");
    router.run();
    eprintln!("llrpcd: stopped");
    ExitCode::SUCCESS
}

/// Parses command line arguments into run options.
fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut config = RouterConfig::default();
    let mut check = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                i += 1;
                let value = args.get(i).ok_or("missing value for --bind")?;
                config.bind_addr = value
                    .parse::<Endpoint>()
                    .map_err(|_| format!("invalid bind address: {value}"))?;
            }
            "--peer" | "-p" => {
                i += 1;
                let value = args.get(i).ok_or("missing value for --peer")?;
                config.peer = value
                    .parse::<Endpoint>()
                    .map_err(|_| format!("invalid peer address: {value}"))?;
            }
            "--interval" | "-i" => {
                i += 1;
                let value = args.get(i).ok_or("missing value for --interval")?;
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid interval: {value}"))?;
                if secs == 0 {
                    return Err("interval must be at least 1 second".into());
                }
                config.heartbeat_interval = Duration::from_secs(secs);
            }
            "--check" => {
                check = true;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => {
                return Err(format!("unknown argument: {arg}"));
            }
        }
        i += 1;
    }

    Ok(Options { config, check })
}

fn print_usage() {
    eprintln!(
        r#"llrpcd - LLRPC endpoint daemon

USAGE:
    llrpcd [OPTIONS]

OPTIONS:
    -b, --bind <IPV4>       Local bind address (default: 127.0.0.1)
    -p, --peer <IPV4>       Heartbeat peer address (default: 127.0.0.1)
    -i, --interval <SECS>   Heartbeat interval in seconds (default: {DEFAULT_INTERVAL_SECS})
        --check             Open and close the raw endpoint, then exit
    -h, --help              Print this help message

SIGNALS:
    SIGTERM, SIGINT         Graceful shutdown

EXAMPLE:
    llrpcd --bind 127.0.0.1 --peer 192.168.1.100 --interval 1
"#
    );
}
