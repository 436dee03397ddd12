//! Entry point for `drtp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing, exit codes).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser};
use env_logger::Env;

use drtp::config::{Config, DEFAULT_CLIENT_WINDOW};
use drtp::simulator::SimulatorConfig;
use drtp::transfer::{receive_file, send_file};
use drtp::{shutdown_channel, DrtpError, ShutdownSignal};

/// Reliable file transfer over UDP.
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(group(ArgGroup::new("mode").required(true).args(["server", "client"])))]
struct Cli {
    /// Run as a server, receiving one file.
    #[arg(short = 's')]
    server: bool,

    /// Run as a client, sending a file.
    #[arg(short = 'c')]
    client: bool,

    /// IP address to bind (server) or connect to (client).
    #[arg(short = 'i')]
    ip: IpAddr,

    /// UDP port.
    #[arg(short = 'p')]
    port: u16,

    /// File to send (client only).
    #[arg(short = 'f')]
    file: Option<PathBuf>,

    /// Requested sliding window size (client only).
    #[arg(short = 'w', default_value_t = DEFAULT_CLIENT_WINDOW,
          value_parser = clap::value_parser!(u16).range(1..))]
    window: u16,

    /// Discard the first data packet to exercise retransmission (server only).
    #[arg(short = 'd', long)]
    discard: bool,

    /// Directory for the received file (server only).
    #[arg(short = 'o', long, default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default `info` level.
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let (shutdown, signal) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted; shutting down");
            shutdown.trigger();
        }
    });

    if let Err(err) = run(cli, signal).await {
        log::error!("{err:#}");
        let code = err
            .downcast_ref::<DrtpError>()
            .map(DrtpError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli, signal: ShutdownSignal) -> anyhow::Result<()> {
    let addr = SocketAddr::new(cli.ip, cli.port);
    let config = Config::default();
    config.validate().map_err(anyhow::Error::msg)?;

    if cli.server {
        let simulator = if cli.discard {
            SimulatorConfig::discard_first()
        } else {
            SimulatorConfig::default()
        };
        log::info!("Starting server on {addr}");
        let report = receive_file(addr, &cli.output_dir, simulator, &config, signal).await?;
        log::info!(
            "received {} bytes from {} into {}",
            report.stats.bytes,
            report.peer,
            report.path.display()
        );
        return Ok(());
    }

    let Some(file) = cli.file else {
        bail!("client mode requires a file (-f)");
    };
    if !file.is_file() {
        bail!("{} is not a readable file", file.display());
    }
    log::info!("Starting client, sending {} to {addr}", file.display());
    let report = send_file(&file, addr, cli.window, &config, signal)
        .await
        .with_context(|| format!("sending {}", file.display()))?;
    if !report.teardown.is_complete() {
        log::warn!("teardown incomplete; the server may not have seen the FIN");
    }
    Ok(())
}
