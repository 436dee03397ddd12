//! File-level entry points used by the binary.
//!
//! `send_file` reads and chunks a file, connects, streams it and closes.
//! `receive_file` accepts one connection and writes the stream to a fresh
//! `received_file_<unix-seconds>` in the output directory.  Both report
//! throughput in Mbps over the data transfer phase.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::fs::File;
use tokio::io::BufWriter;

use crate::config::Config;
use crate::connection::{ClientSession, ServerSession};
use crate::error::DrtpError;
use crate::receiver::ReceiveStats;
use crate::sender::{chunk_bytes, SendStats};
use crate::simulator::{Simulator, SimulatorConfig};
use crate::socket::{ShutdownSignal, Socket};
use crate::teardown::TeardownOutcome;

/// Summary of a finished upload.
#[derive(Debug, Clone)]
pub struct ClientReport {
    pub window: u16,
    pub stats: SendStats,
    pub elapsed: Duration,
    pub teardown: TeardownOutcome,
}

impl ClientReport {
    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.stats.bytes, self.elapsed)
    }
}

/// Summary of a finished download.
#[derive(Debug, Clone)]
pub struct ServerReport {
    pub peer: SocketAddr,
    pub window: u16,
    pub path: PathBuf,
    pub stats: ReceiveStats,
    pub elapsed: Duration,
}

impl ServerReport {
    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.stats.bytes, self.elapsed)
    }
}

/// `bytes * 8 / seconds / 10^6`; zero when no time elapsed.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}

/// Read `path` whole and split it into `chunk_size` pieces.
pub async fn read_chunks(path: &Path, chunk_size: usize) -> Result<Vec<Vec<u8>>, DrtpError> {
    let data = tokio::fs::read(path).await?;
    log::debug!("read {} bytes from {}", data.len(), path.display());
    Ok(chunk_bytes(&data, chunk_size))
}

/// Output location for a download started now.
pub fn output_path(dir: &Path) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    dir.join(format!("received_file_{secs}"))
}

/// Upload `path` to the server at `server`.
///
/// The file is read before any packet is sent, so an unreadable file never
/// opens a connection.
pub async fn send_file(
    path: &Path,
    server: SocketAddr,
    window: u16,
    config: &Config,
    shutdown: ShutdownSignal,
) -> Result<ClientReport, DrtpError> {
    let chunks = read_chunks(path, config.chunk_size).await?;

    let local = match server {
        SocketAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
        SocketAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
    };
    let socket = Socket::bind(local).await?.with_shutdown(shutdown);
    let mut session = ClientSession::connect(socket, server, window, config.clone()).await?;

    let started = Instant::now();
    let stats = session.send_chunks(chunks).await?;
    let elapsed = started.elapsed();
    let window = session.window();

    let teardown = session.close().await?;
    let report = ClientReport {
        window,
        stats,
        elapsed,
        teardown,
    };
    log::info!("The throughput is {:.2} Mbps", report.throughput_mbps());
    Ok(report)
}

/// Serve one upload on `bind`, writing it under `output_dir`.
///
/// The output file is created only once a client has connected.  If the
/// transfer fails or is cancelled the partial file is kept, holding every
/// payload acknowledged so far; on an idle timeout the error carries its
/// length.
pub async fn receive_file(
    bind: SocketAddr,
    output_dir: &Path,
    simulator: SimulatorConfig,
    config: &Config,
    shutdown: ShutdownSignal,
) -> Result<ServerReport, DrtpError> {
    let socket = Socket::bind(bind).await?.with_shutdown(shutdown);
    let mut session = ServerSession::accept(socket, config.clone())
        .await?
        .with_simulator(Simulator::new(simulator));

    let path = output_path(output_dir);
    let mut out = BufWriter::new(File::create(&path).await?);
    log::info!("writing to {}", path.display());

    let started = Instant::now();
    let stats = session.receive_into(&mut out).await?;
    // Stop the clock at the FIN, not after the linger.
    let elapsed = session
        .transfer_elapsed()
        .unwrap_or_else(|| started.elapsed());

    let report = ServerReport {
        peer: session.peer(),
        window: session.window(),
        path,
        stats,
        elapsed,
    };
    log::info!("The throughput is {:.2} Mbps", report.throughput_mbps());
    Ok(report)
}
