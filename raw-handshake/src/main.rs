//! Entry point for `raw-handshake`.
//!
//! Parses CLI arguments into a [`HandshakeConfig`], opens the raw socket and
//! runs the handshake.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, Ctrl-C handling, argument
//! parsing, exit status).

use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use raw_handshake::session::{DEFAULT_LOCAL_PORT, DEFAULT_REMOTE_PORT};
use raw_handshake::{
    CancelToken, ChecksumMode, Handshake, HandshakeConfig, HandshakeState, RawTransport,
};

/// Perform a TCP three-way handshake with hand-built packets over a raw socket.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Source IPv4 address written into outbound headers.
    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST)]
    source: Ipv4Addr,
    /// Destination IPv4 address of the peer.
    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST)]
    dest: Ipv4Addr,
    /// Local (ephemeral) TCP port.
    #[arg(long, default_value_t = DEFAULT_LOCAL_PORT)]
    local_port: u16,
    /// Peer TCP port.
    #[arg(long, default_value_t = DEFAULT_REMOTE_PORT)]
    remote_port: u16,
    /// Give up after this many seconds without a matching SYN-ACK.
    #[arg(long)]
    timeout: Option<u64>,
    /// Longest single blocking receive, in milliseconds.
    #[arg(long, default_value_t = 200)]
    poll_interval_ms: u64,
    /// Who fills the IPv4/TCP checksum fields.
    #[arg(long, value_enum, default_value_t = ChecksumArg::Compute)]
    checksum: ChecksumArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChecksumArg {
    /// Compute both checksums before sending.
    Compute,
    /// Leave them zero for the network layer.
    Kernel,
}

impl Cli {
    fn into_config(self) -> HandshakeConfig {
        HandshakeConfig {
            source_addr: self.source,
            dest_addr: self.dest,
            local_port: self.local_port,
            remote_port: self.remote_port,
            timeout: self.timeout.map(Duration::from_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            checksum: match self.checksum {
                ChecksumArg::Compute => ChecksumMode::Compute,
                ChecksumArg::Kernel => ChecksumMode::Kernel,
            },
            ..HandshakeConfig::default()
        }
    }
}

/// One line per event on stdout, prefixed `[+]` (progress), `[!]` (problem)
/// or `[-]` (debug detail).  `RUST_LOG` still controls verbosity.
fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            let marker = match record.level() {
                log::Level::Error | log::Level::Warn => '!',
                log::Level::Info => '+',
                log::Level::Debug | log::Level::Trace => '-',
            };
            writeln!(buf, "[{marker}] {}", record.args())
        })
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logger();

    let config = Cli::parse().into_config();
    log::info!("Starting TCP three-way handshake client...");

    let transport = RawTransport::open().context("socket setup failed")?;

    // Ctrl-C trips the token; the receive loop notices within one poll.
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut handshake = Handshake::new(config, transport).with_cancel_token(cancel);
    let state = tokio::task::spawn_blocking(move || {
        let result = handshake.run();
        handshake.into_transport().close();
        result
    })
    .await
    .context("handshake task panicked")?
    .context("handshake failed")?;

    if state != HandshakeState::Established {
        bail!("handshake ended in {state}");
    }
    Ok(())
}
