//! Handshake configuration and per-run session state.
//!
//! [`HandshakeConfig`] carries every address, port and sequence number the
//! handshake uses.  Its [`Default`] holds the fixed, pre-agreed test values
//! (client ISN 200, server ISN 400, final ACK sequence 600 on loopback,
//! 54321 → 12345), so a peer built against those numbers interoperates
//! without any flags.
//!
//! [`HandshakeSession`] is derived from a config once per run.  It holds the
//! values the filter compares against and the current FSM state.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::state::HandshakeState;

/// Local ephemeral port used by the client.
pub const DEFAULT_LOCAL_PORT: u16 = 54321;
/// Port the peer listens on.
pub const DEFAULT_REMOTE_PORT: u16 = 12345;

/// Who fills the IPv4 and TCP checksum fields of outbound packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumMode {
    /// Compute both checksums before sending.
    #[default]
    Compute,
    /// Leave both fields zero and let the network layer deal with them.
    ///
    /// Linux fills the IPv4 checksum under `IP_HDRINCL` but never the TCP one.
    Kernel,
}

/// Every tunable of one handshake run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub source_addr: Ipv4Addr,
    pub dest_addr: Ipv4Addr,
    pub local_port: u16,
    pub remote_port: u16,
    /// Sequence number carried by our SYN.
    pub initial_seq: u32,
    /// Sequence number the peer's SYN-ACK must carry.
    pub expected_remote_seq: u32,
    /// Sequence number carried by our final ACK.
    pub final_seq: u32,
    pub ttl: u8,
    pub window: u16,
    /// IPv4 identification of the SYN.
    pub syn_ident: u16,
    /// IPv4 identification of the final ACK.
    pub ack_ident: u16,
    pub checksum: ChecksumMode,
    /// Give up waiting for a SYN-ACK after this long.  `None` waits forever.
    pub timeout: Option<Duration>,
    /// Upper bound on a single blocking receive; the cancel token and the
    /// overall timeout are checked between polls.
    pub poll_interval: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            source_addr: Ipv4Addr::LOCALHOST,
            dest_addr: Ipv4Addr::LOCALHOST,
            local_port: DEFAULT_LOCAL_PORT,
            remote_port: DEFAULT_REMOTE_PORT,
            initial_seq: 200,
            expected_remote_seq: 400,
            final_seq: 600,
            ttl: 64,
            window: 8192,
            syn_ident: 12345,
            ack_ident: 12346,
            checksum: ChecksumMode::Compute,
            timeout: None,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// State of one handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeSession {
    pub config: HandshakeConfig,
    pub local_port: u16,
    pub remote_port: u16,
    pub local_initial_seq: u32,
    pub expected_remote_seq: u32,
    /// Acknowledgment number the SYN-ACK must carry (`local_initial_seq + 1`).
    pub expected_ack: u32,
    /// Sequence number of the final ACK.
    pub final_seq: u32,
    pub state: HandshakeState,
}

impl HandshakeSession {
    /// Create a session in [`HandshakeState::Init`].
    pub fn new(config: HandshakeConfig) -> Self {
        Self {
            local_port: config.local_port,
            remote_port: config.remote_port,
            local_initial_seq: config.initial_seq,
            expected_remote_seq: config.expected_remote_seq,
            expected_ack: config.initial_seq.wrapping_add(1),
            final_seq: config.final_seq,
            state: HandshakeState::Init,
            config,
        }
    }

    /// Acknowledgment number carried by the final ACK (`expected_remote_seq + 1`).
    pub fn final_ack(&self) -> u32 {
        self.expected_remote_seq.wrapping_add(1)
    }
}
