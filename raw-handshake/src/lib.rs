//! `raw-handshake` — a TCP three-way handshake assembled by hand over a raw
//! IPv4 socket, bypassing the kernel's TCP state machine.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  build_syn / build_ack  ┌──────────┐
//!  │  Handshake   │────────────────────────▶│ builder  │
//!  │ (FSM + loop) │                         └────┬─────┘
//!  └──┬────────▲──┘                              │ packet::Segment
//!     │ send   │ receive(wait)                   ▼
//!  ┌──▼────────┴──────────────────┐         ┌──────────┐
//!  │   Transport                  │         │  packet  │
//!  │   RawTransport (pnet, L3)    │         │ (wire)   │
//!  │   ScriptedTransport (tests)  │         └──────────┘
//!  └──────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — IPv4 + TCP wire format and checksums
//! - [`builder`]     — the SYN and final ACK byte buffers
//! - [`socket`]      — raw socket transport and the [`socket::Transport`] seam
//! - [`session`]     — configuration and per-run handshake numbers
//! - [`state`]       — finite-state-machine types
//! - [`timer`]       — receive deadline and cancellation token
//! - [`connection`]  — the handshake controller
//! - [`simulator`]   — scripted transport for deterministic testing

pub mod builder;
pub mod connection;
pub mod packet;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use connection::{Handshake, HandshakeError, Inbound};
pub use session::{ChecksumMode, HandshakeConfig, HandshakeSession};
pub use socket::{RawTransport, Transport, TransportError};
pub use state::HandshakeState;
pub use timer::CancelToken;
