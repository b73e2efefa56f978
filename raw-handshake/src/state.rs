//! Handshake finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::connection::Handshake`] can
//! occupy and which transitions between them are legal.  The transitions
//! themselves are driven from [`crate::connection`].
//!
//! ```text
//!  INIT ──SYN sent──▶ SYN_SENT ──SYN-ACK──▶ ESTABLISHED
//!                        │
//!                        ├──deadline──▶ TIMED_OUT
//!                        │
//!                        └──cancel────▶ CANCELLED
//! ```
//!
//! The path is strictly forward: nothing ever returns to an earlier state,
//! and the three right-hand states are terminal.

/// All possible states of the handshake FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Session created, nothing sent yet.
    #[default]
    Init,
    /// SYN has been sent; waiting for a matching SYN-ACK.
    SynSent,
    /// SYN-ACK matched and the final ACK was sent.
    Established,
    /// The configured timeout elapsed before a matching SYN-ACK arrived.
    TimedOut,
    /// The cancel token was tripped while waiting.
    Cancelled,
}

impl HandshakeState {
    /// `true` for states the controller stops in.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Established | Self::TimedOut | Self::Cancelled)
    }

    /// Whether the FSM may move from `self` to `next`.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::SynSent)
                | (Self::SynSent, Self::Established)
                | (Self::SynSent, Self::TimedOut)
                | (Self::SynSent, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::SynSent => "SYN_SENT",
            Self::Established => "ESTABLISHED",
            Self::TimedOut => "TIMED_OUT",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}
