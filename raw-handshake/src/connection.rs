//! Handshake controller: drives the client side of the three-way handshake.
//!
//! A [`Handshake`] owns the [`HandshakeSession`] and the [`Transport`] for
//! one run.  Its responsibilities are:
//! - Building and sending the SYN ([`Handshake::send_syn`]).
//! - Filtering raw inbound traffic down to the peer's reply
//!   ([`Handshake::handle_packet`]).
//! - Sending the final ACK once a SYN-ACK with exactly the expected numbers
//!   arrives.
//! - Stopping on a deadline or a [`CancelToken`] ([`Handshake::run`]).
//!
//! # Matching rule
//!
//! A packet completes the handshake only if **all** of the following hold:
//! - destination port = local port and source port = remote port,
//! - the TCP flags byte is exactly `SYN | ACK`,
//! - seq = expected remote ISN and ack = local ISN + 1.
//!
//! Everything else is left on the floor without a state change.  The raw
//! socket sees all TCP traffic on the host, so the port check is what keeps
//! unrelated connections out of the state machine.

use std::net::IpAddr;

use thiserror::Error;

use crate::builder::{build_ack, build_syn};
use crate::packet::{flags, tcp_checksum, FlagSummary, Segment, TcpHeader};
use crate::session::{HandshakeConfig, HandshakeSession};
use crate::socket::{Transport, TransportError};
use crate::state::HandshakeState;
use crate::timer::{CancelToken, Deadline};

// ---------------------------------------------------------------------------
// Error / outcome types
// ---------------------------------------------------------------------------

/// Errors that end a handshake attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A fatal transport failure (socket setup or send).
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The controller was asked to move the FSM backwards or sideways.
    #[error("illegal state transition {from} -> {to}")]
    InvalidTransition {
        from: HandshakeState,
        to: HandshakeState,
    },
}

/// What [`Handshake::handle_packet`] did with one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Not a well-formed IPv4/TCP packet.
    Malformed,
    /// Ports do not belong to this session.
    Unrelated,
    /// Right ports, but wrong flags or sequence numbers.
    Mismatch,
    /// The expected SYN-ACK; the final ACK has been sent.
    SynAck,
}

/// Port filter: is this segment travelling from the peer to us?
pub fn matches_ports(tcp: &TcpHeader, session: &HandshakeSession) -> bool {
    tcp.dest_port == session.local_port && tcp.source_port == session.remote_port
}

/// Transition predicate: exactly `SYN | ACK` with the pre-agreed numbers.
pub fn is_expected_syn_ack(tcp: &TcpHeader, session: &HandshakeSession) -> bool {
    tcp.flags == flags::SYN | flags::ACK
        && tcp.seq == session.expected_remote_seq
        && tcp.ack == session.expected_ack
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// One client-side handshake over a [`Transport`].
pub struct Handshake<T: Transport> {
    session: HandshakeSession,
    transport: T,
    cancel: CancelToken,
}

impl<T: Transport> Handshake<T> {
    /// Create a controller in [`HandshakeState::Init`].
    pub fn new(config: HandshakeConfig, transport: T) -> Self {
        Self {
            session: HandshakeSession::new(config),
            transport,
            cancel: CancelToken::new(),
        }
    }

    /// Use `token` to stop [`run`](Self::run) from outside.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> &HandshakeSession {
        &self.session
    }

    pub fn state(&self) -> HandshakeState {
        self.session.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give back the transport, e.g. to close it or inspect a test double.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn check_transition(&self, next: HandshakeState) -> Result<(), HandshakeError> {
        let from = self.session.state;
        if from.can_advance_to(next) {
            Ok(())
        } else {
            Err(HandshakeError::InvalidTransition { from, to: next })
        }
    }

    fn advance(&mut self, next: HandshakeState) -> Result<(), HandshakeError> {
        self.check_transition(next)?;
        log::debug!("state {} -> {}", self.session.state, next);
        self.session.state = next;
        Ok(())
    }

    /// `INIT → SYN_SENT`: build and transmit the SYN.
    pub fn send_syn(&mut self) -> Result<(), HandshakeError> {
        self.check_transition(HandshakeState::SynSent)?;

        let syn = build_syn(&self.session);
        self.transport.send(&syn, self.session.config.dest_addr)?;
        log::info!(
            "Sent SYN packet with sequence number {}",
            self.session.local_initial_seq
        );

        self.advance(HandshakeState::SynSent)
    }

    /// Process one raw inbound packet while in `SYN_SENT`.
    ///
    /// On the expected SYN-ACK this sends the final ACK and moves to
    /// `ESTABLISHED`; every other packet leaves the state untouched.
    pub fn handle_packet(
        &mut self,
        packet: &[u8],
        source: IpAddr,
    ) -> Result<Inbound, HandshakeError> {
        self.check_transition(HandshakeState::Established)?;

        let segment = match Segment::decode(packet) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("dropping {} byte packet from {source}: {e}", packet.len());
                return Ok(Inbound::Malformed);
            }
        };
        let tcp = &segment.tcp;

        if !matches_ports(tcp, &self.session) {
            log::trace!("ignoring {}:{} -> :{}", source, tcp.source_port, tcp.dest_port);
            return Ok(Inbound::Unrelated);
        }

        log::info!("TCP Flags:  {} SEQ: {}", FlagSummary(tcp.flags), tcp.seq);

        let tcp_bytes = &packet[segment.ip.header_len()..];
        if tcp.checksum != 0
            && tcp_checksum(segment.ip.source, segment.ip.destination, tcp_bytes) != 0
        {
            // Loopback captures commonly carry offloaded partial checksums.
            log::debug!("TCP checksum does not verify (0x{:04x})", tcp.checksum);
        }

        if !is_expected_syn_ack(tcp, &self.session) {
            log::debug!(
                "not the expected SYN-ACK (want seq={} ack={}, got flags=0x{:02x} seq={} ack={})",
                self.session.expected_remote_seq,
                self.session.expected_ack,
                tcp.flags,
                tcp.seq,
                tcp.ack
            );
            return Ok(Inbound::Mismatch);
        }

        log::info!("Received SYN-ACK from {source}");
        self.send_final_ack()?;
        self.advance(HandshakeState::Established)?;
        log::info!("TCP three-way handshake completed successfully!");
        Ok(Inbound::SynAck)
    }

    fn send_final_ack(&mut self) -> Result<(), HandshakeError> {
        let ack = build_ack(&self.session);
        self.transport.send(&ack, self.session.config.dest_addr)?;
        log::info!(
            "Sent ACK packet with sequence number {}",
            self.session.final_seq
        );
        Ok(())
    }

    /// Run the whole handshake and return the terminal state reached.
    ///
    /// Without a configured timeout and without cancellation this waits
    /// until a matching SYN-ACK arrives.  Reception faults are logged and the
    /// loop continues; send and socket failures are returned.
    pub fn run(&mut self) -> Result<HandshakeState, HandshakeError> {
        self.send_syn()?;

        let deadline = Deadline::after(self.session.config.timeout);
        let poll = self.session.config.poll_interval;

        loop {
            if self.cancel.is_cancelled() {
                self.advance(HandshakeState::Cancelled)?;
                log::warn!("handshake cancelled while waiting for SYN-ACK");
                return Ok(self.state());
            }
            if deadline.expired() {
                self.advance(HandshakeState::TimedOut)?;
                log::warn!("timed out waiting for SYN-ACK");
                return Ok(self.state());
            }

            match self.transport.receive(deadline.next_wait(poll)) {
                Ok(Some((packet, source))) => {
                    if self.handle_packet(&packet, source)? == Inbound::SynAck {
                        return Ok(self.state());
                    }
                }
                Ok(None) => {}
                Err(e) if !e.is_fatal() => log::warn!("{e}"),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{inbound_segment, ScriptedTransport};

    fn session() -> HandshakeSession {
        HandshakeSession::new(HandshakeConfig::default())
    }

    fn tcp(source_port: u16, dest_port: u16, flags: u8, seq: u32, ack: u32) -> TcpHeader {
        TcpHeader {
            source_port,
            dest_port,
            seq,
            ack,
            data_offset: 5,
            flags,
            window: 8192,
            checksum: 0,
            urgent: 0,
        }
    }

    #[test]
    fn predicate_accepts_only_exact_syn_ack() {
        let s = session();
        let synack = flags::SYN | flags::ACK;
        assert!(is_expected_syn_ack(&tcp(12345, 54321, synack, 400, 201), &s));

        // One-field deviations.
        assert!(!is_expected_syn_ack(&tcp(12345, 54321, flags::SYN, 400, 201), &s));
        assert!(!is_expected_syn_ack(&tcp(12345, 54321, flags::ACK, 400, 201), &s));
        assert!(!is_expected_syn_ack(&tcp(12345, 54321, synack | flags::PSH, 400, 201), &s));
        assert!(!is_expected_syn_ack(&tcp(12345, 54321, synack | flags::FIN, 400, 201), &s));
        assert!(!is_expected_syn_ack(&tcp(12345, 54321, synack, 399, 201), &s));
        assert!(!is_expected_syn_ack(&tcp(12345, 54321, synack, 400, 200), &s));
    }

    #[test]
    fn port_filter_requires_both_directions() {
        let s = session();
        assert!(matches_ports(&tcp(12345, 54321, 0, 0, 0), &s));
        assert!(!matches_ports(&tcp(54321, 12345, 0, 0, 0), &s));
        assert!(!matches_ports(&tcp(12345, 54322, 0, 0, 0), &s));
        assert!(!matches_ports(&tcp(80, 54321, 0, 0, 0), &s));
    }

    #[test]
    fn send_syn_moves_to_syn_sent() {
        let mut hs = Handshake::new(HandshakeConfig::default(), ScriptedTransport::new());
        hs.send_syn().unwrap();
        assert_eq!(hs.state(), HandshakeState::SynSent);
        assert_eq!(hs.transport().sent().len(), 1);
    }

    #[test]
    fn second_syn_is_rejected() {
        let mut hs = Handshake::new(HandshakeConfig::default(), ScriptedTransport::new());
        hs.send_syn().unwrap();
        let err = hs.send_syn().unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::InvalidTransition {
                from: HandshakeState::SynSent,
                to: HandshakeState::SynSent
            }
        ));
        assert_eq!(hs.transport().sent().len(), 1);
    }

    #[test]
    fn packets_before_syn_are_rejected() {
        let mut hs = Handshake::new(HandshakeConfig::default(), ScriptedTransport::new());
        let pkt = inbound_segment(12345, 54321, flags::SYN | flags::ACK, 400, 201);
        assert!(hs.handle_packet(&pkt, ScriptedTransport::PEER).is_err());
        assert_eq!(hs.state(), HandshakeState::Init);
    }

    #[test]
    fn malformed_packet_is_dropped() {
        let mut hs = Handshake::new(HandshakeConfig::default(), ScriptedTransport::new());
        hs.send_syn().unwrap();
        let outcome = hs.handle_packet(&[0x45, 0, 0], ScriptedTransport::PEER).unwrap();
        assert_eq!(outcome, Inbound::Malformed);
        assert_eq!(hs.state(), HandshakeState::SynSent);
    }

    #[test]
    fn packets_after_established_are_rejected() {
        let mut hs = Handshake::new(HandshakeConfig::default(), ScriptedTransport::new());
        hs.send_syn().unwrap();
        let pkt = inbound_segment(12345, 54321, flags::SYN | flags::ACK, 400, 201);
        assert_eq!(hs.handle_packet(&pkt, ScriptedTransport::PEER).unwrap(), Inbound::SynAck);
        assert!(hs.handle_packet(&pkt, ScriptedTransport::PEER).is_err());
        assert_eq!(hs.transport().sent().len(), 2);
    }
}
