//! Scripted in-memory transport for exercising the handshake without a raw
//! socket.
//!
//! A [`ScriptedTransport`] replays a queue of [`Step`]s from
//! [`Transport::receive`] and records every packet passed to
//! [`Transport::send`].  Once the script runs out, every receive reports a
//! quiet network (`Ok(None)`), so a controller configured with a timeout
//! terminates and one without keeps polling.
//!
//! | Step            | What `receive` returns                          |
//! |-----------------|-------------------------------------------------|
//! | `Packet`        | The bytes and source address, as a capture would |
//! | `Silence`       | `Ok(None)`, i.e. the wait elapsed               |
//! | `Fault`         | `Err(TransportError::Receive)`                  |
//!
//! [`inbound_segment`] builds the peer-to-client packets tests feed in.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::packet::{fill_checksums, Ipv4Header, Segment, TcpHeader, IPPROTO_TCP, PACKET_LEN};
use crate::socket::{Transport, TransportError};

/// One scripted result of [`Transport::receive`].
#[derive(Debug, Clone)]
pub enum Step {
    Packet(Vec<u8>, IpAddr),
    Silence,
    Fault(io::ErrorKind),
}

/// A fake transport driven by a fixed script.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: VecDeque<Step>,
    sent: Vec<(Vec<u8>, Ipv4Addr)>,
    fail_sends_after: Option<usize>,
    receive_calls: usize,
}

impl ScriptedTransport {
    /// Source address reported for scripted packets.
    pub const PEER: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound packet from [`Self::PEER`].
    pub fn push_packet(mut self, packet: Vec<u8>) -> Self {
        self.script.push_back(Step::Packet(packet, Self::PEER));
        self
    }

    pub fn push(mut self, step: Step) -> Self {
        self.script.push_back(step);
        self
    }

    /// Reject every send after the first `n` succeed.
    pub fn fail_sends_after(mut self, n: usize) -> Self {
        self.fail_sends_after = Some(n);
        self
    }

    /// Packets handed to `send`, in order, with their destinations.
    pub fn sent(&self) -> &[(Vec<u8>, Ipv4Addr)] {
        &self.sent
    }

    /// Decoded view of [`sent`](Self::sent).
    pub fn sent_segments(&self) -> Vec<Segment> {
        self.sent
            .iter()
            .filter_map(|(bytes, _)| Segment::decode(bytes).ok())
            .collect()
    }

    /// Scripted steps not consumed yet.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, packet: &[u8], dest: Ipv4Addr) -> Result<(), TransportError> {
        if self.fail_sends_after.is_some_and(|n| self.sent.len() >= n) {
            return Err(TransportError::Transmit(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "scripted send failure",
            )));
        }
        self.sent.push((packet.to_vec(), dest));
        Ok(())
    }

    fn receive(&mut self, _wait: Duration) -> Result<Option<(Vec<u8>, IpAddr)>, TransportError> {
        self.receive_calls += 1;
        match self.script.pop_front() {
            Some(Step::Packet(bytes, source)) => Ok(Some((bytes, source))),
            Some(Step::Fault(kind)) => Err(TransportError::Receive(io::Error::from(kind))),
            Some(Step::Silence) | None => Ok(None),
        }
    }
}

/// A well-formed loopback IPv4/TCP packet with the given ports, flags and
/// sequence numbers, as the peer would send it.
pub fn inbound_segment(
    source_port: u16,
    dest_port: u16,
    flags: u8,
    seq: u32,
    ack: u32,
) -> Vec<u8> {
    let segment = Segment {
        ip: Ipv4Header {
            version: 4,
            ihl: 5,
            tos: 0,
            total_len: PACKET_LEN as u16,
            ident: 0,
            frag_off: 0x4000, // DF, as Linux sets it
            ttl: 64,
            protocol: IPPROTO_TCP,
            checksum: 0,
            source: Ipv4Addr::LOCALHOST,
            destination: Ipv4Addr::LOCALHOST,
        },
        tcp: TcpHeader {
            source_port,
            dest_port,
            seq,
            ack,
            data_offset: 5,
            flags,
            window: 65_495,
            checksum: 0,
            urgent: 0,
        },
    };
    let mut buf = segment.encode();
    fill_checksums(&mut buf);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::flags;

    #[test]
    fn replays_script_then_reports_silence() {
        let pkt = inbound_segment(1, 2, flags::SYN, 3, 4);
        let mut t = ScriptedTransport::new()
            .push_packet(pkt.clone())
            .push(Step::Fault(io::ErrorKind::Interrupted));

        let wait = Duration::from_millis(1);
        assert_eq!(t.receive(wait).unwrap(), Some((pkt, ScriptedTransport::PEER)));
        assert!(matches!(t.receive(wait), Err(TransportError::Receive(_))));
        assert_eq!(t.receive(wait).unwrap(), None);
        assert_eq!(t.receive_calls(), 3);
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn records_sends_until_configured_failure() {
        let mut t = ScriptedTransport::new().fail_sends_after(1);
        t.send(&[0u8; 40], Ipv4Addr::LOCALHOST).unwrap();
        assert!(matches!(
            t.send(&[0u8; 40], Ipv4Addr::LOCALHOST),
            Err(TransportError::Transmit(_))
        ));
        assert_eq!(t.sent().len(), 1);
    }

    #[test]
    fn inbound_segment_decodes_to_requested_fields() {
        let seg = Segment::decode(&inbound_segment(12345, 54321, flags::RST, 9, 10)).unwrap();
        assert_eq!(seg.tcp.source_port, 12345);
        assert_eq!(seg.tcp.dest_port, 54321);
        assert_eq!(seg.tcp.flags, flags::RST);
        assert_eq!((seg.tcp.seq, seg.tcp.ack), (9, 10));
    }
}
