//! Outbound packet construction for the two segments the client sends.
//!
//! [`build_syn`] and [`build_ack`] are pure functions of a
//! [`HandshakeSession`]: they read its numbers, never mutate it, and return
//! the same bytes every time they are called on the same session.  Neither
//! touches the socket; [`crate::connection::Handshake`] hands the result to
//! the transport.

use crate::packet::{
    fill_checksums, flags, Ipv4Header, Segment, TcpHeader, IPPROTO_TCP, PACKET_LEN,
};
use crate::session::{ChecksumMode, HandshakeSession};

/// IHL / data offset for a header with no options, in 32-bit words.
const MIN_HEADER_WORDS: u8 = 5;

/// The client's opening SYN: sequence = ISN, acknowledgment = 0.
pub fn build_syn(session: &HandshakeSession) -> [u8; PACKET_LEN] {
    let ident = session.config.syn_ident;
    build(session, ident, flags::SYN, session.local_initial_seq, 0)
}

/// The final ACK: sequence = `final_seq`, acknowledgment = peer ISN + 1.
pub fn build_ack(session: &HandshakeSession) -> [u8; PACKET_LEN] {
    let ident = session.config.ack_ident;
    build(session, ident, flags::ACK, session.final_seq, session.final_ack())
}

fn build(
    session: &HandshakeSession,
    ident: u16,
    tcp_flags: u8,
    seq: u32,
    ack: u32,
) -> [u8; PACKET_LEN] {
    let config = &session.config;
    let segment = Segment {
        ip: Ipv4Header {
            version: 4,
            ihl: MIN_HEADER_WORDS,
            tos: 0,
            total_len: PACKET_LEN as u16,
            ident,
            frag_off: 0,
            ttl: config.ttl,
            protocol: IPPROTO_TCP,
            checksum: 0,
            source: config.source_addr,
            destination: config.dest_addr,
        },
        tcp: TcpHeader {
            source_port: session.local_port,
            dest_port: session.remote_port,
            seq,
            ack,
            data_offset: MIN_HEADER_WORDS,
            flags: tcp_flags,
            window: config.window,
            checksum: 0,
            urgent: 0,
        },
    };

    let mut buf = segment.encode();
    if config.checksum == ChecksumMode::Compute {
        fill_checksums(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{internet_checksum, tcp_checksum, IPV4_HEADER_LEN};
    use crate::session::HandshakeConfig;

    fn session() -> HandshakeSession {
        HandshakeSession::new(HandshakeConfig::default())
    }

    #[test]
    fn syn_carries_isn_and_only_syn_flag() {
        let bytes = build_syn(&session());
        let seg = Segment::decode(&bytes).unwrap();
        assert_eq!(seg.tcp.flags, flags::SYN);
        assert_eq!(seg.tcp.seq, 200);
        assert_eq!(seg.tcp.ack, 0);
        assert_eq!(seg.tcp.source_port, 54321);
        assert_eq!(seg.tcp.dest_port, 12345);
        assert_eq!(seg.tcp.window, 8192);
    }

    #[test]
    fn syn_has_minimal_header_shape() {
        let bytes = build_syn(&session());
        assert_eq!(bytes.len(), 40);
        let seg = Segment::decode(&bytes).unwrap();
        assert_eq!(seg.ip.ihl, 5);
        assert_eq!(seg.ip.total_len, 40);
        assert_eq!(seg.ip.protocol, IPPROTO_TCP);
        assert_eq!(seg.ip.ttl, 64);
        assert_eq!(seg.ip.ident, 12345);
        assert_eq!(seg.tcp.data_offset, 5);
    }

    #[test]
    fn ack_carries_final_numbers_and_only_ack_flag() {
        let seg = Segment::decode(&build_ack(&session())).unwrap();
        assert_eq!(seg.tcp.flags, flags::ACK);
        assert_eq!(seg.tcp.seq, 600);
        assert_eq!(seg.tcp.ack, 401);
        assert_eq!(seg.ip.ident, 12346);
        assert_eq!(seg.ip.total_len, 40);
    }

    #[test]
    fn builders_are_idempotent() {
        let s = session();
        assert_eq!(build_syn(&s), build_syn(&s));
        assert_eq!(build_ack(&s), build_ack(&s));
        assert_eq!(s, session());
    }

    #[test]
    fn computed_checksums_verify() {
        for bytes in [build_syn(&session()), build_ack(&session())] {
            assert_eq!(internet_checksum(&bytes[..IPV4_HEADER_LEN]), 0);
            let seg = Segment::decode(&bytes).unwrap();
            assert_ne!(seg.tcp.checksum, 0);
            assert_eq!(
                tcp_checksum(seg.ip.source, seg.ip.destination, &bytes[IPV4_HEADER_LEN..]),
                0
            );
        }
    }

    #[test]
    fn tcp_checksum_agrees_with_pnet() {
        use pnet::packet::tcp::{ipv4_checksum, TcpPacket};

        for bytes in [build_syn(&session()), build_ack(&session())] {
            let seg = Segment::decode(&bytes).unwrap();
            let tcp = TcpPacket::new(&bytes[IPV4_HEADER_LEN..]).unwrap();
            assert_eq!(
                ipv4_checksum(&tcp, &seg.ip.source, &seg.ip.destination),
                seg.tcp.checksum
            );
        }
    }

    #[test]
    fn kernel_mode_leaves_checksums_zero() {
        let s = HandshakeSession::new(HandshakeConfig {
            checksum: ChecksumMode::Kernel,
            ..HandshakeConfig::default()
        });
        let seg = Segment::decode(&build_syn(&s)).unwrap();
        assert_eq!(seg.ip.checksum, 0);
        assert_eq!(seg.tcp.checksum, 0);
    }

    #[test]
    fn builders_follow_config_addresses() {
        let s = HandshakeSession::new(HandshakeConfig {
            source_addr: "192.0.2.1".parse().unwrap(),
            dest_addr: "192.0.2.2".parse().unwrap(),
            ..HandshakeConfig::default()
        });
        let seg = Segment::decode(&build_ack(&s)).unwrap();
        assert_eq!(seg.ip.source.to_string(), "192.0.2.1");
        assert_eq!(seg.ip.destination.to_string(), "192.0.2.2");
    }
}
