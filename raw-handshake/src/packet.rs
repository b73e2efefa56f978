//! Wire-format definitions for raw IPv4 + TCP segments.
//!
//! Every packet this crate puts on the wire is a [`Segment`]: a minimal IPv4
//! header immediately followed by a minimal TCP header, with no options and
//! no payload.  This module is responsible for:
//! - Defining the on-wire binary layout of both headers.
//! - Packing header structs into fixed-size byte arrays.
//! - Unpacking a raw inbound buffer back into header structs, returning
//!   errors for malformed or truncated input.
//! - Computing the Internet checksum (RFC 1071) for both headers.
//!
//! No I/O happens here — this is pure data transformation.  Fields are read
//! and written with explicit big-endian conversions rather than by casting a
//! buffer to a struct, so there are no alignment or aliasing concerns.
//!
//! # Wire format
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-------+-------+---------------+-------------------------------+
//! |Version|  IHL  |      TOS      |          Total Length         |
//! +-------+-------+---------------+-----+-------------------------+
//! |        Identification         |Flags|     Fragment Offset     |
//! +---------------+---------------+-----+-------------------------+
//! |      TTL      |   Protocol    |        Header Checksum        |
//! +---------------+---------------+-------------------------------+
//! |                        Source Address                         |
//! +---------------------------------------------------------------+
//! |                      Destination Address                      |
//! +===============================+===============================+
//! |          Source Port          |       Destination Port        |
//! +-------------------------------+-------------------------------+
//! |                        Sequence Number                        |
//! +---------------------------------------------------------------+
//! |                    Acknowledgment Number                      |
//! +-------+-------+---------------+-------------------------------+
//! | Offset|  Rsvd |     Flags     |            Window             |
//! +-------+-------+---------------+-------------------------------+
//! |           Checksum            |        Urgent Pointer         |
//! +-------------------------------+-------------------------------+
//! ```
//!
//! Total size: [`PACKET_LEN`] = [`IPV4_HEADER_LEN`] + [`TCP_HEADER_LEN`] = 40 bytes.

use std::fmt;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Bit-flag constants for the TCP `flags` byte (RFC 793 §3.1).
pub mod flags {
    /// No more data from sender.
    pub const FIN: u8 = 0b0000_0001;
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u8 = 0b0000_0010;
    /// Reset the connection.
    pub const RST: u8 = 0b0000_0100;
    /// Push buffered data to the application.
    pub const PSH: u8 = 0b0000_1000;
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0b0001_0000;
    /// Urgent pointer field is significant.
    pub const URG: u8 = 0b0010_0000;
}

/// Byte length of an IPv4 header with no options.
pub const IPV4_HEADER_LEN: usize = 20;
/// Byte length of a TCP header with no options.
pub const TCP_HEADER_LEN: usize = 20;
/// Byte length of a complete outbound segment (no payload).
pub const PACKET_LEN: usize = IPV4_HEADER_LEN + TCP_HEADER_LEN;

/// IANA protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;

// IPv4 header field offsets.
const OFF_VERSION_IHL: usize = 0;
const OFF_TOS: usize = 1;
const OFF_TOTAL_LEN: usize = 2;
const OFF_IDENT: usize = 4;
const OFF_FRAG: usize = 6;
const OFF_TTL: usize = 8;
const OFF_PROTOCOL: usize = 9;
const OFF_IP_CHECKSUM: usize = 10;
const OFF_SRC_ADDR: usize = 12;
const OFF_DST_ADDR: usize = 16;

// TCP header field offsets, relative to the start of the TCP header.
const OFF_SRC_PORT: usize = 0;
const OFF_DST_PORT: usize = 2;
const OFF_SEQ: usize = 4;
const OFF_ACK: usize = 8;
const OFF_DATA_OFFSET: usize = 12;
const OFF_FLAGS: usize = 13;
const OFF_WINDOW: usize = 14;
const OFF_TCP_CHECKSUM: usize = 16;
const OFF_URGENT: usize = 18;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing an inbound raw packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer ends before the header it is supposed to contain.
    #[error("buffer too short: need {needed} bytes, have {actual}")]
    BufferTooShort { needed: usize, actual: usize },
    /// The IP version nibble is not 4.
    #[error("not an IPv4 packet (version {0})")]
    NotIpv4(u8),
    /// IHL or TCP data offset below the 5-word minimum.
    #[error("unsupported header length of {0} words")]
    BadHeaderLength(u8),
    /// The IPv4 protocol field does not name TCP.
    #[error("not a TCP packet (protocol {0})")]
    NotTcp(u8),
}

// ---------------------------------------------------------------------------
// IPv4 header
// ---------------------------------------------------------------------------

/// Fixed-form IPv4 header.  Fields are in host byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// Header length in 32-bit words.
    pub ihl: u8,
    pub tos: u8,
    pub total_len: u16,
    pub ident: u16,
    /// Flags (top 3 bits) and fragment offset.
    pub frag_off: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Header length in bytes, as advertised by the IHL field.
    pub fn header_len(&self) -> usize {
        usize::from(self.ihl) * 4
    }

    /// Pack into a 20-byte array.  The checksum is written as stored.
    pub fn encode(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut buf = [0u8; IPV4_HEADER_LEN];
        buf[OFF_VERSION_IHL] = (self.version << 4) | (self.ihl & 0x0f);
        buf[OFF_TOS] = self.tos;
        buf[OFF_TOTAL_LEN..OFF_TOTAL_LEN + 2].copy_from_slice(&self.total_len.to_be_bytes());
        buf[OFF_IDENT..OFF_IDENT + 2].copy_from_slice(&self.ident.to_be_bytes());
        buf[OFF_FRAG..OFF_FRAG + 2].copy_from_slice(&self.frag_off.to_be_bytes());
        buf[OFF_TTL] = self.ttl;
        buf[OFF_PROTOCOL] = self.protocol;
        buf[OFF_IP_CHECKSUM..OFF_IP_CHECKSUM + 2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_SRC_ADDR..OFF_SRC_ADDR + 4].copy_from_slice(&self.source.octets());
        buf[OFF_DST_ADDR..OFF_DST_ADDR + 4].copy_from_slice(&self.destination.octets());
        buf
    }

    /// Parse the IPv4 header at the front of `buf`.
    ///
    /// Options, if the peer sent any, are skipped rather than rejected; the
    /// caller uses [`header_len`](Self::header_len) to find the TCP header.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, IPV4_HEADER_LEN)?;

        let version = buf[OFF_VERSION_IHL] >> 4;
        if version != 4 {
            return Err(PacketError::NotIpv4(version));
        }
        let ihl = buf[OFF_VERSION_IHL] & 0x0f;
        if ihl < 5 {
            return Err(PacketError::BadHeaderLength(ihl));
        }
        ensure_len(buf, usize::from(ihl) * 4)?;

        Ok(Self {
            version,
            ihl,
            tos: buf[OFF_TOS],
            total_len: read_u16(buf, OFF_TOTAL_LEN),
            ident: read_u16(buf, OFF_IDENT),
            frag_off: read_u16(buf, OFF_FRAG),
            ttl: buf[OFF_TTL],
            protocol: buf[OFF_PROTOCOL],
            checksum: read_u16(buf, OFF_IP_CHECKSUM),
            source: read_addr(buf, OFF_SRC_ADDR),
            destination: read_addr(buf, OFF_DST_ADDR),
        })
    }
}

// ---------------------------------------------------------------------------
// TCP header
// ---------------------------------------------------------------------------

/// Fixed-form TCP header.  Fields are in host byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub dest_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in 32-bit words.
    pub data_offset: u8,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl TcpHeader {
    /// Pack into a 20-byte array.  The checksum is written as stored.
    pub fn encode(&self) -> [u8; TCP_HEADER_LEN] {
        let mut buf = [0u8; TCP_HEADER_LEN];
        buf[OFF_SRC_PORT..OFF_SRC_PORT + 2].copy_from_slice(&self.source_port.to_be_bytes());
        buf[OFF_DST_PORT..OFF_DST_PORT + 2].copy_from_slice(&self.dest_port.to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_DATA_OFFSET] = self.data_offset << 4;
        buf[OFF_FLAGS] = self.flags;
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.window.to_be_bytes());
        buf[OFF_TCP_CHECKSUM..OFF_TCP_CHECKSUM + 2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_URGENT..OFF_URGENT + 2].copy_from_slice(&self.urgent.to_be_bytes());
        buf
    }

    /// Parse the TCP header at the front of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, TCP_HEADER_LEN)?;

        let data_offset = buf[OFF_DATA_OFFSET] >> 4;
        if data_offset < 5 {
            return Err(PacketError::BadHeaderLength(data_offset));
        }

        Ok(Self {
            source_port: read_u16(buf, OFF_SRC_PORT),
            dest_port: read_u16(buf, OFF_DST_PORT),
            seq: read_u32(buf, OFF_SEQ),
            ack: read_u32(buf, OFF_ACK),
            data_offset,
            flags: buf[OFF_FLAGS],
            window: read_u16(buf, OFF_WINDOW),
            checksum: read_u16(buf, OFF_TCP_CHECKSUM),
            urgent: read_u16(buf, OFF_URGENT),
        })
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// An IPv4 header plus the TCP header it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub ip: Ipv4Header,
    pub tcp: TcpHeader,
}

impl Segment {
    /// Pack both headers back-to-back into a [`PACKET_LEN`]-byte array.
    ///
    /// Checksum fields are written exactly as stored; call
    /// [`fill_checksums`] afterwards to compute them.
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[..IPV4_HEADER_LEN].copy_from_slice(&self.ip.encode());
        buf[IPV4_HEADER_LEN..].copy_from_slice(&self.tcp.encode());
        buf
    }

    /// Parse a raw inbound packet as captured from a raw socket.
    ///
    /// Returns [`Err`] if the buffer is truncated, is not IPv4, or does not
    /// carry TCP.  Any TCP payload past the header is ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let ip = Ipv4Header::decode(buf)?;
        if ip.protocol != IPPROTO_TCP {
            return Err(PacketError::NotTcp(ip.protocol));
        }
        let tcp = TcpHeader::decode(&buf[ip.header_len()..])?;
        Ok(Self { ip, tcp })
    }
}

/// Renders a flags byte the way the handshake log prints it:
/// `SYN: 1 ACK: 1 FIN: 0 RST: 0 PSH: 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSummary(pub u8);

impl fmt::Display for FlagSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |mask: u8| u8::from(self.0 & mask != 0);
        write!(
            f,
            "SYN: {} ACK: {} FIN: {} RST: {} PSH: {}",
            bit(flags::SYN),
            bit(flags::ACK),
            bit(flags::FIN),
            bit(flags::RST),
            bit(flags::PSH),
        )
    }
}

// ---------------------------------------------------------------------------
// Checksums
// ---------------------------------------------------------------------------

/// Compute and store the IPv4 header checksum and the TCP checksum in a
/// packed segment.
///
/// Both checksum fields are zeroed before summing, so calling this twice on
/// the same buffer yields the same bytes.
pub fn fill_checksums(buf: &mut [u8; PACKET_LEN]) {
    buf[OFF_IP_CHECKSUM..OFF_IP_CHECKSUM + 2].copy_from_slice(&[0, 0]);
    let ip_csum = internet_checksum(&buf[..IPV4_HEADER_LEN]);
    buf[OFF_IP_CHECKSUM..OFF_IP_CHECKSUM + 2].copy_from_slice(&ip_csum.to_be_bytes());

    let tcp_csum_at = IPV4_HEADER_LEN + OFF_TCP_CHECKSUM;
    buf[tcp_csum_at..tcp_csum_at + 2].copy_from_slice(&[0, 0]);
    let source = read_addr(buf, OFF_SRC_ADDR);
    let destination = read_addr(buf, OFF_DST_ADDR);
    let tcp_csum = tcp_checksum(source, destination, &buf[IPV4_HEADER_LEN..]);
    buf[tcp_csum_at..tcp_csum_at + 2].copy_from_slice(&tcp_csum.to_be_bytes());
}

/// Checksum of a TCP segment (header + payload) under the RFC 793
/// pseudo-header.
///
/// Summing a segment whose checksum field is already filled in yields zero
/// when the stored checksum is correct.
pub fn tcp_checksum(source: Ipv4Addr, destination: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut data = Vec::with_capacity(12 + segment.len());
    data.extend_from_slice(&source.octets());
    data.extend_from_slice(&destination.octets());
    data.push(0);
    data.push(IPPROTO_TCP);
    data.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    data.extend_from_slice(segment);
    internet_checksum(&data)
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.  The caller must zero any checksum field within `data`
/// before calling this function when generating a checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);

    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    // Odd trailing byte — pad with a zero byte on the right.
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_len(buf: &[u8], needed: usize) -> Result<(), PacketError> {
    if buf.len() < needed {
        return Err(PacketError::BufferTooShort {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

// Callers bounds-check via `ensure_len` first.
fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_addr(buf: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(buf[at], buf[at + 1], buf[at + 2], buf[at + 3])
}
