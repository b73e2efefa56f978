//! Raw IPv4 transport.
//!
//! [`Transport`] is the seam between the handshake state machine and the
//! network: send one fully-formed packet, or wait a bounded time for the next
//! inbound one.  [`RawTransport`] implements it over a `pnet` layer-3
//! channel, i.e. `socket(AF_INET, SOCK_RAW, IPPROTO_TCP)` with `IP_HDRINCL`
//! set, so the kernel transmits our IPv4 header verbatim.  All protocol
//! logic lives elsewhere; this module owns only byte I/O.
//!
//! Raw capture is not connection-scoped: [`Transport::receive`] returns every
//! inbound TCP packet on the host, unfiltered.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::transport::{
    ipv4_packet_iter, transport_channel, TransportChannelType::Layer3, TransportReceiver,
    TransportSender,
};
use thiserror::Error;

/// Receive buffer size; large enough for any IPv4 datagram.
const RECV_BUFFER: usize = 65_536;

/// Shortest receive wait handed to the kernel; `SO_RCVTIMEO` of zero means
/// "block forever".
const MIN_WAIT: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Raw socket creation or `IP_HDRINCL` setup was denied.
    #[error("cannot open raw socket (CAP_NET_RAW or root is usually required): {0}")]
    Resource(#[source] io::Error),
    /// The kernel rejected an outbound packet.
    #[error("failed to send packet: {0}")]
    Transmit(#[source] io::Error),
    /// A transient fault while waiting for inbound packets.
    #[error("packet reception failed: {0}")]
    Receive(#[source] io::Error),
}

impl TransportError {
    /// `false` only for [`TransportError::Receive`], which callers retry.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Receive(_))
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Packet-level network access used by [`crate::connection::Handshake`].
pub trait Transport {
    /// Transmit one complete IPv4 packet to `dest`.
    fn send(&mut self, packet: &[u8], dest: Ipv4Addr) -> Result<(), TransportError>;

    /// Block for at most `wait` until the next inbound packet arrives.
    ///
    /// Returns `(ip_packet_bytes, source_address)`, or `Ok(None)` if `wait`
    /// elapsed with nothing received.
    fn receive(&mut self, wait: Duration) -> Result<Option<(Vec<u8>, IpAddr)>, TransportError>;
}

// ---------------------------------------------------------------------------
// RawTransport
// ---------------------------------------------------------------------------

/// Owns one raw TCP-protocol socket with application-supplied IP headers.
///
/// The socket is closed when this value is dropped, so it is released on
/// every exit path, including early returns and panics.
pub struct RawTransport {
    tx: TransportSender,
    rx: TransportReceiver,
}

impl RawTransport {
    /// Open the raw socket.
    pub fn open() -> Result<Self, TransportError> {
        let (tx, rx) = transport_channel(RECV_BUFFER, Layer3(IpNextHeaderProtocols::Tcp))
            .map_err(TransportError::Resource)?;
        log::debug!("raw socket opened (IPPROTO_TCP, IP_HDRINCL)");
        Ok(Self { tx, rx })
    }

    /// Release the socket explicitly.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for RawTransport {
    fn drop(&mut self) {
        log::debug!("raw socket closed");
    }
}

impl Transport for RawTransport {
    fn send(&mut self, packet: &[u8], dest: Ipv4Addr) -> Result<(), TransportError> {
        let ip = Ipv4Packet::new(packet).ok_or_else(|| {
            TransportError::Transmit(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} bytes is too short for an IPv4 header", packet.len()),
            ))
        })?;
        let n = self
            .tx
            .send_to(ip, IpAddr::V4(dest))
            .map_err(TransportError::Transmit)?;
        log::trace!("sent {n} bytes to {dest}");
        Ok(())
    }

    fn receive(&mut self, wait: Duration) -> Result<Option<(Vec<u8>, IpAddr)>, TransportError> {
        let mut iter = ipv4_packet_iter(&mut self.rx);
        match iter.next_with_timeout(wait.max(MIN_WAIT)) {
            Ok(Some((ip, source))) => Ok(Some((ip.packet().to_vec(), source))),
            Ok(None) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(TransportError::Receive(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_receive_errors_are_recoverable() {
        let err = || io::Error::new(io::ErrorKind::Other, "boom");
        assert!(TransportError::Resource(err()).is_fatal());
        assert!(TransportError::Transmit(err()).is_fatal());
        assert!(!TransportError::Receive(err()).is_fatal());
    }

    #[test]
    fn resource_error_mentions_privileges() {
        let e = TransportError::Resource(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(e.to_string().contains("CAP_NET_RAW"));
    }

    /// Opening either succeeds (privileged run) or reports `Resource`.
    #[test]
    fn open_fails_only_with_resource_error() {
        match RawTransport::open() {
            Ok(t) => t.close(),
            Err(e) => assert!(matches!(e, TransportError::Resource(_)), "got {e:?}"),
        }
    }
}
