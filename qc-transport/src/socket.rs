use std::net::SocketAddr;
use std::sync::Arc;

use qc_faults::FaultConfig;
use qc_wire::Packet;
use tokio::net::UdpSocket;
use tracing::{trace, warn};

/// Maximum size of a single inbound datagram (spec.md §4.2: "up to 8 KiB").
const RECV_BUF_LEN: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("packet exceeds MAX_PCKT_SIZE, dropped silently")]
    TooLarge,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single UDP endpoint per process (spec.md §4.2). On servers the socket
/// is unconnected and every send names a peer address explicitly; on
/// clients the socket is connected to the one server peer and sends omit the
/// address. Fault injection is applied here, at the single chokepoint every
/// outbound datagram passes through, resolving the "loss injection
/// placement" note in spec.md §9.
pub struct DatagramIo {
    socket: UdpSocket,
    connected: bool,
    faults: Arc<FaultConfig>,
}

impl DatagramIo {
    pub async fn bind(addr: SocketAddr, faults: Arc<FaultConfig>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket, connected: false, faults })
    }

    /// Binds an ephemeral client socket and connects it to `peer`.
    pub async fn connect(peer: SocketAddr, faults: Arc<FaultConfig>) -> std::io::Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(Self { socket, connected: true, faults })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serializes and writes `pkt` to `addr` (ignored when the socket is
    /// connected). On a dropped send (fault injection) or partial/failed
    /// write, returns `Ok(())` anyway when the drop was intentional, or
    /// `Err(SendError)` on a genuine I/O failure — either way the caller's
    /// retransmission scan is what provides reliability, not this method.
    pub async fn send_to(&self, addr: SocketAddr, pkt: &Packet) -> Result<(), SendError> {
        let bytes = qc_wire::serialize_packet(pkt).ok_or(SendError::TooLarge)?;

        if self.faults.should_drop() {
            trace!(conv_id = pkt.conv_id, packet_num = pkt.packet_num, "fault injection: dropped send");
            return Ok(());
        }

        self.write_datagram(addr, &bytes).await?;

        for _ in 0..self.faults.extra_duplicates() {
            if let Err(e) = self.write_datagram(addr, &bytes).await {
                warn!("duplicate send failed: {e}");
            }
        }

        Ok(())
    }

    async fn write_datagram(&self, addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()> {
        if self.connected {
            self.socket.send(bytes).await?;
        } else {
            self.socket.send_to(bytes, addr).await?;
        }
        Ok(())
    }

    /// Returns a single datagram and its sender address.
    pub async fn recv(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, addr))
    }
}
