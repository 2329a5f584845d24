use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::warn;

use crate::health::LinkStatus;
use crate::telemetry::{Payload, PER_ITEM_GAP_MS};

/// Receive buffer for inbound datagrams, larger than anything either
/// codec will produce.
pub const MAX_DATAGRAM: usize = 2_048;

pub async fn bind_udp(port: u16) -> Result<UdpSocket> {
    UdpSocket::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind udp port {port}"))
}

/// Unbound sender socket with broadcast permission, for telemetry.
pub async fn bind_sender() -> Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))
        .await
        .context("failed to bind telemetry socket")?;
    socket
        .set_broadcast(true)
        .context("failed to enable broadcast")?;
    Ok(socket)
}

/// Resolve a `host:port` destination string.
pub async fn resolve_dest(dest: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(dest)
        .await
        .with_context(|| format!("failed to resolve {dest:?}"))?
        .next()
        .with_context(|| format!("no address for {dest:?}"))
}

/// The limited broadcast address on the same port as `dest`, used by
/// the degraded telemetry path.
pub fn broadcast_for(dest: SocketAddr) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), dest.port())
}

/// Non-blocking receive. `None` when nothing is pending; receive errors
/// are logged and swallowed, matching the lossy channel contract.
pub fn try_recv(socket: &UdpSocket, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
    match socket.try_recv_from(buf) {
        Ok((len, from)) => Some((len, from)),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
        Err(e) => {
            warn!("udp receive failed: {e}");
            None
        }
    }
}

/// Blocking receive bounded by a timeout. Absence of data is not an
/// error on this channel.
pub async fn poll_datagram(
    socket: &UdpSocket,
    timeout_ms: u64,
    buf: &mut [u8],
) -> Option<(usize, SocketAddr)> {
    let wait = Duration::from_millis(timeout_ms);
    match tokio::time::timeout(wait, socket.recv_from(buf)).await {
        Ok(Ok((len, from))) => Some((len, from)),
        Ok(Err(e)) => {
            warn!("udp receive failed: {e}");
            None
        }
        Err(_) => None,
    }
}

/// Fire-and-forget telemetry send. A single-frame payload goes to the
/// configured destination; per-item frames go to the full broadcast
/// address with a short gap between frames.
pub async fn send_payload(
    socket: &UdpSocket,
    payload: &Payload,
    dest: SocketAddr,
    broadcast: SocketAddr,
) {
    match payload {
        Payload::Single(frame) => {
            if let Err(e) = socket.send_to(frame, dest).await {
                warn!(%dest, "telemetry send failed: {e}");
            }
        }
        Payload::PerItem(frames) => {
            for (i, frame) in frames.iter().enumerate() {
                if let Err(e) = socket.send_to(frame, broadcast).await {
                    warn!(dest = %broadcast, "telemetry send failed: {e}");
                }
                if i + 1 < frames.len() {
                    tokio::time::sleep(Duration::from_millis(PER_ITEM_GAP_MS)).await;
                }
            }
        }
    }
}

/// Link check via a route lookup toward the telemetry destination:
/// connecting a UDP socket sends no traffic but fails immediately when
/// the kernel has no route there. The limited broadcast address has no
/// route entry of its own and never gates. A routed-but-dead uplink
/// still reports connected; the health checks themselves catch that
/// case.
pub struct RouteCheck {
    dest: SocketAddr,
}

impl RouteCheck {
    pub fn toward(dest: SocketAddr) -> Self {
        Self { dest }
    }
}

impl LinkStatus for RouteCheck {
    fn is_connected(&self) -> bool {
        match self.dest {
            SocketAddr::V4(v4) if v4.ip().is_broadcast() => true,
            dest => {
                let any: SocketAddr = if dest.is_ipv4() {
                    (Ipv4Addr::UNSPECIFIED, 0).into()
                } else {
                    (Ipv6Addr::UNSPECIFIED, 0).into()
                };
                std::net::UdpSocket::bind(any)
                    .and_then(|socket| socket.connect(dest))
                    .is_ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_keeps_the_destination_port() {
        let dest: SocketAddr = "192.168.1.50:5005".parse().unwrap();
        let bcast = broadcast_for(dest);
        assert_eq!(bcast.to_string(), "255.255.255.255:5005");
    }

    #[test]
    fn route_check_keys_on_the_telemetry_destination() {
        // A loopback destination stays routable on a box with no
        // uplink and no default route, so checks keep running there.
        let gate = RouteCheck::toward("127.0.0.1:5005".parse().unwrap());
        assert!(gate.is_connected());
    }

    #[test]
    fn broadcast_telemetry_never_gates_the_checks() {
        let gate = RouteCheck::toward("255.255.255.255:5005".parse().unwrap());
        assert!(gate.is_connected());
    }

    #[tokio::test]
    async fn resolve_dest_accepts_ip_literals() {
        let addr = resolve_dest("255.255.255.255:5005").await.unwrap();
        assert_eq!(addr, "255.255.255.255:5005".parse().unwrap());
    }

    #[tokio::test]
    async fn poll_datagram_times_out_quietly() {
        let socket = bind_udp(0).await.unwrap();
        let mut buf = [0u8; MAX_DATAGRAM];
        assert!(poll_datagram(&socket, 10, &mut buf).await.is_none());
    }

    #[tokio::test]
    async fn payload_frames_arrive_at_the_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr().unwrap();
        let sender = bind_sender().await.unwrap();

        let payload = Payload::Single(b"{\"ts\":1,\"items\":[]}".to_vec());
        send_payload(&sender, &payload, dest, broadcast_for(dest)).await;

        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, _) = poll_datagram(&receiver, 500, &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"{\"ts\":1,\"items\":[]}");

        // Degraded path: both frames arrive, to the broadcast argument.
        // Loopback stands in for the broadcast address here.
        let burst = Payload::PerItem(vec![b"one".to_vec(), b"two".to_vec()]);
        send_payload(&sender, &burst, "203.0.113.1:9".parse().unwrap(), dest).await;

        let (len, _) = poll_datagram(&receiver, 500, &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"one");
        let (len, _) = poll_datagram(&receiver, 500, &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"two");
    }
}
