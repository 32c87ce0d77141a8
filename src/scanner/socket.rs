//! Raw IPv4 socket carrying hand-built TCP probes (requires root or CAP_NET_RAW).

use super::error::ScanError;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tracing::debug;

/// Shortest blocking receive; a zero read timeout means "block forever" to the OS.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Packet I/O used by the scan loop.
pub trait Transport {
    /// Sends one complete IPv4 datagram, header included.
    fn send(&mut self, packet: &[u8]) -> io::Result<()>;

    /// Waits at most `wait` for one inbound datagram and copies it into `buf`.
    /// `Ok(None)` means nothing arrived in time.
    fn recv(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<Option<usize>>;
}

/// Rounds `wait` up to whole milliseconds, at least [`MIN_WAIT`], so the
/// socket option only changes when the millisecond value does.
fn read_timeout(wait: Duration) -> Duration {
    let millis = wait.as_nanos().div_ceil(1_000_000);
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX)).max(MIN_WAIT)
}

pub struct RawSocket {
    socket: Socket,
    read_timeout: Option<Duration>,
}

impl RawSocket {
    /// Opens a raw TCP socket with `IP_HDRINCL`, bound to `local` and
    /// associated with `target`. The connect only fixes the peer address;
    /// no handshake happens at this layer.
    pub fn open(local: Ipv4Addr, target: Ipv4Addr) -> Result<Self, ScanError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))
            .map_err(|e| ScanError::resource("socket", e))?;
        socket
            .set_header_included_v4(true)
            .map_err(|e| ScanError::resource("setsockopt", e))?;
        socket
            .bind(&SockAddr::from(SocketAddrV4::new(local, 0)))
            .map_err(|e| ScanError::resource("bind", e))?;
        socket
            .connect(&SockAddr::from(SocketAddrV4::new(target, 0)))
            .map_err(|e| ScanError::resource("connect", e))?;
        debug!(%local, %target, "raw socket ready");

        Ok(Self {
            socket,
            read_timeout: None,
        })
    }
}

impl Transport for RawSocket {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(packet)?;
        if sent != packet.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {sent} of {} bytes", packet.len()),
            ));
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<Option<usize>> {
        let wait = read_timeout(wait);
        if self.read_timeout != Some(wait) {
            self.socket.set_read_timeout(Some(wait))?;
            self.read_timeout = Some(wait);
        }
        match self.socket.read(buf) {
            Ok(len) => Ok(Some(len)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
