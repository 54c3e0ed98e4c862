//! Socket abstraction. Production code reads UDP packets; tests feed a
//! scripted queue of byte slices instead of opening a real port.

use std::collections::VecDeque;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

/// Everything a [`crate::pipeline::PipelineStream`] receiver needs from a
/// socket. Named only by this interface so the original vendor-specific
/// board abstraction never leaks into the pipeline.
pub trait DaqSocket: Send + Sync {
    /// Reads one packet into `buf`, returning the byte count. `Ok(0)` means
    /// no data was available before the read timeout elapsed.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Real network backing: a `std::net::UdpSocket` with a read timeout so the
/// receive loop can observe shutdown requests.
pub struct UdpDaqSocket {
    socket: UdpSocket,
}

impl UdpDaqSocket {
    pub fn bind(addr: impl ToSocketAddrs, read_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(read_timeout))?;
        Ok(UdpDaqSocket { socket })
    }
}

impl DaqSocket for UdpDaqSocket {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// In-memory test double: a fixed queue of packets, returned one per call.
/// Once exhausted it sleeps for `idle_delay` and returns `Ok(0)`, mimicking
/// a real socket's read timeout so a receive loop spinning on it doesn't
/// busy-loop.
pub struct FakeSocket {
    packets: Mutex<VecDeque<Vec<u8>>>,
    idle_delay: Duration,
}

impl FakeSocket {
    pub fn new(packets: Vec<Vec<u8>>, idle_delay: Duration) -> Self {
        FakeSocket {
            packets: Mutex::new(packets.into()),
            idle_delay,
        }
    }
}

impl DaqSocket for FakeSocket {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self.packets.lock().unwrap().pop_front();
        match next {
            Some(packet) => {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                Ok(n)
            }
            None => {
                std::thread::sleep(self.idle_delay);
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_socket_returns_scripted_packets_in_order() {
        let socket = FakeSocket::new(vec![vec![1, 2, 3], vec![4, 5]], Duration::from_millis(1));
        let mut buf = [0u8; 16];
        assert_eq!(socket.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(socket.recv(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[test]
    fn fake_socket_returns_zero_once_exhausted() {
        let socket = FakeSocket::new(vec![vec![1]], Duration::from_millis(1));
        let mut buf = [0u8; 16];
        socket.recv(&mut buf).unwrap();
        assert_eq!(socket.recv(&mut buf).unwrap(), 0);
    }
}
