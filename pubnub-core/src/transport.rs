//! L3 — Transport (§4.3).
//!
//! `Transport` is the socket collaborator (§6: "non-blocking TCP with
//! readiness notification"); `TcpTransport` is the default
//! implementation, built on `std::net` with `native-tls` for the
//! handshake stage, used directly since the async transport crate
//! this backend used to sit behind is dropped (see `DESIGN.md`).

use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::ResultCode;

/// Outcome of a non-blocking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome<T> {
    Done(T),
    WouldBlock,
}

/// The socket + TLS collaborator (§6). A single `Transport` instance
/// is scoped to one connection attempt; `connect` may be called again
/// after `close` to try the next cached address.
pub trait Transport: std::fmt::Debug {
    /// Attempt to connect to `addr`. Blocking transports resolve
    /// synchronously with `wait_connect_timeout` as their cap;
    /// non-blocking ones may return `WouldBlock` and expect the
    /// caller to call `connect` again once the socket is writable.
    fn connect(
        &mut self,
        addr: SocketAddr,
        host: &str,
        use_tls: bool,
        wait_connect_timeout: Duration,
    ) -> Result<IoOutcome<()>, ResultCode>;

    fn send(&mut self, bytes: &[u8]) -> Result<IoOutcome<usize>, ResultCode>;
    fn recv(&mut self, buf: &mut [u8]) -> Result<IoOutcome<usize>, ResultCode>;
    fn close(&mut self);
    fn set_blocking(&mut self, blocking: bool) -> Result<(), ResultCode>;
}

enum Stream {
    Plain(TcpStream),
    Tls(native_tls::TlsStream<TcpStream>),
    None,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Plain(_) => write!(f, "Stream::Plain"),
            Stream::Tls(_) => write!(f, "Stream::Tls"),
            Stream::None => write!(f, "Stream::None"),
        }
    }
}

/// Default blocking `Transport`. Non-blocking mode is modeled by
/// setting the underlying `TcpStream` non-blocking and translating
/// `WouldBlock` I/O errors to `IoOutcome::WouldBlock`, matching §4.3's
/// "blocking or non-blocking" requirement without two separate
/// implementations.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Stream,
    blocking: bool,
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport {
            stream: Stream::None,
            blocking: true,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(
        &mut self,
        addr: SocketAddr,
        host: &str,
        use_tls: bool,
        wait_connect_timeout: Duration,
    ) -> Result<IoOutcome<()>, ResultCode> {
        let tcp = TcpStream::connect_timeout(&addr, wait_connect_timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                ResultCode::ConnectionTimeout
            } else {
                ResultCode::ConnectError
            }
        })?;
        tcp.set_nonblocking(!self.blocking)
            .map_err(|e| ResultCode::IoError(e.to_string()))?;

        self.stream = if use_tls {
            let connector = native_tls::TlsConnector::new().map_err(|e| ResultCode::TlsError(e.to_string()))?;
            let tls = connector
                .connect(host, tcp)
                .map_err(|e| ResultCode::TlsError(e.to_string()))?;
            Stream::Tls(tls)
        } else {
            Stream::Plain(tcp)
        };

        Ok(IoOutcome::Done(()))
    }

    fn send(&mut self, bytes: &[u8]) -> Result<IoOutcome<usize>, ResultCode> {
        let result = match &mut self.stream {
            Stream::Plain(s) => s.write(bytes),
            Stream::Tls(s) => s.write(bytes),
            Stream::None => return Err(ResultCode::IoError("not connected".to_string())),
        };
        translate(result)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<IoOutcome<usize>, ResultCode> {
        let result = match &mut self.stream {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
            Stream::None => return Err(ResultCode::IoError("not connected".to_string())),
        };
        translate(result)
    }

    fn close(&mut self) {
        self.stream = Stream::None;
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<(), ResultCode> {
        self.blocking = blocking;
        match &self.stream {
            Stream::Plain(s) => s.set_nonblocking(!blocking).map_err(|e| ResultCode::IoError(e.to_string())),
            Stream::Tls(s) => s
                .get_ref()
                .set_nonblocking(!blocking)
                .map_err(|e| ResultCode::IoError(e.to_string())),
            Stream::None => Ok(()),
        }
    }
}

fn translate(result: io::Result<usize>) -> Result<IoOutcome<usize>, ResultCode> {
    match result {
        Ok(n) => Ok(IoOutcome::Done(n)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(IoOutcome::WouldBlock),
        Err(e) => Err(ResultCode::IoError(e.to_string())),
    }
}

/// §4.3: "IPv6 and IPv4 addresses are interleaved by preference (IPv6
/// first when enabled)" — the address cache (`dns.rs`) already lists
/// IPv6 first, so ordering here is a passthrough, but kept as a named
/// step so the connect-stage driver has one place to apply any future
/// interleaving policy change.
pub fn ordered_candidates(addresses: &[IpAddr]) -> Vec<IpAddr> {
    addresses.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    #[test]
    fn connect_to_closed_port_is_a_connect_error() {
        // Bind then immediately drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = TcpTransport::default();
        let result = transport.connect(addr, "localhost", false, Duration::from_millis(200));
        assert!(result.is_err());
    }

    #[test]
    fn send_before_connect_is_an_io_error() {
        let mut transport = TcpTransport::default();
        let result = transport.send(b"hello");
        assert!(result.is_err());
    }

    #[test]
    fn plain_tcp_roundtrips_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(&buf).unwrap();
        });

        let mut transport = TcpTransport::default();
        transport
            .connect(addr, "localhost", false, Duration::from_secs(1))
            .unwrap();
        transport.send(b"hello").unwrap();

        let mut buf = [0u8; 5];
        loop {
            match transport.recv(&mut buf).unwrap() {
                IoOutcome::Done(5) => break,
                _ => continue,
            }
        }
        assert_eq!(&buf, b"hello");
        server.join().unwrap();
    }

    #[test]
    fn ordered_candidates_preserves_ipv6_first_order() {
        let addrs = vec![IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))];
        assert_eq!(ordered_candidates(&addrs), addrs);
    }
}
