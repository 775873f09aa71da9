//! Socket-backed transports.
//!
//! Thin blocking wrappers around `std::net` sockets that implement
//! [`Transport`].  Sockets that need options `std::net` cannot set before
//! binding (address reuse, multicast membership) are built with `socket2`
//! and converted.  All protocol logic lives elsewhere; this module owns only
//! byte I/O.

use std::io::{self, Read, Write};
use std::net::{
    Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpListener, TcpStream, UdpSocket,
};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::BenchError;
use crate::record::Framing;
use crate::transport::{is_timeout, Incoming, Transport};

/// Port used by every mode unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5007;

/// Multicast group used by the datagram harness unless configured otherwise.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 1, 1, 1);

/// Multicast TTL: stay on the local segment.
pub const DEFAULT_MULTICAST_TTL: u32 = 1;

/// How long the sender waits for the TCP handshake before giving up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// TCP
// ---------------------------------------------------------------------------

/// A connected TCP stream carrying newline-framed records.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    closed: bool,
}

impl TcpTransport {
    /// Active open towards a listening receiver.  No retry: a receiver that is
    /// not up yet is a configuration error, not a transient one.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, BenchError> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| BenchError::ConnectFailure { addr, source })?;
        log::info!("connected to {addr}");
        Self::from_stream(stream, addr)
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Result<Self, BenchError> {
        // Records are small; do not let Nagle batch them behind the clock.
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer,
            closed: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    fn framing(&self) -> Framing {
        Framing::Line
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Incoming> {
        match self.stream.read(buf) {
            Ok(0) => Ok(Incoming::Closed),
            Ok(n) => Ok(Incoming::Data(n)),
            Err(e) if is_timeout(&e) => Ok(Incoming::Idle),
            Err(e) => Err(e),
        }
    }

    fn set_idle_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.flush()?;
        match self.stream.shutdown(Shutdown::Both) {
            // The peer may already be gone; the socket is released either way.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// A listening socket that hands out one [`TcpTransport`] per sender.
#[derive(Debug)]
pub struct TcpBenchListener {
    inner: TcpListener,
    pub local_addr: SocketAddr,
}

impl TcpBenchListener {
    /// Bind with `SO_REUSEADDR` so back-to-back runs can reuse the port.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port.
    pub fn bind(addr: SocketAddr) -> Result<Self, BenchError> {
        let bind_err = |source| BenchError::Bind { addr, source };
        let socket =
            Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
                .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(1).map_err(bind_err)?;

        let inner: TcpListener = socket.into();
        let local_addr = inner.local_addr()?;
        log::info!("TCP receiver listening on {local_addr}");
        Ok(Self { inner, local_addr })
    }

    /// Block until one sender connects.
    pub fn accept(&self) -> Result<TcpTransport, BenchError> {
        let (stream, peer) = self.inner.accept()?;
        log::info!("sender connected from {peer}");
        TcpTransport::from_stream(stream, peer)
    }
}

// ---------------------------------------------------------------------------
// UDP
// ---------------------------------------------------------------------------

/// A UDP socket carrying one record per datagram.
///
/// A sending transport has a fixed destination; a receiving transport only
/// reads.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    dest: Option<SocketAddr>,
    group: Option<Ipv4Addr>,
}

impl UdpTransport {
    /// Socket that sends every frame to `dest`.
    ///
    /// When `dest` is an IPv4 multicast group, `ttl` bounds how many router
    /// hops the datagrams may take.
    pub fn sender(dest: SocketAddr, ttl: u32) -> Result<Self, BenchError> {
        let local: SocketAddr = match dest {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket =
            UdpSocket::bind(local).map_err(|source| BenchError::Bind { addr: local, source })?;
        if dest.ip().is_multicast() {
            socket.set_multicast_ttl_v4(ttl)?;
        }
        log::info!("UDP sender targeting {dest}");
        Ok(Self {
            socket,
            dest: Some(dest),
            group: None,
        })
    }

    /// Socket bound to `bind_ip:port` that reads datagrams.
    ///
    /// With `group`, the socket also joins that IPv4 multicast group on the
    /// default interface.  Address reuse is enabled so several receivers on
    /// one host can share the group port.
    pub fn receiver(
        bind_ip: Ipv4Addr,
        port: u16,
        group: Option<Ipv4Addr>,
    ) -> Result<Self, BenchError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(bind_ip, port));
        let bind_err = |source| BenchError::Bind { addr, source };

        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        if let Some(group) = group {
            if !group.is_multicast() {
                return Err(BenchError::Config(format!(
                    "{group} is not a multicast address"
                )));
            }
            socket
                .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
                .map_err(bind_err)?;
        }

        let socket: UdpSocket = socket.into();
        log::info!(
            "UDP receiver listening on {}{}",
            socket.local_addr()?,
            group.map(|g| format!(" (group {g})")).unwrap_or_default()
        );
        Ok(Self {
            socket,
            dest: None,
            group,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn framing(&self) -> Framing {
        Framing::Datagram
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let dest = self.dest.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "receiving socket has no destination")
        })?;
        self.socket.send_to(frame, dest)?;
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<Incoming> {
        match self.socket.recv_from(buf) {
            Ok((n, _from)) => Ok(Incoming::Data(n)),
            Err(e) if is_timeout(&e) => Ok(Incoming::Idle),
            Err(e) => Err(e),
        }
    }

    fn set_idle_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        // A zero timeout is rejected by the OS; treat it as "block forever".
        self.socket.set_read_timeout(timeout.filter(|t| !t.is_zero()))
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(group) = self.group.take() {
            self.socket
                .leave_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        }
        Ok(())
    }
}
