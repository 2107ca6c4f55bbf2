//! Datagram transport capability used by session clients.
//!
//! A session never touches a socket directly. It talks to a [`Transport`],
//! so tests can swap the network for an in-memory one, and the aggregation
//! engine opens one transport per worker through a [`Connector`].

use crate::config::SessionConfig;
use async_trait::async_trait;
use log::debug;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

#[async_trait]
pub trait Transport: Send {
    /// Sends one datagram, bounded by the write deadline.
    async fn send_to(&mut self, data: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Receives one datagram, bounded by the read deadline.
    ///
    /// An elapsed deadline is reported as [`io::ErrorKind::TimedOut`].
    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn set_read_deadline(&mut self, deadline: Option<Instant>);

    fn set_write_deadline(&mut self, deadline: Option<Instant>);
}

/// Opens fresh transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport + 'static;

    async fn connect(&self, config: &SessionConfig) -> io::Result<Self::Transport>;
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
}

/// Unconnected UDP socket with settable deadlines.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl UdpTransport {
    /// Binds `address`, or a dual-stack wildcard falling back to IPv4.
    pub async fn bind(address: Option<SocketAddr>) -> io::Result<Self> {
        let socket = match address {
            Some(address) => UdpSocket::bind(address).await?,
            None => {
                let dual_stack = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0);
                match UdpSocket::bind(dual_stack).await {
                    Ok(socket) => socket,
                    Err(e) => {
                        debug!("Dual-stack bind failed ({}), using IPv4", e);
                        UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?
                    }
                }
            }
        };

        Ok(Self {
            socket,
            read_deadline: None,
            write_deadline: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Rewrites `target` into the address family of the local socket.
    fn map_target(&self, target: SocketAddr) -> SocketAddr {
        let local_is_v6 = self
            .socket
            .local_addr()
            .map(|addr| addr.is_ipv6())
            .unwrap_or(false);

        match (local_is_v6, target.ip()) {
            (true, IpAddr::V4(v4)) => SocketAddr::new(IpAddr::V6(v4.to_ipv6_mapped()), target.port()),
            (false, IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => SocketAddr::new(IpAddr::V4(v4), target.port()),
                None => target,
            },
            _ => target,
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&mut self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
        let target = self.map_target(target);
        match self.write_deadline {
            Some(deadline) => timeout_at(deadline, self.socket.send_to(data, target))
                .await
                .map_err(|_| deadline_exceeded())?,
            None => self.socket.send_to(data, target).await,
        }
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self.read_deadline {
            Some(deadline) => timeout_at(deadline, self.socket.recv_from(buf))
                .await
                .map_err(|_| deadline_exceeded())?,
            None => self.socket.recv_from(buf).await,
        }
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline = deadline;
    }
}

/// Opens one [`UdpTransport`] per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpConnector;

#[async_trait]
impl Connector for UdpConnector {
    type Transport = UdpTransport;

    async fn connect(&self, config: &SessionConfig) -> io::Result<UdpTransport> {
        UdpTransport::bind(config.bind_address).await
    }
}
