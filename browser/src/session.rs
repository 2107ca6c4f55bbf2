//! Session client: one socket, one target at a time, one token per target.

use crate::config::SessionConfig;
use crate::error::{BrowserError, Result};
use crate::exchange::{exchange, RetryPolicy};
use crate::token_cache::TokenCache;
use crate::transport::{Transport, UdpTransport};
use log::debug;
use shared::packet::{self, Request, ResponseKind, SERVERS_PER_CHUNK};
use shared::{ServerAddress, ServerInfo, Token, MAX_DATAGRAM_SIZE};
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::net::lookup_host;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct SessionClient<T: Transport = UdpTransport> {
    transport: T,
    target: Option<SocketAddr>,
    config: SessionConfig,
    tokens: TokenCache,
    cancel: CancellationToken,
}

impl SessionClient<UdpTransport> {
    /// Opens a UDP socket as configured by `config.bind_address`.
    pub async fn bind(config: SessionConfig) -> Result<Self> {
        let transport = UdpTransport::bind(config.bind_address).await?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn with_transport(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            target: None,
            config,
            tokens: TokenCache::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts pending exchanges once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn target(&self) -> Option<SocketAddr> {
        self.target
    }

    /// Resolves `host:port` and makes it the target of later requests.
    pub async fn set_target(&mut self, address: &str) -> Result<()> {
        let resolved = lookup_host(address)
            .await
            .map_err(|_| BrowserError::Resolve(address.to_string()))?
            .next()
            .ok_or_else(|| BrowserError::Resolve(address.to_string()))?;
        self.target = Some(resolved);
        Ok(())
    }

    pub fn set_target_addr(&mut self, address: SocketAddr) {
        self.target = Some(address);
    }

    fn current_target(&self) -> Result<SocketAddr> {
        self.target.ok_or(BrowserError::NoTarget)
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.read_timeout, self.config.min_timeout)
            .with_write_timeout(self.config.write_timeout)
    }

    /// A valid token for the current target, running the handshake if needed.
    pub async fn get_token(&mut self) -> Result<Token> {
        let target = self.current_target()?;
        let key = ServerAddress::new(target);
        if let Some(token) = self.tokens.get(&key) {
            return Ok(token);
        }

        let requested = Token::generate();
        let frame = requested.request_frame();
        let lifetime = self.config.token_lifetime;
        let policy = self.policy();

        let token = exchange(
            &mut self.transport,
            target,
            &frame,
            policy,
            &self.cancel,
            |datagram, _| {
                let payload = packet::expect_response(datagram, ResponseKind::Token)?;
                let token = Token::from_response(payload, lifetime)?;
                if token.client_token() != requested.client_token() {
                    return Err(BrowserError::TokenMismatch {
                        sent: requested.client_token(),
                        received: token.client_token(),
                    });
                }
                Ok(token)
            },
        )
        .await?;

        debug!("Received {} from {}", token, target);
        self.tokens.insert(key, token);
        Ok(token)
    }

    async fn request_frame(&mut self, request: Request) -> Result<Vec<u8>> {
        let token = self.get_token().await?;
        Ok(packet::build_request(&token, request)?)
    }

    /// Number of servers registered at the current target.
    pub async fn get_server_count(&mut self) -> Result<i32> {
        let target = self.current_target()?;
        let frame = self.request_frame(Request::ServerCount).await?;
        let policy = self.policy();

        exchange(&mut self.transport, target, &frame, policy, &self.cancel, |datagram, _| {
            let payload = packet::expect_response(datagram, ResponseKind::ServerCount)?;
            Ok(packet::parse_server_count(payload)?)
        })
        .await
    }

    /// Status record of the game server at the current target.
    ///
    /// The record's address is the canonical form of the endpoint that replied.
    pub async fn get_server_info(&mut self) -> Result<ServerInfo> {
        let target = self.current_target()?;
        let frame = self.request_frame(Request::ServerInfo).await?;
        let policy = self.policy();

        exchange(&mut self.transport, target, &frame, policy, &self.cancel, |datagram, from| {
            let payload = packet::expect_response(datagram, ResponseKind::ServerInfo)?;
            Ok(packet::parse_server_info(payload, ServerAddress::new(from).to_string())?)
        })
        .await
    }

    /// Full server list of the master server at the current target.
    ///
    /// Asks for the count first to learn how many datagrams the list spans,
    /// then reads chunks until all arrived or the read timeout elapsed. A
    /// missing chunk truncates the list.
    pub async fn get_server_addresses(&mut self) -> Result<Vec<ServerAddress>> {
        let target = self.current_target()?;
        let count = self.get_server_count().await?;
        if count <= 0 {
            return Ok(Vec::new());
        }
        let expected_chunks = (count as usize + SERVERS_PER_CHUNK - 1) / SERVERS_PER_CHUNK;

        let frame = self.request_frame(Request::ServerList).await?;
        let policy = self.policy();
        let started = Instant::now();

        let first = exchange(&mut self.transport, target, &frame, policy, &self.cancel, |datagram, _| {
            let payload = packet::expect_response(datagram, ResponseKind::ServerList)?;
            Ok(packet::parse_server_list(payload))
        })
        .await?;

        let mut seen = HashSet::new();
        let mut servers = Vec::with_capacity(count as usize);
        absorb_chunk(first, &mut seen, &mut servers);
        let mut chunks = 1;

        let expected_source = ServerAddress::new(target);
        let deadline = started + policy.timeout();
        self.transport.set_read_deadline(Some(deadline));
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while chunks < expected_chunks {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return Err(BrowserError::Cancelled),
                received = self.transport.recv_from(&mut buf) => received,
            };

            let (len, from) = match received {
                Ok(received) => received,
                Err(e) => {
                    debug!(
                        "Server list from {} truncated after {}/{} chunks: {}",
                        target, chunks, expected_chunks, e
                    );
                    break;
                }
            };
            if ServerAddress::new(from) != expected_source {
                continue;
            }

            match packet::expect_response(&buf[..len], ResponseKind::ServerList) {
                Ok(payload) => {
                    if absorb_chunk(packet::parse_server_list(payload), &mut seen, &mut servers) {
                        chunks += 1;
                    }
                }
                Err(e) => debug!("Ignoring datagram from {}: {}", from, e),
            }
        }

        debug!(
            "{} servers in {}/{} chunks from {}",
            servers.len(),
            chunks,
            expected_chunks,
            target
        );
        Ok(servers)
    }
}

/// Appends the unseen addresses of one chunk. True if the chunk was new.
fn absorb_chunk(
    chunk: Vec<ServerAddress>,
    seen: &mut HashSet<ServerAddress>,
    servers: &mut Vec<ServerAddress>,
) -> bool {
    let before = servers.len();
    for address in chunk {
        if seen.insert(address) {
            servers.push(address);
        }
    }
    servers.len() > before
}
