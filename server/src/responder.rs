//! UDP responder speaking the discovery protocol as a master or game server.

use crate::token_registry::TokenRegistry;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::packet::{self, Request, ResponseKind};
use shared::token::{self, TOKEN_PREFIX_SIZE};
use shared::{ServerAddress, ServerInfo, MAX_DATAGRAM_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// What the responder answers to.
#[derive(Debug, Clone)]
pub enum Role {
    /// Answers count and list requests with the registered servers.
    Master { servers: Vec<ServerAddress> },
    /// Answers info requests with its own status.
    Game { info: ServerInfo },
}

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    pub token_lifetime: Duration,
    pub max_tokens: usize,
    /// Datagrams dropped unanswered before the responder starts replying.
    pub drop_first: usize,
    /// Probability of dropping any later datagram.
    pub loss: f64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(30),
            max_tokens: 4096,
            drop_first: 0,
            loss: 0.0,
        }
    }
}

/// Counters of handled datagrams.
#[derive(Debug, Default)]
pub struct ResponderStats {
    pub received: AtomicUsize,
    pub dropped: AtomicUsize,
    pub token_requests: AtomicUsize,
    pub count_requests: AtomicUsize,
    pub list_requests: AtomicUsize,
    pub info_requests: AtomicUsize,
    pub rejected: AtomicUsize,
}

impl ResponderStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Responder {
    socket: Arc<UdpSocket>,
    role: Role,
    tokens: TokenRegistry,
    config: ResponderConfig,
    stats: Arc<ResponderStats>,
}

/// Handle to a spawned responder.
pub struct ResponderHandle {
    pub local_addr: SocketAddr,
    pub stats: Arc<ResponderStats>,
    task: JoinHandle<()>,
}

impl ResponderHandle {
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ResponderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Responder {
    pub async fn bind(addr: &str, role: Role, config: ResponderConfig) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("{} listening on {}", role_name(&role), socket.local_addr()?);

        Ok(Self {
            socket,
            role,
            tokens: TokenRegistry::new(config.token_lifetime, config.max_tokens),
            config,
            stats: Arc::new(ResponderStats::default()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> Arc<ResponderStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the receive loop on its own task.
    pub fn spawn(self) -> io::Result<ResponderHandle> {
        let local_addr = self.local_addr()?;
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("Responder on {} stopped: {}", local_addr, e);
            }
        });

        Ok(ResponderHandle {
            local_addr,
            stats,
            task,
        })
    }

    pub async fn run(mut self) -> io::Result<()> {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let mut expire_interval = tokio::time::interval(self.config.token_lifetime);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    let (len, from) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            // ICMP errors of earlier sends surface here on some platforms
                            warn!("Error receiving datagram: {}", e);
                            continue;
                        }
                    };

                    for reply in self.respond(&buffer[..len], from) {
                        if let Err(e) = self.socket.send_to(&reply, from).await {
                            debug!("Failed to reply to {}: {}", from, e);
                        }
                    }
                }
                _ = expire_interval.tick() => {
                    let expired = self.tokens.expire();
                    if expired > 0 {
                        debug!("Expired {} tokens", expired);
                    }
                }
            }
        }
    }

    /// Datagrams to send back for one received datagram.
    pub fn respond(&mut self, data: &[u8], from: SocketAddr) -> Vec<Vec<u8>> {
        let received = self.stats.received.fetch_add(1, Ordering::Relaxed);
        if received < self.config.drop_first
            || (self.config.loss > 0.0 && rand::thread_rng().gen_bool(self.config.loss.min(1.0)))
        {
            ResponderStats::bump(&self.stats.dropped);
            return Vec::new();
        }

        if token::is_token_request(data) {
            ResponderStats::bump(&self.stats.token_requests);
            let Ok(client_token) = token::requested_client_token(data) else {
                return Vec::new();
            };
            return match self.tokens.issue(from, client_token) {
                Some(server_token) => {
                    vec![packet::build_token_response(client_token, server_token).to_vec()]
                }
                None => Vec::new(),
            };
        }

        let Ok((server_token, client_token)) = packet::request_tokens(data) else {
            ResponderStats::bump(&self.stats.rejected);
            return Vec::new();
        };
        if !self.tokens.validate(from, server_token) {
            debug!("Invalid token from {}", from);
            ResponderStats::bump(&self.stats.rejected);
            return Vec::new();
        }
        let Some(request) = Request::classify(&data[TOKEN_PREFIX_SIZE..]) else {
            ResponderStats::bump(&self.stats.rejected);
            return Vec::new();
        };

        let reply = |kind: ResponseKind, payload: &[u8]| {
            packet::build_response(client_token, server_token, kind, payload)
        };

        match (&self.role, request) {
            (Role::Master { servers }, Request::ServerCount) => {
                ResponderStats::bump(&self.stats.count_requests);
                let count = u16::try_from(servers.len()).unwrap_or(u16::MAX);
                vec![reply(ResponseKind::ServerCount, &packet::pack_server_count(count)[..])]
            }
            (Role::Master { servers }, Request::ServerList) => {
                ResponderStats::bump(&self.stats.list_requests);
                packet::pack_server_list(servers)
                    .iter()
                    .map(|chunk| reply(ResponseKind::ServerList, chunk.as_slice()))
                    .collect()
            }
            (Role::Game { info }, Request::ServerInfo) => {
                ResponderStats::bump(&self.stats.info_requests);
                vec![reply(ResponseKind::ServerInfo, info.to_bytes().as_slice())]
            }
            (role, request) => {
                debug!("{} ignores {:?} from {}", role_name(role), request, from);
                ResponderStats::bump(&self.stats.rejected);
                Vec::new()
            }
        }
    }
}

fn role_name(role: &Role) -> &'static str {
    match role {
        Role::Master { .. } => "Master server",
        Role::Game { .. } => "Game server",
    }
}
