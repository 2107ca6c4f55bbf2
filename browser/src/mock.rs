//! In-memory network of scripted master and game servers.
//!
//! Replies are computed synchronously inside `send_to` and queued on the
//! sending transport, so a receive either finds a datagram immediately or
//! waits out the read deadline.

use crate::config::SessionConfig;
use crate::transport::{Connector, Transport};
use async_trait::async_trait;
use shared::packet::{self, Request, ResponseKind};
use shared::token;
use shared::{ServerAddress, ServerInfo};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum Scripted {
    Master(Vec<ServerAddress>),
    Game(ServerInfo),
    /// Answers token requests with a client token other than the one sent.
    WrongEcho,
    Silent,
}

impl Scripted {
    pub fn master(servers: Vec<ServerAddress>) -> Self {
        Scripted::Master(servers)
    }

    pub fn game(info: ServerInfo) -> Self {
        Scripted::Game(info)
    }

    pub fn wrong_echo() -> Self {
        Scripted::WrongEcho
    }
}

#[derive(Debug)]
struct Endpoint {
    address: SocketAddr,
    behavior: Scripted,
    server_token: i32,
    token_requests: usize,
    requests: HashMap<Request, usize>,
}

impl Endpoint {
    fn respond(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        if matches!(self.behavior, Scripted::Silent) {
            return Vec::new();
        }

        if token::is_token_request(data) {
            self.token_requests += 1;
            let Ok(client_token) = token::requested_client_token(data) else {
                return Vec::new();
            };
            let echoed = match self.behavior {
                Scripted::WrongEcho => client_token.wrapping_add(1),
                _ => client_token,
            };
            return vec![packet::build_token_response(echoed, self.server_token).to_vec()];
        }

        let Ok((server_token, client_token)) = packet::request_tokens(data) else {
            return Vec::new();
        };
        if server_token != self.server_token {
            return Vec::new();
        }
        let Some(request) = Request::classify(&data[token::TOKEN_PREFIX_SIZE..]) else {
            return Vec::new();
        };
        *self.requests.entry(request).or_default() += 1;

        let reply = |kind: ResponseKind, payload: &[u8]| {
            packet::build_response(client_token, server_token, kind, payload)
        };
        match (&self.behavior, request) {
            (Scripted::Master(servers), Request::ServerCount) => {
                let count = u16::try_from(servers.len()).unwrap_or(u16::MAX);
                vec![reply(ResponseKind::ServerCount, &packet::pack_server_count(count)[..])]
            }
            (Scripted::Master(servers), Request::ServerList) => packet::pack_server_list(servers)
                .iter()
                .map(|chunk| reply(ResponseKind::ServerList, chunk.as_slice()))
                .collect(),
            (Scripted::Game(info), Request::ServerInfo) => {
                vec![reply(ResponseKind::ServerInfo, info.to_bytes().as_slice())]
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    endpoints: HashMap<ServerAddress, Endpoint>,
    connects: usize,
    refuse_connects: bool,
}

/// Shared handle to the simulated network.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut NetworkState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add(&self, address: SocketAddr, behavior: Scripted) {
        self.with_state(|state| {
            let server_token = 0x5000 + state.endpoints.len() as i32;
            state.endpoints.insert(
                ServerAddress::new(address),
                Endpoint {
                    address,
                    behavior,
                    server_token,
                    token_requests: 0,
                    requests: HashMap::new(),
                },
            );
        });
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            network: self.clone(),
            inbox: VecDeque::new(),
            read_deadline: None,
        }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            network: self.clone(),
        }
    }

    pub fn refuse_connects(&self) {
        self.with_state(|state| state.refuse_connects = true);
    }

    pub fn connects(&self) -> usize {
        self.with_state(|state| state.connects)
    }

    pub fn token_requests(&self, address: SocketAddr) -> usize {
        self.with_state(|state| {
            state
                .endpoints
                .get(&ServerAddress::new(address))
                .map_or(0, |endpoint| endpoint.token_requests)
        })
    }

    pub fn requests(&self, address: SocketAddr, request: Request) -> usize {
        self.with_state(|state| {
            state
                .endpoints
                .get(&ServerAddress::new(address))
                .and_then(|endpoint| endpoint.requests.get(&request).copied())
                .unwrap_or(0)
        })
    }

    fn deliver(&self, data: &[u8], target: SocketAddr) -> Vec<(SocketAddr, Vec<u8>)> {
        self.with_state(|state| match state.endpoints.get_mut(&ServerAddress::new(target)) {
            Some(endpoint) => {
                let from = endpoint.address;
                endpoint.respond(data).into_iter().map(|reply| (from, reply)).collect()
            }
            None => Vec::new(),
        })
    }
}

#[derive(Debug)]
pub struct MockTransport {
    network: MockNetwork,
    inbox: VecDeque<(SocketAddr, Vec<u8>)>,
    read_deadline: Option<Instant>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_to(&mut self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
        let replies = self.network.deliver(data, target);
        self.inbox.extend(replies);
        Ok(data.len())
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        if let Some((from, data)) = self.inbox.pop_front() {
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            return Ok((len, from));
        }

        match self.read_deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"))
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
    }

    fn set_write_deadline(&mut self, _deadline: Option<Instant>) {}
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    network: MockNetwork,
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _config: &SessionConfig) -> io::Result<MockTransport> {
        let refused = self.network.with_state(|state| {
            state.connects += 1;
            state.refuse_connects
        });
        if refused {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "no free local port"));
        }
        Ok(self.network.transport())
    }
}
