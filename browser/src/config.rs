use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Public master servers queried when nothing else is configured.
pub const DEFAULT_MASTER_SERVERS: [&str; 4] = [
    "master1.teeworlds.com:8283",
    "master2.teeworlds.com:8283",
    "master3.teeworlds.com:8283",
    "master4.teeworlds.com:8283",
];

/// Shortest receive window an exchange ever uses.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(35);

pub const DEFAULT_MASTER_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(16);
pub const DEFAULT_RETRY_BUDGET: usize = 2;

/// Settings of a single session client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Overall budget of one request/response exchange.
    pub read_timeout: Duration,
    /// Bound on every send, restarted before each burst.
    pub write_timeout: Duration,
    pub token_lifetime: Duration,
    pub min_timeout: Duration,
    /// Local address to bind. `None` tries dual-stack first, then IPv4.
    pub bind_address: Option<SocketAddr>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_SERVER_TIMEOUT,
            write_timeout: DEFAULT_SERVER_TIMEOUT,
            token_lifetime: shared::TOKEN_LIFETIME,
            min_timeout: MIN_TIMEOUT,
            bind_address: None,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self.write_timeout = timeout;
        self
    }
}

/// Settings of the aggregation engine.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// `host:port` endpoints of the master servers.
    pub master_servers: Vec<String>,
    pub master_timeout: Duration,
    pub server_timeout: Duration,
    /// Additional info passes after the first one.
    pub retry_budget: usize,
    /// Optional cap on concurrent info workers, each owning one socket.
    /// `None` starts one worker per address.
    pub max_workers: Option<usize>,
    /// Template for every session the engine opens.
    pub session: SessionConfig,
    pub cancel: CancellationToken,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            master_servers: DEFAULT_MASTER_SERVERS.iter().map(|s| s.to_string()).collect(),
            master_timeout: DEFAULT_MASTER_TIMEOUT,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            retry_budget: DEFAULT_RETRY_BUDGET,
            max_workers: None,
            session: SessionConfig::default(),
            cancel: CancellationToken::new(),
        }
    }
}

impl BrowserConfig {
    pub(crate) fn master_session(&self) -> SessionConfig {
        self.session.clone().with_timeout(self.master_timeout)
    }

    pub(crate) fn server_session(&self) -> SessionConfig {
        self.session.clone().with_timeout(self.server_timeout)
    }
}
