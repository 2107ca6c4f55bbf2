//! Aggregation engine: fans queries out over master servers and game servers.
//!
//! Every concurrent task owns its own session client. The only shared state
//! is the address set built by `discover_addresses` and the result list of
//! `fetch_infos`; both locks are held just for the insert.

use crate::config::BrowserConfig;
use crate::error::{BrowserError, Result};
use crate::session::SessionClient;
use crate::transport::{Connector, UdpConnector};
use log::{debug, info, warn};
use shared::{ServerAddress, ServerInfo};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

pub struct Browser<C: Connector = UdpConnector> {
    connector: Arc<C>,
    config: BrowserConfig,
    masters: Vec<SocketAddr>,
}

impl Browser<UdpConnector> {
    /// Resolves the configured master servers once.
    pub async fn new(config: BrowserConfig) -> Result<Self> {
        Self::with_connector(UdpConnector, config).await
    }
}

impl<C: Connector> Browser<C> {
    pub async fn with_connector(connector: C, config: BrowserConfig) -> Result<Self> {
        let mut masters = Vec::with_capacity(config.master_servers.len());
        for host in &config.master_servers {
            match lookup_host(host.as_str()).await {
                Ok(mut resolved) => match resolved.next() {
                    Some(address) => {
                        debug!("Master server {} resolved to {}", host, address);
                        masters.push(address);
                    }
                    None => warn!("Master server {} has no addresses", host),
                },
                Err(e) => warn!("Could not resolve master server {}: {}", host, e),
            }
        }

        if masters.is_empty() {
            return Err(BrowserError::NoMasterServers);
        }

        Ok(Self {
            connector: Arc::new(connector),
            config,
            masters,
        })
    }

    pub fn master_servers(&self) -> &[SocketAddr] {
        &self.masters
    }

    /// Number of servers each master reports, for the masters that answered.
    pub async fn server_counts(&self) -> Result<Vec<(SocketAddr, i32)>> {
        let mut tasks: JoinSet<Result<(SocketAddr, Result<i32>)>> = JoinSet::new();
        for &master in &self.masters {
            let connector = Arc::clone(&self.connector);
            let session = self.config.master_session();
            let cancel = self.config.cancel.clone();

            tasks.spawn(async move {
                let transport = connector.connect(&session).await?;
                let mut client = SessionClient::with_transport(transport, session).with_cancel(cancel);
                client.set_target_addr(master);
                Ok((master, client.get_server_count().await))
            });
        }

        let mut counts = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (master, result) = joined??;
            match result {
                Ok(count) => counts.push((master, count)),
                Err(BrowserError::Cancelled) => return Err(BrowserError::Cancelled),
                Err(e) => warn!("Master server {} did not report a count: {}", master, e),
            }
        }
        Ok(counts)
    }

    /// Union of the server lists of all master servers, deduplicated.
    ///
    /// An unreachable master contributes nothing. Failing to open a local
    /// socket is fatal.
    pub async fn discover_addresses(&self) -> Result<Vec<ServerAddress>> {
        let found = Arc::new(Mutex::new(HashSet::new()));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for &master in &self.masters {
            let connector = Arc::clone(&self.connector);
            let session = self.config.master_session();
            let cancel = self.config.cancel.clone();
            let found = Arc::clone(&found);

            tasks.spawn(async move {
                let transport = connector.connect(&session).await?;
                let mut client = SessionClient::with_transport(transport, session).with_cancel(cancel);
                client.set_target_addr(master);

                match client.get_server_addresses().await {
                    Ok(servers) => {
                        debug!("Master server {} listed {} servers", master, servers.len());
                        found.lock().await.extend(servers);
                        Ok(())
                    }
                    Err(BrowserError::Cancelled) => Err(BrowserError::Cancelled),
                    Err(e) => {
                        warn!("Master server {} failed: {}", master, e);
                        Ok(())
                    }
                }
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined? {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let found = found.lock().await;
        info!("Discovered {} unique server addresses", found.len());
        Ok(found.iter().copied().collect())
    }

    /// Queries every address for its server info with a pool of workers.
    ///
    /// Addresses that fail are skipped; they simply do not appear in the
    /// result. The first failure to open a worker socket is returned instead.
    pub async fn fetch_infos(&self, addresses: &[ServerAddress]) -> Result<Vec<ServerInfo>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let (queue, jobs) = flume::bounded(addresses.len());
        for &address in addresses {
            queue
                .try_send(address)
                .map_err(|_| BrowserError::Io(std::io::ErrorKind::BrokenPipe.into()))?;
        }
        drop(queue);

        let results = Arc::new(Mutex::new(Vec::with_capacity(addresses.len())));
        let workers = match self.config.max_workers {
            Some(cap) => addresses.len().min(cap.max(1)),
            None => addresses.len(),
        };
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for _ in 0..workers {
            let connector = Arc::clone(&self.connector);
            let session = self.config.server_session();
            let cancel = self.config.cancel.clone();
            let jobs = jobs.clone();
            let results = Arc::clone(&results);

            tasks.spawn(async move {
                let transport = connector.connect(&session).await?;
                let mut client = SessionClient::with_transport(transport, session).with_cancel(cancel);

                while let Ok(address) = jobs.recv_async().await {
                    client.set_target_addr(address.socket_addr());
                    match client.get_server_info().await {
                        Ok(info) => results.lock().await.push(info),
                        Err(BrowserError::Cancelled) => return Err(BrowserError::Cancelled),
                        Err(e) if e.is_remote() => debug!("No server info from {}: {}", address, e),
                        Err(e) => warn!("Querying {} failed locally: {}", address, e),
                    }
                }
                Ok(())
            });
        }
        drop(jobs);

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined? {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut results = results.lock().await;
        Ok(std::mem::take(&mut *results))
    }

    /// Discovers all servers and collects their info over several passes.
    ///
    /// Each pass only queries addresses that have not answered yet; results
    /// are keyed by the address each server reports for itself.
    pub async fn discover_all(&self) -> Result<Vec<ServerInfo>> {
        let addresses = self.discover_addresses().await?;
        let mut table: HashMap<String, ServerInfo> = HashMap::with_capacity(addresses.len());

        for pass in 0..=self.config.retry_budget {
            let missing: Vec<ServerAddress> = addresses
                .iter()
                .filter(|address| !table.contains_key(&address.to_string()))
                .copied()
                .collect();
            if missing.is_empty() {
                break;
            }

            let infos = self.fetch_infos(&missing).await?;
            info!(
                "Pass {}: {} of {} missing servers answered",
                pass + 1,
                infos.len(),
                missing.len()
            );
            for info in infos {
                table.insert(info.address.clone(), info);
            }
        }

        info!("Collected info of {}/{} servers", table.len(), addresses.len());
        Ok(table.into_values().collect())
    }
}
