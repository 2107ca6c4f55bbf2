//! Server tokens handed out to querying clients.
//!
//! A responder issues one server token per client address and only answers
//! follow-up requests that carry it. Repeated token requests from the same
//! address, as produced by burst retransmission, get the same token back so
//! that whichever response the client accepts stays valid.

use log::debug;
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Token state kept for one client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedToken {
    pub server_token: i32,
    pub client_token: i32,
    pub last_seen: Instant,
}

#[derive(Debug)]
pub struct TokenRegistry {
    tokens: HashMap<SocketAddr, IssuedToken>,
    lifetime: Duration,
    max_entries: usize,
}

impl TokenRegistry {
    pub fn new(lifetime: Duration, max_entries: usize) -> Self {
        Self {
            tokens: HashMap::new(),
            lifetime,
            max_entries,
        }
    }

    /// Server token for `addr`, reusing a live one if present.
    ///
    /// Returns `None` when the registry is full even after expiring old entries.
    pub fn issue(&mut self, addr: SocketAddr, client_token: i32) -> Option<i32> {
        let now = Instant::now();

        if let Some(entry) = self.tokens.get_mut(&addr) {
            if now.duration_since(entry.last_seen) <= self.lifetime {
                entry.client_token = client_token;
                entry.last_seen = now;
                return Some(entry.server_token);
            }
        }

        if self.tokens.len() >= self.max_entries && self.expire() == 0 {
            debug!("Token registry full, ignoring {}", addr);
            return None;
        }

        let server_token = rand::thread_rng().gen_range(0..=i32::MAX);
        self.tokens.insert(
            addr,
            IssuedToken {
                server_token,
                client_token,
                last_seen: now,
            },
        );
        Some(server_token)
    }

    /// True if `server_token` is the live token issued to `addr`.
    pub fn validate(&mut self, addr: SocketAddr, server_token: i32) -> bool {
        let now = Instant::now();
        match self.tokens.get_mut(&addr) {
            Some(entry)
                if entry.server_token == server_token
                    && now.duration_since(entry.last_seen) <= self.lifetime =>
            {
                entry.last_seen = now;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&IssuedToken> {
        self.tokens.get(addr)
    }

    /// Removes tokens not used within the lifetime; returns how many.
    pub fn expire(&mut self) -> usize {
        let lifetime = self.lifetime;
        let before = self.tokens.len();
        self.tokens
            .retain(|_, entry| entry.last_seen.elapsed() <= lifetime);
        before - self.tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
