use shared::{ServerAddress, Token};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

/// Tokens of one session, keyed by remote endpoint.
///
/// Expired entries are swept lazily from a min-heap on every access. The heap
/// may hold stale entries for keys whose token was replaced since; those are
/// discarded when they surface without touching the newer token.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: HashMap<ServerAddress, Token>,
    expiry: BinaryHeap<Reverse<(Instant, ServerAddress)>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A still valid token for `address`.
    pub fn get(&mut self, address: &ServerAddress) -> Option<Token> {
        self.get_at(address, Instant::now())
    }

    pub fn get_at(&mut self, address: &ServerAddress, now: Instant) -> Option<Token> {
        self.sweep_at(now);
        self.tokens.get(address).copied()
    }

    /// Stores an issued token. Tokens without an expiry are ignored.
    pub fn insert(&mut self, address: ServerAddress, token: Token) {
        self.insert_at(address, token, Instant::now());
    }

    pub fn insert_at(&mut self, address: ServerAddress, token: Token, now: Instant) {
        self.sweep_at(now);
        let Some(expires_at) = token.expires_at() else {
            return;
        };
        if expires_at <= now {
            return;
        }
        self.tokens.insert(address, token);
        self.expiry.push(Reverse((expires_at, address)));
    }

    pub fn remove(&mut self, address: &ServerAddress) -> Option<Token> {
        self.tokens.remove(address)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Drops every token that expired at `now`; returns how many were dropped.
    pub fn sweep_at(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(Reverse((expires_at, address))) = self.expiry.peek().copied() {
            if expires_at > now {
                break;
            }
            self.expiry.pop();

            let expired = self
                .tokens
                .get(&address)
                .and_then(Token::expires_at)
                .map_or(false, |current| current <= now);
            if expired {
                self.tokens.remove(&address);
                removed += 1;
            }
        }
        removed
    }
}
