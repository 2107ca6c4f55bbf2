//! # Server Browser Library
//!
//! Client side of the server discovery protocol. Master servers keep a
//! registry of running game servers, and every game server answers status
//! queries on its own. Both speak a connectionless protocol on top of UDP in
//! which a token handshake has to precede any real query.
//!
//! ## Architecture Overview
//!
//! Requests flow strictly downwards:
//!
//! `Browser` → `SessionClient` → `exchange` → wire codec (`shared`) → `Transport`
//!
//! ### Reliable Exchange (`exchange`)
//! UDP loses and reorders datagrams, and the protocol has no acknowledgements.
//! A single request is therefore retransmitted with a receive window and a
//! burst size that both double after each failed attempt, until a matching
//! reply arrives or the caller's time budget is spent.
//!
//! ### Session Client (`session`)
//! Owns one socket and one current target. Tokens are cached per target in a
//! [`TokenCache`] so a handshake is only repeated once the previous token
//! expired.
//!
//! ### Aggregation Engine (`browser`)
//! Queries all master servers concurrently and merges their lists, then
//! queries every game server through a pool of workers. Addresses
//! that did not answer are retried in later passes, up to the retry budget.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use browser::{Browser, BrowserConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let browser = Browser::new(BrowserConfig::default()).await?;
//!
//!     for info in browser.discover_all().await? {
//!         println!("{}", info);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! A session client is never shared between tasks; every master query and
//! every info worker opens its own transport through a [`Connector`]. The
//! only shared state is the merged address set and the collected results,
//! each behind a lock that is never held across network I/O.

pub mod browser;
pub mod config;
pub mod error;
pub mod exchange;
pub mod session;
pub mod token_cache;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use crate::browser::Browser;
pub use config::{BrowserConfig, SessionConfig};
pub use error::{BrowserError, Result};
pub use exchange::{exchange, RetryPolicy};
pub use session::SessionClient;
pub use token_cache::TokenCache;
pub use transport::{Connector, Transport, UdpConnector, UdpTransport};
