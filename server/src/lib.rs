//! # Discovery Responders
//!
//! Server side of the discovery protocol, used to run a self-contained
//! master server and any number of game servers on the local machine.
//!
//! ## Protocol Handling
//!
//! A responder first answers token requests, issuing one server token per
//! client address through the [`token_registry`]. Follow-up requests are only
//! answered when they carry the token issued to their source address.
//!
//! ### Master Role
//! Replies to count requests with a two byte big-endian count and to list
//! requests with one datagram per 75 registered servers.
//!
//! ### Game Role
//! Replies to info requests with the serialized server info record.
//!
//! ## Simulated Loss
//! `ResponderConfig::drop_first` and `ResponderConfig::loss` drop incoming
//! datagrams before they are handled, which exercises the retry logic of
//! the browser against a real socket.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::responder::{Responder, ResponderConfig, Role};
//! use shared::ServerInfo;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let info = ServerInfo {
//!         name: "My Server".to_string(),
//!         max_clients: 16,
//!         ..Default::default()
//!     };
//!     let responder = Responder::bind("127.0.0.1:8303", Role::Game { info }, ResponderConfig::default()).await?;
//!     responder.run().await?;
//!     Ok(())
//! }
//! ```

pub mod responder;
pub mod token_registry;

pub use responder::{Responder, ResponderConfig, ResponderHandle, ResponderStats, Role};
pub use token_registry::TokenRegistry;
