//! Wire format of the connectionless server discovery protocol.
//!
//! Everything in here is pure: byte layouts, the token handshake values and
//! the server/player records. Sockets, retries and concurrency live in the
//! `browser` and `server` crates.

pub mod address;
pub mod error;
pub mod packer;
pub mod packet;
pub mod server_info;
pub mod token;
pub mod varint;

pub use address::{ServerAddress, SERVER_ENTRY_SIZE};
pub use error::WireError;
pub use packer::{Packer, Unpacker};
pub use packet::{Request, ResponseKind, SERVERS_PER_CHUNK};
pub use server_info::{PlayerInfo, ServerInfo};
pub use token::{Token, TokenState, TOKEN_LIFETIME};

/// Largest datagram either side sends or expects.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Port master servers listen on.
pub const MASTER_SERVER_PORT: u16 = 8283;

/// Port game servers listen on unless configured otherwise.
pub const DEFAULT_SERVER_PORT: u16 = 8303;
