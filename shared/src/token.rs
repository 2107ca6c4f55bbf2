//! Anti-spoofing token handshake.
//!
//! A client sends a control message carrying a random client token and the
//! "unknown" server token. The remote answers with a 12-byte frame echoing the
//! client token and assigning a server token. Both values prefix every
//! follow-up request until the token expires.

use crate::error::WireError;
use rand::Rng;
use std::fmt;
use std::time::{Duration, Instant};

/// Protocol lifetime of an issued token.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(16);
/// Subtracted from the lifetime so a token never expires mid-flight.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(1);

/// Server token value before the first response arrived.
pub const SERVER_TOKEN_UNKNOWN: i32 = -1;

pub const TOKEN_REQUEST_SIZE: usize = 7 + TOKEN_REQUEST_DATA_SIZE;
pub const TOKEN_RESPONSE_SIZE: usize = 12;
pub const TOKEN_PREFIX_SIZE: usize = 9;

const TOKEN_REQUEST_DATA_SIZE: usize = 512;
const PACKET_FLAG_CONTROL: u8 = 1;
const PACKET_FLAG_CONNLESS: u8 = 8;
const PACKET_VERSION: u8 = 1;
const CONTROL_MESSAGE_TOKEN: u8 = 5;

/// First byte of a token request / token response frame.
pub const CONTROL_HEADER: u8 = (PACKET_FLAG_CONTROL << 2) & 0b1111_1100;
/// First byte of every follow-up request and response.
pub const CONNLESS_HEADER: u8 =
    ((PACKET_FLAG_CONNLESS << 2) & 0b1111_1100) | (PACKET_VERSION & 0b0000_0011);

/// Where a token is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unset,
    Requested,
    Valid,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unset,
    Requested,
    Issued { expires_at: Instant },
}

/// A (client token, server token) pair bound to one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    client_token: i32,
    server_token: i32,
    phase: Phase,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            client_token: 0,
            server_token: SERVER_TOKEN_UNKNOWN,
            phase: Phase::Unset,
        }
    }
}

impl Token {
    /// Starts a handshake with a freshly generated, non-negative client token.
    pub fn generate() -> Self {
        let client_token = rand::thread_rng().gen_range(0..=i32::MAX);
        Self::requested(client_token)
    }

    /// Starts a handshake with a caller-chosen client token.
    pub fn requested(client_token: i32) -> Self {
        Self {
            client_token,
            server_token: SERVER_TOKEN_UNKNOWN,
            phase: Phase::Requested,
        }
    }

    /// An issued token with an explicit expiry instant.
    pub fn issued(client_token: i32, server_token: i32, expires_at: Instant) -> Self {
        Self {
            client_token,
            server_token,
            phase: Phase::Issued { expires_at },
        }
    }

    /// Unpacks a 12-byte token response.
    ///
    /// Expiry is set to `now + lifetime - 1s`. Checking that the echoed client
    /// token matches the requested one is up to the caller.
    pub fn from_response(frame: &[u8], lifetime: Duration) -> Result<Self, WireError> {
        if frame.len() < TOKEN_RESPONSE_SIZE {
            return Err(WireError::InvalidHeader(frame.len()));
        }
        let client_token = i32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]);
        let server_token = i32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]);
        let expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);
        Ok(Self::issued(client_token, server_token, expires_at))
    }

    pub fn client_token(&self) -> i32 {
        self.client_token
    }

    pub fn server_token(&self) -> i32 {
        self.server_token
    }

    pub fn expires_at(&self) -> Option<Instant> {
        match self.phase {
            Phase::Issued { expires_at } => Some(expires_at),
            _ => None,
        }
    }

    pub fn state(&self) -> TokenState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> TokenState {
        match self.phase {
            Phase::Unset => TokenState::Unset,
            Phase::Requested => TokenState::Requested,
            Phase::Issued { expires_at } if now >= expires_at => TokenState::Expired,
            Phase::Issued { .. } => TokenState::Valid,
        }
    }

    /// True unless the token was issued and is still within its lifetime.
    pub fn is_expired(&self) -> bool {
        self.state() != TokenState::Valid
    }

    /// The 519-byte control frame that asks a remote for a server token.
    pub fn request_frame(&self) -> Vec<u8> {
        let mut frame = vec![0u8; TOKEN_REQUEST_SIZE];
        frame[0] = CONTROL_HEADER;
        frame[3..7].copy_from_slice(&SERVER_TOKEN_UNKNOWN.to_be_bytes());
        frame[7] = CONTROL_MESSAGE_TOKEN;
        frame[8..12].copy_from_slice(&self.client_token.to_be_bytes());
        frame
    }

    /// The 9-byte prefix of every follow-up request.
    pub fn prefix(&self) -> Result<[u8; TOKEN_PREFIX_SIZE], WireError> {
        if self.is_expired() {
            return Err(WireError::TokenExpired);
        }
        Ok(connless_prefix(self.server_token, self.client_token))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "token(client: {}, server: {}, {:?})",
            self.client_token,
            self.server_token,
            self.state()
        )
    }
}

/// Connless header followed by two big-endian tokens.
pub fn connless_prefix(first: i32, second: i32) -> [u8; TOKEN_PREFIX_SIZE] {
    let mut prefix = [0u8; TOKEN_PREFIX_SIZE];
    prefix[0] = CONNLESS_HEADER;
    prefix[1..5].copy_from_slice(&first.to_be_bytes());
    prefix[5..9].copy_from_slice(&second.to_be_bytes());
    prefix
}

/// True if `frame` looks like a token request control message.
pub fn is_token_request(frame: &[u8]) -> bool {
    frame.len() >= TOKEN_RESPONSE_SIZE
        && frame[0] == CONTROL_HEADER
        && frame[7] == CONTROL_MESSAGE_TOKEN
}

/// Client token carried by a token request frame.
pub fn requested_client_token(frame: &[u8]) -> Result<i32, WireError> {
    if !is_token_request(frame) {
        return Err(WireError::InvalidHeader(frame.len()));
    }
    Ok(i32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]))
}

/// The 12-byte answer a remote sends to a token request.
pub fn token_response_frame(client_token: i32, server_token: i32) -> [u8; TOKEN_RESPONSE_SIZE] {
    let mut frame = [0u8; TOKEN_RESPONSE_SIZE];
    frame[0] = CONTROL_HEADER;
    frame[3..7].copy_from_slice(&client_token.to_be_bytes());
    frame[7] = CONTROL_MESSAGE_TOKEN;
    frame[8..12].copy_from_slice(&server_token.to_be_bytes());
    frame
}
