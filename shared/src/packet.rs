//! Connless request and response framing for the discovery protocol.
//!
//! Every follow-up datagram is `prefix(9) + marker + payload`. The only
//! exception is the 12-byte token response, which is classified by its length.

use crate::address::{ServerAddress, SERVER_ENTRY_SIZE};
use crate::error::WireError;
use crate::server_info::ServerInfo;
use crate::token::{self, Token, TOKEN_PREFIX_SIZE, TOKEN_RESPONSE_SIZE};
use std::fmt;

pub const REQUEST_SERVER_LIST: &[u8] = b"\xff\xff\xff\xffreq2";
pub const RESPONSE_SERVER_LIST: &[u8] = b"\xff\xff\xff\xfflis2";
pub const REQUEST_SERVER_COUNT: &[u8] = b"\xff\xff\xff\xffcou2";
pub const RESPONSE_SERVER_COUNT: &[u8] = b"\xff\xff\xff\xffsiz2";
pub const REQUEST_SERVER_INFO: &[u8] = b"\xff\xff\xff\xffgie3\x00";
pub const RESPONSE_SERVER_INFO: &[u8] = b"\xff\xff\xff\xffinf3\x00";

/// Entries a master server puts into one server list datagram.
pub const SERVERS_PER_CHUNK: usize = 75;

/// Most bytes a server count payload may have.
pub const MAX_COUNT_PAYLOAD: usize = 4;

/// Follow-up requests a client can send once it holds a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    ServerList,
    ServerCount,
    ServerInfo,
}

impl Request {
    pub fn marker(self) -> &'static [u8] {
        match self {
            Request::ServerList => REQUEST_SERVER_LIST,
            Request::ServerCount => REQUEST_SERVER_COUNT,
            Request::ServerInfo => REQUEST_SERVER_INFO,
        }
    }

    /// Response kind a remote answers this request with.
    pub fn response(self) -> ResponseKind {
        match self {
            Request::ServerList => ResponseKind::ServerList,
            Request::ServerCount => ResponseKind::ServerCount,
            Request::ServerInfo => ResponseKind::ServerInfo,
        }
    }

    /// Classifies the marker following the prefix of a request datagram.
    pub fn classify(body: &[u8]) -> Option<Self> {
        [Request::ServerList, Request::ServerCount, Request::ServerInfo]
            .into_iter()
            .find(|request| body.starts_with(request.marker()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Token,
    ServerList,
    ServerCount,
    ServerInfo,
}

impl ResponseKind {
    const MARKED: [ResponseKind; 3] = [
        ResponseKind::ServerList,
        ResponseKind::ServerCount,
        ResponseKind::ServerInfo,
    ];

    /// The marker after the prefix; the token response has none.
    pub fn marker(self) -> &'static [u8] {
        match self {
            ResponseKind::Token => &[],
            ResponseKind::ServerList => RESPONSE_SERVER_LIST,
            ResponseKind::ServerCount => RESPONSE_SERVER_COUNT,
            ResponseKind::ServerInfo => RESPONSE_SERVER_INFO,
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseKind::Token => "token",
            ResponseKind::ServerList => "server list",
            ResponseKind::ServerCount => "server count",
            ResponseKind::ServerInfo => "server info",
        };
        f.write_str(name)
    }
}

/// Builds `prefix + marker` for a follow-up request.
pub fn build_request(token: &Token, request: Request) -> Result<Vec<u8>, WireError> {
    let prefix = token.prefix()?;
    let marker = request.marker();

    let mut frame = Vec::with_capacity(TOKEN_PREFIX_SIZE + marker.len());
    frame.extend_from_slice(&prefix);
    frame.extend_from_slice(marker);
    Ok(frame)
}

/// Classifies a received datagram.
///
/// Returns the kind and the payload behind the marker. For a token response
/// the payload is the whole 12-byte frame.
pub fn match_response(datagram: &[u8]) -> Result<(ResponseKind, &[u8]), WireError> {
    if datagram.len() == TOKEN_RESPONSE_SIZE {
        return Ok((ResponseKind::Token, datagram));
    }
    if datagram.len() < TOKEN_PREFIX_SIZE {
        return Err(WireError::InvalidHeader(datagram.len()));
    }

    let body = &datagram[TOKEN_PREFIX_SIZE..];
    ResponseKind::MARKED
        .into_iter()
        .find(|kind| body.starts_with(kind.marker()))
        .map(|kind| (kind, &body[kind.marker().len()..]))
        .ok_or(WireError::InvalidHeader(datagram.len()))
}

/// Like [`match_response`], but only accepts `expected`.
pub fn expect_response(datagram: &[u8], expected: ResponseKind) -> Result<&[u8], WireError> {
    let (found, payload) = match_response(datagram)?;
    if found != expected {
        return Err(WireError::HeaderMismatch { expected, found });
    }
    Ok(payload)
}

/// Reads the 18-byte entries of a server list payload.
/// A trailing partial entry is ignored.
pub fn parse_server_list(payload: &[u8]) -> Vec<ServerAddress> {
    payload
        .chunks_exact(SERVER_ENTRY_SIZE)
        .filter_map(|entry| <&[u8; SERVER_ENTRY_SIZE]>::try_from(entry).ok())
        .map(ServerAddress::from_entry)
        .collect()
}

/// Reads a server count payload.
///
/// Each byte is shifted by its distance from the last byte in *bits*, not in
/// bytes, which is what deployed clients do. Only single byte counts decode
/// to the intended value; `[0x01, 0x00]` yields 2, not 256.
pub fn parse_server_count(payload: &[u8]) -> Result<i32, WireError> {
    if payload.len() > MAX_COUNT_PAYLOAD {
        return Err(WireError::MalformedRecord("server count longer than 4 bytes"));
    }

    let last = payload.len().saturating_sub(1);
    let count = payload
        .iter()
        .enumerate()
        .fold(0i32, |count, (idx, &b)| count | (i32::from(b) << (last - idx)));
    Ok(count)
}

/// Reads a server info payload received from `address`.
pub fn parse_server_info(payload: &[u8], address: impl Into<String>) -> Result<ServerInfo, WireError> {
    ServerInfo::parse(payload, address)
}

/// Responder side: the 12-byte answer to a token request.
pub fn build_token_response(client_token: i32, server_token: i32) -> [u8; TOKEN_RESPONSE_SIZE] {
    token::token_response_frame(client_token, server_token)
}

/// Responder side: `prefix + marker + payload`.
///
/// A response prefix carries the client token first and the server token
/// second, the mirror image of a request prefix.
pub fn build_response(
    client_token: i32,
    server_token: i32,
    kind: ResponseKind,
    payload: &[u8],
) -> Vec<u8> {
    let marker = kind.marker();
    let mut frame = Vec::with_capacity(TOKEN_PREFIX_SIZE + marker.len() + payload.len());
    frame.extend_from_slice(&token::connless_prefix(client_token, server_token));
    frame.extend_from_slice(marker);
    frame.extend_from_slice(payload);
    frame
}

/// Server tokens of a follow-up request prefix: `(server_token, client_token)`.
pub fn request_tokens(datagram: &[u8]) -> Result<(i32, i32), WireError> {
    if datagram.len() < TOKEN_PREFIX_SIZE || datagram[0] != token::CONNLESS_HEADER {
        return Err(WireError::InvalidHeader(datagram.len()));
    }
    let server_token = i32::from_be_bytes([datagram[1], datagram[2], datagram[3], datagram[4]]);
    let client_token = i32::from_be_bytes([datagram[5], datagram[6], datagram[7], datagram[8]]);
    Ok((server_token, client_token))
}

/// Responder side: server list payloads of at most [`SERVERS_PER_CHUNK`] entries each.
pub fn pack_server_list(servers: &[ServerAddress]) -> Vec<Vec<u8>> {
    servers
        .chunks(SERVERS_PER_CHUNK)
        .map(|chunk| {
            let mut payload = Vec::with_capacity(chunk.len() * SERVER_ENTRY_SIZE);
            for server in chunk {
                payload.extend_from_slice(&server.to_entry());
            }
            payload
        })
        .collect()
}

/// Responder side: the count as two big-endian bytes.
pub fn pack_server_count(count: u16) -> [u8; 2] {
    count.to_be_bytes()
}
