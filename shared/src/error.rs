use crate::packet::ResponseKind;
use thiserror::Error;

/// Errors reported by the wire codec and token framing.
///
/// None of these are retried at this layer; callers decide whether a
/// malformed datagram is fatal or just one more lost packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The consumer asked for more bytes than remain in the input.
    #[error("unexpected end of data")]
    UnexpectedEnd,

    /// A varint kept its extend bit set past the 5th byte.
    #[error("varint does not fit into 32 bits")]
    Overflow,

    /// A record field is missing its terminator or carries an impossible value.
    #[error("malformed record: {0}")]
    MalformedRecord(&'static str),

    /// The datagram is too short or carries no known response marker.
    #[error("invalid header in datagram of {0} bytes")]
    InvalidHeader(usize),

    /// The datagram is a valid response, just not the one that was requested.
    #[error("expected {expected} response, received {found}")]
    HeaderMismatch {
        expected: ResponseKind,
        found: ResponseKind,
    },

    /// A follow-up request was built from an unset or expired token.
    #[error("token expired")]
    TokenExpired,
}
