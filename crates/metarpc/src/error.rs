//! # Error Definitions
//!
//! Failures of the protocol layer itself. Failures of the *remote code* are not
//! errors here: they travel as an `exception` descriptor inside a normal reply.

use metapack::Error as PackError;

/// Operational failures within the protocol mechanism.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The underlying metapack layer failed (truncated input, bad tag, open scope).
    Pack(PackError),
    /// A descriptor, command, or frame tag that this side does not know.
    UnknownVariant(String),
    /// The structure of the message was malformed (e.g. a missing field).
    ProtocolViolation(String),
    /// Descriptors nested deeper than `codec::MAX_DEPTH`.
    RecursionLimitExceeded,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pack(e) => write!(f, "wire format error: {}", e),
            Self::UnknownVariant(tag) => write!(f, "unknown variant: {}", tag),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Self::RecursionLimitExceeded => write!(f, "descriptor nesting exceeds the recursion limit"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pack(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PackError> for Error {
    fn from(e: PackError) -> Self { Self::Pack(e) }
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
