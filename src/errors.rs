//! Error types shared across the runtime.

use std::fmt::{Display, Formatter};

use crate::rpc::envelope::RpcError;

/// Shared runtime result type.
pub type Result<T> = std::result::Result<T, ConduitError>;

/// Runtime error enumeration covering the protocol failure taxonomy.
///
/// Framing, dispatch, capability, and timeout failures are local-recoverable;
/// transport failures are fatal to their owning connection only.
#[derive(Debug)]
pub enum ConduitError {
    /// Malformed or unrecognized message envelope.
    Frame(String),
    /// Transport I/O failure or stream closure.
    Transport(String),
    /// Outbound request expired before a matching response arrived.
    Timeout {
        /// Method of the request that timed out.
        method: String,
    },
    /// The remote declared the required capability unsupported.
    CapabilityDenied {
        /// Name of the missing capability.
        capability: String,
    },
    /// The remote answered with a JSON-RPC error payload.
    Remote(RpcError),
    /// Primitive registry add/remove violation.
    Registry(String),
    /// Session operation attempted before a transport was attached.
    Detached,
    /// Payload (de)serialization failure.
    Serde(String),
}

impl Display for ConduitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(msg) => write!(f, "frame: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Timeout { method } => write!(f, "timeout: no response to `{method}`"),
            Self::CapabilityDenied { capability } => {
                write!(f, "capability denied: remote does not support `{capability}`")
            }
            Self::Remote(err) => write!(f, "remote error {}: {}", err.code, err.message),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::Detached => write!(f, "session is not attached to a transport"),
            Self::Serde(msg) => write!(f, "serde: {msg}"),
        }
    }
}

impl std::error::Error for ConduitError {}

impl From<serde_json::Error> for ConduitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

impl From<std::io::Error> for ConduitError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
