//! Negotiated-capability snapshot and the capability gate.
//!
//! The remote's declared feature set is captured once, at `initialize`, into
//! an immutable snapshot. Capability-gated outbound calls consult the
//! snapshot first: a capability the remote declared unsupported fails
//! locally with a typed error naming it, before any I/O. Until negotiation
//! has occurred, gated calls proceed optimistically — only an explicit
//! "unsupported" rejects.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::{ConduitError, Result};

/// File-system feature flags declared by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSystemCapability {
    /// Whether `fs/readTextFile` is available.
    pub read_text_file: bool,
    /// Whether `fs/writeTextFile` is available.
    pub write_text_file: bool,
}

/// Structured capability document declared by the remote at `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientCapabilities {
    /// File-system access capabilities.
    pub fs: FileSystemCapability,
    /// Whether the `terminal/*` methods are available.
    pub terminal: bool,
}

/// Write-once snapshot of the negotiated capabilities.
#[derive(Debug, Default)]
pub struct CapabilitySnapshot {
    inner: OnceLock<ClientCapabilities>,
}

impl CapabilitySnapshot {
    /// Create an un-negotiated snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the snapshot. First write wins; returns `false` when a
    /// snapshot already existed (the existing one is kept).
    pub fn capture(&self, capabilities: ClientCapabilities) -> bool {
        self.inner.set(capabilities).is_ok()
    }

    /// The captured snapshot, when negotiation has occurred.
    #[must_use]
    pub fn get(&self) -> Option<&ClientCapabilities> {
        self.inner.get()
    }

    /// Whether negotiation has occurred.
    #[must_use]
    pub fn is_negotiated(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Pre-flight check for a capability-gated call.
    ///
    /// # Errors
    ///
    /// [`ConduitError::CapabilityDenied`] naming `capability` when the
    /// snapshot exists and `supported` returns `false` for it. An absent
    /// snapshot passes (optimistic until negotiated).
    pub fn gate(
        &self,
        capability: &str,
        supported: impl FnOnce(&ClientCapabilities) -> bool,
    ) -> Result<()> {
        match self.inner.get() {
            Some(caps) if !supported(caps) => Err(ConduitError::CapabilityDenied {
                capability: capability.to_owned(),
            }),
            _ => Ok(()),
        }
    }
}
