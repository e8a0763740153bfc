//! Agent Client Protocol (ACP) façade.
//!
//! Binds the agent-side protocol methods onto a [`Session`](crate::session::Session):
//! inbound `initialize`/`authenticate`/`session/*` calls route to an
//! [`Agent`](agent::Agent) implementation, while the agent's outbound calls
//! (`session/update`, permission requests, file-system and terminal access)
//! are exposed as typed, capability-gated wrappers.

pub mod agent;
pub mod connection;
pub mod context;
pub mod types;
