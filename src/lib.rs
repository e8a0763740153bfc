#![forbid(unsafe_code)]
//! Bidirectional JSON-RPC 2.0 runtime for agent-integration protocols.
//!
//! The crate layers a transport abstraction (stdio, single- and multi-tenant
//! WebSocket) under a request/notification correlation session, and builds
//! two protocol surfaces on top: an MCP server exposing dynamic
//! tool/resource/prompt registries, and an ACP agent façade with capability
//! negotiation.

pub mod acp;
pub mod errors;
pub mod mcp;
pub mod rpc;
pub mod session;
pub mod transport;
pub mod worker;

pub use errors::{ConduitError, Result};
