//! Model Context Protocol server layer.
//!
//! Exposes dynamically registered tools, resources, resource templates, and
//! prompts over a [`Session`](crate::session::Session). Submodules:
//! - `types`: wire-level primitive descriptors and results.
//! - `registry`: add/remove primitive tables with no-silent-overwrite
//!   semantics.
//! - `uri_template`: structural URI-template matching for resource dispatch.
//! - `server`: binds the MCP methods onto a session.

pub mod registry;
pub mod server;
pub mod types;
pub mod uri_template;
