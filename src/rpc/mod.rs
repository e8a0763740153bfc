//! JSON-RPC 2.0 envelope and error model.
//!
//! Submodules:
//! - `envelope`: message shapes, shape-based discrimination, and the
//!   standard error-code constants shared by both protocol surfaces.

pub mod envelope;
