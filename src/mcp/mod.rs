//! Model Context Protocol (MCP) dispatch core
//!
//! Provides handler registration, schema validation, JSON-RPC envelopes and the per-request protocol session.

pub mod registry;
pub mod rpc;
pub mod schema;
pub mod server;
