//! HTTP Transport layer for the Model Context Protocol
//!
//! Binds the protocol session to `POST /mcp` and serves the metadata endpoints.

pub mod handlers;
