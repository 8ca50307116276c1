//! Model Context Protocol (MCP) JSON-RPC engine
//!
//! Protocol-level decoding, validation, and method routing shared by both
//! transport adapters; each adapter hands decoded payloads to this engine.

pub mod rpc;
pub mod server;
