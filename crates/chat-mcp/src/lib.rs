//! MCP tool provider client: spawns a server process and speaks JSON-RPC
//! 2.0 over its stdin/stdout, one line per frame.

mod client;
mod wire;

pub use client::McpClient;
