//! MCP tool surface over stdio JSON-RPC.
//!
//! A thin shim: every tool maps one-to-one onto a library operation and
//! the library semantics stay normative.

mod protocol;
mod server;

pub use server::McpServer;
