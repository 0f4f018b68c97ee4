//! `simple-search-mcp` crate (library surface).
//!
//! The primary entrypoint for end users is the `simple-search` binary (MCP stdio).
//! This library module exposes the protocol loop so it can be embedded or driven over
//! in-memory streams.

pub mod mcp;
