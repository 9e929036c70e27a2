//! MCP (Model Context Protocol) server for Granske.
//!
//! Exposes the research workflow as an MCP tool over stdio, for use with
//! AI assistants like Claude.

mod protocol;
mod server;
mod tools;

pub use server::McpServer;
