//! HTTP API module.
//!
//! - Server: read-only access to the marts and a run trigger
//! - Types: request/response payloads
//! - Logs: run log and SSE fan-out

pub mod logs;
pub mod server;
pub mod types;
