//! JSON-RPC stdio transport (spec §6: "transport is out of scope" for the
//! tool surface itself, but a running service needs one to be reachable).
//! `CortexService` and [`crate::dispatch::dispatch`] are transport-agnostic;
//! this module is the one concrete wiring of them to stdin/stdout.

mod server;

pub use server::{run_server, McpServer};
