//! Dispatch-table SDK wiring the event/memory store, diagnostics store,
//! bi-temporal graph, hybrid search, and NLP extraction into the cortex
//! tool surface (spec §1, §6).

pub mod dispatch;
pub mod error;
pub mod mcp;
pub mod providers;
pub mod service;

pub use dispatch::dispatch;
pub use error::{Error, Result};
pub use mcp::{run_server, McpServer};
pub use providers::EmbeddingProvider;
pub use service::CortexService;
