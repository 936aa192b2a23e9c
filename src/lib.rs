//! Dolex — a data-analysis server bridging an AI assistant with a user's
//! local tabular data (CSV files and SQLite databases) over a JSON-RPC tool
//! protocol. This crate is the core: source lifecycle, the declarative query
//! DSL and its hybrid SQL/in-process executor, the derived-column transform
//! engine, the bounded result/spec caches, and the visualization pattern
//! selector. The tool transport framing, the chart renderers, and the MCP
//! App HTML shell are external collaborators this crate only shapes
//! responses for.

pub mod cache;
pub mod connector;
pub mod contracts;
pub mod dsl;
pub mod errors;
pub mod expr;
pub mod model;
pub mod observability;
pub mod path_utils;
pub mod pattern;
pub mod source;
pub mod transform;
pub mod types;
pub mod util;
pub mod validation;

#[cfg(feature = "mcp-server")]
pub mod mcp;

pub use errors::DolexError;
pub use observability::{get_metrics, init_logging, init_logging_with_level, log_operation, with_trace_id};
pub use util::operation_log::OperationLog;
