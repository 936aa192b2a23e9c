//! Source Manager: the registry of data sources, lazy connection lifecycle,
//! and the only path through which SQL reaches a connector.

pub mod manager;
pub mod registry;

pub use manager::{SourceManager, SourceManagerConfig};
