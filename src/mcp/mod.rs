//! The MCP tool transport: JSON-RPC envelope dispatch (`server`), the tool
//! handlers it dispatches to (`tools`), configuration (`config`), and the
//! wire types shared by both (`types`).

pub mod config;
pub mod server;
pub mod tools;
pub mod types;

pub use config::DolexConfig;
pub use server::{MCPServer, ServerState};

/// Build a server over a fresh `ServerState` derived from `config`, creating
/// the data directory if it does not yet exist.
pub async fn init_mcp_server(config: DolexConfig) -> anyhow::Result<MCPServer> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let state = ServerState::new(config)?;
    Ok(MCPServer::new(state))
}
