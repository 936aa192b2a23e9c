//! Dolex MCP Server — STDIO transport.
//!
//! Reads one JSON-RPC request per line from stdin, writes one JSON-RPC
//! response per line to stdout. stdout is reserved for protocol traffic, so
//! all logging goes to stderr.

use anyhow::Result;
use clap::{Arg, Command};
use dolex::mcp::config::DolexConfig;
use dolex::mcp::types::{MCPError, MCPRequest, MCPResponse, RequestId};
use dolex::mcp::{init_mcp_server, MCPServer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let matches = Command::new("dolex-mcp-stdio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Dolex MCP Server (STDIO)")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a dolex.toml configuration file"),
        )
        .get_matches();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dolex=info"));
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = DolexConfig::load(config_path)?;

    eprintln!("Starting Dolex MCP Server (STDIO) v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Data directory: {}", config.storage.data_dir);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config))
}

async fn run(config: DolexConfig) -> Result<()> {
    let server = init_mcp_server(config).await?;
    run_stdio_loop(&server).await
}

/// One JSON object per line (spec §6). A line that fails to parse gets a
/// JSON-RPC parse-error response with a null id rather than killing the
/// process — one bad line should not end the session.
async fn run_stdio_loop(server: &MCPServer) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<MCPRequest>(&line) {
            Ok(request) => server.handle_request(request).await,
            Err(err) => MCPResponse {
                jsonrpc: "2.0".to_string(),
                id: RequestId::Number(0),
                result: None,
                error: Some(MCPError::parse_error(&err.to_string())),
            },
        };

        let serialized = serde_json::to_string(&response)?;
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}
