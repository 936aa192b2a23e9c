//! Dolex CLI — a thin `clap` front end over the same tool handlers the MCP
//! server dispatches to (spec §A.5). `serve` runs the stdio JSON-RPC loop;
//! the remaining subcommands exist for local debugging against a data
//! directory without a host framework in the loop.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dolex::mcp::config::DolexConfig;
use dolex::mcp::{init_mcp_server, tools, MCPServer};
use dolex::mcp::types::{MCPRequest, MCPResponse, RequestId};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "dolex", version, about = "A data-analysis server bridging AI assistants and local tabular data")]
struct Cli {
    /// Path to a dolex.toml configuration file.
    #[arg(short = 'c', long, global = true)]
    config: Option<String>,

    /// Raise logging to dolex=debug,info regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Force logging to error only, regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stdio JSON-RPC tool loop.
    Serve,
    /// Register a CSV file/directory or SQLite database as a source.
    AddSource {
        #[arg(long)]
        name: String,
        #[arg(long)]
        path: String,
    },
    /// Describe one table of a registered source.
    Describe {
        source: String,
        table: String,
        #[arg(long, default_value = "compact")]
        detail: String,
    },
    /// Run raw read-only SQL against a registered source.
    Query {
        source: String,
        sql: String,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// List every registered source.
    ListSources,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(cli))
}

fn init_logging(cli: &Cli) {
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("dolex=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dolex=warn,error"))
    };
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

macro_rules! qprintln {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}

async fn run(cli: Cli) -> Result<()> {
    let config = DolexConfig::load(cli.config.as_deref())?;
    std::fs::create_dir_all(&config.storage.data_dir)?;

    match cli.command {
        Commands::Serve => {
            qprintln!(cli.quiet, "Starting Dolex MCP Server (STDIO) v{}", env!("CARGO_PKG_VERSION"));
            let server = init_mcp_server(config).await?;
            serve_stdio(&server).await
        }
        Commands::AddSource { name, path } => {
            let server = init_mcp_server(config).await?;
            let args = json!({ "name": name, "path": path });
            print_tool_result(&server, "add_source", args, cli.quiet).await
        }
        Commands::Describe { source, table, detail } => {
            let server = init_mcp_server(config).await?;
            let args = json!({ "sourceId": source, "table": table, "detail": detail });
            print_tool_result(&server, "describe_source", args, cli.quiet).await
        }
        Commands::Query { source, sql, max_rows } => {
            let server = init_mcp_server(config).await?;
            let mut args = json!({ "sourceId": source, "sql": sql });
            if let Some(max_rows) = max_rows {
                args["maxRows"] = json!(max_rows);
            }
            print_tool_result(&server, "query_source", args, cli.quiet).await
        }
        Commands::ListSources => {
            let server = init_mcp_server(config).await?;
            print_tool_result(&server, "list_sources", json!({}), cli.quiet).await
        }
    }
}

/// Call a tool handler directly (bypassing JSON-RPC framing, since this is a
/// local CLI, not a client of the server) and print its response body.
async fn print_tool_result(server: &MCPServer, tool: &str, arguments: serde_json::Value, quiet: bool) -> Result<()> {
    let state = server.state();
    let Some(envelope) = tools::dispatch(state, tool, arguments).await else {
        bail!("unknown tool: {tool}");
    };
    let is_error = envelope.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
    let text = envelope["content"][0]["text"].as_str().unwrap_or("{}");
    qprintln!(quiet, "{text}");
    if is_error {
        std::process::exit(1);
    }
    Ok(())
}

/// One JSON object per line (spec §6), matching `bin/mcp_server_stdio.rs`'s
/// framing exactly so `dolex serve` and `dolex-mcp-stdio` are interchangeable.
async fn serve_stdio(server: &MCPServer) -> Result<()> {
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
                error: Some(dolex::mcp::types::MCPError::parse_error(&err.to_string())),
            },
        };

        let serialized = serde_json::to_string(&response)?;
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}
