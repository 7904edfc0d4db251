//! scaffold-mcp server binary.
//!
//! Runs the MCP protocol core over stdio (default), over HTTP/SSE, or both
//! surfaces from one process sharing a single dispatcher and tool registry.

use std::io;
use std::sync::Arc;

use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use scaffold_mcp::protocol::http::{HttpConfig, HttpTransport};
use scaffold_mcp::protocol::stdio::StdioTransport;
use scaffold_mcp::protocol::types::ServerInfo;
use scaffold_mcp::registry::ToolRegistry;
use scaffold_mcp::server::McpServer;
use scaffold_mcp::tools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportMode {
    Stdio,
    Http,
    Both,
}

struct CliArgs {
    mode: TransportMode,
    host: Option<String>,
    port: Option<u16>,
}

/// Parse command-line arguments. Exits the process for `--help`/`--version`
/// and on malformed input.
fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut mode = TransportMode::Stdio;
    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("scaffold-mcp v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("MCP server exposing application-model operations to AI agents.");
                println!();
                println!("USAGE:");
                println!("    scaffold-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help            Print help information");
                println!("    -V, --version         Print version information");
                println!("    --stdio               Serve on stdin/stdout (default)");
                println!("    --http                Serve over HTTP with SSE push");
                println!("    --both                Serve stdio and HTTP simultaneously");
                println!("    --host <ADDR>         HTTP listen address (default: 127.0.0.1)");
                println!("    --port <PORT>         HTTP starting port (default: 4000)");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG              Log level filter (e.g., debug, info, warn)");
                println!("    SCAFFOLD_HTTP_HOST    HTTP listen address override");
                println!("    SCAFFOLD_HTTP_PORT    HTTP starting port override");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("scaffold-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--stdio" => mode = TransportMode::Stdio,
            "--http" => mode = TransportMode::Http,
            "--both" => mode = TransportMode::Both,
            "--host" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --host requires an address argument");
                    std::process::exit(1);
                }
                host = Some(args[i].clone());
            }
            "--port" => {
                i += 1;
                let value = args.get(i).and_then(|s| s.parse::<u16>().ok());
                match value {
                    Some(p) => port = Some(p),
                    None => {
                        eprintln!("error: --port requires a port number");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'scaffold-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    CliArgs { mode, host, port }
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments first so --help/--version work before logging init
    let args = parse_args();

    // Logging goes to stderr: stdout carries JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("scaffold-mcp v{} starting...", env!("CARGO_PKG_VERSION"));

    // Tool registration happens once, here; the registry is read-only after.
    let mut registry = ToolRegistry::new();
    if let Err(e) = tools::register_builtin(&mut registry) {
        error!("Tool registration failed: {}", e);
        std::process::exit(1);
    }
    info!("Registered {} tools", registry.len());

    let server = Arc::new(McpServer::new(
        Arc::new(registry),
        ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    ));

    let mut http_config = HttpConfig::from_env();
    if let Some(host) = args.host {
        http_config.host = host;
    }
    if let Some(port) = args.port {
        http_config.port = port;
    }

    match args.mode {
        TransportMode::Stdio => {
            info!("Serving MCP on stdio");
            if let Err(e) = StdioTransport::new(server).run_stdio().await {
                error!("stdio transport error: {}", e);
                std::process::exit(1);
            }
        }
        TransportMode::Http => {
            if let Err(e) = HttpTransport::new(http_config).run(server).await {
                error!("HTTP transport error: {}", e);
                std::process::exit(1);
            }
        }
        TransportMode::Both => {
            let http_server = Arc::clone(&server);
            tokio::spawn(async move {
                if let Err(e) = HttpTransport::new(http_config).run(http_server).await {
                    // The stdio surface keeps serving; the caller restarts us
                    // if the HTTP side matters to it.
                    error!("HTTP transport error: {}", e);
                }
            });

            info!("Serving MCP on stdio");
            if let Err(e) = StdioTransport::new(server).run_stdio().await {
                error!("stdio transport error: {}", e);
                std::process::exit(1);
            }
        }
    }

    info!("scaffold-mcp shutting down");
}
