#[cfg(feature = "mcp-server")]
use carenav_lib::run_mcp_stdio;

/// Standalone MCP server using stdio transport (stdin/stdout).
///
/// Exposes the facility functions (search, details, patient data,
/// appointments) as MCP tools to clients that spawn a process and speak
/// line-delimited JSON-RPC over its standard streams, such as IDE agents.
///
/// # Example Configuration
///
/// ```json
/// {
///   "mcpServers": {
///     "carenav": {
///       "command": "/path/to/mcp-stdio",
///       "args": []
///     }
///   }
/// }
/// ```
///
/// # Environment Variables
///
/// - `CARENAV_LOG`: Set logging level (trace, debug, info, warn, error)
/// - `CARENAV_DATA_DIR`: Override data directory location
///
/// Logs go to stderr; stdout carries protocol traffic only.
#[cfg(feature = "mcp-server")]
fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("[carenav::mcp-stdio] Failed to start runtime: {err:?}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run_mcp_stdio()) {
        eprintln!("[carenav::mcp-stdio] Runtime failed: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "mcp-server"))]
fn main() {
    eprintln!(
        "[carenav::mcp-stdio] Build with `--features mcp-server` to enable the MCP stdio server."
    );
    eprintln!("Example: cargo build --release --bin mcp-stdio --features mcp-server");
    std::process::exit(1);
}
