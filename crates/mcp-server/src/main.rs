use anyhow::Context;
use clap::Parser;
use mcp_config::ConfigLoader;
use mcp_logging::{init_logging, LogFormat};
use mcp_modbus::OperationDispatcher;
use mcp_server::{wait_for_shutdown, ModbusMcpServer};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "modbus-mcp", author, version, about = "Modbus MCP Server", long_about = None)]
struct Args {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. info or info,mcp_modbus=debug
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format (pretty or json)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();

    let mut loader = ConfigLoader::new(args.config.as_ref());
    if let Some(level) = &args.log_level {
        loader = loader.with_override("logging.level", level.as_str());
    }
    if let Some(format) = args.log_format {
        loader = loader.with_override("logging.format", format.to_string());
    }

    let config = loader
        .load_validated()
        .context("Failed to load configuration")?;

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    init_logging(&config.logging)?;

    tracing::info!(
        transport = %config.modbus.transport,
        host = %config.modbus.host,
        port = config.modbus.port,
        default_slave_id = config.modbus.default_slave_id,
        "Starting Modbus MCP Server"
    );

    let dispatcher = Arc::new(OperationDispatcher::with_tokio_modbus(Arc::new(
        config.modbus.clone(),
    )));
    let server = ModbusMcpServer::new(config.server.clone(), dispatcher);

    tokio::select! {
        result = server.run(tokio::io::stdin(), tokio::io::stdout()) => result?,
        signal = wait_for_shutdown() => {
            tracing::info!("Shutting down on {:?}", signal);
        }
    }

    Ok(())
}
