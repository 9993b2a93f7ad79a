use anyhow::Result;
use clap::Parser;
use module_loader::cli::{resolve_config, run_module, show_graph, Commands, ModuleLoaderCli};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ModuleLoaderCli::parse();
    let config = resolve_config(&cli).await?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting module-loader v{}", env!("CARGO_PKG_VERSION"));

    let result = match &cli.command {
        Commands::Run(args) => run_module(&config, args).await,
        Commands::Graph(args) => show_graph(&config, args).await,
    };

    if let Err(e) = &result {
        error!("❌ {e:#}");
    }
    result
}
