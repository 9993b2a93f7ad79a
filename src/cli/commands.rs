use crate::cli::options::{GraphArgs, ModuleLoaderCli, RunArgs};
use crate::cli::output::{print_cycles, print_program_output, print_registry};
use crate::config::LoaderConfig;
use crate::loader::ModuleLoader;
use crate::script::ScriptHooks;
use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};

/// Loads the configuration file (if any) and applies command line overrides
pub async fn resolve_config(cli: &ModuleLoaderCli) -> Result<LoaderConfig> {
    let mut config = match &cli.config {
        Some(path) => LoaderConfig::load(path)
            .await
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => LoaderConfig::default(),
    };

    if let Some(root) = &cli.root {
        config.root_dir = root.clone();
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }

    Ok(config)
}

pub fn build_loader(config: &LoaderConfig) -> ModuleLoader<ScriptHooks> {
    ModuleLoader::new(ScriptHooks::from_config(config)).with_fetch_timeout(config.fetch_timeout())
}

/// Load, link and evaluate the entry module, printing what the bodies printed
pub async fn run_module(config: &LoaderConfig, args: &RunArgs) -> Result<()> {
    let loader = build_loader(config);

    for provided in &args.provide {
        let (spec, file) = provided
            .split_once('=')
            .ok_or_else(|| anyhow!("expected MODULE=FILE, got '{provided}'"))?;
        let key = loader.hooks().resolve_spec(spec, None)?;
        let source = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading provided source {file}"))?;
        loader.provide_fetch(&key, source)?;
        info!(%key, file, "using provided module source");
    }

    let result = loader.load_and_evaluate_module(&args.entry, None, ()).await;
    print_program_output(&loader.hooks().take_output());

    let cycles = loader.cycles();
    if !cycles.is_empty() {
        info!(count = cycles.len(), "module graph contains circular dependencies");
    }
    if args.dump_registry {
        println!("{}", serde_json::to_string_pretty(&loader.snapshot())?);
        print_cycles(&cycles);
    }

    if let Err(err) = &result {
        warn!(error = %err, "module evaluation failed");
    }
    result.with_context(|| format!("running {}", args.entry))
}

/// Load the module graph without evaluating it and report every entry
pub async fn show_graph(config: &LoaderConfig, args: &GraphArgs) -> Result<()> {
    let loader = build_loader(config);
    let result = loader.load_module(&args.entry, None, ()).await;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&loader.snapshot())?),
        "text" => {
            print_registry(&loader.snapshot());
            print_cycles(&loader.cycles());
        }
        other => bail!("unsupported output format '{other}' (expected text or json)"),
    }

    result
        .map(|_| ())
        .with_context(|| format!("loading {}", args.entry))
}
