use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command line interface of the module loader
#[derive(Parser)]
#[command(name = "module-loader")]
#[command(about = "Load, link and evaluate script module graphs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct ModuleLoaderCli {
    #[command(subcommand)]
    pub command: Commands,

    /// Loader configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory module specifiers resolve against
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load, link and evaluate a module and everything it imports
    Run(RunArgs),

    /// Load a module graph without evaluating it and show every entry
    Graph(GraphArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Entry module specifier
    pub entry: String,

    /// Print the registry as JSON after evaluation
    #[arg(long)]
    pub dump_registry: bool,

    /// Supply a module's source from a file instead of fetching it (MODULE=FILE)
    #[arg(long = "provide", value_name = "MODULE=FILE")]
    pub provide: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Entry module specifier
    pub entry: String,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub format: String,
}
