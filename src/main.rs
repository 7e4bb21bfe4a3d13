use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sourceindex::config::{Config, LoggingConfig};

mod cli;

#[derive(Parser)]
#[command(name = "sourceindex")]
#[command(version)]
#[command(about = "Cross-reference index host for out-of-process language analyzers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./sourceindex.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Index database (overrides the configured one)
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host server that analyzers connect to
    Serve {
        /// Address to listen on (overrides the configured one)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run a configured analyzer against a private host
    Index {
        /// Language whose analyzer to run
        language: String,

        /// Arguments passed through to the analyzer
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Query the index
    Query {
        /// Query type: declarations, references, implementations, search
        query_type: String,

        /// Normalized symbol name (e.g. csharp:T:Foo) or search pattern
        target: String,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Maximum number of search results
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show a stored file or folder
    Show {
        /// Path below the root, e.g. src/test/foo.cs
        path: String,
    },

    /// Show index statistics
    Stats {
        /// Also break symbols down by kind
        #[arg(short, long)]
        kinds: bool,
    },

    /// List configured language analyzers
    Languages,
}

fn init_logging(logging: &LoggingConfig, debug: bool, verbose: bool) {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format.as_str() {
        "pretty" => builder.pretty().init(),
        "full" => builder.init(),
        _ => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.store.database = database;
    }

    init_logging(&config.logging, cli.debug, cli.verbose);

    info!("sourceindex v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { bind } => {
            cli::serve::serve(&config, bind).await?;
        }

        Commands::Index { language, args } => {
            let code = cli::index::run_index(&config, &language, args).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Query {
            query_type,
            target,
            format,
            limit,
        } => {
            cli::query::query_index(&config, &query_type, &target, &format, limit)?;
        }

        Commands::Show { path } => {
            cli::show::show_path(&config, &path)?;
        }

        Commands::Stats { kinds } => {
            cli::stats::show_stats(&config, kinds)?;
        }

        Commands::Languages => {
            cli::languages::list_languages(&config);
        }
    }

    Ok(())
}
