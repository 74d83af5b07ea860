mod commands;
mod config;
mod serve;
mod store;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::create::CreateArgs;
use crate::commands::move_deal::MoveArgs;
use crate::config::ServeConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Bondflow deal stage workflow engine.
#[derive(Parser)]
#[command(name = "bondflow", version, about = "Bondflow deal stage workflow engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    /// JSON snapshot file holding the deal store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map stage spellings to their canonical stage
    Normalize {
        /// Raw stage values, as stored or typed
        #[arg(required = true)]
        raw: Vec<String>,
    },

    /// Create a deal
    Create(CreateArgs),

    /// Move a deal to another stage
    Move(MoveArgs),

    /// Show the reconciled bank notes of a deal for a stage
    Banks {
        /// Deal id or deal code
        deal: String,
        /// Stage whose notes to show
        #[arg(long, default_value = "submitted")]
        stage: String,
    },

    /// Show the deduplicated activity feed
    Activity {
        /// Search deal codes, actors and stages
        #[arg(long, short)]
        query: Option<String>,
        /// Maximum entries to show (1-1000)
        #[arg(long)]
        limit: Option<usize>,
        /// Only this deal's recorded moves
        #[arg(long)]
        deal: Option<String>,
        /// Build the feed from deal move histories instead of activity rows
        #[arg(long, conflicts_with = "deal")]
        from_history: bool,
    },

    /// Start the HTTP JSON API server
    Serve {
        /// Port to listen on [default: 8080]
        #[arg(long)]
        port: Option<u16>,
        /// Require this API key on every request except /health
        #[arg(long)]
        api_key: Option<String>,
        /// Requests per minute allowed per client IP
        #[arg(long)]
        rate_limit: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut config = match ServeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e.to_string(), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    if let Some(store) = cli.store {
        config.store_path = Some(store);
    }

    match cli.command {
        Commands::Normalize { raw } => commands::normalize::cmd_normalize(&raw, cli.output),
        Commands::Create(args) => commands::create::cmd_create(args, &config, cli.output, cli.quiet),
        Commands::Move(args) => commands::move_deal::cmd_move(args, &config, cli.output, cli.quiet),
        Commands::Banks { deal, stage } => {
            commands::banks::cmd_banks(&deal, &stage, &config, cli.output, cli.quiet)
        }
        Commands::Activity {
            query,
            limit,
            deal,
            from_history,
        } => commands::activity::cmd_activity(
            commands::activity::FeedQuery {
                query,
                limit,
                deal,
                from_history,
            },
            &config,
            cli.output,
            cli.quiet,
        ),
        Commands::Serve {
            port,
            api_key,
            rate_limit,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(key) = api_key {
                config.api_key = Some(key);
            }
            if let Some(limit) = rate_limit {
                config.rate_limit_per_minute = limit;
            }
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(
                        &format!("failed to create tokio runtime: {}", e),
                        cli.output,
                        cli.quiet,
                    );
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Report an error message respecting output format and quiet flag.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{{\"error\": \"{}\"}}", msg.replace('"', "\\\""));
        }
    }
}
