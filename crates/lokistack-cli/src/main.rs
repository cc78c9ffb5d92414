//! LokiStack CLI - run the operator or render a stack offline
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! lokistack run
//!
//! # Render everything a stack would apply
//! lokistack render lokistack.yaml --secret loki-s3.yaml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod display;
mod error;
mod exit_codes;

use config::OperatorConfig;

#[derive(Parser)]
#[command(name = "lokistack")]
#[command(version)]
#[command(about = "Operator for Loki clusters described by LokiStack resources", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the configuration and manifests of a stack
    Render {
        /// LokiStack manifest
        stack: PathBuf,

        /// Object storage secret manifest
        #[arg(short, long)]
        secret: PathBuf,

        /// Target namespace (defaults to the manifest's)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Reference time for schema validation (RFC 3339)
        #[arg(long)]
        at: Option<String>,

        /// Output directory (if not set, outputs to stdout)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print only the rendered Loki configuration
        #[arg(long)]
        config_only: bool,

        #[command(flatten)]
        operator: OperatorConfig,
    },

    /// Check a stack and its secret without a cluster
    Validate {
        /// LokiStack manifest
        stack: PathBuf,

        /// Object storage secret manifest
        #[arg(short, long)]
        secret: Option<PathBuf>,

        /// Reference time for schema validation (RFC 3339)
        #[arg(long)]
        at: Option<String>,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        operator: OperatorConfig,
    },

    /// Print the LokiStack CustomResourceDefinition
    Crd,

    /// Run the controller
    Run {
        #[command(flatten)]
        operator: OperatorConfig,
    },
}

fn init_tracing(cli: &Cli) {
    let default_level = match (&cli.command, cli.debug) {
        (_, true) => "debug",
        (Commands::Run { .. }, false) => "info",
        _ => "warn",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match &cli.command {
        Commands::Render {
            stack,
            secret,
            namespace,
            at,
            output_dir,
            config_only,
            operator,
        } => commands::render::run(commands::render::RenderArgs {
            stack,
            secret,
            namespace: namespace.as_deref(),
            at: at.as_deref(),
            output_dir: output_dir.as_deref(),
            config_only: *config_only,
            operator,
        }),

        Commands::Validate {
            stack,
            secret,
            at,
            json,
            operator,
        } => commands::validate::run(stack, secret.as_deref(), at.as_deref(), *json, operator),

        Commands::Crd => commands::crd::run(),

        Commands::Run { operator } => commands::run::run(operator).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
