//! vigil — endpoint liveness monitoring tools.
//!
//! Two subcommands:
//! - `watch`: monitor a list of endpoints and keep printing the selected
//!   live one.
//! - `serve`: run synthetic servers whose behavior (up/down/hang/error) is
//!   driven interactively from stdin, for exercising the monitor.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "vigil — endpoint liveness monitor",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor endpoints and print the selected live one
    Watch {
        /// Targets: `host:port`, `http(s)://…`, or a bare port (implies localhost)
        #[arg(required = true)]
        targets: Vec<String>,

        /// Selection policy: first-live, round-robin, or random
        #[arg(long, default_value = "round-robin")]
        policy: String,

        /// Check period in milliseconds
        #[arg(long, default_value = "500")]
        period_ms: u64,

        /// Consecutive failures tolerated before an endpoint is declared down
        #[arg(long, default_value = "0")]
        retries: u32,

        /// Seconds between printed selections
        #[arg(long, default_value = "10")]
        print_interval: u64,
    },
    /// Run synthetic servers on the given ports
    Serve {
        /// Ports to listen on
        #[arg(required = true)]
        ports: Vec<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().expect("static filter")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            targets,
            policy,
            period_ms,
            retries,
            print_interval,
        } => commands::watch::run(targets, &policy, period_ms, retries, print_interval).await,
        Commands::Serve { ports } => commands::serve::run(ports).await,
    }
}
