//! ecs-elastic: operator tooling for the elastic agent scheduler.
//!
//! # Usage
//!
//! ```text
//! ecs-elastic validate --settings elastic.toml
//! ecs-elastic plan --settings elastic.toml --request request.json
//! ecs-elastic simulate --settings elastic.toml --request request.json --reject-capacity
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "ecs-elastic",
    about = "Elastic build agents on a container backend",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a settings file and print a summary
    Validate {
        #[arg(short, long)]
        settings: PathBuf,
    },
    /// Print the task definition a request would register
    Plan {
        #[arg(short, long)]
        settings: PathBuf,
        /// Schedule request (JSON)
        #[arg(short, long)]
        request: PathBuf,
        /// Server id written into the ownership labels
        #[arg(long, default_value = commands::DEFAULT_SERVER_ID)]
        server_id: String,
    },
    /// Create, reconcile, and stop a task against an in-memory backend
    Simulate {
        #[arg(short, long)]
        settings: PathBuf,
        #[arg(short, long)]
        request: PathBuf,
        #[arg(long, default_value = commands::DEFAULT_SERVER_ID)]
        server_id: String,
        /// Make every launch report a failure
        #[arg(long)]
        fail_launch: bool,
        /// Reject capacity provider strategies, forcing the launch type fallback
        #[arg(long)]
        reject_capacity: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Validate { settings } => commands::validate::validate(&settings),
        Commands::Plan {
            settings,
            request,
            server_id,
        } => commands::plan::plan(&settings, &request, &server_id),
        Commands::Simulate {
            settings,
            request,
            server_id,
            fail_launch,
            reject_capacity,
        } => {
            let options = commands::simulate::SimulateOptions {
                server_id,
                fail_launch,
                reject_capacity,
            };
            commands::simulate::simulate(&settings, &request, options).await
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => "info,elastic=debug".parse()?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
