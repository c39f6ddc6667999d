use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lpo")]
#[command(about = "Lending protocol oracle CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (defaults -> market overlay -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Replay a scenario file against the paper ledger
    Run {
        /// Scenario file (YAML or JSON)
        scenario: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Write the JSON report here
        #[arg(long)]
        report: Option<String>,
    },

    /// Predict the post-action state from a JSON before-state
    Predict {
        /// Prediction request (JSON)
        #[arg(long)]
        input: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = lpo_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Run {
            scenario,
            config_paths,
            report,
        } => {
            commands::run::run_scenario(&scenario, &config_paths, report.as_deref())?;
        }

        Commands::Predict {
            input,
            config_paths,
        } => {
            commands::predict::predict_from_file(&input, &config_paths)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
