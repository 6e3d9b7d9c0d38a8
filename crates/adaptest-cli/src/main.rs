//! adaptest CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "adaptest", version, about = "Adaptive assessment engine (Rasch CAT)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run simulated learners through adaptive sessions
    Simulate {
        /// Path to .toml item bank or directory
        #[arg(long)]
        bank: PathBuf,

        /// True abilities to simulate (comma-separated)
        #[arg(long, default_value = "-1.5,0,1.5", allow_hyphen_values = true)]
        thetas: String,

        /// Simulated learners per ability
        #[arg(long, default_value = "10")]
        learners: usize,

        /// Max concurrent sessions (default: from config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Seed for simulated responses
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output directory (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Take an adaptive session interactively on the terminal
    Take {
        /// Path to .toml item bank or directory
        #[arg(long)]
        bank: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Estimate ability from a JSON response history
    Estimate {
        /// JSON file with [{"difficulty": .., "is_correct": ..}, ...]
        #[arg(long)]
        history: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Normalize and grade an answer against a canonical answer
    Check {
        /// The answer as typed by the learner
        #[arg(long, allow_hyphen_values = true)]
        given: String,

        /// The expected answer
        #[arg(long, allow_hyphen_values = true)]
        canonical: String,
    },

    /// Validate item bank TOML files
    Validate {
        /// Path to item bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Create starter config and example item bank
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adaptest=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            bank,
            thetas,
            learners,
            parallelism,
            seed,
            output,
            config,
        } => {
            commands::simulate::execute(bank, thetas, learners, parallelism, seed, output, config)
                .await
        }
        Commands::Take { bank, config } => commands::take::execute(bank, config).await,
        Commands::Estimate { history, config } => commands::estimate::execute(history, config),
        Commands::Check { given, canonical } => commands::check::execute(&given, &canonical),
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
