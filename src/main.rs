//! CLI entry point (spec §6 "External Interfaces"). Out-of-scope glue
//! around the core library: parses arguments, drives a replay set or a
//! single record, and maps the result to a process exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rcmd", about = "Record-and-replay automation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs every record in a replay set and writes results.json/incomplete.set.
    Replay {
        /// Replay-set id (looks for `<set>.set` under --root).
        set: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Runs a single `.rcmd` record and prints its result as JSON.
    Check {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    rcmd::logging::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Replay { set, root, out } => run_replay(&set, &root, out).await,
        Commands::Check { path } => run_check(&path).await,
    }
}

async fn run_replay(set_name: &str, root: &PathBuf, out: Option<PathBuf>) -> ExitCode {
    let set_path = root.join(format!("{}.set", set_name));
    let replay_set = match rcmd::ReplaySet::load(&set_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to load replay set '{}': {}", set_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let result = replay_set.run(root).await;
    let out_dir = out.unwrap_or_else(|| root.join("results").join(set_name));
    if let Err(e) = rcmd::replayer::write_outputs(&out_dir, &result) {
        eprintln!("failed to write results: {}", e);
        return ExitCode::FAILURE;
    }
    println!("{}", result.to_json().unwrap_or_default());
    ExitCode::from(result.exit_code() as u8)
}

async fn run_check(path: &PathBuf) -> ExitCode {
    match rcmd::replayer::run_single(path).await {
        Ok(result) => {
            let passed = result.passed;
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("failed to run '{}': {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}
