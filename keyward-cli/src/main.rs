//! Keyward CLI - WebAuthn attestation and authenticator data inspector.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod input;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Invalid arguments
  65  Malformed or invalid WebAuthn data
  66  Cannot read input file
  74  Cannot write output";

#[derive(Parser)]
#[command(name = "keyward")]
#[command(author, version, about = "WebAuthn attestation and authenticator data inspector", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Suppress the human-readable report
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an attestation object and describe the credential it carries
    Inspect {
        /// Attestation object: raw CBOR, hex, base64url, or a registration
        /// response JSON. Use `-` for stdin.
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print JSON instead of a report
        #[arg(long)]
        json: bool,
    },

    /// Decode authenticator data given as hex or base64url
    Authdata {
        #[arg(value_name = "DATA")]
        data: String,

        /// Print JSON instead of a report
        #[arg(long)]
        json: bool,
    },

    /// Generate random challenges (base64url)
    Challenge {
        /// Challenge length in bytes
        #[arg(short, long, default_value_t = keyward_core::challenge::DEFAULT_CHALLENGE_BYTES)]
        bytes: usize,

        /// Number of challenges to print
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = &exit.message {
            eprintln!("{} {message}", "error:".red().bold());
        }
        process::exit(exit.code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Inspect { file, json } => commands::inspect::execute(file, json, cli.quiet),
        Commands::Authdata { data, json } => commands::authdata::execute(&data, json, cli.quiet),
        Commands::Challenge { bytes, count } => commands::challenge::execute(bytes, count),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
