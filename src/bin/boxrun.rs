//! boxrun command-line interface.
//!
//! ```text
//! boxrun run <image> <command> [args...]   pull if needed, then run
//! boxrun pull <image>                      pull into the local store
//! boxrun version                           print the version
//! boxrun help                              print usage
//! ```
//!
//! `run` exits with the sandboxed command's exit code; internal failures
//! exit with 1 after printing `error: <message>` to stderr.

use boxrun::{ensure_image, run_in_sandbox, Config};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Parsed command line.
enum Command {
    Run {
        image: String,
        command: String,
        args: Vec<String>,
    },
    Pull {
        image: String,
    },
    Version,
    Help,
}

fn print_usage() {
    eprintln!("Usage: boxrun <command> [arguments]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <image> <command> [args...]  Run a command inside an image");
    eprintln!("  pull <image>                     Pull an image into the local store");
    eprintln!("  version                          Print the version");
    eprintln!("  help                             Print this message");
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        Some("run") => {
            if args.len() < 3 {
                return Err("run requires <image> <command>".to_string());
            }
            Ok(Command::Run {
                image: args[1].clone(),
                command: args[2].clone(),
                args: args[3..].to_vec(),
            })
        }
        Some("pull") => {
            if args.len() != 2 {
                return Err("pull requires <image>".to_string());
            }
            Ok(Command::Pull {
                image: args[1].clone(),
            })
        }
        Some("version") | Some("--version") => Ok(Command::Version),
        Some("help") | Some("--help") | None => Ok(Command::Help),
        Some(other) => Err(format!("unknown command '{}'", other)),
    }
}

async fn cmd_run(image: &str, command: &str, args: &[String]) -> ExitCode {
    let config = Config::new();

    let image_id = match ensure_image(&config, image).await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_in_sandbox(&config, &image_id, command, args) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_pull(image: &str) -> ExitCode {
    let config = Config::new();
    match ensure_image(&config, image).await {
        Ok(image_id) => {
            println!("{}", image_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match parse_args(&args) {
        Ok(Command::Run {
            image,
            command,
            args,
        }) => cmd_run(&image, &command, &args).await,
        Ok(Command::Pull { image }) => cmd_pull(&image).await,
        Ok(Command::Version) => {
            println!("boxrun {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Ok(Command::Help) => {
            print_usage();
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {}", message);
            print_usage();
            ExitCode::FAILURE
        }
    }
}
