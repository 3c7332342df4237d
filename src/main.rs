//! Bench sequencer CLI - runs declarative test sequences against bench instruments

use clap::Parser;
use bench_sequencer::{cli, commands, common::logging};
use commands::Commands;

#[derive(Parser)]
#[command(name = "bench-seq", about = "Run test sequences against bench instruments")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Held until exit so the file writer flushes
    let _guard = match &cli.command {
        Commands::Run {
            verbose,
            log_file: Some(path),
            ..
        } => {
            let path = path.clone().or_else(logging::default_log_path);
            match path {
                Some(path) => match logging::init_with_file(*verbose, &path) {
                    Ok(guard) => Some(guard),
                    Err(e) => {
                        eprintln!("Error: cannot open log file {}: {e}", path.display());
                        std::process::exit(1);
                    }
                },
                None => {
                    logging::init_cli(*verbose);
                    tracing::warn!("No data directory for the default log file");
                    None
                }
            }
        }
        Commands::Run { verbose, .. } => {
            logging::init_cli(*verbose);
            None
        }
        _ => {
            logging::init_cli(false);
            None
        }
    };

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
