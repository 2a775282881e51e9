use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drive_export::config::Config;
use drive_export::{run, Outcome};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so inspection output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Exits with status 2 when the file name is missing
    let config = Config::parse();

    info!("Google Drive export");
    info!("  Credentials: {}", config.credentials_file.display());
    info!("  Output directory: {}", config.output_dir().display());

    match run(&config).await {
        Ok(Outcome::Exported(file)) => {
            info!(
                "Wrote {} ({} bytes)",
                file.path.display(),
                file.bytes_written
            );
            ExitCode::SUCCESS
        }
        Ok(Outcome::Inspected) => ExitCode::SUCCESS,
        Err(err) => {
            for cause in err.chain() {
                eprintln!("ERROR: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
