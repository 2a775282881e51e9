//! Export a Google Drive document, located by exact name, to a local `.ods`
//! file using a service-account credential.

pub mod config;
pub mod credentials;
pub mod gdrive;
pub mod inspect;

use std::time::Duration;

use anyhow::Context;
use drive_export_core::{DocumentFetcher, DriveApi, ExportedFile};
use tracing::{info, warn};

use config::{Config, Inspect};
use credentials::{ServiceAccountCredential, DRIVE_SCOPES};
use gdrive::{ClientOptions, GDriveClient};

/// What an invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exported(ExportedFile),
    Inspected,
}

/// Run one invocation: load the credential, build the client, then export
/// or inspect. Every remote call is awaited in sequence.
pub async fn run(config: &Config) -> anyhow::Result<Outcome> {
    let credential = ServiceAccountCredential::load(&config.credentials_file, DRIVE_SCOPES)
        .await
        .context("Failed to load service account credential")?;

    let client = GDriveClient::new(
        credential,
        ClientOptions {
            api_base_url: config.api_base_url.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        },
    )
    .context("Failed to create Google Drive client")?;
    info!(
        "Google Drive client ready for {}",
        client.credential().client_email()
    );

    let fetcher = DocumentFetcher::new(client);

    if let Some(inspect) = config.inspect {
        run_inspect(&fetcher, config, inspect).await?;
        return Ok(Outcome::Inspected);
    }

    let output_dir = config.output_dir();
    let exported = match (&config.file_id, &config.file_name) {
        (Some(file_id), name) => {
            if let Some(name) = name {
                warn!("--file-id {} given, not searching for '{}'", file_id, name);
            }
            info!("Exporting file {} to {}", file_id, output_dir.display());
            fetcher
                .export_to_dir(file_id, output_dir)
                .await
                .with_context(|| format!("Failed to export file {}", file_id))?
        }
        (None, Some(name)) => {
            info!("Looking for '{}', output to {}", name, output_dir.display());
            fetcher
                .fetch_by_name(name, output_dir)
                .await
                .inspect_err(|err| {
                    if let Some(count) = err.lookup_count() {
                        warn!("'{}' matched {} files, expected exactly one", name, count);
                    }
                })
                .with_context(|| format!("Failed to export '{}'", name))?
        }
        (None, None) => anyhow::bail!("no file name or file id given"),
    };

    Ok(Outcome::Exported(exported))
}

async fn run_inspect<A: DriveApi>(
    fetcher: &DocumentFetcher<A>,
    config: &Config,
    inspect: Inspect,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout();
    let api = fetcher.api();

    match inspect {
        Inspect::Files => inspect::files(api, &mut out).await?,
        Inspect::Drives => inspect::drives(api, &mut out).await?,
        Inspect::About => inspect::about(api, &mut out).await?,
        Inspect::ExportLinks => {
            let file_id = match (&config.file_id, &config.file_name) {
                (Some(file_id), _) => file_id.clone(),
                (None, Some(name)) => fetcher.locate(name).await?,
                (None, None) => anyhow::bail!("--inspect export-links needs a file name or --file-id"),
            };
            inspect::export_links(api, &file_id, &mut out).await?;
        }
    }
    Ok(())
}
