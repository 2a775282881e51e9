//! Diagnostic queries. Each prints a human-readable summary; nothing is
//! written to disk.

use std::io::Write;

use drive_export_core::{DriveApi, ExportFormat, FetchError, SEARCH_PAGE_SIZE};
use futures::StreamExt;

/// Print the first page of files with their export links.
pub async fn files<A: DriveApi>(api: &A, out: &mut impl Write) -> Result<(), FetchError> {
    let files = api.list_files(SEARCH_PAGE_SIZE).await?;

    writeln!(out, "Files ({}):", files.len())?;
    if files.is_empty() {
        writeln!(out, "No files found.")?;
        return Ok(());
    }

    for file in &files {
        writeln!(out, "{} ({})", file.name, file.id)?;
        writeln!(out, "\texport links: {}", file.export_links.len())?;
        let mut links: Vec<_> = file.export_links.iter().collect();
        links.sort();
        for (mime_type, url) in links {
            writeln!(out, "\t\t{} : {}", mime_type, url)?;
        }
        writeln!(out, "\tkind: {}", file.kind.as_deref().unwrap_or("-"))?;
        writeln!(out, "\tmime: {}", file.mime_type.as_deref().unwrap_or("-"))?;
        writeln!(out, "\tsize: {}", file.size.as_deref().unwrap_or("-"))?;
        writeln!(out, "\tcreated: {}", file.created_time.as_deref().unwrap_or("-"))?;
    }
    Ok(())
}

/// Print the shared drives visible to the credential.
pub async fn drives<A: DriveApi>(api: &A, out: &mut impl Write) -> Result<(), FetchError> {
    let drives = api.list_drives().await?;

    writeln!(out, "Drives ({}):", drives.len())?;
    if drives.is_empty() {
        writeln!(out, "No drives found.")?;
    }
    for drive in &drives {
        writeln!(out, "{} ({})", drive.name, drive.id)?;
    }
    Ok(())
}

/// Print the account the credential authenticates as.
pub async fn about<A: DriveApi>(api: &A, out: &mut impl Write) -> Result<(), FetchError> {
    let about = api.about().await?;
    let email = about
        .user
        .and_then(|u| u.email_address)
        .unwrap_or_else(|| "unknown".to_string());
    writeln!(out, "About ({}):", email)?;
    Ok(())
}

/// Print every export link of one file, marking the ODS one, then resolve
/// the ODS link with the bearer token and report how many bytes it served.
pub async fn export_links<A: DriveApi>(
    api: &A,
    file_id: &str,
    out: &mut impl Write,
) -> Result<(), FetchError> {
    let file = api.get_metadata(file_id).await?;

    writeln!(out, "{} ({})", file.name, file.id)?;
    if file.export_links.is_empty() {
        writeln!(out, "\tno export links (not a native Google document)")?;
        return Ok(());
    }

    let mut links: Vec<_> = file.export_links.iter().collect();
    links.sort();
    for (mime_type, url) in links {
        let marker = if ExportFormat::ODS.matches_link_key(mime_type) {
            " *"
        } else {
            ""
        };
        writeln!(out, "\t{} : {}{}", mime_type, url, marker)?;
    }

    match file.export_link(ExportFormat::ODS) {
        Some(url) => {
            let mut stream = api.fetch_export_link(url).await?;
            let mut bytes = 0u64;
            while let Some(chunk) = stream.next().await {
                bytes += chunk?.len() as u64;
            }
            writeln!(out, "ods link resolved: {} bytes", bytes)?;
        }
        None => writeln!(out, "no ods export link")?,
    }
    Ok(())
}
