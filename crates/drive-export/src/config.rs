use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

/// Default service-account key file, relative to the working directory.
pub const DEFAULT_CREDENTIALS_FILE: &str = ".credentials.json";

/// Default Google Drive API v3 root.
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Configuration for the drive-export command.
#[derive(Parser, Debug, Clone)]
#[command(name = "drive-export")]
#[command(about = "Export a Google Drive spreadsheet by name to a local .ods file")]
pub struct Config {
    /// Exact display name of the remote document (case-sensitive)
    #[arg(required_unless_present_any = ["inspect", "file_id"])]
    pub file_name: Option<String>,

    /// Directory the exported file is written to (default: current directory)
    pub output_path: Option<PathBuf>,

    /// Service-account JSON key file
    #[arg(default_value = DEFAULT_CREDENTIALS_FILE)]
    pub credentials_file: PathBuf,

    /// Export this file id directly instead of searching by name
    #[arg(long)]
    pub file_id: Option<String>,

    /// Run a diagnostic query instead of exporting
    #[arg(long, value_enum)]
    pub inspect: Option<Inspect>,

    /// Per-request timeout in seconds (no timeout when unset)
    #[arg(long, env = "DRIVE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Google Drive API root
    #[arg(long, default_value = DEFAULT_API_BASE_URL, env = "DRIVE_API_BASE_URL", hide = true)]
    pub api_base_url: String,
}

/// Diagnostic queries available through `--inspect`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inspect {
    /// First page of files visible to the service account
    Files,
    /// Shared drives visible to the service account
    Drives,
    /// Account the credential authenticates as
    About,
    /// Export links of the named file
    ExportLinks,
}

impl Config {
    /// Output directory, with an absent path resolved to the working directory.
    pub fn output_dir(&self) -> &Path {
        self.output_path.as_deref().unwrap_or(Path::new("."))
    }
}
