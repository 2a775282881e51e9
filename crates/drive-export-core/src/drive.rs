use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::error::Result;

/// Byte stream produced by a server-side export. Consumed exactly once.
pub type ExportStream = BoxStream<'static, Result<Bytes>>;

/// Target format of a server-side export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    pub mime_type: &'static str,
    pub extension: &'static str,
}

impl ExportFormat {
    /// OpenDocument spreadsheet, the only format the exporter writes.
    pub const ODS: ExportFormat = ExportFormat {
        mime_type: "application/x-vnd.oasis.opendocument.spreadsheet",
        extension: "ods",
    };

    /// Whether an `exportLinks` key denotes this format.
    ///
    /// Drive lists ODS under both the `x-vnd` and the registered `vnd` type.
    pub fn matches_link_key(&self, key: &str) -> bool {
        if key == self.mime_type {
            return true;
        }
        match self.mime_type.strip_prefix("application/x-") {
            Some(rest) => key.strip_prefix("application/") == Some(rest),
            None => false,
        }
    }
}

/// Metadata record for a remote file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Export MIME type -> download URL. Only present for native documents.
    #[serde(default)]
    pub export_links: HashMap<String, String>,
    #[serde(default)]
    pub kind: Option<String>,
    /// Drive reports sizes as decimal strings.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
}

impl FileDescriptor {
    /// Export link for the given format, if Drive offered one.
    pub fn export_link(&self, format: ExportFormat) -> Option<&str> {
        self.export_links
            .iter()
            .find(|(key, _)| format.matches_link_key(key))
            .map(|(_, url)| url.as_str())
    }
}

/// A shared drive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DriveInfo {
    pub id: String,
    pub name: String,
}

/// Account information for the authenticated identity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AboutInfo {
    #[serde(default)]
    pub user: Option<AboutUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutUser {
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Exact, case-sensitive name filter in Drive query syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery(String);

impl SearchQuery {
    pub fn name_equals(name: &str) -> Self {
        let mut escaped = String::with_capacity(name.len());
        for c in name.chars() {
            if c == '\'' || c == '\\' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        Self(format!("name = '{}'", escaped))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote file-storage operations used by the exporter.
///
/// Implementations own authentication; callers only pass identifiers.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Run a metadata search and return the first page of matches.
    ///
    /// Matches carry only `id`, `name` and `mimeType`.
    async fn search(&self, query: &SearchQuery, page_size: u32) -> Result<Vec<FileDescriptor>>;

    /// Fetch `id`, `name`, `mimeType` and `exportLinks` for one file.
    async fn get_metadata(&self, file_id: &str) -> Result<FileDescriptor>;

    /// Export a native document converted to `format`.
    async fn export(&self, file_id: &str, format: ExportFormat) -> Result<ExportStream>;

    /// Download an `exportLinks` URL with the identity's bearer token.
    async fn fetch_export_link(&self, url: &str) -> Result<ExportStream>;

    /// First page of files visible to the identity, with diagnostic fields.
    async fn list_files(&self, page_size: u32) -> Result<Vec<FileDescriptor>>;

    /// Shared drives visible to the identity.
    async fn list_drives(&self) -> Result<Vec<DriveInfo>>;

    /// Account information for the authenticated identity.
    async fn about(&self) -> Result<AboutInfo>;
}
