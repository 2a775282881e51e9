//! Core traits and types for exporting Google Drive documents.
//!
//! This crate defines the pieces shared by the CLI and its tests:
//! - `DriveApi`: the remote file-storage operations the exporter relies on
//! - `DocumentFetcher`: name lookup, export, and the local file write
//! - `FetchError`: every failure an invocation can surface

mod drive;
mod error;
mod fetcher;

pub use drive::{
    AboutInfo, AboutUser, DriveApi, DriveInfo, ExportFormat, ExportStream, FileDescriptor,
    SearchQuery,
};
pub use error::FetchError;
pub use fetcher::{DocumentFetcher, ExportedFile, SEARCH_PAGE_SIZE};
