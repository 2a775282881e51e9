//! Name lookup and export-to-disk on top of a `DriveApi`.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::drive::{DriveApi, ExportFormat, ExportStream, SearchQuery};
use crate::error::{FetchError, Result};

/// Page size of the name search. Only the first page is inspected.
pub const SEARCH_PAGE_SIZE: u32 = 10;

/// A file written by an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Locates one remote document by name and writes its ODS export locally.
pub struct DocumentFetcher<A> {
    api: A,
    format: ExportFormat,
}

impl<A: DriveApi> DocumentFetcher<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            format: ExportFormat::ODS,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Resolve an exact display name to the id of the single matching file.
    #[instrument(skip(self), level = "debug")]
    pub async fn locate(&self, name: &str) -> Result<String> {
        let query = SearchQuery::name_equals(name);
        let mut files = self.api.search(&query, SEARCH_PAGE_SIZE).await?;

        if files.len() != 1 {
            return Err(FetchError::AmbiguousLookup {
                name: name.to_string(),
                count: files.len(),
            });
        }

        let file = files.remove(0);
        debug!("Resolved '{}' to file {}", name, file.id);
        Ok(file.id)
    }

    /// Export `file_id` and write it to `<output_dir>/<remote name>.<ext>`.
    ///
    /// An existing file of that name is overwritten. A failure mid-stream
    /// leaves the partial file in place.
    #[instrument(skip(self), level = "debug")]
    pub async fn export_to_dir(&self, file_id: &str, output_dir: &Path) -> Result<ExportedFile> {
        let metadata = self.api.get_metadata(file_id).await?;
        let stream = self.api.export(file_id, self.format).await?;

        let path = output_dir.join(output_file_name(&metadata.name, self.format));
        let bytes_written = write_stream(&path, stream).await?;

        info!(
            "Exported '{}' ({}) to {} ({} bytes)",
            metadata.name,
            file_id,
            path.display(),
            bytes_written
        );

        Ok(ExportedFile {
            path,
            bytes_written,
        })
    }

    /// `locate` followed by `export_to_dir`. Nothing is exported unless the
    /// name resolves to exactly one file.
    pub async fn fetch_by_name(&self, name: &str, output_dir: &Path) -> Result<ExportedFile> {
        let file_id = self.locate(name).await?;
        self.export_to_dir(&file_id, output_dir).await
    }
}

/// Local file name for a remote document. Path separators in the remote
/// name are replaced so the file stays inside the output directory.
fn output_file_name(remote_name: &str, format: ExportFormat) -> String {
    let stem: String = remote_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}.{}", stem, format.extension)
}

/// Copy the stream into `path`. The file is flushed and closed before this
/// returns, including when the stream fails part way.
async fn write_stream(path: &Path, mut stream: ExportStream) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    let copied: Result<()> = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(())
    }
    .await;

    let flushed = file.flush().await;
    drop(file);

    copied?;
    flushed?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    use super::*;
    use crate::drive::{AboutInfo, DriveInfo, FileDescriptor};

    /// In-memory Drive recording every call it receives.
    #[derive(Default)]
    struct FakeDrive {
        files: Vec<FileDescriptor>,
        chunks: Vec<&'static [u8]>,
        fail_after_chunks: Option<usize>,
        queries: Mutex<Vec<(String, u32)>>,
        exports: Mutex<Vec<(String, &'static str)>>,
    }

    impl FakeDrive {
        fn with_files(names: &[(&str, &str)]) -> Self {
            Self {
                files: names
                    .iter()
                    .map(|(id, name)| FileDescriptor {
                        id: id.to_string(),
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }
        }

        fn exports(&self) -> Vec<(String, &'static str)> {
            self.exports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DriveApi for FakeDrive {
        async fn search(&self, query: &SearchQuery, page_size: u32) -> Result<Vec<FileDescriptor>> {
            self.queries
                .lock()
                .unwrap()
                .push((query.to_string(), page_size));
            Ok(self.files.clone())
        }

        async fn get_metadata(&self, file_id: &str) -> Result<FileDescriptor> {
            self.files
                .iter()
                .find(|f| f.id == file_id)
                .cloned()
                .ok_or_else(|| FetchError::Remote(format!("404 Not Found: {}", file_id)))
        }

        async fn export(&self, file_id: &str, format: ExportFormat) -> Result<ExportStream> {
            self.exports
                .lock()
                .unwrap()
                .push((file_id.to_string(), format.mime_type));

            let fail_after = self.fail_after_chunks;
            let items: Vec<Result<Bytes>> = self
                .chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| match fail_after {
                    Some(n) if i >= n => Err(FetchError::Remote("connection reset".into())),
                    _ => Ok(Bytes::from_static(*chunk)),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }

        async fn fetch_export_link(&self, url: &str) -> Result<ExportStream> {
            Err(FetchError::Remote(format!("unexpected export link fetch: {}", url)))
        }

        async fn list_files(&self, _page_size: u32) -> Result<Vec<FileDescriptor>> {
            Ok(self.files.clone())
        }

        async fn list_drives(&self) -> Result<Vec<DriveInfo>> {
            Ok(Vec::new())
        }

        async fn about(&self) -> Result<AboutInfo> {
            Ok(AboutInfo::default())
        }
    }

    #[tokio::test]
    async fn test_zero_matches_reports_count_and_skips_export() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = DocumentFetcher::new(FakeDrive::default());

        let err = fetcher
            .fetch_by_name("Budget", temp_dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::AmbiguousLookup { count: 0, .. }));
        assert!(err.to_string().contains("invalid amount = 0"));
        assert!(fetcher.api().exports().is_empty());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_matches_reports_exact_count() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher =
            DocumentFetcher::new(FakeDrive::with_files(&[("a", "Budget"), ("b", "Budget")]));

        let err = fetcher
            .fetch_by_name("Budget", temp_dir.path())
            .await
            .unwrap_err();

        assert_eq!(err.lookup_count(), Some(2));
        assert!(fetcher.api().exports().is_empty());
    }

    #[tokio::test]
    async fn test_search_uses_exact_name_and_page_size() {
        let fetcher = DocumentFetcher::new(FakeDrive::with_files(&[("x", "Budget")]));

        let id = fetcher.locate("Budget").await.unwrap();

        assert_eq!(id, "x");
        let queries = fetcher.api().queries.lock().unwrap().clone();
        assert_eq!(queries, vec![("name = 'Budget'".to_string(), SEARCH_PAGE_SIZE)]);
    }

    #[tokio::test]
    async fn test_single_match_exports_once_and_writes_all_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let mut drive = FakeDrive::with_files(&[("X", "Budget")]);
        drive.chunks = vec![&b"PK\x03\x04"[..], &b"content.xml"[..], &b"\x00\x01\x02"[..]];
        let fetcher = DocumentFetcher::new(drive);

        let exported = fetcher
            .fetch_by_name("Budget", temp_dir.path())
            .await
            .unwrap();

        assert_eq!(
            fetcher.api().exports(),
            vec![("X".to_string(), ExportFormat::ODS.mime_type)]
        );
        assert_eq!(exported.path, temp_dir.path().join("Budget.ods"));
        let content = tokio::fs::read(&exported.path).await.unwrap();
        assert_eq!(content, b"PK\x03\x04content.xml\x00\x01\x02");
        assert_eq!(exported.bytes_written, content.len() as u64);
    }

    #[tokio::test]
    async fn test_existing_file_is_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("Budget.ods");
        tokio::fs::write(&target, vec![b'z'; 64]).await.unwrap();

        let mut drive = FakeDrive::with_files(&[("X", "Budget")]);
        drive.chunks = vec![&b"short"[..]];
        let fetcher = DocumentFetcher::new(drive);

        fetcher.export_to_dir("X", temp_dir.path()).await.unwrap();

        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_stream_failure_leaves_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut drive = FakeDrive::with_files(&[("X", "Budget")]);
        drive.chunks = vec![&b"first"[..], &b"second"[..]];
        drive.fail_after_chunks = Some(1);
        let fetcher = DocumentFetcher::new(drive);

        let err = fetcher
            .export_to_dir("X", temp_dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Remote(_)));
        let content = tokio::fs::read(temp_dir.path().join("Budget.ods"))
            .await
            .unwrap();
        assert_eq!(content, b"first");
    }

    #[tokio::test]
    async fn test_written_chunks_are_on_disk_when_stream_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Budget.ods");
        let big_chunk = Bytes::from(vec![0x5au8; 8 * 1024 * 1024]);
        let items: Vec<Result<Bytes>> = vec![
            Ok(big_chunk.clone()),
            Err(FetchError::Remote("connection reset".into())),
        ];

        let err = write_stream(&path, stream::iter(items).boxed())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Remote(_)));
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, big_chunk.len() as u64);
    }

    #[tokio::test]
    async fn test_missing_output_dir_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut drive = FakeDrive::with_files(&[("X", "Budget")]);
        drive.chunks = vec![&b"data"[..]];
        let fetcher = DocumentFetcher::new(drive);

        let err = fetcher
            .export_to_dir("X", &temp_dir.path().join("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Io(_)));
    }

    #[test]
    fn test_output_file_name_stays_in_directory() {
        assert_eq!(output_file_name("Budget", ExportFormat::ODS), "Budget.ods");
        assert_eq!(
            output_file_name("2024/Q1\\draft", ExportFormat::ODS),
            "2024_Q1_draft.ods"
        );
    }
}
