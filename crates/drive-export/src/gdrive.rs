//! Google Drive API v3 client.
//!
//! Every request carries a bearer token from the service-account credential.
//! Non-success responses become `FetchError::Remote` with status and body.

use std::time::Duration;

use async_trait::async_trait;
use drive_export_core::{
    AboutInfo, DriveApi, DriveInfo, ExportFormat, ExportStream, FetchError, FileDescriptor,
    SearchQuery,
};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::credentials::ServiceAccountCredential;

/// Application identifier sent as the User-Agent of every request.
pub const APPLICATION_NAME: &str = concat!("drive-export/", env!("CARGO_PKG_VERSION"));

const SEARCH_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";
const METADATA_FIELDS: &str = "id, name, mimeType, exportLinks";
const LIST_FIELDS: &str =
    "nextPageToken, files(id, name, mimeType, exportLinks, kind, size, createdTime)";

/// Transport options for the client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base_url: String,
    pub timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base_url: crate::config::DEFAULT_API_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileDescriptor>,
}

#[derive(Debug, Deserialize)]
struct DriveList {
    #[serde(default)]
    drives: Vec<DriveInfo>,
}

/// Authenticated Google Drive API client.
pub struct GDriveClient {
    http: Client,
    credential: ServiceAccountCredential,
    base_url: String,
}

impl GDriveClient {
    pub fn new(
        credential: ServiceAccountCredential,
        options: ClientOptions,
    ) -> Result<Self, FetchError> {
        let mut builder = Client::builder().user_agent(APPLICATION_NAME);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| FetchError::Remote(format!("unable to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credential,
            base_url: options.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn credential(&self) -> &ServiceAccountCredential {
        &self.credential
    }

    /// Attach a bearer token and send.
    async fn send(&self, request: RequestBuilder) -> Result<Response, FetchError> {
        let token = self.credential.access_token(&self.http).await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Remote(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let url = resp.url().path().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Remote(format!(
                "Google Drive API error {} on {}: {}",
                status, url, body
            )));
        }

        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Remote(format!("invalid Google Drive response: {}", e)))
    }
}

fn byte_stream(resp: Response) -> ExportStream {
    resp.bytes_stream()
        .map_err(|e| FetchError::Remote(format!("export stream interrupted: {}", e)))
        .boxed()
}

#[async_trait]
impl DriveApi for GDriveClient {
    #[instrument(skip(self), level = "debug")]
    async fn search(
        &self,
        query: &SearchQuery,
        page_size: u32,
    ) -> Result<Vec<FileDescriptor>, FetchError> {
        let page_size = page_size.to_string();
        let request = self.http.get(format!("{}/files", self.base_url)).query(&[
            ("q", query.as_str()),
            ("pageSize", page_size.as_str()),
            ("fields", SEARCH_FIELDS),
        ]);

        let list: FileList = self.get_json(request).await?;
        debug!("Search {} returned {} file(s)", query, list.files.len());
        Ok(list.files)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_metadata(&self, file_id: &str) -> Result<FileDescriptor, FetchError> {
        let request = self
            .http
            .get(format!("{}/files/{}", self.base_url, file_id))
            .query(&[("fields", METADATA_FIELDS)]);

        let metadata: FileDescriptor = self.get_json(request).await?;
        debug!("Got metadata for file {}: {:?}", file_id, metadata);
        Ok(metadata)
    }

    #[instrument(skip(self), level = "debug")]
    async fn export(
        &self,
        file_id: &str,
        format: ExportFormat,
    ) -> Result<ExportStream, FetchError> {
        let request = self
            .http
            .get(format!("{}/files/{}/export", self.base_url, file_id))
            .query(&[("mimeType", format.mime_type)]);

        let resp = self.send(request).await?;
        debug!("Export of {} as {} started", file_id, format.mime_type);
        Ok(byte_stream(resp))
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_export_link(&self, url: &str) -> Result<ExportStream, FetchError> {
        let resp = self.send(self.http.get(url)).await?;
        debug!("Export link {} answered {}", url, resp.status());
        Ok(byte_stream(resp))
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_files(&self, page_size: u32) -> Result<Vec<FileDescriptor>, FetchError> {
        let page_size = page_size.to_string();
        let request = self.http.get(format!("{}/files", self.base_url)).query(&[
            ("pageSize", page_size.as_str()),
            ("fields", LIST_FIELDS),
        ]);

        let list: FileList = self.get_json(request).await?;
        Ok(list.files)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_drives(&self) -> Result<Vec<DriveInfo>, FetchError> {
        let request = self.http.get(format!("{}/drives", self.base_url));
        let list: DriveList = self.get_json(request).await?;
        Ok(list.drives)
    }

    #[instrument(skip(self), level = "debug")]
    async fn about(&self) -> Result<AboutInfo, FetchError> {
        let request = self
            .http
            .get(format!("{}/about", self.base_url))
            .query(&[("fields", "user")]);
        self.get_json(request).await
    }
}
