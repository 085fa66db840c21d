//! Google Drive API client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use tracing::debug;

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, FileListResponse, FileMetadata};
use crate::remote::{ChildFilter, Content, RemoteStore};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Metadata fields requested for every object.
const FILE_FIELDS: &str = "id, name, size, mimeType, trashed";

/// Client for reading files and folders from Google Drive.
pub struct DriveClient {
    auth: Authenticator,
    http: Client,
    base_url: String,
    drive_id: Option<String>,
}

impl DriveClient {
    /// Create a new DriveClient.
    ///
    /// # Arguments
    /// * `auth` - Authenticator for obtaining access tokens
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
            base_url: DRIVE_API_BASE.to_string(),
            drive_id: None,
        }
    }

    /// Restrict listings to the Shared Drive `drive_id`.
    pub fn with_drive_id(mut self, drive_id: impl Into<String>) -> Self {
        self.drive_id = Some(drive_id.into());
        self
    }

    /// Talk to a different API endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Query files using Google Drive query syntax, following every page.
    pub async fn query_files(&self, query: &str) -> Result<Vec<FileMetadata>> {
        let token = self.auth.get_access_token().await?;
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.base_url))
                .bearer_auth(&token)
                .query(&[("q", query), ("fields", fields.as_str()), ("spaces", "drive")]);

            if let Some(ref drive_id) = self.drive_id {
                request = request.query(&[
                    ("driveId", drive_id.as_str()),
                    ("corpora", "drive"),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                ]);
            }

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check_status(request.send().await?).await?;
            let list_response: FileListResponse = response.json().await?;
            debug!(query, count = list_response.files.len(), "listed page");
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &str) -> Result<FileMetadata> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}", self.base_url, file_id))
            .bearer_auth(&token)
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .send()
            .await?;

        let metadata: FileMetadata = check_status(response).await?.json().await?;
        Ok(metadata)
    }

    /// Start downloading the content of a file.
    ///
    /// The transfer status is reported rather than turned into an error so the
    /// caller decides what a failed transfer means.
    pub async fn download(&self, file_id: &str) -> Result<Content> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(format!("{}/files/{}", self.base_url, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;

        let status = response.status();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(DriveError::from))
            .boxed();

        Ok(Content { status, chunks })
    }
}

/// Turn a non-success response into an `ApiError`, decoding Google's error body when present.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return Err(DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        });
    }
    Err(DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    })
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_children(&self, parent_id: &str, filter: &ChildFilter) -> Result<Vec<FileMetadata>> {
        self.query_files(&filter.to_query(parent_id)).await
    }

    async fn get_by_id(&self, id: &str) -> Result<FileMetadata> {
        self.get_file(id).await
    }

    async fn open_content(&self, file: &FileMetadata) -> Result<Content> {
        self.download(&file.id).await
    }
}
