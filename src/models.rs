//! Data models for Google Drive API responses.

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Whether a remote object can hold children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    Folder,
}

/// Metadata for a file or folder in Google Drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default)]
    pub trashed: bool,
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl FileMetadata {
    pub fn kind(&self) -> ObjectKind {
        match self.mime_type.as_deref() {
            Some(FOLDER_MIME_TYPE) => ObjectKind::Folder,
            _ => ObjectKind::File,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == ObjectKind::Folder
    }
}

impl std::fmt::Display for FileMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            ObjectKind::Folder => write!(f, "{}/", self.name),
            ObjectKind::File => write!(f, "{} ({})", self.name, human_size(self.size.unwrap_or(0))),
        }
    }
}

/// Format bytes into a human-readable size, e.g. `500.0bytes` or `1.5KB`.
///
/// Values beyond the gigabyte range are always expressed in `TB`.
pub fn human_size(bytes: u64) -> String {
    let mut num = bytes as f64;
    for unit in ["bytes", "KB", "MB", "GB"] {
        if num.abs() < 1024.0 {
            return format!("{:3.1}{}", num, unit);
        }
        num /= 1024.0;
    }
    format!("{:3.1}{}", num, "TB")
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileMetadata>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Service account credentials from JSON file.
#[derive(Debug, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// OAuth2 error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}
