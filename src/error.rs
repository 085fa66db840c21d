//! Error types for the gget crate.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to Google Drive or mirroring its content.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("The credentials have been revoked or expired: {0}")]
    CredentialsRevoked(String),

    #[error("Authorization flow failed: {0}")]
    AuthorizationFlow(String),

    #[error("Invalid client secrets: {0}")]
    InvalidClientSecrets(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Error downloading {name}: {status}")]
    DownloadFailed { name: String, status: StatusCode },

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),
}

impl DriveError {
    /// Whether the user has to go through the authorization flow again.
    pub fn is_revoked(&self) -> bool {
        matches!(self, DriveError::CredentialsRevoked(_))
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
