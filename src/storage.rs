//! On-disk storage for the user's OAuth2 credentials.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::TokenResponse;

/// Credentials persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub client_id: String,
    pub token_uri: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token` in seconds since the Unix epoch.
    #[serde(default)]
    pub token_expiry: Option<u64>,
}

impl StoredCredentials {
    /// Credentials without a refresh token cannot be renewed and need a new
    /// authorization.
    pub fn invalid(&self) -> bool {
        self.refresh_token.as_deref().map_or(true, str::is_empty)
    }

    /// Drop every token so the next run starts a new authorization.
    pub fn revoke(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expiry = None;
    }

    /// Fold a token endpoint response into these credentials. A response
    /// without a refresh token keeps the current one.
    pub fn apply(&mut self, response: TokenResponse) {
        self.access_token = Some(response.access_token);
        self.token_expiry = Some(unix_now() + response.expires_in);
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }
}

/// Seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// A JSON file holding `StoredCredentials`.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored credentials, if any have been saved.
    pub fn get(&self) -> Result<Option<StoredCredentials>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no stored credentials");
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Save `credentials`, creating the private parent directory if needed.
    pub fn put(&self, credentials: &StoredCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                restrict_permissions(parent, 0o700)?;
            }
        }

        fs::write(&self.path, serde_json::to_string_pretty(credentials)?)?;
        restrict_permissions(&self.path, 0o600)?;
        debug!(path = %self.path.display(), "stored credentials");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
