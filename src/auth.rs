//! OAuth2 access tokens for Google APIs, from a user's stored credentials or a
//! service account.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{DriveError, Result};
use crate::flow::ClientSecrets;
use crate::models::{ServiceAccountCredentials, TokenErrorResponse, TokenResponse};
use crate::storage::{unix_now, StoredCredentials, TokenStorage};

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only Google Drive scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Tokens this close to expiry are renewed before use.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration (seconds since the epoch).
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > unix_now() + EXPIRY_BUFFER.as_secs()
    }
}

enum CredentialSource {
    ServiceAccount(ServiceAccountCredentials),
    Installed {
        secrets: ClientSecrets,
        storage: TokenStorage,
        credentials: Mutex<StoredCredentials>,
    },
}

/// Supplies access tokens for Drive requests, refreshing them as they expire.
#[derive(Clone)]
pub struct Authenticator {
    source: Arc<CredentialSource>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    /// Create a new authenticator from a service account JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::service_account(credentials))
    }

    /// Create a new authenticator from service account credentials.
    pub fn service_account(credentials: ServiceAccountCredentials) -> Self {
        Self::with_source(CredentialSource::ServiceAccount(credentials), None)
    }

    /// Create an authenticator for a user who went through the authorization
    /// flow. Refreshed tokens are written back to `storage`.
    pub fn installed(secrets: ClientSecrets, storage: TokenStorage, credentials: StoredCredentials) -> Self {
        let cached = match (&credentials.access_token, credentials.token_expiry) {
            (Some(access_token), Some(expires_at)) => Some(CachedToken {
                access_token: access_token.clone(),
                expires_at,
            }),
            _ => None,
        };
        let source = CredentialSource::Installed {
            secrets,
            storage,
            credentials: Mutex::new(credentials),
        };
        Self::with_source(source, cached)
    }

    fn with_source(source: CredentialSource, cached: Option<CachedToken>) -> Self {
        Self {
            source: Arc::new(source),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(cached)),
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
                return Ok(token.access_token.clone());
            }
        }

        let new_token = match self.source.as_ref() {
            CredentialSource::ServiceAccount(credentials) => self.request_jwt_token(credentials).await?,
            CredentialSource::Installed {
                secrets,
                storage,
                credentials,
            } => self.refresh_user_token(secrets, storage, credentials).await?,
        };

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Exchange a signed JWT assertion for an access token.
    async fn request_jwt_token(&self, credentials: &ServiceAccountCredentials) -> Result<CachedToken> {
        let token_uri = credentials.token_uri.as_deref().unwrap_or(TOKEN_URI);
        let now = unix_now();

        let claims = Claims {
            iss: credentials.client_email.clone(),
            scope: DRIVE_SCOPE.to_string(),
            aud: token_uri.to_string(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ];

        let response = self.client.post(token_uri).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (_, message) = describe_token_error(status, &body);
            return Err(DriveError::TokenRefreshError(message));
        }

        let token_response: TokenResponse = response.json().await?;
        debug!(account = %credentials.client_email, "obtained service account token");

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: unix_now() + token_response.expires_in,
        })
    }

    /// Use the stored refresh token to obtain a new access token.
    async fn refresh_user_token(
        &self,
        secrets: &ClientSecrets,
        storage: &TokenStorage,
        credentials: &Mutex<StoredCredentials>,
    ) -> Result<CachedToken> {
        let mut credentials = credentials.lock().await;
        let refresh_token = match credentials.refresh_token.clone() {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(DriveError::CredentialsRevoked(
                    "no refresh token is stored".to_string(),
                ))
            }
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&credentials.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (error, message) = describe_token_error(status, &body);
            let revoked = error.as_deref() == Some("invalid_grant")
                || status == StatusCode::BAD_REQUEST
                || status == StatusCode::UNAUTHORIZED;
            if !revoked {
                return Err(DriveError::TokenRefreshError(message));
            }
            credentials.revoke();
            storage.put(&credentials)?;
            warn!(path = %storage.path().display(), "stored credentials revoked");
            return Err(DriveError::CredentialsRevoked(message));
        }

        let token_response: TokenResponse = response.json().await?;
        credentials.apply(token_response);
        storage.put(&credentials)?;
        debug!(path = %storage.path().display(), "refreshed access token");

        match (&credentials.access_token, credentials.token_expiry) {
            (Some(access_token), Some(expires_at)) => Ok(CachedToken {
                access_token: access_token.clone(),
                expires_at,
            }),
            _ => Err(DriveError::TokenRefreshError(
                "token endpoint returned no access token".to_string(),
            )),
        }
    }
}

/// Split a failed token endpoint response into its OAuth error code (if any)
/// and a message for the user.
pub(crate) fn describe_token_error(status: StatusCode, body: &str) -> (Option<String>, String) {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) => {
            let message = match &err.error_description {
                Some(description) => format!("Status {}: {} ({})", status, err.error, description),
                None => format!("Status {}: {}", status, err.error),
            };
            (Some(err.error), message)
        }
        Err(_) => (None, format!("Status {}: {}", status, body)),
    }
}
