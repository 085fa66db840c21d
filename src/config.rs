//! Runtime configuration and construction of an authenticated client.

use std::path::PathBuf;

use reqwest::Client;
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::client::DriveClient;
use crate::error::Result;
use crate::flow::{run_flow, ClientSecrets, FlowFlags};
use crate::storage::TokenStorage;

/// Default location of the OAuth client registration.
pub const DEFAULT_CLIENT_SECRETS: &str = "/etc/gget/client_secrets.json";

/// Directory under the user's home holding gget state.
const CONFIG_DIR: &str = ".gget";

/// File inside `CONFIG_DIR` holding the stored credentials.
const CREDENTIALS_FILE: &str = "auth.dat";

/// Default credential store: `~/.gget/auth.dat`.
pub fn default_credentials_store() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CREDENTIALS_FILE)
}

/// Everything needed to connect to Drive.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_secrets: PathBuf,
    pub credentials_store: PathBuf,
    /// Authenticate as this service account instead of an interactive user.
    pub service_account: Option<PathBuf>,
    /// Shared Drive to search instead of the user's own files.
    pub drive_id: Option<String>,
    pub flow: FlowFlags,
    /// Override of the Drive API endpoint.
    pub api_base: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secrets: PathBuf::from(DEFAULT_CLIENT_SECRETS),
            credentials_store: default_credentials_store(),
            service_account: None,
            drive_id: None,
            flow: FlowFlags::default(),
            api_base: None,
        }
    }
}

/// Build an authenticated client from `config`.
///
/// With a service account configured its key is used directly. Otherwise the
/// stored user credentials are loaded, and the interactive authorization flow
/// runs when there are none or they can no longer be refreshed.
pub async fn connect(config: &Config) -> Result<DriveClient> {
    let auth = match &config.service_account {
        Some(path) => {
            debug!(path = %path.display(), "using service account");
            Authenticator::from_file(path)?
        }
        None => user_authenticator(config).await?,
    };

    let mut client = DriveClient::new(auth);
    if let Some(drive_id) = &config.drive_id {
        client = client.with_drive_id(drive_id.clone());
    }
    if let Some(api_base) = &config.api_base {
        client = client.with_base_url(api_base.clone());
    }
    Ok(client)
}

async fn user_authenticator(config: &Config) -> Result<Authenticator> {
    let secrets = ClientSecrets::from_file(&config.client_secrets)?;
    let storage = TokenStorage::new(&config.credentials_store);

    let credentials = match storage.get()? {
        Some(credentials) if !credentials.invalid() => credentials,
        _ => {
            info!("no usable stored credentials, starting authorization");
            run_flow(&Client::new(), &secrets, &storage, &config.flow).await?
        }
    };

    Ok(Authenticator::installed(secrets, storage, credentials))
}
