//! Interactive OAuth2 authorization for installed applications.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::auth::{describe_token_error, DRIVE_SCOPE, TOKEN_URI};
use crate::error::{DriveError, Result};
use crate::models::TokenResponse;
use crate::storage::{StoredCredentials, TokenStorage};

/// Google OAuth2 consent endpoint.
const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// How long the redirect listener may take to finish its last response.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><head><title>Authentication Status</title></head>\
<body><p>The authentication flow has completed. You may close this window.</p></body></html>";

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Load client secrets from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DriveError::InvalidClientSecrets(format!(
                "{} is missing; download the OAuth client JSON from the Google Cloud console",
                path.display()
            )),
            _ => DriveError::Io(e),
        })?;
        Self::from_json(&content)
    }

    /// Parse the `installed` (or `web`) section of a client secrets document.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(content)?;
        file.installed.or(file.web).ok_or_else(|| {
            DriveError::InvalidClientSecrets("expected an \"installed\" or \"web\" client".to_string())
        })
    }
}

/// Options controlling how the user completes the consent step.
#[derive(Debug, Clone)]
pub struct FlowFlags {
    /// Ask the user to paste the code instead of catching the redirect locally.
    pub noauth_local_webserver: bool,
    pub auth_host_name: String,
    /// Ports tried, in order, for the local redirect listener.
    pub auth_host_port: Vec<u16>,
}

impl Default for FlowFlags {
    fn default() -> Self {
        Self {
            noauth_local_webserver: false,
            auth_host_name: "localhost".to_string(),
            auth_host_port: vec![8080, 8090],
        }
    }
}

/// Build the consent page URL the user has to visit.
pub fn authorization_url(secrets: &ClientSecrets, redirect_uri: &str) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", DRIVE_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| DriveError::AuthorizationFlow(format!("invalid auth_uri {}: {}", secrets.auth_uri, e)))
}

/// Pull the authorization code out of the query parameters of a redirect.
///
/// Returns `None` when the parameters carry neither a code nor an error.
pub fn parse_callback(params: &HashMap<String, String>) -> Option<Result<String>> {
    if let Some(code) = params.get("code") {
        return Some(Ok(code.clone()));
    }
    params
        .get("error")
        .map(|e| Err(DriveError::AuthorizationFlow(format!("authorization was refused: {}", e))))
}

fn code_from_url(url: &Url) -> Option<Result<String>> {
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    parse_callback(&params)
}

/// Accept either a bare code or the whole redirected URL pasted by the user.
fn code_from_input(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DriveError::AuthorizationFlow("no authorization code given".to_string()));
    }
    if let Ok(url) = Url::parse(input) {
        if let Some(code) = code_from_url(&url) {
            return code;
        }
    }
    Ok(input.to_string())
}

/// Run the consent flow, store the resulting credentials and return them.
pub async fn run_flow(
    http: &Client,
    secrets: &ClientSecrets,
    storage: &TokenStorage,
    flags: &FlowFlags,
) -> Result<StoredCredentials> {
    let listener = if flags.noauth_local_webserver {
        None
    } else {
        bind_listener(flags).await
    };

    let (code, redirect_uri) = match listener {
        Some((listener, redirect_uri)) => {
            let url = authorization_url(secrets, &redirect_uri)?;
            eprintln!("Go to the following link in your browser:\n\n    {}\n", url);
            eprintln!("Waiting for the authorization redirect on {} ...", redirect_uri);
            (receive_code(listener).await?, redirect_uri)
        }
        None => {
            let redirect_uri = secrets
                .redirect_uris
                .first()
                .cloned()
                .unwrap_or_else(|| "http://localhost".to_string());
            let url = authorization_url(secrets, &redirect_uri)?;
            eprintln!("Go to the following link in your browser:\n\n    {}\n", url);
            eprint!("Enter the verification code (or the URL you were redirected to): ");
            let mut line = String::new();
            BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
            (code_from_input(&line)?, redirect_uri)
        }
    };

    let credentials = exchange_code(http, secrets, &code, &redirect_uri).await?;
    storage.put(&credentials)?;
    info!(path = %storage.path().display(), "authorization complete");
    eprintln!("Authentication successful.");
    Ok(credentials)
}

async fn bind_listener(flags: &FlowFlags) -> Option<(TcpListener, String)> {
    for port in &flags.auth_host_port {
        match TcpListener::bind((flags.auth_host_name.as_str(), *port)).await {
            Ok(listener) => {
                let redirect_uri = format!("http://{}:{}/", flags.auth_host_name, port);
                return Some((listener, redirect_uri));
            }
            Err(e) => debug!(port, error = %e, "cannot listen for redirect"),
        }
    }
    warn!("no redirect port available, falling back to manual code entry");
    None
}

/// Serve the redirect URI until the browser delivers a code or an error.
async fn receive_code(listener: TcpListener) -> Result<String> {
    let (code_tx, mut code_rx) = mpsc::channel::<Result<String>>(1);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let app = Router::new().route("/", get(redirect)).with_state(code_tx);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let result = code_rx.recv().await.unwrap_or_else(|| {
        Err(DriveError::AuthorizationFlow(
            "redirect listener stopped before a code arrived".to_string(),
        ))
    });

    let _ = stop_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "redirect listener failed"),
        Ok(Err(e)) => warn!(error = %e, "redirect listener panicked"),
        Err(_) => debug!("redirect listener still busy, leaving it behind"),
    }
    result
}

async fn redirect(
    State(code_tx): State<mpsc::Sender<Result<String>>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    let Some(result) = parse_callback(&params) else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<html><body><p>No authorization code in this request.</p></body></html>".to_string()),
        );
    };

    let page = match &result {
        Ok(_) => SUCCESS_PAGE.to_string(),
        Err(e) => format!("<html><body><p>{}</p></body></html>", e),
    };
    if code_tx.send(result).await.is_err() {
        debug!("authorization already received, ignoring redirect");
    }
    (StatusCode::OK, Html(page))
}

/// Trade an authorization code for tokens.
pub async fn exchange_code(
    http: &Client,
    secrets: &ClientSecrets,
    code: &str,
    redirect_uri: &str,
) -> Result<StoredCredentials> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("redirect_uri", redirect_uri),
    ];

    let response = http.post(&secrets.token_uri).form(&params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (_, message) = describe_token_error(status, &body);
        return Err(DriveError::AuthorizationFlow(message));
    }

    let token_response: TokenResponse = response.json().await?;
    let mut credentials = StoredCredentials {
        client_id: secrets.client_id.clone(),
        token_uri: secrets.token_uri.clone(),
        access_token: None,
        refresh_token: None,
        token_expiry: None,
    };
    credentials.apply(token_response);
    Ok(credentials)
}
