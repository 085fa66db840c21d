//! gget CLI - Download a Google Drive file or folder tree by path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gget::config::DEFAULT_CLIENT_SECRETS;
use gget::flow::FlowFlags;
use gget::{connect, download_path, extract_id, Config, DriveError};

/// Download files or whole folders from Google Drive.
///
/// The last segment of GDRIVE_PATH may contain `*` wildcards, e.g.
/// `Photos/2024/*.jpg`.
#[derive(Parser)]
#[command(name = "gget")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path inside Google Drive, relative to --base.
    gdrive_path: String,

    /// Local directory to download into.
    dest_path: PathBuf,

    /// Folder URL or ID the path starts from.
    #[arg(long, env = "GGET_BASE", default_value = "root")]
    base: String,

    /// OAuth client secrets JSON file.
    #[arg(long, env = "GGET_CLIENT_SECRETS", default_value = DEFAULT_CLIENT_SECRETS)]
    client_secrets: PathBuf,

    /// File storing the authorized credentials [default: ~/.gget/auth.dat].
    #[arg(long, env = "GGET_CREDENTIALS")]
    credentials_store: Option<PathBuf>,

    /// Service account JSON key to use instead of user authorization.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    service_account: Option<PathBuf>,

    /// Shared Drive ID to search in.
    #[arg(long, env = "SHARED_DRIVE_ID")]
    drive_id: Option<String>,

    /// Do not run a local web server to catch the authorization redirect.
    #[arg(long)]
    noauth_local_webserver: bool,

    /// Hostname for the local authorization redirect server.
    #[arg(long, default_value = "localhost")]
    auth_host_name: String,

    /// Ports to try for the local authorization redirect server.
    #[arg(long, num_args = 1.., default_values_t = [8080u16, 8090])]
    auth_host_port: Vec<u16>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, default_value = "warn")]
    logging_level: String,
}

impl Cli {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            client_secrets: self.client_secrets.clone(),
            credentials_store: self
                .credentials_store
                .clone()
                .unwrap_or(defaults.credentials_store),
            service_account: self.service_account.clone(),
            drive_id: self.drive_id.clone(),
            flow: FlowFlags {
                noauth_local_webserver: self.noauth_local_webserver,
                auth_host_name: self.auth_host_name.clone(),
                auth_host_port: self.auth_host_port.clone(),
            },
            api_base: None,
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.logging_level);

    match run(&cli).await {
        Err(e) if e.downcast_ref::<DriveError>().is_some_and(DriveError::is_revoked) => {
            eprintln!(
                "The credentials have been revoked or expired, please re-run the application to re-authorize"
            );
            Ok(())
        }
        other => other,
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let base = extract_id(&cli.base)
        .with_context(|| format!("Invalid folder URL or ID: {}", cli.base))?;

    let client = connect(&cli.config()).await?;

    std::fs::create_dir_all(&cli.dest_path)
        .with_context(|| format!("Failed to create directory: {:?}", cli.dest_path))?;

    let count = download_path(
        &client,
        &cli.gdrive_path,
        &base,
        &cli.dest_path,
        std::io::stdout().lock(),
    )
    .await?;

    tracing::info!(count, path = %cli.gdrive_path, "done");
    Ok(())
}
