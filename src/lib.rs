//! gget - download files and folder trees from Google Drive by path.
//!
//! This library provides functionality to:
//! - Authenticate with OAuth2 (installed-app flow or a service account)
//! - Resolve slash-delimited paths, with `*` wildcards in the last segment
//! - Mirror the resolved files and folders into a local directory
//!
//! # Example
//!
//! ```no_run
//! use gget::{connect, download_path, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = connect(&Config::default()).await?;
//!     let count = download_path(&client, "Photos/2024/*.jpg", "root", "./photos".as_ref(), std::io::stdout()).await?;
//!     println!("{} item(s) matched", count);
//!     Ok(())
//! }
//! ```

use std::io::Write;
use std::path::Path;

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod mirror;
pub mod models;
pub mod pattern;
pub mod remote;
pub mod resolver;
pub mod storage;
pub mod url_parser;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::DriveClient;
pub use config::{connect, Config};
pub use error::{DriveError, Result};
pub use mirror::TreeMirror;
pub use models::{human_size, FileMetadata, ObjectKind};
pub use remote::RemoteStore;
pub use resolver::{PathResolver, ROOT_ID};
pub use url_parser::extract_id;

/// Resolve `path` under `base` and mirror every match into `dest_dir`,
/// writing the listing to `out`. Returns the number of matched objects.
pub async fn download_path<S, W>(store: &S, path: &str, base: &str, dest_dir: &Path, out: W) -> Result<usize>
where
    S: RemoteStore + ?Sized,
    W: Write,
{
    let items = PathResolver::new(store).resolve(path, base).await?;
    tracing::debug!(path, base, count = items.len(), "resolved");

    let mut mirror = TreeMirror::new(store, out);
    for item in &items {
        mirror.mirror(item, dest_dir, "").await?;
    }
    Ok(items.len())
}
