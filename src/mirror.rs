//! Recreate remote files and folder trees on the local filesystem.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{DriveError, Result};
use crate::models::{human_size, FileMetadata};
use crate::remote::{Content, RemoteStore};
use crate::resolver::PathResolver;

/// Indentation added for each level of nesting in the listing.
const INDENT: &str = "  ";

/// Prefix of in-flight download files; their length does not depend on the target name.
const TEMP_PREFIX: &str = ".gget-";

/// Downloads remote objects into a local directory, printing a listing to `out`.
pub struct TreeMirror<'a, S: RemoteStore + ?Sized, W: Write> {
    store: &'a S,
    out: W,
}

impl<'a, S: RemoteStore + ?Sized, W: Write> TreeMirror<'a, S, W> {
    pub fn new(store: &'a S, out: W) -> Self {
        Self { store, out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Mirror `object` into `dest_dir`.
    ///
    /// Folders become directories (created if missing) and are walked depth
    /// first, children in name order. Files are written to
    /// `dest_dir/<name>`, replacing any existing file. The walk stops at the
    /// first failed download.
    pub async fn mirror(&mut self, object: &FileMetadata, dest_dir: &Path, indent: &str) -> Result<()> {
        let resolver = PathResolver::new(self.store);
        let mut pending: Vec<(FileMetadata, PathBuf, String)> =
            vec![(object.clone(), dest_dir.to_path_buf(), indent.to_string())];

        while let Some((object, dest_dir, indent)) = pending.pop() {
            let target = dest_dir.join(local_name(&object.name));

            if object.is_folder() {
                writeln!(self.out, "{}{}/", indent, object.name)?;
                create_folder(&target).await?;

                let children = resolver.resolve("*", &object.id).await?;
                let child_indent = format!("{}{}", indent, INDENT);
                pending.extend(
                    children
                        .into_iter()
                        .rev()
                        .map(|child| (child, target.clone(), child_indent.clone())),
                );
            } else {
                writeln!(
                    self.out,
                    "{}{} ({})",
                    indent,
                    object.name,
                    human_size(object.size.unwrap_or(0))
                )?;
                self.download(&object, &target).await?;
            }
        }

        self.out.flush()?;
        Ok(())
    }

    async fn download(&self, file: &FileMetadata, target: &Path) -> Result<()> {
        let content = self.store.open_content(file).await?;
        if !content.status.is_success() {
            return Err(DriveError::DownloadFailed {
                name: file.name.clone(),
                status: content.status,
            });
        }

        persist(content, target).await?;
        info!(id = %file.id, path = %target.display(), "downloaded");
        Ok(())
    }
}

/// Create the directory for a folder, reusing one that already exists.
async fn create_folder(target: &Path) -> Result<()> {
    match fs::create_dir(target).await {
        Ok(()) => {
            debug!(path = %target.display(), "created directory");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            if fs::metadata(target).await?.is_dir() {
                Ok(())
            } else {
                Err(e.into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Stream `content` into a temporary file next to `target`, then move it
/// over `target`. The temporary file is removed if anything fails.
async fn persist(content: Content, target: &Path) -> Result<()> {
    let dir = target
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".part")
        .tempfile_in(dir)?;

    let mut file = File::from_std(temp.reopen()?);
    let mut chunks = content.chunks;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Turn a Drive name into a single local path component.
///
/// Drive allows `/` in names and names such as `..`, neither of which may
/// escape the destination directory.
fn local_name(name: &str) -> String {
    let cleaned = name.replace(['/', '\0'], "_");
    match cleaned.as_str() {
        "" | "." | ".." => {
            warn!(name, "renaming unusable file name");
            cleaned.replace('.', "_") + "_"
        }
        _ => cleaned,
    }
}
