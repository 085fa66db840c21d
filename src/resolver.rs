//! Resolution of slash-delimited virtual paths against a remote folder tree.

use tracing::debug;

use crate::error::Result;
use crate::models::FileMetadata;
use crate::pattern::NamePattern;
use crate::remote::{ChildFilter, RemoteStore};

/// Id Drive uses for the root of "My Drive".
pub const ROOT_ID: &str = "root";

/// Split a virtual path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Resolves virtual paths to remote objects.
pub struct PathResolver<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RemoteStore + ?Sized> PathResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolve `path` relative to the folder `base`.
    ///
    /// Every segment but the last must name exactly one folder. The last one may
    /// contain `*` wildcards and can therefore match several objects, which are
    /// returned sorted by name. An empty path resolves to `base` itself. A path
    /// that does not exist, or that walks through a file, resolves to nothing.
    pub async fn resolve(&self, path: &str, base: &str) -> Result<Vec<FileMetadata>> {
        let mut segments = split_path(path);
        let mut base = base.to_string();

        if segments.is_empty() {
            debug!(base = %base, "empty path resolves to base");
            return Ok(vec![self.store.get_by_id(&base).await?]);
        }

        let leaf = segments.pop().unwrap_or_default();
        for segment in segments {
            let folders = self.children_matching(&base, segment, false).await?;
            let Some(folder) = folders.into_iter().next() else {
                debug!(parent = %base, segment, "no such folder");
                return Ok(Vec::new());
            };
            if !folder.is_folder() {
                debug!(id = %folder.id, segment, "cannot navigate into a file");
                return Ok(Vec::new());
            }
            debug!(id = %folder.id, segment, "entered folder");
            base = folder.id;
        }

        self.children_matching(&base, leaf, true).await
    }

    /// Direct children of `base` named by `segment`, sorted by name.
    pub async fn children_matching(
        &self,
        base: &str,
        segment: &str,
        allow_glob: bool,
    ) -> Result<Vec<FileMetadata>> {
        let pattern = NamePattern::new(segment, allow_glob);
        let filter = match pattern.exact_name() {
            Some(name) => ChildFilter::Named(name.to_string()),
            None => ChildFilter::All,
        };

        let mut matches: Vec<FileMetadata> = self
            .store
            .list_children(base, &filter)
            .await?
            .into_iter()
            .filter(|item| !item.trashed && pattern.matches(&item.name))
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }
}
