//! The remote store contract consumed by path resolution and mirroring.

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::StatusCode;

use crate::error::Result;
use crate::models::FileMetadata;

/// Which children of a folder a listing should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildFilter {
    All,
    Named(String),
}

impl ChildFilter {
    /// Render the Drive query selecting the non-trashed children of `parent_id`.
    pub fn to_query(&self, parent_id: &str) -> String {
        let mut query = format!("'{}' in parents and trashed = false", escape_literal(parent_id));
        if let ChildFilter::Named(name) = self {
            query.push_str(&format!(" and name = '{}'", escape_literal(name)));
        }
        query
    }
}

/// Escape a value for use inside a single-quoted Drive query string.
pub fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Body of a file download: the transfer status and the byte chunks.
pub struct Content {
    pub status: StatusCode,
    pub chunks: BoxStream<'static, Result<Vec<u8>>>,
}

/// Read-only access to a folder hierarchy of remote objects.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List direct children of `parent_id` selected by `filter`, across all pages.
    async fn list_children(&self, parent_id: &str, filter: &ChildFilter) -> Result<Vec<FileMetadata>>;

    async fn get_by_id(&self, id: &str) -> Result<FileMetadata>;

    /// Start fetching the content of `file`.
    async fn open_content(&self, file: &FileMetadata) -> Result<Content>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store for resolver and mirror tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use futures::stream;

    use super::*;
    use crate::error::DriveError;
    use crate::models::FOLDER_MIME_TYPE;

    #[derive(Default)]
    pub struct MemoryStore {
        objects: HashMap<String, FileMetadata>,
        children: HashMap<String, Vec<String>>,
        contents: HashMap<String, (StatusCode, Vec<Vec<u8>>)>,
        pub queries: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            let mut store = Self::default();
            store.objects.insert("root".to_string(), folder_meta("root", "My Drive"));
            store
        }

        pub fn add_folder(&mut self, parent: &str, id: &str, name: &str) {
            self.insert(parent, folder_meta(id, name));
        }

        pub fn add_file(&mut self, parent: &str, id: &str, name: &str, content: &[u8]) {
            self.insert(parent, file_meta(id, name, content.len() as u64));
            self.contents
                .insert(id.to_string(), (StatusCode::OK, vec![content.to_vec()]));
        }

        pub fn add_trashed(&mut self, parent: &str, id: &str, name: &str) {
            let mut meta = file_meta(id, name, 0);
            meta.trashed = true;
            self.insert(parent, meta);
        }

        /// Make the download of `id` answer with `status`, after sending `chunks`.
        pub fn set_content(&mut self, id: &str, status: StatusCode, chunks: Vec<Vec<u8>>) {
            self.contents.insert(id.to_string(), (status, chunks));
        }

        fn insert(&mut self, parent: &str, meta: FileMetadata) {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(meta.id.clone());
            self.objects.insert(meta.id.clone(), meta);
        }
    }

    pub fn folder_meta(id: &str, name: &str) -> FileMetadata {
        FileMetadata {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
            size: None,
            trashed: false,
        }
    }

    pub fn file_meta(id: &str, name: &str, size: u64) -> FileMetadata {
        FileMetadata {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: Some("application/octet-stream".to_string()),
            size: Some(size),
            trashed: false,
        }
    }

    #[async_trait]
    impl RemoteStore for MemoryStore {
        async fn list_children(&self, parent_id: &str, filter: &ChildFilter) -> Result<Vec<FileMetadata>> {
            self.queries.lock().unwrap().push(filter.to_query(parent_id));
            let ids = self.children.get(parent_id).cloned().unwrap_or_default();
            Ok(ids
                .iter()
                .filter_map(|id| self.objects.get(id))
                .filter(|meta| !meta.trashed)
                .filter(|meta| match filter {
                    ChildFilter::All => true,
                    ChildFilter::Named(name) => &meta.name == name,
                })
                .cloned()
                .collect())
        }

        async fn get_by_id(&self, id: &str) -> Result<FileMetadata> {
            self.objects.get(id).cloned().ok_or_else(|| DriveError::ApiError {
                status: 404,
                message: format!("File not found: {}", id),
            })
        }

        async fn open_content(&self, file: &FileMetadata) -> Result<Content> {
            let (status, chunks) = self
                .contents
                .get(&file.id)
                .cloned()
                .unwrap_or((StatusCode::NOT_FOUND, Vec::new()));
            Ok(Content {
                status,
                chunks: Box::pin(stream::iter(chunks.into_iter().map(Ok))),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_all_children() {
        assert_eq!(
            ChildFilter::All.to_query("root"),
            "'root' in parents and trashed = false"
        );
    }

    #[test]
    fn test_query_named_child_escapes_quotes() {
        let query = ChildFilter::Named("Bob's \\ notes".to_string()).to_query("abc");
        assert_eq!(
            query,
            r"'abc' in parents and trashed = false and name = 'Bob\'s \\ notes'"
        );
    }
}
