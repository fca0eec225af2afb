//! Pool catalog
//!
//! Enumerates the image pool under a root directory. The returned order
//! is the basis for reproducible sampling, so it only depends on the
//! directory contents: identifiers are root-relative, `/`-separated,
//! sorted and deduplicated.

use rankpool_common::config::normalize_extensions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::types::ResourceId;

/// Pool catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Root path does not exist
    #[error("Pool root not found: {0}")]
    NotFound(PathBuf),

    /// Root path exists but is not a directory
    #[error("Pool root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl From<CatalogError> for rankpool_common::Error {
    fn from(err: CatalogError) -> Self {
        rankpool_common::Error::Catalog(err.to_string())
    }
}

/// File names never treated as pool images, whatever their extension
const SYSTEM_FILES: [&str; 3] = ["Thumbs.db", "desktop.ini", ".DS_Store"];

/// Image pool catalog
#[derive(Debug, Clone)]
pub struct PoolCatalog {
    extensions: Vec<String>,
    recursive: bool,
}

impl PoolCatalog {
    /// Create a catalog accepting the given extensions
    ///
    /// Extensions are matched case-insensitively; a leading dot is ignored.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: normalize_extensions(extensions),
            recursive: false,
        }
    }

    /// Also descend into (non-hidden) subdirectories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// List eligible resource identifiers under `root`
    pub fn list_pool_ids(&self, root: &Path) -> Result<Vec<ResourceId>, CatalogError> {
        if !root.exists() {
            return Err(CatalogError::NotFound(root.to_path_buf()));
        }

        if !root.is_dir() {
            return Err(CatalogError::NotADirectory(root.to_path_buf()));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        let mut ids = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable pool entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_eligible(&entry) {
                continue;
            }

            match resource_id(root, entry.path()) {
                Some(id) => ids.push(id),
                None => tracing::warn!(
                    path = %entry.path().display(),
                    "Skipping pool entry with non UTF-8 path"
                ),
            }
        }

        ids.sort();
        ids.dedup();

        tracing::debug!(
            root = %root.display(),
            count = ids.len(),
            "Pool catalog listed"
        );

        Ok(ids)
    }

    fn is_eligible(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if SYSTEM_FILES.iter().any(|s| name.eq_ignore_ascii_case(s)) {
            return false;
        }

        entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }
}

impl Default for PoolCatalog {
    fn default() -> Self {
        Self::new(rankpool_common::config::DEFAULT_EXTENSIONS)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Root-relative identifier with `/` separators
fn resource_id(root: &Path, path: &Path) -> Option<ResourceId> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}
