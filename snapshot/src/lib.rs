//! Page snapshot utilities for slide-judge
//!
//! Rendering a page of an artifact into a raster image is delegated to a
//! [`PageRenderer`]. [`SnapshotCache`] memoizes rendered pages for the
//! lifetime of one evaluation process so the same page is never rendered
//! twice.

pub mod command;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use command::CommandRenderer;

/// Errors related to snapshot rendering
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Render failed for {artifact} page {page_id}: {message}")]
    RenderFailed {
        artifact: PathBuf,
        page_id: String,
        message: String,
    },
    #[error("Invalid renderer configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Renders a single page of an artifact to raster image bytes
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, artifact: &Path, page_id: &str) -> SnapshotResult<Vec<u8>>;
}

#[async_trait]
impl<R: PageRenderer + ?Sized> PageRenderer for Arc<R> {
    async fn render(&self, artifact: &Path, page_id: &str) -> SnapshotResult<Vec<u8>> {
        (**self).render(artifact, page_id).await
    }
}

#[async_trait]
impl<R: PageRenderer + ?Sized> PageRenderer for Box<R> {
    async fn render(&self, artifact: &Path, page_id: &str) -> SnapshotResult<Vec<u8>> {
        (**self).render(artifact, page_id).await
    }
}

/// Diagnostic view of the cache contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// In-memory memo of rendered pages keyed by (artifact path, page id).
///
/// Owned by a single evaluation pipeline; it is not shared between tasks.
pub struct SnapshotCache<R> {
    renderer: R,
    entries: HashMap<(PathBuf, String), Arc<[u8]>>,
}

impl<R: PageRenderer> SnapshotCache<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            entries: HashMap::new(),
        }
    }

    /// Return the cached snapshot or render, store and return it.
    pub async fn get(&mut self, artifact: &Path, page_id: &str) -> SnapshotResult<Arc<[u8]>> {
        let key = (artifact.to_path_buf(), page_id.to_string());

        if let Some(bytes) = self.entries.get(&key) {
            debug!("Snapshot cache hit: {} page {}", artifact.display(), page_id);
            return Ok(Arc::clone(bytes));
        }

        debug!("Snapshot cache miss: {} page {}", artifact.display(), page_id);
        let bytes: Arc<[u8]> = self.renderer.render(artifact, page_id).await?.into();
        self.entries.insert(key, Arc::clone(&bytes));
        Ok(bytes)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .map(|(artifact, page_id)| format!("{}:{}", artifact.display(), page_id))
            .collect();
        keys.sort();

        CacheStats {
            size: self.entries.len(),
            keys,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}
