//! Drawing catalogue
//!
//! Drawings are produced by an external painting tool; this crate only needs
//! their ids and image urls. The catalogue document has the shape
//! `{ "items": [{ "id": "...", "url": "..." }] }`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drawing {
    pub id: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DrawingStoreError {
    #[error("Failed to read drawing catalogue {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse drawing catalogue: {0}")]
    Parse(#[from] serde_json::Error),
}

pub trait DrawingStore {
    fn list_drawings(&self) -> impl Future<Output = Result<Vec<Drawing>, DrawingStoreError>> + Send;
}

#[derive(Debug, Default, Deserialize)]
struct Catalogue {
    #[serde(default)]
    items: Vec<Drawing>,
}

/// Reads the catalogue from a JSON file
#[derive(Debug, Clone)]
pub struct JsonDrawingStore {
    path: PathBuf,
}

impl JsonDrawingStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn parse(json: &str) -> Result<Vec<Drawing>, DrawingStoreError> {
        let catalogue: Catalogue = serde_json::from_str(json)?;
        Ok(catalogue.items)
    }
}

impl DrawingStore for JsonDrawingStore {
    async fn list_drawings(&self) -> Result<Vec<Drawing>, DrawingStoreError> {
        debug!("Loading drawings from {}", self.path.display());
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DrawingStoreError::Read {
                path: self.path.clone(),
                source,
            })?;
        let drawings = Self::parse(&json)?;
        info!("Loaded {} drawings", drawings.len());
        Ok(drawings)
    }
}
