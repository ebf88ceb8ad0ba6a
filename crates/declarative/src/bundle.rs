//! Bundles - the owning context of items
//!
//! A bundle is materialized once per node. Items hold a shared,
//! read-only reference to it for templating and asset lookup.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Name of the asset directory inside a bundle
pub const ASSET_DIR: &str = "files";

/// A bundle as seen by its items
#[derive(Debug, Clone)]
pub struct Bundle {
    name: String,
    node_name: String,
    bundle_dir: PathBuf,
    metadata: Map<String, Value>,
}

impl Bundle {
    pub fn new(
        name: impl Into<String>,
        node_name: impl Into<String>,
        bundle_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            name: name.into(),
            node_name: node_name.into(),
            bundle_dir: bundle_dir.as_ref().to_path_buf(),
            metadata: Map::new(),
        }
    }

    /// Attach node metadata exposed to templates
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Resolve a `source` attribute against the bundle's asset root
    pub fn asset_path(&self, source: &str) -> PathBuf {
        self.bundle_dir.join(ASSET_DIR).join(source)
    }
}
