//! Error types for the declarative crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, validating or scheduling items
///
/// Runtime failures of a single item (transport errors, failed commands)
/// are not represented here: they are caught at the item boundary and
/// recorded as a `failed` outcome.
#[derive(Error, Debug)]
pub enum Error {
    /// An attribute failed its validator, or the attribute map is malformed
    #[error("invalid configuration for {item}: {message}")]
    Config { item: String, message: String },

    /// The dependency graph of a node contains a cycle
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// An item depends on (or triggers) an id that is not part of the node
    #[error("{item} references unknown item {missing}")]
    UnknownDependency { item: String, missing: String },

    /// Bundle content could not be resolved (missing asset, unreadable source)
    #[error("bundle error for {item}: {message}")]
    Bundle { item: String, message: String },

    /// Template rendering failed; the underlying error is kept intact
    #[error(transparent)]
    Render(#[from] minijinja::Error),

    /// Content could not be encoded with the requested encoding
    #[error("cannot encode content of {item} as {encoding}")]
    Encoding { item: String, encoding: String },

    /// Failed to read a local asset
    #[error("failed to read {}: {source}", .path.display())]
    ReadAsset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker pool could not be created
    #[error("failed to create item worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn config(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            item: item.into(),
            message: message.into(),
        }
    }

    pub(crate) fn bundle(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bundle {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a node's apply before any item runs
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            Self::DependencyCycle(_) | Self::UnknownDependency { .. }
        )
    }
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
