//! # Declarative
//!
//! Item dependency graph and concurrent reconciliation executor.
//!
//! This crate holds the core of converge: declaring the desired state of
//! a node as a set of items, probing what is actually true on the node,
//! and fixing only what differs, in dependency order and in parallel.
//!
//! ## Core Concepts
//!
//! - **Item**: One unit of desired state (a file, a directory, an action)
//!   with a read-only status probe and a fix for whatever the probe flagged
//! - **DependencyGraph**: Explicit `needs`, path-based auto-deps and
//!   trigger edges over one node's items, checked for cycles up front
//! - **Executor**: Runs items on a bounded worker pool as soon as their
//!   dependencies are done; failures skip everything downstream
//! - **ApplyResult**: Per-node counts, timing and report lines
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyOptions, AutoConfirm, Bundle, ItemRegistry, ItemSpec, NoHooks, apply_node};
//! use std::sync::Arc;
//!
//! let bundle = Arc::new(Bundle::new("motd", "web1", "bundles/motd"));
//! let mut spec = ItemSpec::new("file", "/etc/motd");
//! spec.attributes.insert("content".into(), "Welcome\n".into());
//!
//! let items = ItemRegistry::builtin().build_all(&bundle, [spec])?;
//! let result = apply_node("web1", &items, &target, &ApplyOptions::default(), &mut AutoConfirm, &NoHooks)?;
//! for line in result.report_lines() {
//!     println!("{line}");
//! }
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`Target`]: Runs commands on and uploads files to a node
//! - [`ConfirmCallback`]: Answers interactive confirmations
//! - [`Hooks`]: Receives lifecycle events
//!
//! The crate has no opinion on transports, prompts or output formatting.

pub mod bundle;
pub mod content;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod hash;
pub mod item;
pub mod items;
pub mod path_info;
pub mod registry;
pub mod result;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use bundle::Bundle;
pub use content::ContentType;
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, Hooks, NoHooks, Target};
pub use diff::diff;
pub use error::{Error, Result};
pub use executor::apply_node;
pub use graph::DependencyGraph;
pub use hash::{hash_bytes, hash_local_file};
pub use item::{Attributes, BoxedItem, Item, ItemBase, item_id};
pub use path_info::PathInfo;
pub use registry::{ItemRegistry, ItemSpec, check_unique_ids};
pub use result::{ApplyResult, ItemRecord, format_duration};
pub use types::{ApplyOptions, CommandOutput, ItemStatus, Outcome};
