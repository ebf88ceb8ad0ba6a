//! Core types for item reconciliation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::process::Output;

/// Result of probing an item against its target
///
/// Produced fresh by every status probe and never mutated afterwards.
/// An item is correct exactly when nothing needs fixing, so correctness
/// is derived from `needs_fixing` instead of being stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemStatus {
    needs_fixing: Vec<String>,
    info: BTreeMap<String, String>,
}

impl ItemStatus {
    /// Create a status from the ordered list of failing check categories
    pub fn new<I, S>(needs_fixing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needs_fixing: needs_fixing.into_iter().map(Into::into).collect(),
            info: BTreeMap::new(),
        }
    }

    /// A status with nothing to fix
    pub fn correct_status() -> Self {
        Self::default()
    }

    /// Attach auxiliary information (shown in interactive mode and logs)
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Whether the item already matches its desired state
    pub fn correct(&self) -> bool {
        self.needs_fixing.is_empty()
    }

    /// Failing check categories, in the order they were evaluated
    pub fn needs_fixing(&self) -> &[String] {
        &self.needs_fixing
    }

    /// Whether a specific category was flagged
    pub fn needs(&self, category: &str) -> bool {
        self.needs_fixing.iter().any(|c| c == category)
    }

    pub fn info(&self) -> &BTreeMap<String, String> {
        &self.info
    }
}

/// Outcome of one item within one apply run
///
/// `Pending` is the only initial state; every other variant is terminal
/// and an item reaches exactly one of them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Outcome {
    /// Not yet resolved
    #[default]
    Pending,
    /// Probe reported the item correct, nothing was done
    Correct,
    /// Item was incorrect (or forced by a trigger) and has been fixed
    Fixed,
    /// Item was not attempted
    Skipped { reason: String },
    /// Probe or fix raised an error
    Failed { error: String },
}

impl Outcome {
    /// Check if the outcome is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Check if dependents of an item with this outcome may run
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, Self::Correct | Self::Fixed)
    }

    /// Check if dependents of an item with this outcome must be skipped
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Skipped { .. } | Self::Failed { .. })
    }

    /// Short lowercase label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Correct => "correct",
            Self::Fixed => "fixed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Failed { error } => write!(f, "failed ({error})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Options for applying one node
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Maximum number of items probed or fixed concurrently
    pub workers: usize,
    /// Ask before fixing each incorrect item
    pub interactive: bool,
    /// Answer every confirmation with yes
    pub force: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            interactive: false,
            force: false,
        }
    }
}

impl ApplyOptions {
    /// Worker count clamped to at least one
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Whether fixes must be confirmed by an operator
    pub fn needs_confirmation(&self) -> bool {
        self.interactive && !self.force
    }
}

/// Output from a command run on a target
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

impl CommandOutput {
    /// Whether the command exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_correct_iff_nothing_to_fix() {
        assert!(ItemStatus::correct_status().correct());
        assert!(ItemStatus::new(Vec::<String>::new()).correct());

        let status = ItemStatus::new(["mode", "owner"]);
        assert!(!status.correct());
        assert!(status.needs("owner"));
        assert!(!status.needs("content"));
        assert_eq!(status.needs_fixing(), ["mode", "owner"]);
    }

    #[test]
    fn test_outcome_classification() {
        assert!(!Outcome::Pending.is_terminal());
        assert!(Outcome::Correct.unblocks_dependents());
        assert!(Outcome::Fixed.unblocks_dependents());
        assert!(
            Outcome::Failed {
                error: "boom".into()
            }
            .blocks_dependents()
        );
        assert!(
            Outcome::Skipped {
                reason: "declined".into()
            }
            .blocks_dependents()
        );
    }

    #[test]
    fn test_options_confirmation() {
        let mut opts = ApplyOptions {
            interactive: true,
            ..Default::default()
        };
        assert!(opts.needs_confirmation());
        opts.force = true;
        assert!(!opts.needs_confirmation());

        opts.workers = 0;
        assert_eq!(opts.worker_count(), 1);
    }
}
