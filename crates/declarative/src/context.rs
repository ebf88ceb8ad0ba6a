//! Collaborator traits consumed by the executor
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific transport, prompt or hook implementation.

use crate::result::ApplyResult;
use crate::types::{CommandOutput, ItemStatus, Outcome};
use anyhow::Result;
use std::path::Path;

/// A remote (or local) machine that items are applied to
///
/// Implementations own connection handling and authentication. Any
/// transport failure is returned as an error and becomes the invoking
/// item's failure.
pub trait Target: Send + Sync {
    /// Name of the node this target belongs to
    fn name(&self) -> &str;

    /// Run a shell command on the target
    ///
    /// A non-zero exit code is not an error at this level; it is
    /// reported through [`CommandOutput::exit_code`].
    fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Run a command and fail unless it exits with status zero
    fn run_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.run(command)?;
        if !output.success() {
            anyhow::bail!(
                "command failed on {} (exit {}): {}: {}",
                self.name(),
                output.exit_code,
                command,
                output.stderr_str().trim()
            );
        }
        Ok(output)
    }

    /// Copy a local file to the target and set its ownership and mode
    fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        owner: &str,
        group: &str,
        mode: &str,
    ) -> Result<()>;
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations. The executor
/// serializes calls, so implementations never see concurrent prompts.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Arguments
    /// * `prompt` - The confirmation prompt to show
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Lifecycle callbacks invoked by the executor
///
/// Hooks are fire-and-forget: they cannot influence scheduling and their
/// return values are ignored. Item-level hooks may be called from
/// several worker threads at once.
pub trait Hooks: Sync {
    /// Called once before any item of the node is probed
    fn apply_start(&self, _node: &str, _interactive: bool) {}

    /// Called once after the last item reached a terminal outcome
    fn apply_end(&self, _node: &str, _result: &ApplyResult) {}

    /// Called when a worker picks up an item
    fn item_apply_start(&self, _node: &str, _item_id: &str) {}

    /// Called when an item reached its terminal outcome
    fn item_apply_end(&self, _node: &str, _item_id: &str, _outcome: &Outcome) {}

    /// Called after an item has been fixed successfully
    fn item_fixed(&self, _node: &str, _item_id: &str, _status: &ItemStatus) {}
}

/// No-op hooks
pub struct NoHooks;

impl Hooks for NoHooks {}
