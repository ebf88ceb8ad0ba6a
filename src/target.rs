//! Transports to nodes
//!
//! `localhost` nodes run commands through `sh -c`; every other node is
//! reached over `ssh`/`scp` using the operator's ssh configuration.

use crate::repo::Node;
use anyhow::{Context, Result};
use declarative::path_info::quote;
use declarative::{CommandOutput, Target};
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build the transport for a node
pub fn for_node(node: &Node) -> Box<dyn Target> {
    if node.is_local() {
        Box::new(LocalTarget::new(&node.name))
    } else {
        Box::new(SshTarget::new(&node.name, &node.hostname))
    }
}

/// Finish an upload: set ownership and mode on the staged path, then move it into place
fn install_staged(
    target: &dyn Target,
    staged: &str,
    remote_path: &str,
    owner: &str,
    group: &str,
    mode: &str,
) -> Result<()> {
    target.run_checked(&install_command(staged, remote_path, owner, group, mode))?;
    Ok(())
}

fn install_command(staged: &str, remote_path: &str, owner: &str, group: &str, mode: &str) -> String {
    let staged = quote(staged);
    format!(
        "chown {} -- {staged} && chmod {} -- {staged} && mv -f -- {staged} {}",
        quote(&format!("{owner}:{group}")),
        quote(mode),
        quote(remote_path)
    )
}

/// Unique name for a staged upload next to its destination
fn staging_path(remote_path: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "{remote_path}.converge-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Runs commands on this machine
pub struct LocalTarget {
    name: String,
}

impl LocalTarget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Target for LocalTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, command: &str) -> Result<CommandOutput> {
        log::trace!("{}: sh -c {command}", self.name);
        let output = Command::new("sh")
            .args(["-c", command])
            .output()
            .with_context(|| format!("Failed to execute: {command}"))?;
        Ok(output.into())
    }

    fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        owner: &str,
        group: &str,
        mode: &str,
    ) -> Result<()> {
        let staged = staging_path(remote_path);
        std::fs::copy(local_path, &staged)
            .with_context(|| format!("Failed to copy {} to {staged}", local_path.display()))?;
        install_staged(self, &staged, remote_path, owner, group, mode)
    }
}

/// Runs commands on a remote node over ssh
pub struct SshTarget {
    name: String,
    hostname: String,
}

impl SshTarget {
    pub fn new(name: &str, hostname: &str) -> Self {
        Self {
            name: name.to_string(),
            hostname: hostname.to_string(),
        }
    }
}

impl Target for SshTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, command: &str) -> Result<CommandOutput> {
        log::trace!("{}: ssh {} {command}", self.name, self.hostname);
        let output = Command::new("ssh")
            .args(["-o", "BatchMode=yes", "--", &self.hostname, command])
            .output()
            .with_context(|| format!("Failed to execute ssh to {}", self.hostname))?;

        // ssh reserves 255 for its own errors (connection, authentication)
        if output.status.code() == Some(255) {
            anyhow::bail!(
                "ssh to {} failed: {}",
                self.hostname,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.into())
    }

    fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        owner: &str,
        group: &str,
        mode: &str,
    ) -> Result<()> {
        let staged = staging_path(remote_path);
        let output = Command::new("scp")
            .args(["-q", "-o", "BatchMode=yes", "--"])
            .arg(local_path)
            .arg(format!("{}:{}", self.hostname, quote(&staged)))
            .output()
            .with_context(|| format!("Failed to execute scp to {}", self.hostname))?;
        if !output.status.success() {
            anyhow::bail!(
                "scp to {} failed: {}",
                self.hostname,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        install_staged(self, &staged, remote_path, owner, group, mode)
    }
}
