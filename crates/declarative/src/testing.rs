//! Test doubles shared by unit tests

use crate::context::Target;
use crate::types::CommandOutput;
use anyhow::Result;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub content: Vec<u8>,
    pub remote_path: String,
    pub owner: String,
    pub group: String,
    pub mode: String,
}

/// Target with scripted command responses that records everything it is asked to do
///
/// Commands without a scripted response succeed with empty output.
#[derive(Default)]
pub struct FakeTarget {
    responses: Vec<(String, Result<CommandOutput, String>)>,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Upload>>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix`
    pub fn respond(mut self, prefix: &str, exit_code: i32, stdout: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            Ok(CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                exit_code,
            }),
        ));
        self
    }

    /// Answer commands starting with `prefix` with raw bytes
    pub fn respond_bytes(mut self, prefix: &str, stdout: &[u8]) -> Self {
        self.responses.push((
            prefix.to_string(),
            Ok(CommandOutput {
                stdout: stdout.to_vec(),
                stderr: Vec::new(),
                exit_code: 0,
            }),
        ));
        self
    }

    /// Fail commands starting with `prefix` with a transport error
    pub fn fail(mut self, prefix: &str, message: &str) -> Self {
        self.responses
            .push((prefix.to_string(), Err(message.to_string())));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands that change state (everything except probes)
    pub fn mutations(&self) -> Vec<String> {
        const PROBES: &[&str] = &["stat ", "sha1sum ", "readlink ", "cat "];
        self.commands()
            .into_iter()
            .filter(|c| !PROBES.iter().any(|p| c.starts_with(p)))
            .collect()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Target for FakeTarget {
    fn name(&self) -> &str {
        "fake"
    }

    fn run(&self, command: &str) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        match self
            .responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(message))) => Err(anyhow::anyhow!("{message}")),
            None => Ok(CommandOutput::default()),
        }
    }

    fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        owner: &str,
        group: &str,
        mode: &str,
    ) -> Result<()> {
        let content = std::fs::read(local_path)?;
        self.uploads.lock().unwrap().push(Upload {
            content,
            remote_path: remote_path.to_string(),
            owner: owner.to_string(),
            group: group.to_string(),
            mode: mode.to_string(),
        });
        Ok(())
    }
}
