//! Action item - a command run on the target

use crate::context::Target;
use crate::error::{Error, Result};
use crate::item::{Attributes, Item, ItemBase, parse_attributes};
use crate::types::ItemStatus;
use serde::Deserialize;

pub const ITEM_TYPE: &str = "action";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionAttributes {
    pub command: String,
    /// Probe command; exit status zero means nothing needs to run
    #[serde(default)]
    pub unless: Option<String>,
    #[serde(default)]
    pub expected_return_code: i32,
    /// Only run when fired by another item's trigger
    #[serde(default)]
    pub triggered: bool,
}

#[derive(Debug)]
pub struct Action {
    base: ItemBase,
    attributes: ActionAttributes,
}

impl Action {
    pub fn validate_attributes(item_id: &str, attributes: &Attributes) -> Result<()> {
        match attributes.get("command").and_then(|v| v.as_str()) {
            Some(command) if !command.trim().is_empty() => Ok(()),
            _ => Err(Error::config(item_id, "command must be a non-empty string")),
        }
    }

    pub fn from_attributes(base: ItemBase, attributes: &Attributes) -> Result<Self> {
        let id = crate::item::item_id(ITEM_TYPE, &base.name);
        Self::validate_attributes(&id, attributes)?;
        Ok(Self::new(base, parse_attributes(&id, attributes)?))
    }

    pub fn new(base: ItemBase, attributes: ActionAttributes) -> Self {
        Self { base, attributes }
    }
}

impl Item for Action {
    fn item_type(&self) -> &'static str {
        ITEM_TYPE
    }

    fn base(&self) -> &ItemBase {
        &self.base
    }

    fn get_status(&self, target: &dyn Target) -> anyhow::Result<ItemStatus> {
        if self.attributes.triggered {
            return Ok(ItemStatus::correct_status().with_info("triggered", "true"));
        }
        if let Some(unless) = &self.attributes.unless {
            let output = target.run(unless)?;
            log::debug!(
                "{}: unless for {} exited {}",
                target.name(),
                self.id(),
                output.exit_code
            );
            if output.success() {
                return Ok(ItemStatus::correct_status());
            }
        }
        Ok(ItemStatus::new(["command"]))
    }

    fn fix(&self, target: &dyn Target, _status: &ItemStatus) -> anyhow::Result<()> {
        let output = target.run(&self.attributes.command)?;
        if output.exit_code != self.attributes.expected_return_code {
            anyhow::bail!(
                "{} returned {} (expected {}): {}",
                self.attributes.command,
                output.exit_code,
                self.attributes.expected_return_code,
                output.stderr_str().trim()
            );
        }
        Ok(())
    }

    fn ask(&self, _target: &dyn Target, _status: &ItemStatus) -> anyhow::Result<String> {
        Ok(format!("run: {}", self.attributes.command))
    }
}
