//! Symlink item

use crate::context::Target;
use crate::error::Result;
use crate::item::{
    AttributeValidator, Attributes, BoxedItem, Item, ItemBase, ancestor_dependency,
    parse_attributes, validate_account, validate_with,
};
use crate::path_info::{PathInfo, quote};
use crate::types::ItemStatus;
use serde::Deserialize;

pub const ITEM_TYPE: &str = "symlink";

const VALIDATORS: &[(&str, AttributeValidator)] =
    &[("owner", validate_account), ("group", validate_account)];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymlinkAttributes {
    /// Path the link points to
    pub target: String,
    #[serde(default = "default_account")]
    pub owner: String,
    #[serde(default = "default_account")]
    pub group: String,
}

fn default_account() -> String {
    "root".to_string()
}

#[derive(Debug)]
pub struct Symlink {
    base: ItemBase,
    attributes: SymlinkAttributes,
}

impl Symlink {
    pub fn validate_attributes(item_id: &str, attributes: &Attributes) -> Result<()> {
        validate_with(item_id, attributes, VALIDATORS)
    }

    pub fn from_attributes(base: ItemBase, attributes: &Attributes) -> Result<Self> {
        let id = crate::item::item_id(ITEM_TYPE, &base.name);
        Self::validate_attributes(&id, attributes)?;
        Ok(Self::new(base, parse_attributes(&id, attributes)?))
    }

    pub fn new(base: ItemBase, attributes: SymlinkAttributes) -> Self {
        Self { base, attributes }
    }

    fn path(&self) -> &str {
        &self.base.name
    }

    fn fix_owner(&self, target: &dyn Target) -> anyhow::Result<()> {
        // -h changes the link itself, not what it points to
        target.run_checked(&format!(
            "chown -h {}:{} -- {}",
            self.attributes.owner,
            self.attributes.group,
            quote(self.path())
        ))?;
        Ok(())
    }
}

impl Item for Symlink {
    fn item_type(&self) -> &'static str {
        ITEM_TYPE
    }

    fn base(&self) -> &ItemBase {
        &self.base
    }

    fn get_auto_deps(&self, items: &[BoxedItem]) -> Vec<String> {
        ancestor_dependency(self.path(), items).into_iter().collect()
    }

    fn get_status(&self, target: &dyn Target) -> anyhow::Result<ItemStatus> {
        let info = PathInfo::probe(target, self.path())?;
        let mut needs_fixing = Vec::new();

        if info.exists() && !info.is_symlink() {
            needs_fixing.push("type");
        }
        if info.symlink_target.as_deref() != Some(self.attributes.target.as_str()) {
            needs_fixing.push("target");
        }
        if info.owner.as_deref() != Some(self.attributes.owner.as_str())
            || info.group.as_deref() != Some(self.attributes.group.as_str())
        {
            needs_fixing.push("owner");
        }

        Ok(ItemStatus::new(needs_fixing)
            .with_info("path_info", info.describe())
            .with_info("target", info.symlink_target.unwrap_or_default()))
    }

    fn fix(&self, target: &dyn Target, status: &ItemStatus) -> anyhow::Result<()> {
        let path = quote(self.path());
        if status.needs("type") || status.needs("target") {
            if status.needs("type") {
                target.run_checked(&format!("rm -rf -- {path}"))?;
            }
            target.run_checked(&format!(
                "ln -sfn -- {} {path}",
                quote(&self.attributes.target)
            ))?;
            // a fresh link is owned by whoever created it
            return self.fix_owner(target);
        }
        if status.needs("owner") {
            self.fix_owner(target)?;
        }
        Ok(())
    }

    fn ask(&self, _target: &dyn Target, status: &ItemStatus) -> anyhow::Result<String> {
        let info = status.info();
        let mut lines = Vec::new();
        if status.needs("type") {
            lines.push(format!(
                "{} is a {}, not a symlink",
                self.path(),
                info.get("path_info").map_or("", String::as_str)
            ));
        }
        if status.needs("target") {
            lines.push(format!(
                "target: {} -> {}",
                info.get("target").map_or("", String::as_str),
                self.attributes.target
            ));
        }
        if status.needs("owner") {
            lines.push(format!(
                "owner -> {}:{}",
                self.attributes.owner, self.attributes.group
            ));
        }
        Ok(lines.join("\n"))
    }
}
