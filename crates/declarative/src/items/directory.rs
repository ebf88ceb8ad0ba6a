//! Directory item

use crate::context::Target;
use crate::error::Result;
use crate::item::{
    AttributeValidator, Attributes, BoxedItem, Item, ItemBase, ancestor_dependency,
    normalize_mode, parse_attributes, validate_account, validate_mode, validate_with,
};
use crate::path_info::{PathInfo, quote};
use crate::types::ItemStatus;
use serde::Deserialize;

pub const ITEM_TYPE: &str = "directory";

const VALIDATORS: &[(&str, AttributeValidator)] = &[
    ("mode", validate_mode),
    ("owner", validate_account),
    ("group", validate_account),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryAttributes {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_account")]
    pub owner: String,
    #[serde(default = "default_account")]
    pub group: String,
}

fn default_mode() -> String {
    "0755".to_string()
}

fn default_account() -> String {
    "root".to_string()
}

impl Default for DirectoryAttributes {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            owner: default_account(),
            group: default_account(),
        }
    }
}

#[derive(Debug)]
pub struct Directory {
    base: ItemBase,
    attributes: DirectoryAttributes,
}

impl Directory {
    pub fn validate_attributes(item_id: &str, attributes: &Attributes) -> Result<()> {
        validate_with(item_id, attributes, VALIDATORS)
    }

    pub fn from_attributes(base: ItemBase, attributes: &Attributes) -> Result<Self> {
        let id = crate::item::item_id(ITEM_TYPE, &base.name);
        Self::validate_attributes(&id, attributes)?;
        Ok(Self::new(base, parse_attributes(&id, attributes)?))
    }

    pub fn new(base: ItemBase, attributes: DirectoryAttributes) -> Self {
        Self { base, attributes }
    }

    fn path(&self) -> &str {
        &self.base.name
    }

    fn create(&self, target: &dyn Target) -> anyhow::Result<()> {
        target.run_checked(&format!("mkdir -p -- {}", quote(self.path())))?;
        self.fix_mode(target)?;
        self.fix_owner(target)
    }

    fn fix_mode(&self, target: &dyn Target) -> anyhow::Result<()> {
        target.run_checked(&format!(
            "chmod {} -- {}",
            self.attributes.mode,
            quote(self.path())
        ))?;
        Ok(())
    }

    fn fix_owner(&self, target: &dyn Target) -> anyhow::Result<()> {
        target.run_checked(&format!(
            "chown {}:{} -- {}",
            self.attributes.owner,
            self.attributes.group,
            quote(self.path())
        ))?;
        Ok(())
    }
}

impl Item for Directory {
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
        let described = info.describe();

        // mode and ownership only apply to something that is already a directory
        let needs_fixing: Vec<&str> = if !info.exists() {
            vec!["exists"]
        } else if !info.is_directory() {
            vec!["type"]
        } else {
            let mut needs = Vec::new();
            if info.mode.as_deref() != Some(normalize_mode(&self.attributes.mode).as_str()) {
                needs.push("mode");
            }
            if info.owner.as_deref() != Some(self.attributes.owner.as_str())
                || info.group.as_deref() != Some(self.attributes.group.as_str())
            {
                needs.push("owner");
            }
            needs
        };

        Ok(ItemStatus::new(needs_fixing)
            .with_info("path_info", described)
            .with_info("mode", info.mode.unwrap_or_default())
            .with_info("owner", info.owner.unwrap_or_default())
            .with_info("group", info.group.unwrap_or_default()))
    }

    fn fix(&self, target: &dyn Target, status: &ItemStatus) -> anyhow::Result<()> {
        if status.needs("type") {
            target.run_checked(&format!("rm -rf -- {}", quote(self.path())))?;
            return self.create(target);
        }
        if status.needs("exists") {
            return self.create(target);
        }
        if status.needs("mode") {
            self.fix_mode(target)?;
        }
        if status.needs("owner") {
            self.fix_owner(target)?;
        }
        Ok(())
    }

    fn ask(&self, _target: &dyn Target, status: &ItemStatus) -> anyhow::Result<String> {
        let current = |key: &str| status.info().get(key).cloned().unwrap_or_default();
        let mut lines = Vec::new();
        if status.needs("exists") {
            lines.push(format!("{} will be created", self.path()));
        }
        if status.needs("type") {
            lines.push(format!(
                "{} is a {}, not a directory",
                self.path(),
                current("path_info")
            ));
        }
        if status.needs("mode") {
            lines.push(format!(
                "mode: {} -> {}",
                current("mode"),
                normalize_mode(&self.attributes.mode)
            ));
        }
        if status.needs("owner") {
            lines.push(format!(
                "owner: {}:{} -> {}:{}",
                current("owner"),
                current("group"),
                self.attributes.owner,
                self.attributes.group
            ));
        }
        Ok(lines.join("\n"))
    }
}
