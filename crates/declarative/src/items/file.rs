//! File item - content, permissions and ownership of a regular file

use crate::content::{self, ContentType, TemplateContext};
use crate::context::Target;
use crate::diff::diff;
use crate::error::{Error, Result};
use crate::hash::{hash_bytes, hash_local_file};
use crate::item::{
    AttributeValidator, Attributes, BoxedItem, Item, ItemBase, ancestor_dependency,
    normalize_mode, parse_attributes, validate_account, validate_mode, validate_with,
};
use crate::path_info::{PathInfo, parent_dir, quote};
use crate::types::ItemStatus;
use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;

pub const ITEM_TYPE: &str = "file";

const VALIDATORS: &[(&str, AttributeValidator)] = &[
    ("mode", validate_mode),
    ("owner", validate_account),
    ("group", validate_account),
    ("content_type", validate_content_type),
    ("encoding", validate_encoding),
];

fn validate_content_type(item_id: &str, value: &Value) -> Result<()> {
    serde_json::from_value::<ContentType>(value.clone())
        .map(|_| ())
        .map_err(|_| Error::config(item_id, format!("invalid content_type: {value}")))
}

fn validate_encoding(item_id: &str, value: &Value) -> Result<()> {
    match value.as_str() {
        Some(label) if content::is_known_encoding(label) => Ok(()),
        _ => Err(Error::config(item_id, format!("unknown encoding: {value}"))),
    }
}

/// Desired state of a file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileAttributes {
    /// Literal content or template source
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Asset path relative to the bundle's `files/` directory
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_account")]
    pub owner: String,
    #[serde(default = "default_account")]
    pub group: String,
    /// Extra template variables
    #[serde(default)]
    pub context: Map<String, Value>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_mode() -> String {
    "0664".to_string()
}

fn default_account() -> String {
    "root".to_string()
}

impl Default for FileAttributes {
    fn default() -> Self {
        Self {
            content: None,
            content_type: ContentType::default(),
            encoding: default_encoding(),
            source: None,
            mode: default_mode(),
            owner: default_account(),
            group: default_account(),
            context: Map::new(),
        }
    }
}

/// A regular file on the target
#[derive(Debug)]
pub struct File {
    base: ItemBase,
    attributes: FileAttributes,
}

impl File {
    /// Run the attribute validators without building the item
    pub fn validate_attributes(item_id: &str, attributes: &Attributes) -> Result<()> {
        validate_with(item_id, attributes, VALIDATORS)
    }

    /// Validate and build a file item from its declared attributes
    pub fn from_attributes(base: ItemBase, attributes: &Attributes) -> Result<Self> {
        let id = crate::item::item_id(ITEM_TYPE, &base.name);
        Self::validate_attributes(&id, attributes)?;
        let attributes: FileAttributes = parse_attributes(&id, attributes)?;

        if attributes.content.is_some() && attributes.source.is_some() {
            return Err(Error::config(id, "content and source are mutually exclusive"));
        }
        if attributes.content_type == ContentType::Binary && attributes.source.is_none() {
            return Err(Error::config(id, "binary content requires a source"));
        }

        Ok(Self::new(base, attributes))
    }

    pub fn new(base: ItemBase, attributes: FileAttributes) -> Self {
        Self { base, attributes }
    }

    pub fn attributes(&self) -> &FileAttributes {
        &self.attributes
    }

    fn path(&self) -> &str {
        &self.base.name
    }

    fn asset_path(&self) -> Option<PathBuf> {
        self.attributes
            .source
            .as_deref()
            .map(|source| self.bundle().asset_path(source))
    }

    /// Raw template (or literal) text before processing
    fn template_source(&self) -> Result<String> {
        let Some(asset) = self.asset_path() else {
            return Ok(self.attributes.content.clone().unwrap_or_default());
        };
        if !asset.is_file() {
            return Err(Error::bundle(
                self.id(),
                format!("source file not found: {}", asset.display()),
            ));
        }
        let bytes = std::fs::read(&asset).map_err(|source| Error::ReadAsset {
            path: asset.clone(),
            source,
        })?;
        content::decode_strict(&bytes, &self.attributes.encoding).ok_or_else(|| Error::Encoding {
            item: self.id(),
            encoding: self.attributes.encoding.clone(),
        })
    }

    /// Desired content as bytes, for text and template content
    pub fn content(&self) -> Result<Vec<u8>> {
        let source = self.template_source()?;
        let text = match self.attributes.content_type {
            ContentType::Template => {
                let bundle = self.bundle();
                content::render_template(
                    &source,
                    &TemplateContext {
                        node_name: bundle.node_name(),
                        bundle_name: bundle.name(),
                        variables: bundle.metadata(),
                        context: &self.attributes.context,
                    },
                )?
            }
            ContentType::Text | ContentType::Binary => content::process_text(&source).to_string(),
        };
        content::encode(&self.id(), &text, &self.attributes.encoding)
    }

    /// SHA-1 of the desired content
    pub fn content_hash(&self) -> Result<String> {
        match (self.attributes.content_type, self.asset_path()) {
            (ContentType::Binary, Some(asset)) => {
                hash_local_file(&asset).map_err(|source| Error::ReadAsset {
                    path: asset,
                    source,
                })
            }
            _ => Ok(hash_bytes(&self.content()?)),
        }
    }

    fn fix_type(&self, target: &dyn Target) -> anyhow::Result<()> {
        target.run_checked(&format!("rm -rf -- {}", quote(self.path())))?;
        target.run_checked(&format!("mkdir -p -- {}", quote(&parent_dir(self.path()))))?;
        self.fix_content(target)
    }

    fn fix_content(&self, target: &dyn Target) -> anyhow::Result<()> {
        let FileAttributes {
            owner, group, mode, ..
        } = &self.attributes;

        if self.attributes.content_type == ContentType::Binary
            && let Some(asset) = self.asset_path()
        {
            return target.upload(&asset, self.path(), owner, group, mode);
        }

        let content = self.content()?;
        let mut staged = tempfile::NamedTempFile::new().context("Failed to stage file content")?;
        staged.write_all(&content)?;
        staged.flush()?;
        target.upload(staged.path(), self.path(), owner, group, mode)
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

impl Item for File {
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
        let content_hash = self.content_hash()?;
        let mut needs_fixing = Vec::new();

        if info.exists() && !info.is_file() {
            needs_fixing.push("type");
        }
        if info.sha1.as_deref() != Some(content_hash.as_str()) {
            needs_fixing.push("content");
        }
        if info.mode.as_deref() != Some(normalize_mode(&self.attributes.mode).as_str()) {
            needs_fixing.push("mode");
        }
        // owner and group are changed by one command, so they drift as one unit
        if info.owner.as_deref() != Some(self.attributes.owner.as_str())
            || info.group.as_deref() != Some(self.attributes.group.as_str())
        {
            needs_fixing.push("owner");
        }

        Ok(ItemStatus::new(needs_fixing)
            .with_info("path_info", info.describe())
            .with_info("mode", info.mode.unwrap_or_default())
            .with_info("owner", info.owner.unwrap_or_default())
            .with_info("group", info.group.unwrap_or_default()))
    }

    fn fix(&self, target: &dyn Target, status: &ItemStatus) -> anyhow::Result<()> {
        if status.needs("type") {
            // recreating the object discards its content; the upload also sets mode and owner
            return self.fix_type(target);
        }
        if status.needs("content") {
            return self.fix_content(target);
        }
        if status.needs("mode") {
            self.fix_mode(target)?;
        }
        if status.needs("owner") {
            self.fix_owner(target)?;
        }
        Ok(())
    }

    fn ask(&self, target: &dyn Target, status: &ItemStatus) -> anyhow::Result<String> {
        let info = status.info();
        let current = |key: &str| info.get(key).cloned().unwrap_or_default();
        let mut lines = Vec::new();

        if status.needs("type") {
            lines.push(format!(
                "{} is a {}, not a file",
                self.path(),
                current("path_info")
            ));
        }
        if status.needs("content") {
            if self.attributes.content_type == ContentType::Binary {
                lines.push("binary content differs".to_string());
            } else {
                let old = if current("path_info") == "file" {
                    target
                        .run_checked(&format!("cat -- {}", quote(self.path())))?
                        .stdout
                } else {
                    Vec::new()
                };
                let new = self.content()?;
                lines.push(diff(&old, &new, self.path(), Some(&self.attributes.encoding)));
            }
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

    fn test(&self) -> Result<()> {
        match self.attributes.content_type {
            ContentType::Binary => {
                if let Some(asset) = self.asset_path()
                    && !asset.is_file()
                {
                    return Err(Error::bundle(
                        self.id(),
                        format!("source file not found: {}", asset.display()),
                    ));
                }
                Ok(())
            }
            ContentType::Text | ContentType::Template => self.content().map(|_| ()),
        }
    }
}
