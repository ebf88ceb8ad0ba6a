//! Item trait for declarative state management
//!
//! An Item is one declarative unit of desired state on a target. It can
//! probe the target (`get_status`) and correct whatever the probe found
//! wrong (`fix`). Items are materialized once per node and apply run and
//! are immutable after validation.

use crate::bundle::Bundle;
use crate::context::Target;
use crate::error::{Error, Result};
use crate::types::ItemStatus;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Raw attribute mapping of an item, as declared in its bundle
pub type Attributes = Map<String, Value>;

/// Validator for a single attribute value
pub type AttributeValidator = fn(&str, &Value) -> Result<()>;

/// Item types whose declared path is a location other items live under
pub const PATH_DEFINING_TYPES: &[&str] = &["directory", "symlink"];

/// Build an item id from its type and name
pub fn item_id(item_type: &str, name: &str) -> String {
    format!("{item_type}:{name}")
}

/// Split an item id into (type, name)
pub fn split_item_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(':').filter(|(t, n)| !t.is_empty() && !n.is_empty())
}

/// State every item carries regardless of its type
#[derive(Debug, Clone)]
pub struct ItemBase {
    /// Owning bundle (read-only, templating context and asset root)
    pub bundle: Arc<Bundle>,
    /// Item name; for path-bearing items this is the path
    pub name: String,
    /// Explicitly declared dependencies (item ids)
    pub needs: Vec<String>,
    /// Items forced to run when this item is fixed (item ids)
    pub triggers: Vec<String>,
}

impl ItemBase {
    pub fn new(bundle: Arc<Bundle>, name: impl Into<String>) -> Self {
        Self {
            bundle,
            name: name.into(),
            needs: Vec::new(),
            triggers: Vec::new(),
        }
    }
}

/// Core trait for declarative items
///
/// Every item type implements this trait, which provides:
/// - Identity (`"<type>:<name>"`)
/// - Structural dependency inference (auto-deps)
/// - State detection (read-only probe)
/// - State convergence (fix exactly what the probe flagged)
///
/// Probes and fixes return `anyhow::Result`: any error is caught by the
/// executor and recorded as the item's failure.
pub trait Item: Send + Sync + fmt::Debug {
    /// Item type tag (e.g. "file", "directory")
    fn item_type(&self) -> &'static str;

    /// Shared item state
    fn base(&self) -> &ItemBase;

    fn name(&self) -> &str {
        &self.base().name
    }

    /// Unique identifier within a node
    fn id(&self) -> String {
        item_id(self.item_type(), self.name())
    }

    fn bundle(&self) -> &Bundle {
        &self.base().bundle
    }

    fn needs(&self) -> &[String] {
        &self.base().needs
    }

    fn triggers(&self) -> &[String] {
        &self.base().triggers
    }

    /// Ids of items this item implicitly depends on
    ///
    /// Must be a pure function of the node's full item set.
    fn get_auto_deps(&self, _items: &[BoxedItem]) -> Vec<String> {
        Vec::new()
    }

    /// Probe the target and compare against the desired state
    ///
    /// Must never change the target. Every applicable check is evaluated
    /// and all failing ones are reported, not just the first.
    fn get_status(&self, target: &dyn Target) -> anyhow::Result<ItemStatus>;

    /// Perform the corrective actions implied by `status`
    fn fix(&self, target: &dyn Target, status: &ItemStatus) -> anyhow::Result<()>;

    /// Describe what `fix` would do, shown before interactive confirmation
    fn ask(&self, _target: &dyn Target, status: &ItemStatus) -> anyhow::Result<String> {
        Ok(status
            .needs_fixing()
            .iter()
            .map(|c| format!("{c} needs fixing"))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Stand-alone pre-flight check, no target contact
    ///
    /// Errors are returned unmodified so validation fails fast with the
    /// underlying cause (e.g. a template syntax error).
    fn test(&self) -> Result<()> {
        Ok(())
    }
}

/// A boxed item for type-erased storage
pub type BoxedItem = Box<dyn Item>;

/// Run per-attribute validators over an attribute map
///
/// Attributes without a validator are accepted here; unknown keys are
/// rejected later when the map is deserialized.
pub fn validate_with(
    item_id: &str,
    attributes: &Attributes,
    validators: &[(&str, AttributeValidator)],
) -> Result<()> {
    for (key, value) in attributes {
        if let Some((_, validator)) = validators.iter().find(|(name, _)| name == key) {
            validator(item_id, value)?;
        }
    }
    Ok(())
}

/// Deserialize a validated attribute map into a typed struct
pub fn parse_attributes<T: DeserializeOwned>(item_id: &str, attributes: &Attributes) -> Result<T> {
    serde_json::from_value(Value::Object(attributes.clone()))
        .map_err(|e| Error::config(item_id, e.to_string()))
}

/// Permission mode: 3 or 4 octal digits
pub fn validate_mode(item_id: &str, value: &Value) -> Result<()> {
    let Some(mode) = value.as_str() else {
        return Err(Error::config(item_id, "mode must be a string"));
    };
    let valid_len = mode.len() == 3 || mode.len() == 4;
    if !valid_len || !mode.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(Error::config(
            item_id,
            format!("invalid mode: '{mode}' (expected 3 or 4 octal digits)"),
        ));
    }
    Ok(())
}

/// Owner/group names: non-empty, ASCII letters, digits, `.`, `_` and `-` only
///
/// Names are interpolated into remote `chown` commands, so anything a
/// shell would interpret is rejected here.
pub fn validate_account(item_id: &str, value: &Value) -> Result<()> {
    match value.as_str() {
        Some(name) if is_account_name(name) => Ok(()),
        _ => Err(Error::config(
            item_id,
            format!("invalid user or group name: {value}"),
        )),
    }
}

fn is_account_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Normalize a permission mode to four digits for comparison
pub fn normalize_mode(mode: &str) -> String {
    format!("{mode:0>4}")
}

/// Find the nearest path-defining ancestor of `path`
///
/// Considers directory and symlink items whose path is a strict ancestor
/// of `path` and picks the most specific one. When a directory and a
/// symlink are declared at that same path, the symlink wins.
pub fn ancestor_dependency(path: &str, items: &[BoxedItem]) -> Option<String> {
    let path = Path::new(path);
    items
        .iter()
        .filter(|item| PATH_DEFINING_TYPES.contains(&item.item_type()))
        .filter_map(|item| {
            let candidate = Path::new(item.name());
            (candidate != path && path.starts_with(candidate)).then(|| {
                let depth = candidate.components().count();
                let is_symlink = item.item_type() == "symlink";
                ((depth, is_symlink), item.id())
            })
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, id)| id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal item used to populate item sets in tests
    #[derive(Debug)]
    pub(crate) struct StubItem {
        pub item_type: &'static str,
        pub base: ItemBase,
    }

    impl StubItem {
        pub(crate) fn boxed(item_type: &'static str, name: &str) -> BoxedItem {
            let bundle = Arc::new(Bundle::new("test", "node", "/b"));
            Box::new(Self {
                item_type,
                base: ItemBase::new(bundle, name),
            })
        }
    }

    impl Item for StubItem {
        fn item_type(&self) -> &'static str {
            self.item_type
        }

        fn base(&self) -> &ItemBase {
            &self.base
        }

        fn get_status(&self, _target: &dyn Target) -> anyhow::Result<ItemStatus> {
            Ok(ItemStatus::correct_status())
        }

        fn fix(&self, _target: &dyn Target, _status: &ItemStatus) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_item_id_roundtrip() {
        assert_eq!(item_id("file", "/etc/motd"), "file:/etc/motd");
        assert_eq!(split_item_id("file:/etc/motd"), Some(("file", "/etc/motd")));
        assert_eq!(split_item_id("action:run:this"), Some(("action", "run:this")));
        assert_eq!(split_item_id("bogus"), None);
        assert_eq!(split_item_id(":x"), None);
    }

    #[test]
    fn test_mode_validator() {
        for bad in ["ohai", "31337", "47", "4748"] {
            assert!(validate_mode("file:/foo", &Value::from(bad)).is_err(), "{bad}");
        }
        for good in ["0664", "777"] {
            assert!(validate_mode("file:/foo", &Value::from(good)).is_ok(), "{good}");
        }
        assert!(validate_mode("file:/foo", &Value::from(664)).is_err());
    }

    #[test]
    fn test_validator_call() {
        let mut attrs = Attributes::new();
        attrs.insert("mode".into(), Value::from("0644"));
        attrs.insert("owner".into(), Value::from("bad:name"));
        attrs.insert("unvalidated".into(), Value::from(1));

        let validators: &[(&str, AttributeValidator)] =
            &[("mode", validate_mode), ("owner", validate_account)];
        let err = validate_with("file:/foo", &attrs, validators).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        attrs.insert("owner".into(), Value::from("jcleese"));
        assert!(validate_with("file:/foo", &attrs, validators).is_ok());
    }

    #[test]
    fn test_account_names_are_shell_safe() {
        for name in ["root", "www-data", "svc_app", "jcleese.mp", "-dash", "1000"] {
            assert!(validate_account("file:/foo", &Value::from(name)).is_ok(), "{name}");
        }
        for name in ["", "a;b", "$(id)", "`id`", "a b", "a:b", "a/b", "x'y", "a&&b"] {
            assert!(validate_account("file:/foo", &Value::from(name)).is_err(), "{name}");
        }
        assert!(validate_account("file:/foo", &Value::from(0)).is_err());
    }

    #[test]
    fn test_normalize_mode() {
        assert_eq!(normalize_mode("644"), "0644");
        assert_eq!(normalize_mode("1777"), "1777");
    }

    #[test]
    fn test_ancestor_dependency_subdir() {
        let items = vec![
            StubItem::boxed("directory", "/foo/bar"),
            StubItem::boxed("directory", "/bar/foo"),
            StubItem::boxed("file", "/foo/baz"),
            StubItem::boxed("directory", "/foo"),
        ];
        assert_eq!(
            ancestor_dependency("/foo/bar/baz", &items),
            Some("directory:/foo/bar".to_string())
        );
    }

    #[test]
    fn test_ancestor_dependency_prefers_symlink() {
        let items = vec![
            StubItem::boxed("directory", "/foo/bar"),
            StubItem::boxed("symlink", "/foo/bar"),
            StubItem::boxed("directory", "/bar/foo"),
        ];
        assert_eq!(
            ancestor_dependency("/foo/bar/baz", &items),
            Some("symlink:/foo/bar".to_string())
        );
    }

    #[test]
    fn test_ancestor_dependency_is_component_based() {
        let items = vec![
            StubItem::boxed("directory", "/foo/ba"),
            StubItem::boxed("directory", "/foo/bar/baz"),
        ];
        assert_eq!(ancestor_dependency("/foo/bar/baz", &items), None);
    }
}
