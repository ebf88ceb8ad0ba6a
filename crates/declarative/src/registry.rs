//! Static registry of item types
//!
//! Maps a type tag (`"file"`, `"directory"`, ...) to the constructor of
//! a compiled item implementation. Items are materialized in one pass per
//! node; dependency edges are computed afterwards over the finished set.

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use crate::item::{Attributes, BoxedItem, ItemBase, item_id};
use crate::items::{Action, Directory, File, Symlink, action, directory, file, symlink};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Builds a validated item from its base and attribute map
pub type Constructor = fn(ItemBase, &Attributes) -> Result<BoxedItem>;

/// Declaration of one item, as read from a bundle
#[derive(Debug, Clone, Default)]
pub struct ItemSpec {
    pub item_type: String,
    pub name: String,
    pub needs: Vec<String>,
    pub triggers: Vec<String>,
    pub attributes: Attributes,
}

impl ItemSpec {
    pub fn new(item_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> String {
        item_id(&self.item_type, &self.name)
    }
}

/// Type tag to constructor mapping
pub struct ItemRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ItemRegistry {
    /// Registry without any item types
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in item type
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(action::ITEM_TYPE, |base, attrs| {
            Ok(Box::new(Action::from_attributes(base, attrs)?))
        });
        registry.register(directory::ITEM_TYPE, |base, attrs| {
            Ok(Box::new(Directory::from_attributes(base, attrs)?))
        });
        registry.register(file::ITEM_TYPE, |base, attrs| {
            Ok(Box::new(File::from_attributes(base, attrs)?))
        });
        registry.register(symlink::ITEM_TYPE, |base, attrs| {
            Ok(Box::new(Symlink::from_attributes(base, attrs)?))
        });
        registry
    }

    pub fn register(&mut self, item_type: &'static str, constructor: Constructor) {
        self.constructors.insert(item_type, constructor);
    }

    /// Registered type tags, sorted
    pub fn types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Validate and materialize one item
    pub fn build(&self, bundle: &Arc<Bundle>, spec: ItemSpec) -> Result<BoxedItem> {
        let id = spec.id();
        let constructor = self
            .constructors
            .get(spec.item_type.as_str())
            .ok_or_else(|| Error::config(&id, format!("unknown item type '{}'", spec.item_type)))?;

        let base = ItemBase {
            bundle: Arc::clone(bundle),
            name: spec.name,
            needs: spec.needs,
            triggers: spec.triggers,
        };
        log::trace!("materializing {id}");
        constructor(base, &spec.attributes)
    }

    /// Materialize every item of a bundle
    pub fn build_all(
        &self,
        bundle: &Arc<Bundle>,
        specs: impl IntoIterator<Item = ItemSpec>,
    ) -> Result<Vec<BoxedItem>> {
        specs
            .into_iter()
            .map(|spec| self.build(bundle, spec))
            .collect()
    }
}

/// Fail if two items of one node share an id
pub fn check_unique_ids(items: &[BoxedItem]) -> Result<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let id = item.id();
        if !seen.insert(id.clone()) {
            return Err(Error::config(
                id,
                format!("declared more than once (again in bundle {})", item.bundle().name()),
            ));
        }
    }
    Ok(())
}
