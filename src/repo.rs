//! Repository discovery and loading
//!
//! A repository is a directory holding `nodes.toml` and a `bundles/`
//! directory. Each bundle declares its items in `bundles/<name>/items.toml`
//! and keeps its assets under `bundles/<name>/files/`.

use anyhow::{Context, Result, bail};
use declarative::{Attributes, BoxedItem, Bundle, ItemRegistry, ItemSpec, check_unique_ids};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const NODES_FILE: &str = "nodes.toml";
pub const BUNDLES_DIR: &str = "bundles";
pub const ITEMS_FILE: &str = "items.toml";

/// Hostname that selects the local transport
pub const LOCALHOST: &str = "localhost";

/// The working directory does not hold a repository
#[derive(Debug, Error)]
#[error("The current working directory is not a converge repository.")]
pub struct NoSuchRepository(pub PathBuf);

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodesFile {
    #[serde(default)]
    nodes: BTreeMap<String, NodeConfig>,
    #[serde(default)]
    groups: BTreeMap<String, GroupConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeConfig {
    hostname: Option<String>,
    #[serde(default)]
    bundles: Vec<String>,
    #[serde(default)]
    metadata: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupConfig {
    #[serde(default)]
    members: Vec<String>,
}

/// A node as declared in `nodes.toml`
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub hostname: String,
    pub bundles: Vec<String>,
    /// Exposed to templates as bundle variables
    pub metadata: serde_json::Map<String, Value>,
}

impl Node {
    pub fn is_local(&self) -> bool {
        self.hostname == LOCALHOST
    }
}

#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    nodes: BTreeMap<String, Node>,
    groups: BTreeMap<String, Vec<String>>,
}

impl Repository {
    /// Open the repository rooted at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let nodes_file = path.join(NODES_FILE);
        if !nodes_file.is_file() || !path.join(BUNDLES_DIR).is_dir() {
            return Err(NoSuchRepository(path.to_path_buf()).into());
        }

        let content = fs::read_to_string(&nodes_file)
            .with_context(|| format!("Could not read {}", nodes_file.display()))?;
        let parsed: NodesFile = toml::from_str(&content)
            .with_context(|| format!("Invalid {} format", nodes_file.display()))?;

        let mut nodes = BTreeMap::new();
        for (name, config) in parsed.nodes {
            let metadata = match serde_json::to_value(&config.metadata)? {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            nodes.insert(
                name.clone(),
                Node {
                    hostname: config.hostname.unwrap_or_else(|| name.clone()),
                    name,
                    bundles: config.bundles,
                    metadata,
                },
            );
        }

        let mut groups = BTreeMap::new();
        for (name, group) in parsed.groups {
            if nodes.contains_key(&name) {
                bail!("Group '{name}' has the same name as a node");
            }
            if let Some(missing) = group.members.iter().find(|m| !nodes.contains_key(*m)) {
                bail!("Group '{name}' references unknown node '{missing}'");
            }
            groups.insert(name, group.members);
        }

        log::debug!(
            "opened repository {} ({} nodes, {} groups)",
            path.display(),
            nodes.len(),
            groups.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            nodes,
            groups,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, members)| (name.as_str(), members.as_slice()))
    }

    /// Resolve a target selector: node or group names, comma-separated
    pub fn select(&self, selector: &str) -> Result<Vec<&Node>> {
        let mut selected: Vec<&Node> = Vec::new();
        for name in selector.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let found: Vec<&Node> = if let Some(node) = self.nodes.get(name) {
                vec![node]
            } else if let Some(members) = self.groups.get(name) {
                members.iter().filter_map(|m| self.nodes.get(m)).collect()
            } else {
                bail!("No such node or group: {name}");
            };
            for node in found {
                if !selected.iter().any(|n| n.name == node.name) {
                    selected.push(node);
                }
            }
        }

        if selected.is_empty() {
            bail!("Target '{selector}' selects no nodes");
        }
        Ok(selected)
    }

    pub fn bundle_dir(&self, bundle: &str) -> PathBuf {
        self.path.join(BUNDLES_DIR).join(bundle)
    }

    /// Materialize every item of a node from its bundles
    pub fn load_items(&self, node: &Node, registry: &ItemRegistry) -> Result<Vec<BoxedItem>> {
        let mut items = Vec::new();
        for name in &node.bundles {
            let dir = self.bundle_dir(name);
            if !dir.is_dir() {
                bail!("Node '{}' uses unknown bundle '{name}'", node.name);
            }
            let bundle = Arc::new(
                Bundle::new(name.as_str(), node.name.as_str(), &dir)
                    .with_metadata(node.metadata.clone()),
            );
            let specs = read_item_specs(&dir.join(ITEMS_FILE))?;
            items.extend(registry.build_all(&bundle, specs)?);
        }
        check_unique_ids(&items)?;
        Ok(items)
    }
}

/// Read item declarations from a bundle's `items.toml`
///
/// A missing file declares no items.
pub fn read_item_specs(path: &Path) -> Result<Vec<ItemSpec>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&content).with_context(|| format!("Invalid {} format", path.display()))?;
    parse_item_specs(table).with_context(|| format!("Invalid items in {}", path.display()))
}

fn parse_item_specs(table: toml::Table) -> Result<Vec<ItemSpec>> {
    let mut specs = Vec::new();
    for (item_type, items) in table {
        let toml::Value::Table(items) = items else {
            bail!("[{item_type}] must be a table of items");
        };
        for (name, attributes) in items {
            let Value::Object(mut attributes) = serde_json::to_value(&attributes)? else {
                bail!("{item_type}:{name} must be a table");
            };
            let needs = take_id_list(&mut attributes, "needs")
                .with_context(|| format!("{item_type}:{name}"))?;
            let triggers = take_id_list(&mut attributes, "triggers")
                .with_context(|| format!("{item_type}:{name}"))?;
            specs.push(ItemSpec {
                needs,
                triggers,
                attributes,
                ..ItemSpec::new(item_type.as_str(), name)
            });
        }
    }
    Ok(specs)
}

/// Remove a reserved id-list key from an attribute map
fn take_id_list(attributes: &mut Attributes, key: &str) -> Result<Vec<String>> {
    match attributes.remove(key) {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("'{key}' must be a list of item ids")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NODES: &str = r#"
[nodes.web1]
hostname = "web1.example.com"
bundles = ["base"]

[nodes.web1.metadata]
role = "frontend"

[nodes.web2]
bundles = ["base"]

[nodes.local]
hostname = "localhost"

[groups.web]
members = ["web1", "web2"]
"#;

    const ITEMS: &str = r#"
[directory."/srv/www"]
mode = "0750"

[file."/srv/www/index.html"]
content = "hello"
needs = ["directory:/srv/www"]
triggers = ["action:reload"]

[action.reload]
command = "systemctl reload nginx"
triggered = true
"#;

    fn repo() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(NODES_FILE), NODES).unwrap();
        fs::create_dir_all(dir.path().join("bundles/base/files")).unwrap();
        fs::write(dir.path().join("bundles/base").join(ITEMS_FILE), ITEMS).unwrap();
        dir
    }

    #[test]
    fn test_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::open(dir.path()).unwrap_err();
        assert!(err.downcast_ref::<NoSuchRepository>().is_some());
        assert_eq!(
            err.to_string(),
            "The current working directory is not a converge repository."
        );
    }

    #[test]
    fn test_open() {
        let dir = repo();
        let repo = Repository::open(dir.path()).unwrap();
        let names: Vec<_> = repo.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["local", "web1", "web2"]);

        let web2 = repo.select("web2").unwrap()[0];
        assert_eq!(web2.hostname, "web2");
        assert!(repo.select("local").unwrap()[0].is_local());
        assert_eq!(
            repo.select("web1").unwrap()[0].metadata.get("role"),
            Some(&Value::from("frontend"))
        );
    }

    #[test]
    fn test_select() {
        let dir = repo();
        let repo = Repository::open(dir.path()).unwrap();

        let names = |selector: &str| -> Vec<String> {
            repo.select(selector)
                .unwrap()
                .into_iter()
                .map(|n| n.name.clone())
                .collect()
        };
        assert_eq!(names("web"), ["web1", "web2"]);
        assert_eq!(names("local,web"), ["local", "web1", "web2"]);
        assert_eq!(names("web1, web"), ["web1", "web2"]);
        assert!(repo.select("nope").is_err());
        assert!(repo.select("").is_err());
    }

    #[test]
    fn test_unknown_group_member() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(NODES_FILE),
            "[groups.g]\nmembers = [\"ghost\"]\n",
        )
        .unwrap();
        fs::create_dir(dir.path().join(BUNDLES_DIR)).unwrap();
        assert!(Repository::open(dir.path()).is_err());
    }

    #[test]
    fn test_load_items() {
        let dir = repo();
        let repo = Repository::open(dir.path()).unwrap();
        let node = repo.select("web1").unwrap()[0];
        let items = repo.load_items(node, &ItemRegistry::builtin()).unwrap();

        let mut ids: Vec<String> = items.iter().map(|i| i.id()).collect();
        ids.sort();
        assert_eq!(
            ids,
            ["action:reload", "directory:/srv/www", "file:/srv/www/index.html"]
        );

        let file = items
            .iter()
            .find(|i| i.id() == "file:/srv/www/index.html")
            .unwrap();
        assert_eq!(file.needs(), ["directory:/srv/www"]);
        assert_eq!(file.triggers(), ["action:reload"]);
        assert_eq!(file.bundle().node_name(), "web1");
        assert_eq!(file.bundle().bundle_dir(), dir.path().join("bundles/base"));
    }

    #[test]
    fn test_node_without_bundles_has_no_items() {
        let dir = repo();
        let repo = Repository::open(dir.path()).unwrap();
        let node = repo.select("local").unwrap()[0];
        assert!(repo.load_items(node, &ItemRegistry::builtin()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_items() {
        let table: toml::Table = toml::from_str("[file.\"/a\"]\nneeds = \"not-a-list\"\n").unwrap();
        assert!(parse_item_specs(table).is_err());

        let table: toml::Table = toml::from_str("file = 3\n").unwrap();
        assert!(parse_item_specs(table).is_err());
    }
}
