//! Instance configuration file (`apps.toml`).
//!
//! ```toml
//! [[instance]]
//! name = "my_lights"
//! app = "lights"
//! deps = ["apps/presence"]   # optional, restarts on their changes
//! entity = "light.kitchen"   # everything else is payload
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use super::{SourceError, parse_dependency};
use crate::graph::{ConfigEntryError, NodeId};

/// One well-formed `[[instance]]` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceEntry {
    pub name: String,
    pub app: String,
    pub payload: toml::Table,
    pub deps: BTreeSet<NodeId>,
    pub index: usize,
}

/// Parsed configuration set plus entries that had to be skipped.
#[derive(Debug, Default)]
pub struct InstanceSet {
    pub entries: Vec<InstanceEntry>,
    pub errors: Vec<ConfigEntryError>,
    /// Top-level keys other than `instance`.
    pub ignored: Vec<String>,
}

/// Read the configuration file. A missing file is an empty set.
pub fn load(path: &Path) -> Result<InstanceSet, SourceError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(InstanceSet::default()),
        Err(err) => return Err(SourceError::Io(path.to_path_buf(), err)),
    };
    parse(&content).map_err(|err| SourceError::Toml(path.to_path_buf(), err))
}

/// Parse configuration text. Only TOML syntax errors fail the whole set.
pub fn parse(content: &str) -> Result<InstanceSet, toml::de::Error> {
    let mut root: toml::Table = toml::from_str(content)?;
    let mut set = InstanceSet::default();

    let raw = match root.remove("instance") {
        Some(toml::Value::Array(items)) => items,
        Some(_) => {
            set.errors.push(ConfigEntryError::Malformed {
                index: 0,
                reason: "`instance` must be an array of tables".into(),
            });
            Vec::new()
        }
        None => Vec::new(),
    };
    set.ignored = root.keys().cloned().collect();

    for (index, item) in raw.into_iter().enumerate() {
        match entry(index, item) {
            Ok(entry) => set.entries.push(entry),
            Err(err) => set.errors.push(err),
        }
    }
    Ok(set)
}

fn entry(index: usize, item: toml::Value) -> Result<InstanceEntry, ConfigEntryError> {
    let toml::Value::Table(mut payload) = item else {
        return Err(ConfigEntryError::Malformed {
            index,
            reason: "entry is not a table".into(),
        });
    };
    let name = take_string(&mut payload, index, "name")?;
    let app = take_string(&mut payload, index, "app")?;
    let deps = take_deps(&mut payload, index)?;
    Ok(InstanceEntry {
        name,
        app,
        payload,
        deps,
        index,
    })
}

fn take_deps(table: &mut toml::Table, index: usize) -> Result<BTreeSet<NodeId>, ConfigEntryError> {
    let malformed = |reason: String| ConfigEntryError::Malformed { index, reason };
    let items = match table.remove("deps") {
        None => return Ok(BTreeSet::new()),
        Some(toml::Value::Array(items)) => items,
        Some(other) => {
            return Err(malformed(format!(
                "`deps` must be an array of strings, found {}",
                other.type_str()
            )));
        }
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .and_then(parse_dependency)
                .ok_or_else(|| malformed(format!("invalid dependency {item}")))
        })
        .collect()
}

fn take_string(
    table: &mut toml::Table,
    index: usize,
    key: &'static str,
) -> Result<String, ConfigEntryError> {
    match table.remove(key) {
        Some(toml::Value::String(value)) if !value.trim().is_empty() => Ok(value),
        Some(toml::Value::String(_)) | None => Err(ConfigEntryError::MissingKey { index, key }),
        Some(other) => Err(ConfigEntryError::Malformed {
            index,
            reason: format!("`{key}` must be a string, found {}", other.type_str()),
        }),
    }
}
