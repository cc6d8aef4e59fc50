//! Entity-type name to class id mapping.
//!
//! The mapping is read from the generated daemon configuration rather than
//! from the host's current models, so that it always agrees with the index
//! the daemon actually serves. The configuration declares one source per
//! entity type and one `sql_query` per source selecting a constant class id:
//!
//! ```text
//! source sellers
//! {
//!   sql_query = SELECT id * 2 + 0 AS id, 0 AS class_id, ... FROM sellers
//! }
//!
//! source geo__states
//! {
//!   sql_query = SELECT id * 2 + 1 AS id, 1 AS class_id, ... FROM states
//! }
//! ```
//!
//! Sources and class ids are paired in file order. A missing file or a
//! count mismatch leaves the map empty: searches still run, they just
//! resolve no entities.

use crate::error::{Result, SearchError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

static SOURCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^source ([\w-]+)").expect("valid source regex"));

static CLASS_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) AS class_id").expect("valid class id regex"));

/// Bidirectional mapping between entity-type names and class ids.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassIdMap {
    by_name: BTreeMap<String, u32>,
    by_id: BTreeMap<u32, String>,
}

impl ClassIdMap {
    /// An empty mapping; every class id is unmapped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a mapping from `(name, id)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut map = ClassIdMap::default();
        for (name, id) in pairs {
            let name = name.into();
            map.by_id.insert(id, name.clone());
            map.by_name.insert(name, id);
        }
        map
    }

    /// Load the mapping from a generated daemon configuration.
    ///
    /// Never fails: a missing or corrupted file is logged and yields an
    /// empty mapping.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(map) => {
                info!(path = %path.display(), classes = map.len(), "Loaded class id mapping");
                map
            }
            Err(SearchError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    "Daemon configuration not found, no entity types will be mapped"
                );
                ClassIdMap::empty()
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Daemon configuration is unusable, no entity types will be mapped"
                );
                ClassIdMap::empty()
            }
        }
    }

    /// Load the mapping, surfacing failures instead of degrading.
    pub fn try_load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents).map_err(|reason| SearchError::ConfigCorrupted {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse the mapping from configuration text.
    pub fn parse(contents: &str) -> std::result::Result<Self, String> {
        let mut sources = Vec::new();
        let mut ids = Vec::new();

        for line in contents.lines().map(str::trim_start) {
            if let Some(caps) = SOURCE_LINE.captures(line) {
                sources.push(classify(&caps[1]));
            } else if line.starts_with("sql_query ") || line.starts_with("sql_query=") {
                let id = CLASS_ID
                    .captures(line)
                    .and_then(|caps| caps[1].parse::<u32>().ok())
                    .ok_or_else(|| format!("sql_query without a class id: {}", line.trim()))?;
                ids.push(id);
            }
        }

        if sources.len() != ids.len() {
            return Err(format!(
                "{} sources but {} class ids",
                sources.len(),
                ids.len()
            ));
        }

        let map = Self::from_pairs(sources.into_iter().zip(ids));
        if map.by_name.len() != map.by_id.len() {
            return Err("duplicate source names or class ids".to_string());
        }
        Ok(map)
    }

    /// Class id of an entity type
    pub fn id_of(&self, class_name: &str) -> Option<u32> {
        self.by_name.get(class_name).copied()
    }

    /// Entity type of a class id
    pub fn name_of(&self, class_id: u32) -> Option<&str> {
        self.by_id.get(&class_id).map(String::as_str)
    }

    /// Number of mapped entity types
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if no entity type is mapped
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate `(name, id)` pairs in class id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.by_id.iter().map(|(id, name)| (name.as_str(), *id))
    }

    /// The document id codec matching this mapping.
    pub fn codec(&self) -> DocumentIdCodec {
        DocumentIdCodec::new(self.len() as u64)
    }
}

/// Encodes `(class_id, primary_key)` into the daemon's shared document
/// id-space: `document_id = primary_key * multiplier + class_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentIdCodec {
    multiplier: u64,
}

impl DocumentIdCodec {
    /// Create a codec for `multiplier` entity types
    pub fn new(multiplier: u64) -> Self {
        DocumentIdCodec { multiplier }
    }

    /// Encode a primary key of the given class
    pub fn encode(&self, class_id: u32, primary_key: u64) -> u64 {
        primary_key * self.multiplier + class_id as u64
    }

    /// Decode a document id into `(class_id, primary_key)`.
    ///
    /// Returns `None` when no entity type is mapped.
    pub fn decode(&self, document_id: u64) -> Option<(u32, u64)> {
        if self.multiplier == 0 {
            return None;
        }
        let class_id = u32::try_from(document_id % self.multiplier).ok()?;
        Some((class_id, document_id / self.multiplier))
    }
}

/// Turn a source name into an entity-type name.
///
/// `__` separates namespaces; each segment is camel-cased and the last one
/// singularized: `geo__states` becomes `Geo::State`.
pub fn classify(source: &str) -> String {
    let segments: Vec<&str> = source.split("__").filter(|s| !s.is_empty()).collect();
    let last = segments.len().saturating_sub(1);

    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            if i == last {
                camelize(&singularize(segment))
            } else {
                camelize(segment)
            }
        })
        .collect::<Vec<_>>()
        .join("::")
}

fn camelize(segment: &str) -> String {
    segment
        .split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if ["sses", "xes", "ches", "shes", "zes"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        word[..word.len() - 2].to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}
