//! Configuration management for Ultrasearch.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location
//! and is immutable once loaded: a [`Config`] is built at startup and handed
//! to each search by reference.

use crate::error::{Result, SearchError};
use crate::types::OptionValue;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main configuration structure for Ultrasearch.
///
/// ## Example Configuration File (ultrasearch.toml)
///
/// ```toml
/// [query_defaults]
/// per_page = 10
/// sort_mode = "relevance"
/// weights = { title = 2.0 }
///
/// [excerpting]
/// before_match = "<em>"
/// after_match = "</em>"
/// content_methods = [["title", "name"], ["body", "description"]]
///
/// [client]
/// with_subtotals = true
/// max_retries = 2
/// retry_sleep_time = 0.25
///
/// [daemon]
/// max_matches = 1000
/// conf_path = "config/development.conf"
/// text_fields = ["title", "name", "body", "description"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults merged under every user option set
    pub query_defaults: QueryDefaults,

    /// Highlighting and excerpt options
    pub excerpting: ExcerptingOptions,

    /// Client behaviour (retries, subtotals, facets)
    pub client: ClientOptions,

    /// Settings mirrored from the daemon's own configuration
    pub daemon: DaemonSettings,
}

/// Defaults for every search option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub page: usize,
    pub per_page: usize,
    pub class_names: Vec<String>,
    pub sort_mode: String,
    pub sort_by: Option<String>,
    pub weights: BTreeMap<String, f64>,
    pub filters: BTreeMap<String, OptionValue>,
    pub facets: Vec<String>,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        QueryDefaults {
            page: 1,
            per_page: 20,
            class_names: Vec::new(),
            sort_mode: "relevance".to_string(),
            sort_by: Some("created_at".to_string()),
            weights: BTreeMap::new(),
            filters: BTreeMap::new(),
            facets: Vec::new(),
        }
    }
}

/// Options for the excerpting pass.
///
/// Everything except `content_methods` is forwarded to the daemon's
/// excerpt builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcerptingOptions {
    /// Markup inserted before each highlighted match
    pub before_match: String,

    /// Markup inserted after each highlighted match
    pub after_match: String,

    /// Separator between excerpt chunks
    pub chunk_separator: String,

    /// Maximum excerpt size in characters
    pub limit: usize,

    /// Words kept on either side of each match
    pub around: usize,

    /// Groups of candidate field names; the first field an entity exposes
    /// in each group is excerpted
    pub content_methods: Vec<Vec<String>>,
}

impl Default for ExcerptingOptions {
    fn default() -> Self {
        let group = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        ExcerptingOptions {
            before_match: "<strong>".to_string(),
            after_match: "</strong>".to_string(),
            chunk_separator: "...".to_string(),
            limit: 256,
            around: 3,
            content_methods: vec![
                group(&["title", "name"]),
                group(&["body", "description", "content"]),
                group(&["metadata"]),
            ],
        }
    }
}

/// Client behaviour options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Issue one extra query per entity type to compute subtotals
    pub with_subtotals: bool,

    /// Retries after the first attempt for transient daemon failures
    pub max_retries: u32,

    /// Seconds to sleep between attempts
    pub retry_sleep_time: f64,

    /// Maximum number of distinct values kept per facet
    pub max_facets: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            with_subtotals: false,
            max_retries: 4,
            retry_sleep_time: 0.5,
            max_facets: 100,
        }
    }
}

impl ClientOptions {
    /// The pause between retry attempts
    pub fn retry_sleep(&self) -> Duration {
        Duration::from_secs_f64(self.retry_sleep_time.max(0.0))
    }
}

/// Settings that must agree with the daemon's index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Upper bound on matches the daemon will report
    pub max_matches: usize,

    /// Name of the unified index used for excerpting
    pub index_name: String,

    /// Generated daemon configuration (source of the class-id mapping)
    pub conf_path: Option<PathBuf>,

    /// Declared full-text fields
    pub text_fields: Vec<String>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        DaemonSettings {
            max_matches: 1000,
            index_name: "complete".to_string(),
            conf_path: None,
            text_fields: Vec::new(),
        }
    }
}

impl DaemonSettings {
    /// Returns true if `field` is a declared text field
    pub fn is_text_field(&self, field: &str) -> bool {
        self.text_fields.iter().any(|f| f == field)
    }
}

/// Recognized keys per section, used to report unknown ones.
const KNOWN_KEYS: &[(&str, &[&str])] = &[
    (
        "query_defaults",
        &[
            "page",
            "per_page",
            "class_names",
            "sort_mode",
            "sort_by",
            "weights",
            "filters",
            "facets",
        ],
    ),
    (
        "excerpting",
        &[
            "before_match",
            "after_match",
            "chunk_separator",
            "limit",
            "around",
            "content_methods",
        ],
    ),
    (
        "client",
        &["with_subtotals", "max_retries", "retry_sleep_time", "max_facets"],
    ),
    (
        "daemon",
        &["max_matches", "index_name", "conf_path", "text_fields"],
    ),
];

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    ///
    /// Unrecognized sections and keys are reported and ignored.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(contents).map_err(|e| SearchError::Config {
            reason: format!("Failed to parse config: {}", e),
        })?;

        for unknown in unrecognized_keys(&table) {
            warn!(key = %unknown, "Ignoring unrecognized configuration option");
        }

        let config: Config =
            toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| SearchError::Config {
                    reason: format!("Failed to parse config: {}", e),
                })?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SearchError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs =
            ProjectDirs::from("", "", "ultrasearch").ok_or_else(|| SearchError::Config {
                reason: "Could not determine config directory".to_string(),
            })?;

        Ok(dirs.config_dir().join("ultrasearch.toml"))
    }
}

/// Collect `section.key` names that no config record recognizes.
fn unrecognized_keys(table: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    for (section, value) in table {
        let Some((_, known)) = KNOWN_KEYS.iter().find(|(name, _)| name == section) else {
            unknown.push(section.clone());
            continue;
        };
        if let Some(entries) = value.as_table() {
            unknown.extend(
                entries
                    .keys()
                    .filter(|key| !known.contains(&key.as_str()))
                    .map(|key| format!("{}.{}", section, key)),
            );
        }
    }
    unknown
}
