//! Normalization of user-supplied search options.
//!
//! A raw option set is merged over the configured [`QueryDefaults`] and
//! coerced into a typed [`SearchOptions`]. Normalization never fails: values
//! that cannot be coerced fall back to the default and unknown keys are
//! dropped, each with a logged diagnostic.
//!
//! ## Coercion table
//!
//! | key           | accepted values                                         |
//! |---------------|---------------------------------------------------------|
//! | `query`       | string; numbers are rendered; null is empty             |
//! | `page`        | integer or numeric string, clamped to at least 1        |
//! | `per_page`    | integer or numeric string, clamped to at least 1        |
//! | `class_names` | string (one name) or list of strings                    |
//! | `sort_mode`   | string, validated when the request is built             |
//! | `sort_by`     | string                                                  |
//! | `weights`     | map of field to number or numeric string                |
//! | `filters`     | map of field to scalar, list, `{min, max}` or `"a..b"`  |
//! | `facets`      | string (one field) or list of strings                   |
//!
//! Legacy aliases `filter`, `raw_filters`, `class_name` and `weight` are
//! honoured when the canonical key is absent.

use crate::config::QueryDefaults;
use crate::types::{FilterValue, OptionValue, RawOptions};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Option keys a search understands.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "query",
    "page",
    "per_page",
    "class_names",
    "sort_by",
    "sort_mode",
    "weights",
    "filters",
    "facets",
];

/// Legacy alias and the canonical key it stands for, in precedence order.
pub const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("filter", "filters"),
    ("raw_filters", "filters"),
    ("class_name", "class_names"),
    ("weight", "weights"),
];

/// A normalized, typed option set for one search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOptions {
    /// The user query, untranslated
    pub query: String,

    /// 1-based page number
    pub page: usize,

    /// Results per page
    pub per_page: usize,

    /// Entity types to search (empty = all mapped types)
    pub class_names: Vec<String>,

    /// Sort mode name, e.g. "relevance" or "descending"
    pub sort_mode: String,

    /// Attribute used by attribute sort modes
    pub sort_by: Option<String>,

    /// Per-field weights (unlisted text fields weigh 1.0)
    pub weights: BTreeMap<String, f64>,

    /// Attribute filters
    pub filters: BTreeMap<String, FilterValue>,

    /// Fields to facet on, in order
    pub facets: Vec<String>,
}

impl SearchOptions {
    /// Merge `input` over `defaults` and coerce every value.
    pub fn normalize(defaults: &QueryDefaults, mut input: RawOptions) -> Self {
        // Fold legacy aliases into their canonical keys first, so that a
        // user-supplied alias beats the configured default.
        for (alias, canonical) in LEGACY_ALIASES {
            if let Some(value) = input.remove(*alias) {
                let present = input.get(*canonical).is_some_and(|v| !v.is_null());
                if !present && !value.is_null() {
                    input.insert(canonical.to_string(), value);
                }
            }
        }

        let discarded: Vec<&str> = input
            .keys()
            .map(String::as_str)
            .filter(|key| !RECOGNIZED_KEYS.contains(key))
            .collect();
        if !discarded.is_empty() {
            warn!(keys = %discarded.join(", "), "Discarded unrecognized search options");
        }

        let mut take = |key: &str| input.remove(key).filter(|v| !v.is_null());

        let query = match take("query") {
            Some(OptionValue::Str(s)) => s,
            Some(OptionValue::Int(i)) => i.to_string(),
            Some(OptionValue::Float(f)) => f.to_string(),
            Some(other) => {
                warn!(value = ?other, "Ignoring non-text query");
                String::new()
            }
            None => String::new(),
        };

        SearchOptions {
            query,
            page: coerce_count("page", take("page"), defaults.page),
            per_page: coerce_count("per_page", take("per_page"), defaults.per_page),
            class_names: coerce_names("class_names", take("class_names"))
                .unwrap_or_else(|| defaults.class_names.clone()),
            sort_mode: coerce_string("sort_mode", take("sort_mode"))
                .unwrap_or_else(|| defaults.sort_mode.clone()),
            sort_by: coerce_string("sort_by", take("sort_by")).or_else(|| defaults.sort_by.clone()),
            weights: coerce_weights(take("weights")).unwrap_or_else(|| defaults.weights.clone()),
            filters: coerce_filters(take("filters"))
                .unwrap_or_else(|| coerce_filter_map(&defaults.filters)),
            facets: coerce_names("facets", take("facets"))
                .unwrap_or_else(|| defaults.facets.clone()),
        }
    }

    /// Look up a recognized option by name, in its normalized form.
    ///
    /// Returns `None` for unknown names and for an unset `sort_by`.
    pub fn get_option(&self, name: &str) -> Option<OptionValue> {
        let names = |list: &[String]| {
            OptionValue::List(list.iter().cloned().map(OptionValue::Str).collect())
        };
        match name {
            "query" => Some(self.query.clone().into()),
            "page" => Some(OptionValue::Int(self.page as i64)),
            "per_page" => Some(OptionValue::Int(self.per_page as i64)),
            "class_names" => Some(names(&self.class_names)),
            "sort_mode" => Some(self.sort_mode.clone().into()),
            "sort_by" => self.sort_by.clone().map(OptionValue::Str),
            "weights" => Some(OptionValue::Map(
                self.weights
                    .iter()
                    .map(|(k, v)| (k.clone(), OptionValue::Float(*v)))
                    .collect(),
            )),
            "filters" => Some(OptionValue::Map(
                self.filters
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_option()))
                    .collect(),
            )),
            "facets" => Some(names(&self.facets)),
            _ => None,
        }
    }
}

fn coerce_count(key: &str, value: Option<OptionValue>, default: usize) -> usize {
    let count = match value {
        None => default,
        Some(value) => match value.as_i64() {
            Some(n) => n.max(1) as usize,
            None => {
                warn!(key, value = ?value, "Option is not an integer, using default");
                default
            }
        },
    };
    count.max(1)
}

fn coerce_string(key: &str, value: Option<OptionValue>) -> Option<String> {
    match value? {
        OptionValue::Str(s) => Some(s),
        other => {
            warn!(key, value = ?other, "Option is not a string, using default");
            None
        }
    }
}

fn coerce_names(key: &str, value: Option<OptionValue>) -> Option<Vec<String>> {
    match value? {
        OptionValue::Str(s) => Some(vec![s]),
        OptionValue::List(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    OptionValue::Str(s) => Some(s),
                    other => {
                        warn!(key, value = ?other, "Ignoring non-string list entry");
                        None
                    }
                })
                .collect(),
        ),
        other => {
            warn!(key, value = ?other, "Option is not a name list, using default");
            None
        }
    }
}

fn coerce_weights(value: Option<OptionValue>) -> Option<BTreeMap<String, f64>> {
    match value? {
        OptionValue::Map(map) => Some(
            map.into_iter()
                .filter_map(|(field, weight)| match weight.as_f64() {
                    Some(w) => Some((field, w)),
                    None => {
                        warn!(field = %field, value = ?weight, "Ignoring non-numeric weight");
                        None
                    }
                })
                .collect(),
        ),
        other => {
            warn!(value = ?other, "Weights are not a map, using default");
            None
        }
    }
}

fn coerce_filters(value: Option<OptionValue>) -> Option<BTreeMap<String, FilterValue>> {
    match value? {
        OptionValue::Map(map) => Some(coerce_filter_map(&map)),
        other => {
            warn!(value = ?other, "Filters are not a map, using default");
            None
        }
    }
}

fn coerce_filter_map(map: &BTreeMap<String, OptionValue>) -> BTreeMap<String, FilterValue> {
    map.iter()
        .filter_map(|(field, value)| match FilterValue::from_option(value) {
            Some(filter) => Some((field.clone(), filter)),
            None => {
                warn!(field = %field, value = ?value, "Ignoring filter of unusable shape");
                None
            }
        })
        .collect()
}
