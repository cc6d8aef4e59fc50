//! Translation of search options into daemon request settings.
//!
//! [`DaemonRequest`] mirrors the setter surface of the daemon protocol
//! (filters, weights, sort mode, limits, grouping); [`RequestBuilder`] fills
//! one in from a normalized [`SearchOptions`].

use crate::class_map::ClassIdMap;
use crate::config::DaemonSettings;
use crate::error::{Result, SearchError};
use crate::options::SearchOptions;
use crate::types::{FilterValue, Scalar};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Attribute holding each document's class id.
pub const CLASS_ID_ATTRIBUTE: &str = "class_id";

/// Group ordering used for facet queries: largest groups first.
pub const GROUP_SORT_BY_COUNT: &str = "@count desc";

/// How the daemon orders matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// By relevance weight
    Relevance,
    /// By attribute, largest first
    Descending,
    /// By attribute, smallest first
    Ascending,
    /// By time segments, then relevance
    Time,
    /// By an SQL-like sort clause
    Extended,
}

impl SortMode {
    /// The daemon's native constant for this mode
    pub fn code(&self) -> u32 {
        match self {
            SortMode::Relevance => 0,
            SortMode::Descending => 1,
            SortMode::Ascending => 2,
            SortMode::Time => 3,
            SortMode::Extended => 4,
        }
    }

    /// Returns true if the mode orders by the `sort_by` attribute or clause
    pub fn uses_sort_by(&self) -> bool {
        !matches!(self, SortMode::Relevance)
    }
}

impl FromStr for SortMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relevance" => Ok(SortMode::Relevance),
            "descending" | "desc" => Ok(SortMode::Descending),
            "ascending" | "asc" => Ok(SortMode::Ascending),
            "time" => Ok(SortMode::Time),
            "extended" => Ok(SortMode::Extended),
            other => Err(SearchError::usage(format!("unknown sort mode: {}", other))),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortMode::Relevance => "relevance",
            SortMode::Descending => "descending",
            SortMode::Ascending => "ascending",
            SortMode::Time => "time",
            SortMode::Extended => "extended",
        };
        write!(f, "{}", name)
    }
}

/// One attribute filter of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeFilter {
    pub attribute: String,
    pub value: FilterValue,
}

/// Settings for one daemon round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonRequest {
    pub sort_mode: SortMode,
    pub sort_by: Option<String>,
    pub filters: Vec<AttributeFilter>,
    pub field_weights: BTreeMap<String, f64>,
    pub offset: usize,
    pub limit: usize,
    pub max_matches: usize,
    pub group_by: Option<String>,
    pub group_sort: Option<String>,
}

impl Default for DaemonRequest {
    fn default() -> Self {
        DaemonRequest {
            sort_mode: SortMode::Relevance,
            sort_by: None,
            filters: Vec::new(),
            field_weights: BTreeMap::new(),
            offset: 0,
            limit: 20,
            max_matches: 1000,
            group_by: None,
            group_sort: None,
        }
    }
}

impl DaemonRequest {
    /// Set (or replace) the filter on `attribute`.
    pub fn set_filter(&mut self, attribute: impl Into<String>, value: FilterValue) {
        let attribute = attribute.into();
        self.filters.retain(|f| f.attribute != attribute);
        self.filters.push(AttributeFilter { attribute, value });
    }

    /// Get the filter on `attribute`, if any
    pub fn filter(&self, attribute: &str) -> Option<&FilterValue> {
        self.filters
            .iter()
            .find(|f| f.attribute == attribute)
            .map(|f| &f.value)
    }

    /// Set per-field weights
    pub fn set_weights(&mut self, weights: BTreeMap<String, f64>) {
        self.field_weights = weights;
    }

    /// Set the sort mode and its attribute or clause
    pub fn set_sort_mode(&mut self, mode: SortMode, sort_by: Option<String>) {
        self.sort_mode = mode;
        self.sort_by = sort_by;
    }

    /// Set the result window
    pub fn set_limits(&mut self, offset: usize, limit: usize, max_matches: usize) {
        self.offset = offset;
        self.limit = limit;
        self.max_matches = max_matches;
    }

    /// Group matches on `field`
    pub fn set_group_by(&mut self, field: impl Into<String>, group_sort: impl Into<String>) {
        self.group_by = Some(field.into());
        self.group_sort = Some(group_sort.into());
    }
}

/// Builds daemon requests from normalized options.
pub struct RequestBuilder<'a> {
    settings: &'a DaemonSettings,
    class_map: &'a ClassIdMap,
}

impl<'a> RequestBuilder<'a> {
    /// Create a builder for the given daemon settings and class mapping
    pub fn new(settings: &'a DaemonSettings, class_map: &'a ClassIdMap) -> Self {
        RequestBuilder {
            settings,
            class_map,
        }
    }

    /// Build the request for `options`.
    ///
    /// Fails only for an unrecognized sort mode.
    pub fn build(&self, options: &SearchOptions) -> Result<DaemonRequest> {
        let mut request = DaemonRequest::default();

        let mode: SortMode = options.sort_mode.parse()?;
        let sort_by = if mode.uses_sort_by() {
            options.sort_by.clone()
        } else {
            None
        };
        request.set_sort_mode(mode, sort_by);

        request.set_weights(self.weights(options));

        let offset = (options.page - 1).saturating_mul(options.per_page);
        let limit = options.per_page.min(self.settings.max_matches);
        request.set_limits(offset, limit, self.settings.max_matches);

        for (field, value) in &options.filters {
            request.set_filter(field.clone(), value.clone());
        }

        if !options.class_names.is_empty() {
            request.set_filter(CLASS_ID_ATTRIBUTE, self.class_filter(&options.class_names));
        }

        Ok(request)
    }

    /// Weight for every declared text field, 1.0 unless overridden.
    fn weights(&self, options: &SearchOptions) -> BTreeMap<String, f64> {
        for field in options.weights.keys() {
            if !self.settings.is_text_field(field) {
                warn!(field = %field, "Ignoring weight for a field that is not a text field");
            }
        }

        self.settings
            .text_fields
            .iter()
            .map(|field| {
                let weight = options.weights.get(field).copied().unwrap_or(1.0);
                (field.clone(), weight)
            })
            .collect()
    }

    /// Restrict to the class ids of the requested entity types.
    ///
    /// Unknown names are dropped; if none is known the filter admits
    /// nothing.
    fn class_filter(&self, class_names: &[String]) -> FilterValue {
        let ids = class_names
            .iter()
            .filter_map(|name| match self.class_map.id_of(name) {
                Some(id) => Some(Scalar::Int(id as i64)),
                None => {
                    warn!(class_name = %name, "Entity type is not indexed");
                    None
                }
            })
            .collect();
        FilterValue::AnyOf(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryDefaults;
    use crate::types::RawOptions;

    fn settings() -> DaemonSettings {
        DaemonSettings {
            max_matches: 500,
            text_fields: vec!["title".to_string(), "body".to_string()],
            ..DaemonSettings::default()
        }
    }

    fn options(value: serde_json::Value) -> SearchOptions {
        let raw: RawOptions = serde_json::from_value(value).unwrap();
        SearchOptions::normalize(&QueryDefaults::default(), raw)
    }

    fn class_map() -> ClassIdMap {
        ClassIdMap::from_pairs([("Seller", 0), ("User", 1)])
    }

    #[test]
    fn test_sort_modes() {
        for (name, mode, code) in [
            ("relevance", SortMode::Relevance, 0),
            ("descending", SortMode::Descending, 1),
            ("desc", SortMode::Descending, 1),
            ("ascending", SortMode::Ascending, 2),
            ("asc", SortMode::Ascending, 2),
            ("time", SortMode::Time, 3),
            ("extended", SortMode::Extended, 4),
        ] {
            let parsed: SortMode = name.parse().unwrap();
            assert_eq!(parsed, mode);
            assert_eq!(parsed.code(), code);
        }
    }

    #[test]
    fn test_unknown_sort_mode_is_caller_error() {
        let settings = settings();
        let map = class_map();
        let builder = RequestBuilder::new(&settings, &map);

        let err = builder
            .build(&options(serde_json::json!({"sort_mode": "random"})))
            .unwrap_err();
        assert!(matches!(err, SearchError::Usage { .. }));
    }

    #[test]
    fn test_sort_by_only_for_attribute_modes() {
        let settings = settings();
        let map = class_map();
        let builder = RequestBuilder::new(&settings, &map);

        let request = builder.build(&options(serde_json::json!({}))).unwrap();
        assert_eq!(request.sort_mode, SortMode::Relevance);
        assert_eq!(request.sort_by, None);

        let request = builder
            .build(&options(serde_json::json!({"sort_mode": "asc", "sort_by": "price"})))
            .unwrap();
        assert_eq!(request.sort_mode, SortMode::Ascending);
        assert_eq!(request.sort_by.as_deref(), Some("price"));
    }

    #[test]
    fn test_weights_cover_text_fields() {
        let settings = settings();
        let map = class_map();
        let builder = RequestBuilder::new(&settings, &map);

        let request = builder
            .build(&options(serde_json::json!({"weights": {"title": 2.0, "price": 9.0}})))
            .unwrap();

        assert_eq!(request.field_weights.len(), 2);
        assert_eq!(request.field_weights["title"], 2.0);
        assert_eq!(request.field_weights["body"], 1.0);
        assert!(!request.field_weights.contains_key("price"));
    }

    #[test]
    fn test_limits() {
        let settings = settings();
        let map = class_map();
        let builder = RequestBuilder::new(&settings, &map);

        let request = builder
            .build(&options(serde_json::json!({"page": 3, "per_page": 15})))
            .unwrap();
        assert_eq!(request.offset, 30);
        assert_eq!(request.limit, 15);
        assert_eq!(request.max_matches, 500);

        let request = builder
            .build(&options(serde_json::json!({"per_page": 10_000})))
            .unwrap();
        assert_eq!(request.limit, 500);
    }

    #[test]
    fn test_huge_page_saturates_offset() {
        let settings = settings();
        let map = class_map();
        let builder = RequestBuilder::new(&settings, &map);

        let request = builder
            .build(&options(serde_json::json!({"page": i64::MAX, "per_page": 20})))
            .unwrap();
        assert_eq!(request.offset, usize::MAX);
        assert_eq!(request.limit, 20);
    }

    #[test]
    fn test_filters_by_shape() {
        let settings = settings();
        let map = class_map();
        let builder = RequestBuilder::new(&settings, &map);

        let request = builder
            .build(&options(serde_json::json!({
                "filters": {"user_id": 4, "state_id": [1, 2], "capitalization": "1..5"}
            })))
            .unwrap();

        assert_eq!(
            request.filter("user_id"),
            Some(&FilterValue::Equals(Scalar::Int(4)))
        );
        assert_eq!(
            request.filter("state_id"),
            Some(&FilterValue::AnyOf(vec![Scalar::Int(1), Scalar::Int(2)]))
        );
        assert!(matches!(
            request.filter("capitalization"),
            Some(FilterValue::Range { .. })
        ));
    }

    #[test]
    fn test_class_names_restrict_class_ids() {
        let settings = settings();
        let map = class_map();
        let builder = RequestBuilder::new(&settings, &map);

        let request = builder.build(&options(serde_json::json!({}))).unwrap();
        assert_eq!(request.filter(CLASS_ID_ATTRIBUTE), None);

        let request = builder
            .build(&options(serde_json::json!({"class_names": ["User", "Ghost"]})))
            .unwrap();
        assert_eq!(
            request.filter(CLASS_ID_ATTRIBUTE),
            Some(&FilterValue::AnyOf(vec![Scalar::Int(1)]))
        );
    }

    #[test]
    fn test_set_filter_replaces() {
        let mut request = DaemonRequest::default();
        request.set_filter("class_id", FilterValue::AnyOf(vec![Scalar::Int(0)]));
        request.set_filter("class_id", FilterValue::Equals(Scalar::Int(1)));

        assert_eq!(request.filters.len(), 1);
        assert_eq!(
            request.filter("class_id"),
            Some(&FilterValue::Equals(Scalar::Int(1)))
        );
    }
}
