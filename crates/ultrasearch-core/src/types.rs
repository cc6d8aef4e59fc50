//! Core data types for Ultrasearch.
//!
//! This module defines the value types shared by option normalization,
//! request building and result mapping. These types are designed to be:
//!
//! - **Serializable**: Raw option sets arrive as JSON or TOML
//! - **Shape-driven**: Filters are told apart by the shape of their value,
//!   never by an explicit type tag

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A raw, user-supplied option set: option name to loosely typed value.
pub type RawOptions = BTreeMap<String, OptionValue>;

/// A loosely typed option value as supplied by a caller.
///
/// Deserializes from any JSON or TOML value. Normalization turns these into
/// the typed fields of [`crate::SearchOptions`] following a fixed coercion
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<OptionValue>),
    Map(BTreeMap<String, OptionValue>),
}

impl OptionValue {
    /// Get the value as a string slice, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as an integer (numeric strings included)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            OptionValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            OptionValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a float (numeric strings included)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Int(i) => Some(*i as f64),
            OptionValue::Float(f) => Some(*f),
            OptionValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns true for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, OptionValue::Null)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Str(s)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

impl From<f64> for OptionValue {
    fn from(f: f64) -> Self {
        OptionValue::Float(f)
    }
}

impl From<Scalar> for OptionValue {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Bool(b) => OptionValue::Bool(b),
            Scalar::Int(i) => OptionValue::Int(i),
            Scalar::Float(f) => OptionValue::Float(f),
            Scalar::Str(s) => OptionValue::Str(s),
        }
    }
}

/// A single attribute value used in filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Convert a scalar option value; lists, maps and nulls are not scalars.
    pub fn from_option(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::Bool(b) => Some(Scalar::Bool(*b)),
            OptionValue::Int(i) => Some(Scalar::Int(*i)),
            OptionValue::Float(f) => Some(Scalar::Float(*f)),
            OptionValue::Str(s) => Some(Scalar::Str(s.clone())),
            _ => None,
        }
    }

    /// Parse a bare numeric token, preferring integers
    fn parse_number(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Ok(i) = token.parse::<i64>() {
            Some(Scalar::Int(i))
        } else {
            token.parse::<f64>().ok().map(Scalar::Float)
        }
    }

    /// Returns true if this value is a float, which needs a float-range
    /// filter on the daemon side
    pub fn is_float(&self) -> bool {
        matches!(self, Scalar::Float(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A normalized filter value.
///
/// The variant is chosen by the shape of the supplied value:
///
/// | supplied value                          | filter     |
/// |-----------------------------------------|------------|
/// | scalar                                  | `Equals`   |
/// | list                                    | `AnyOf`    |
/// | map `{min, max}` or string `"a..b"`     | `Range`    |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterValue {
    /// Attribute equals the value
    Equals(Scalar),
    /// Attribute is one of the values
    AnyOf(Vec<Scalar>),
    /// Attribute lies within the inclusive bounds
    Range { min: Scalar, max: Scalar },
}

impl FilterValue {
    /// Classify an option value by shape. Returns `None` for values that
    /// cannot be a filter (nulls, nested lists, maps without bounds).
    pub fn from_option(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::List(items) => items
                .iter()
                .map(Scalar::from_option)
                .collect::<Option<Vec<_>>>()
                .map(FilterValue::AnyOf),
            OptionValue::Map(map) => {
                let min = map.get("min").and_then(Scalar::from_option)?;
                let max = map.get("max").and_then(Scalar::from_option)?;
                Some(FilterValue::Range { min, max })
            }
            OptionValue::Str(s) => Some(Self::parse_range(s).unwrap_or_else(|| {
                FilterValue::Equals(Scalar::Str(s.clone()))
            })),
            other => Scalar::from_option(other).map(FilterValue::Equals),
        }
    }

    /// Parse a `"low..high"` range of two numbers
    pub fn parse_range(s: &str) -> Option<Self> {
        let (low, high) = s.split_once("..")?;
        let min = Scalar::parse_number(low)?;
        let max = Scalar::parse_number(high)?;
        Some(FilterValue::Range { min, max })
    }

    /// Render back into the option-value shape it was parsed from
    pub fn to_option(&self) -> OptionValue {
        match self {
            FilterValue::Equals(v) => v.clone().into(),
            FilterValue::AnyOf(vs) => {
                OptionValue::List(vs.iter().cloned().map(OptionValue::from).collect())
            }
            FilterValue::Range { min, max } => {
                let mut map = BTreeMap::new();
                map.insert("min".to_string(), min.clone().into());
                map.insert("max".to_string(), max.clone().into());
                OptionValue::Map(map)
            }
        }
    }
}

/// A typed reference to one indexed domain record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity-type name (e.g. "Seller", "Geo::State")
    pub class_name: String,

    /// Primary key of the record within its type
    pub primary_key: u64,
}

impl EntityRef {
    /// Create a new entity reference
    pub fn new(class_name: impl Into<String>, primary_key: u64) -> Self {
        EntityRef {
            class_name: class_name.into(),
            primary_key,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.primary_key)
    }
}
