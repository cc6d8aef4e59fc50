//! Search daemon client interface.
//!
//! This module defines the abstract interface to the remote search daemon.
//! The core never opens connections itself: a collaborator supplies a
//! [`DaemonClient`] that performs one round trip per call, and the core wraps
//! every call in a [`crate::retry::RetryExecutor`].
//!
//! ## Implementing a Client
//!
//! A client must translate its transport failures into the error taxonomy:
//!
//! - connection refused, timeouts and other connectivity failures become
//!   [`SearchError::Transient`](crate::SearchError::Transient) and are retried
//! - a query the daemon rejects becomes
//!   [`SearchError::Query`](crate::SearchError::Query) and is surfaced at once

use crate::config::ExcerptingOptions;
use crate::error::Result;
use crate::request::DaemonRequest;
use serde::{Deserialize, Serialize};

/// One match as returned by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMatch {
    /// Document id in the shared id-space (encodes class id and primary key)
    pub document_id: u64,

    /// The `class_id` attribute stored with the document
    pub class_id: u32,

    /// Relevance weight assigned by the daemon
    pub weight: i64,
}

impl RawMatch {
    /// Create a new raw match
    pub fn new(document_id: u64, class_id: u32, weight: i64) -> Self {
        RawMatch {
            document_id,
            class_id,
            weight,
        }
    }
}

/// A distinct group value and the number of matches in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub value: String,
    pub count: u64,
}

impl GroupCount {
    /// Create a new group count
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        GroupCount {
            value: value.into(),
            count,
        }
    }
}

/// The daemon's reply to one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonResponse {
    /// Total number of matching documents
    pub total_found: u64,

    /// Time the daemon spent on the query, in seconds
    pub time: f64,

    /// Matches in rank order (the requested page only)
    pub matches: Vec<RawMatch>,

    /// Group counts when the request grouped on a field
    #[serde(default)]
    pub groups: Vec<GroupCount>,

    /// Non-fatal warning reported by the daemon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Highlighting options forwarded to the daemon's excerpt builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightOptions {
    pub before_match: String,
    pub after_match: String,
    pub chunk_separator: String,
    pub limit: usize,
    pub around: usize,
}

impl From<&ExcerptingOptions> for HighlightOptions {
    fn from(options: &ExcerptingOptions) -> Self {
        HighlightOptions {
            before_match: options.before_match.clone(),
            after_match: options.after_match.clone(),
            chunk_separator: options.chunk_separator.clone(),
            limit: options.limit,
            around: options.around,
        }
    }
}

/// Abstract trait for search daemon clients.
///
/// Each method performs exactly one round trip; retries are the caller's
/// concern. Implementations are used from a single thread per search, so no
/// `Send`/`Sync` bound is imposed here.
pub trait DaemonClient {
    /// Run a query in daemon syntax with the given request settings.
    fn query(&self, request: &DaemonRequest, query: &str) -> Result<DaemonResponse>;

    /// Highlight `query` terms in each of `texts`, returning one excerpt per
    /// input text in the same order.
    fn build_excerpts(
        &self,
        texts: &[String],
        index: &str,
        query: &str,
        options: &HighlightOptions,
    ) -> Result<Vec<String>>;
}

impl<T: DaemonClient + ?Sized> DaemonClient for &T {
    fn query(&self, request: &DaemonRequest, query: &str) -> Result<DaemonResponse> {
        (**self).query(request, query)
    }

    fn build_excerpts(
        &self,
        texts: &[String],
        index: &str,
        query: &str,
        options: &HighlightOptions,
    ) -> Result<Vec<String>> {
        (**self).build_excerpts(texts, index, query, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_options_drop_content_methods() {
        let excerpting = ExcerptingOptions::default();
        let highlight = HighlightOptions::from(&excerpting);

        assert_eq!(highlight.before_match, "<strong>");
        assert_eq!(highlight.after_match, "</strong>");
        assert_eq!(highlight.limit, 256);
        assert_eq!(highlight.around, 3);

        let json = serde_json::to_value(&highlight).unwrap();
        assert!(json.get("content_methods").is_none());
    }

    #[test]
    fn test_response_deserializes_without_groups() {
        let response: DaemonResponse = serde_json::from_value(serde_json::json!({
            "total_found": 2,
            "time": 0.004,
            "matches": [
                {"document_id": 7, "class_id": 1, "weight": 3},
                {"document_id": 4, "class_id": 0, "weight": 1},
            ],
        }))
        .unwrap();

        assert_eq!(response.total_found, 2);
        assert_eq!(response.matches[0], RawMatch::new(7, 1, 3));
        assert!(response.groups.is_empty());
        assert!(response.warning.is_none());
    }
}
