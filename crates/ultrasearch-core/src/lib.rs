//! # Ultrasearch Core Library
//!
//! This crate provides a command-style client for a full-text search
//! daemon: it translates user queries into the daemon's boolean syntax,
//! builds and executes requests with bounded retries, and maps matches back
//! to domain entities. The daemon connection and entity storage are
//! abstracted behind traits supplied by the host.
//!
//! ## Architecture
//!
//! - **Parser** (`parser`): Free-form query to daemon syntax
//! - **Options** (`options`): Normalization of raw option sets
//! - **Request** (`request`): Daemon request settings built from options
//! - **Daemon** (`daemon`): Interface to the remote daemon
//! - **Retry** (`retry`): Bounded retries for daemon round trips
//! - **Class map** (`class_map`): Entity-type names and document ids
//! - **Mapper** (`mapper`): Matches to entity references and hits
//! - **Facets** (`facets`): Facet and subtotal queries
//! - **Excerpt** (`excerpt`): Highlighted excerpts of hits
//! - **Search** (`search`): The orchestrator tying it together
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use ultrasearch_core::{Config, RawOptions, Search, SearchContext};
//!
//! // Load configuration and the class mapping once
//! let context = SearchContext::from_config(Config::load()?);
//!
//! // Run a search
//! let options: RawOptions = serde_json::from_str(r#"{"query": "dog OR cat"}"#)?;
//! let mut search = Search::new(&context, &daemon, &resolver, options);
//! for hit in search.results()? {
//!     println!("{}", hit.reference());
//! }
//! ```

pub mod class_map;
pub mod config;
pub mod daemon;
pub mod error;
pub mod excerpt;
pub mod facets;
pub mod mapper;
pub mod options;
pub mod parser;
pub mod request;
pub mod retry;
pub mod search;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use class_map::{ClassIdMap, DocumentIdCodec};
pub use config::Config;
pub use daemon::{DaemonClient, DaemonResponse, GroupCount, HighlightOptions, RawMatch};
pub use error::{Result, SearchError};
pub use facets::{FacetCache, FacetCounts, SharedFacetCache};
pub use mapper::{EntityResolver, Excerptable, Hit};
pub use options::SearchOptions;
pub use parser::{QueryParser, MATCH_ALL_QUERY};
pub use request::{DaemonRequest, SortMode};
pub use retry::RetryExecutor;
pub use search::{Search, SearchContext};
pub use types::{EntityRef, FilterValue, OptionValue, RawOptions, Scalar};
