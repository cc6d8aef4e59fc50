//! The search orchestrator.
//!
//! A [`Search`] owns one normalized option set and the state of its most
//! recent execution: the daemon response, the decoded entity references,
//! resolved hits, facets and subtotals. Accessors that need a response run
//! the search on first use; [`Search::run`] always re-executes and replaces
//! whatever was held before.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ultrasearch_core::{Config, Search, SearchContext, RawOptions};
//!
//! let context = SearchContext::from_config(Config::load()?);
//! let options: RawOptions = serde_json::from_str(r#"{"query": "dog OR cat"}"#)?;
//!
//! let mut search = Search::new(&context, &daemon, &resolver, options);
//! for hit in search.results()? {
//!     println!("{}", hit.reference());
//! }
//! println!("page {} of {}", search.current_page(), search.page_count()?);
//! ```

use crate::class_map::ClassIdMap;
use crate::config::Config;
use crate::daemon::{DaemonClient, DaemonResponse};
use crate::error::{Result, SearchError};
use crate::excerpt::Excerpter;
use crate::facets::{FacetAggregator, FacetCounts, SharedFacetCache, SubtotalAggregator};
use crate::mapper::{EntityResolver, Excerptable, Hit, ResultMapper};
use crate::options::SearchOptions;
use crate::parser::QueryParser;
use crate::request::{DaemonRequest, RequestBuilder};
use crate::retry::RetryExecutor;
use crate::types::{EntityRef, OptionValue, RawOptions};
use std::collections::BTreeMap;
use tracing::{debug_span, info, warn};

/// Process-wide, read-only search configuration.
///
/// Built once at startup and shared by reference with every [`Search`].
#[derive(Debug, Clone)]
pub struct SearchContext {
    config: Config,
    class_map: ClassIdMap,
    parser: QueryParser,
}

impl SearchContext {
    /// Bundle a configuration with an already loaded class mapping
    pub fn new(config: Config, class_map: ClassIdMap) -> Self {
        let parser = QueryParser::new(config.daemon.text_fields.iter().cloned());
        SearchContext {
            config,
            class_map,
            parser,
        }
    }

    /// Load the class mapping named by the configuration.
    ///
    /// Without a daemon configuration path the mapping is empty.
    pub fn from_config(config: Config) -> Self {
        let class_map = match &config.daemon.conf_path {
            Some(path) => ClassIdMap::load(path),
            None => {
                warn!("No daemon configuration path set, no entity types will be mapped");
                ClassIdMap::empty()
            }
        };
        Self::new(config, class_map)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn class_map(&self) -> &ClassIdMap {
        &self.class_map
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    /// Build the daemon request `options` would issue.
    pub fn request_for(&self, options: &SearchOptions) -> Result<DaemonRequest> {
        RequestBuilder::new(&self.config.daemon, &self.class_map).build(options)
    }
}

/// State of one execution.
struct SearchState<E> {
    executed: bool,
    response: DaemonResponse,
    refs: Vec<EntityRef>,
    results: Option<Vec<Hit<E>>>,
    excerpted: bool,
    facets: BTreeMap<String, FacetCounts>,
    subtotals: BTreeMap<String, u64>,
}

impl<E> Default for SearchState<E> {
    fn default() -> Self {
        SearchState {
            executed: false,
            response: DaemonResponse::default(),
            refs: Vec::new(),
            results: None,
            excerpted: false,
            facets: BTreeMap::new(),
            subtotals: BTreeMap::new(),
        }
    }
}

/// One search over the daemon.
///
/// Not meant to be shared between threads; create one per request.
pub struct Search<'a, D, R: EntityResolver> {
    context: &'a SearchContext,
    daemon: D,
    resolver: R,
    retry: RetryExecutor,
    options: SearchOptions,
    parsed_query: String,
    facet_cache: Option<SharedFacetCache>,
    state: SearchState<R::Entity>,
}

impl<'a, D: DaemonClient, R: EntityResolver> Search<'a, D, R> {
    /// Create a search from a raw option set.
    ///
    /// Options are normalized against the configured defaults and the query
    /// is parsed immediately; nothing is sent to the daemon yet.
    pub fn new(context: &'a SearchContext, daemon: D, resolver: R, options: RawOptions) -> Self {
        let options = SearchOptions::normalize(&context.config.query_defaults, options);
        Self::with_options(context, daemon, resolver, options)
    }

    /// Create a search from already normalized options
    pub fn with_options(
        context: &'a SearchContext,
        daemon: D,
        resolver: R,
        options: SearchOptions,
    ) -> Self {
        let parsed_query = context.parser.parse(&options.query);
        Search {
            context,
            daemon,
            resolver,
            retry: RetryExecutor::from_options(&context.config.client),
            options,
            parsed_query,
            facet_cache: None,
            state: SearchState::default(),
        }
    }

    /// Serve facets through a cache shared with other searches
    pub fn with_facet_cache(mut self, cache: SharedFacetCache) -> Self {
        self.facet_cache = Some(cache);
        self
    }

    /// Override the retry policy of this search
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Execute the search and resolve its results.
    ///
    /// Replaces any previously held state.
    pub fn run(&mut self) -> Result<&[Hit<R::Entity>]> {
        self.state = SearchState::default();
        self.ensure_resolved()?;
        Ok(self.state.results.as_deref().unwrap_or(&[]))
    }

    /// Execute the search without resolving entities.
    ///
    /// Replaces any previously held state.
    pub fn run_ids(&mut self) -> Result<&[EntityRef]> {
        self.state = SearchState::default();
        Ok(&self.ensure_run()?.refs)
    }

    /// Check if the search has been executed
    pub fn is_run(&self) -> bool {
        self.state.executed
    }

    /// The user query, untranslated
    pub fn query(&self) -> &str {
        &self.options.query
    }

    /// The query in daemon syntax
    pub fn parsed_query(&self) -> &str {
        &self.parsed_query
    }

    /// The normalized options
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Look up a normalized option by name
    pub fn get_option(&self, name: &str) -> Option<OptionValue> {
        self.options.get_option(name)
    }

    /// Resolved results in rank order
    pub fn results(&mut self) -> Result<&[Hit<R::Entity>]> {
        self.ensure_resolved()?;
        Ok(self.state.results.as_deref().unwrap_or(&[]))
    }

    /// Entity references in rank order, without resolving them
    pub fn entity_refs(&mut self) -> Result<&[EntityRef]> {
        Ok(&self.ensure_run()?.refs)
    }

    /// The raw daemon response
    pub fn response(&mut self) -> Result<&DaemonResponse> {
        Ok(&self.ensure_run()?.response)
    }

    /// Facet counts for every requested facet field.
    pub fn facets(&mut self) -> Result<&BTreeMap<String, FacetCounts>> {
        if self.options.facets.is_empty() {
            return Err(SearchError::usage("no facet field was configured"));
        }
        Ok(&self.ensure_run()?.facets)
    }

    /// Facet counts for one requested facet field.
    pub fn facet(&mut self, field: &str) -> Result<&FacetCounts> {
        if !self.options.facets.iter().any(|f| f == field) {
            return Err(SearchError::usage(format!(
                "facet field '{}' was not requested",
                field
            )));
        }
        self.ensure_run()?
            .facets
            .get(field)
            .ok_or_else(|| {
                SearchError::protocol(format!("no counts computed for facet '{}'", field))
            })
    }

    /// Total matches per entity-type name.
    ///
    /// Requires `with_subtotals` in the client options.
    pub fn subtotals(&mut self) -> Result<&BTreeMap<String, u64>> {
        if !self.context.config.client.with_subtotals {
            return Err(SearchError::usage("subtotals are not enabled"));
        }
        Ok(&self.ensure_run()?.subtotals)
    }

    /// Total matches, capped at the daemon's `max_matches`
    pub fn total_entries(&mut self) -> Result<usize> {
        let max_matches = self.context.config.daemon.max_matches;
        let total_found = self.ensure_run()?.response.total_found;
        Ok(usize::try_from(total_found).map_or(max_matches, |total| total.min(max_matches)))
    }

    /// Time the daemon spent on the query, in seconds
    pub fn time(&mut self) -> Result<f64> {
        Ok(self.ensure_run()?.response.time)
    }

    /// Excerpt the resolved results.
    ///
    /// Runs the search first if needed. Excerpts are built once per
    /// execution.
    pub fn excerpt(&mut self) -> Result<&[Hit<R::Entity>]>
    where
        R::Entity: Excerptable,
    {
        self.ensure_resolved()?;

        if !self.state.excerpted {
            let config = &self.context.config;
            let excerpter = Excerpter::new(
                &self.daemon,
                &self.retry,
                &config.excerpting,
                &config.daemon.index_name,
            );
            if let Some(hits) = self.state.results.as_mut() {
                excerpter.excerpt(hits, &self.parsed_query)?;
            }
            self.state.excerpted = true;
        }

        Ok(self.state.results.as_deref().unwrap_or(&[]))
    }

    /// The current page, starting at 1
    pub fn current_page(&self) -> usize {
        self.options.page
    }

    /// Results per page
    pub fn per_page(&self) -> usize {
        self.options.per_page
    }

    /// Index of the first result of the current page
    pub fn offset(&self) -> usize {
        (self.options.page - 1).saturating_mul(self.options.per_page)
    }

    /// The previous page, or `None` on the first page
    pub fn previous_page(&self) -> Option<usize> {
        (self.options.page > 1).then(|| self.options.page - 1)
    }

    /// Number of pages
    pub fn page_count(&mut self) -> Result<usize> {
        let total = self.total_entries()?;
        Ok(total.div_ceil(self.options.per_page))
    }

    /// The next page, or `None` on the last page
    pub fn next_page(&mut self) -> Result<Option<usize>> {
        let page = self.options.page;
        let page_count = self.page_count()?;
        Ok((page < page_count).then_some(page + 1))
    }

    fn ensure_run(&mut self) -> Result<&mut SearchState<R::Entity>> {
        if !self.state.executed {
            self.state = self.execute()?;
        }
        Ok(&mut self.state)
    }

    fn ensure_resolved(&mut self) -> Result<&mut SearchState<R::Entity>> {
        if !self.state.executed {
            self.state = self.execute()?;
        }
        if self.state.results.is_none() {
            let hits = ResultMapper::new(&self.context.class_map)
                .resolve(&self.resolver, &self.state.refs)?;
            self.state.results = Some(hits);
        }
        Ok(&mut self.state)
    }

    fn execute(&self) -> Result<SearchState<R::Entity>> {
        let span = debug_span!("search", query = %self.options.query, page = self.options.page);
        let _guard = span.enter();

        let context = self.context;
        let request = context.request_for(&self.options)?;

        let response = self
            .retry
            .run("query", || self.daemon.query(&request, &self.parsed_query))?;
        if let Some(warning) = &response.warning {
            warn!(warning = %warning, "Daemon reported a warning");
        }

        let refs = ResultMapper::new(&context.class_map).map(&response.matches);

        let facets = if self.options.facets.is_empty() {
            BTreeMap::new()
        } else {
            FacetAggregator::new(&self.daemon, &self.retry, context.config.client.max_facets)
                .facets(
                    &request,
                    &self.parsed_query,
                    &self.options.facets,
                    self.facet_cache.as_ref(),
                )?
        };

        let subtotals = if context.config.client.with_subtotals {
            SubtotalAggregator::new(&self.daemon, &self.retry, &context.class_map)
                .subtotals(&request, &self.parsed_query)?
        } else {
            BTreeMap::new()
        };

        info!(
            total_found = response.total_found,
            matches = response.matches.len(),
            mapped = refs.len(),
            time = response.time,
            "Search complete"
        );

        Ok(SearchState {
            executed: true,
            response,
            refs,
            facets,
            subtotals,
            ..SearchState::default()
        })
    }
}
