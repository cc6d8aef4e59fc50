//! Scripted collaborators for unit tests.

use crate::class_map::ClassIdMap;
use crate::daemon::{DaemonClient, DaemonResponse, GroupCount, HighlightOptions, RawMatch};
use crate::error::{Result, SearchError};
use crate::mapper::{EntityResolver, Excerptable};
use crate::request::{DaemonRequest, CLASS_ID_ATTRIBUTE};
use crate::types::{EntityRef, FilterValue, Scalar};
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Daemon stub serving a fixed match list, group counts and class totals.
///
/// Scripted failures are returned, in order, before any call succeeds.
#[derive(Default)]
pub struct StubDaemon {
    total_found: u64,
    matches: Vec<RawMatch>,
    groups: HashMap<String, Vec<GroupCount>>,
    class_totals: HashMap<i64, u64>,
    short_excerpts: bool,
    failures: RefCell<VecDeque<SearchError>>,
    queries: RefCell<Vec<(DaemonRequest, String)>>,
    excerpt_calls: RefCell<Vec<(Vec<String>, String, String)>>,
}

impl StubDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `matches` (all pages), reporting `total_found`
    pub fn with_matches(mut self, total_found: u64, matches: Vec<RawMatch>) -> Self {
        self.total_found = total_found;
        self.matches = matches;
        self
    }

    /// Serve matches for `(class_name, primary_key)` pairs
    pub fn with_entities(self, class_map: &ClassIdMap, entities: &[(&str, u64)]) -> Self {
        let codec = class_map.codec();
        let matches: Vec<RawMatch> = entities
            .iter()
            .enumerate()
            .filter_map(|(rank, (name, pk))| {
                let class_id = class_map.id_of(name)?;
                Some(RawMatch::new(
                    codec.encode(class_id, *pk),
                    class_id,
                    (entities.len() - rank) as i64,
                ))
            })
            .collect();
        let total = matches.len() as u64;
        self.with_matches(total, matches)
    }

    pub fn with_groups(mut self, field: &str, groups: Vec<GroupCount>) -> Self {
        self.groups.insert(field.to_string(), groups);
        self
    }

    pub fn with_class_total(mut self, class_id: u32, total: u64) -> Self {
        self.class_totals.insert(class_id as i64, total);
        self
    }

    /// Reply to excerpt calls with one text too few
    pub fn with_short_excerpts(mut self) -> Self {
        self.short_excerpts = true;
        self
    }

    /// Fail the next call with `error`
    pub fn fail_with(self, error: SearchError) -> Self {
        self.failures.borrow_mut().push_back(error);
        self
    }

    /// Every query attempt, in order
    pub fn queries(&self) -> Vec<(DaemonRequest, String)> {
        self.queries.borrow().clone()
    }

    /// Every excerpt call as `(texts, index, query)`
    pub fn excerpt_calls(&self) -> Vec<(Vec<String>, String, String)> {
        self.excerpt_calls.borrow().clone()
    }

    fn next_failure(&self) -> Option<SearchError> {
        self.failures.borrow_mut().pop_front()
    }
}

impl DaemonClient for StubDaemon {
    fn query(&self, request: &DaemonRequest, query: &str) -> Result<DaemonResponse> {
        self.queries
            .borrow_mut()
            .push((request.clone(), query.to_string()));
        if let Some(error) = self.next_failure() {
            return Err(error);
        }

        let mut response = DaemonResponse {
            total_found: self.total_found,
            time: 0.002,
            ..DaemonResponse::default()
        };

        if let Some(field) = &request.group_by {
            response.groups = self.groups.get(field).cloned().unwrap_or_default();
            return Ok(response);
        }

        if let Some(FilterValue::Equals(Scalar::Int(class_id))) =
            request.filter(CLASS_ID_ATTRIBUTE)
        {
            response.total_found = self.class_totals.get(class_id).copied().unwrap_or(0);
            return Ok(response);
        }

        response.matches = self
            .matches
            .iter()
            .skip(request.offset)
            .take(request.limit)
            .cloned()
            .collect();
        Ok(response)
    }

    fn build_excerpts(
        &self,
        texts: &[String],
        index: &str,
        query: &str,
        options: &HighlightOptions,
    ) -> Result<Vec<String>> {
        self.excerpt_calls
            .borrow_mut()
            .push((texts.to_vec(), index.to_string(), query.to_string()));
        if let Some(error) = self.next_failure() {
            return Err(error);
        }

        let mut excerpts: Vec<String> = texts
            .iter()
            .map(|text| {
                if text.is_empty() {
                    String::new()
                } else {
                    format!("{}{}{}", options.before_match, text, options.after_match)
                }
            })
            .collect();
        if self.short_excerpts {
            excerpts.pop();
        }
        Ok(excerpts)
    }
}

/// A domain record with named text fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    reference: EntityRef,
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(class_name: &str, primary_key: u64) -> Self {
        Record {
            reference: EntityRef::new(class_name, primary_key),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn reference(&self) -> &EntityRef {
        &self.reference
    }
}

impl Excerptable for Record {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.fields.get(name).map(|value| Cow::Borrowed(value.as_str()))
    }
}

/// Resolver stub over an in-memory record set.
#[derive(Default)]
pub struct StubResolver {
    records: HashMap<EntityRef, Record>,
    cached: bool,
    failing: bool,
    calls: RefCell<Vec<(String, Vec<u64>)>>,
    cached_calls: Cell<usize>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.records.insert(record.reference.clone(), record);
        self
    }

    /// Serve lookups through the cache-aware path
    pub fn with_cache(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Fail every lookup
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Plain lookups as `(class_name, keys)`
    pub fn calls(&self) -> Vec<(String, Vec<u64>)> {
        self.calls.borrow().clone()
    }

    pub fn cached_calls(&self) -> usize {
        self.cached_calls.get()
    }

    fn lookup(&self, class_name: &str, keys: &[u64]) -> anyhow::Result<Vec<Option<Record>>> {
        if self.failing {
            anyhow::bail!("database unavailable");
        }
        Ok(keys
            .iter()
            .map(|key| self.records.get(&EntityRef::new(class_name, *key)).cloned())
            .collect())
    }
}

impl EntityResolver for StubResolver {
    type Entity = Record;

    fn resolve(&self, class_name: &str, keys: &[u64]) -> anyhow::Result<Vec<Option<Record>>> {
        self.calls
            .borrow_mut()
            .push((class_name.to_string(), keys.to_vec()));
        self.lookup(class_name, keys)
    }

    fn resolve_cached(
        &self,
        class_name: &str,
        keys: &[u64],
    ) -> Option<anyhow::Result<Vec<Option<Record>>>> {
        if !self.cached {
            return None;
        }
        self.cached_calls.set(self.cached_calls.get() + 1);
        Some(self.lookup(class_name, keys))
    }
}
