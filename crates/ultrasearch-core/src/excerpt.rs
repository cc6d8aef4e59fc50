//! Highlighted excerpts for resolved results.
//!
//! For every hit and every content-method group, the first field the entity
//! exposes is selected and its text collected into one flat batch, which is
//! sent to the daemon in a single round trip. The reply is split back into
//! per-hit, per-group order and attached to each [`Hit`] as an excerpt that
//! takes precedence over the entity's own field.
//!
//! A group the entity exposes no field for still contributes an empty text,
//! so that every hit occupies exactly as many slots as there are groups.

use crate::config::ExcerptingOptions;
use crate::daemon::{DaemonClient, HighlightOptions};
use crate::error::{Result, SearchError};
use crate::mapper::{Excerptable, Hit};
use crate::parser::{sanitize_text, strip_query_commands};
use crate::retry::RetryExecutor;
use tracing::debug;

/// Builds excerpts through the daemon.
pub struct Excerpter<'a, D> {
    daemon: &'a D,
    retry: &'a RetryExecutor,
    options: &'a ExcerptingOptions,
    index_name: &'a str,
}

impl<'a, D: DaemonClient> Excerpter<'a, D> {
    pub fn new(
        daemon: &'a D,
        retry: &'a RetryExecutor,
        options: &'a ExcerptingOptions,
        index_name: &'a str,
    ) -> Self {
        Excerpter {
            daemon,
            retry,
            options,
            index_name,
        }
    }

    /// Attach excerpts of `parsed_query` matches to `hits`.
    ///
    /// Only bare terms of the query take part in highlighting; field
    /// restrictions and operators are stripped first.
    pub fn excerpt<E: Excerptable>(&self, hits: &mut [Hit<E>], parsed_query: &str) -> Result<()> {
        let groups = &self.options.content_methods;
        if hits.is_empty() || groups.is_empty() {
            return Ok(());
        }

        let mut selected: Vec<Option<&str>> = Vec::with_capacity(hits.len() * groups.len());
        let mut texts = Vec::with_capacity(hits.len() * groups.len());
        for hit in hits.iter() {
            for group in groups {
                let found = group
                    .iter()
                    .find_map(|name| hit.entity().field(name).map(|text| (name.as_str(), text)));
                match found {
                    Some((name, text)) => {
                        selected.push(Some(name));
                        texts.push(sanitize_text(&text));
                    }
                    None => {
                        selected.push(None);
                        texts.push(String::new());
                    }
                }
            }
        }

        let query = strip_query_commands(parsed_query);
        let highlight = HighlightOptions::from(self.options);
        let excerpts = self.retry.run("build_excerpts", || {
            self.daemon
                .build_excerpts(&texts, self.index_name, &query, &highlight)
        })?;

        if excerpts.len() != texts.len() {
            return Err(SearchError::protocol(format!(
                "{} excerpts returned for {} texts",
                excerpts.len(),
                texts.len()
            )));
        }

        let slots = selected.into_iter().zip(excerpts);
        for (hit, chunk) in hits.iter_mut().zip(chunks(slots, groups.len())) {
            for (field, excerpt) in chunk {
                if let Some(field) = field {
                    hit.set_excerpt(field, excerpt);
                }
            }
        }

        debug!(hits = hits.len(), texts = texts.len(), "Built excerpts");
        Ok(())
    }
}

/// Split `items` into consecutive groups of `size`.
fn chunks<T>(items: impl IntoIterator<Item = T>, size: usize) -> Vec<Vec<T>> {
    let mut groups = Vec::new();
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            groups.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
