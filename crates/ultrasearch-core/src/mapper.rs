//! Mapping of daemon matches back to domain entities.
//!
//! Matches carry document ids from the shared id-space. [`ResultMapper`]
//! decodes them into [`EntityRef`]s using the [`ClassIdMap`], then resolves
//! the references through the host's [`EntityResolver`], one batch per
//! entity type. Rank order is preserved throughout; anything that cannot be
//! mapped or resolved is dropped with a diagnostic.

use crate::class_map::ClassIdMap;
use crate::daemon::RawMatch;
use crate::error::{Result, SearchError};
use crate::types::EntityRef;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Host capability turning primary keys into domain objects.
///
/// Implementations return one slot per requested key, in request order,
/// with `None` for records that no longer exist.
pub trait EntityResolver {
    /// The domain object type
    type Entity;

    /// Load records of `class_name` by primary key.
    fn resolve(&self, class_name: &str, keys: &[u64]) -> anyhow::Result<Vec<Option<Self::Entity>>>;

    /// Load records through a cache, if the host has one for `class_name`.
    ///
    /// Preferred over [`resolve`](Self::resolve) when it returns `Some`.
    fn resolve_cached(
        &self,
        _class_name: &str,
        _keys: &[u64],
    ) -> Option<anyhow::Result<Vec<Option<Self::Entity>>>> {
        None
    }
}

impl<T: EntityResolver + ?Sized> EntityResolver for &T {
    type Entity = T::Entity;

    fn resolve(&self, class_name: &str, keys: &[u64]) -> anyhow::Result<Vec<Option<Self::Entity>>> {
        (**self).resolve(class_name, keys)
    }

    fn resolve_cached(
        &self,
        class_name: &str,
        keys: &[u64],
    ) -> Option<anyhow::Result<Vec<Option<Self::Entity>>>> {
        (**self).resolve_cached(class_name, keys)
    }
}

/// Field access used by the excerpter.
///
/// `field` returns `None` when the entity does not expose the named field,
/// which is different from exposing an empty one.
pub trait Excerptable {
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// A resolved search result.
///
/// Wraps the domain entity together with its reference and any excerpts.
/// The entity is only reachable through shared references: once a result
/// set is built its entities are read-only.
#[derive(Debug, Clone)]
pub struct Hit<E> {
    reference: EntityRef,
    entity: E,
    excerpts: BTreeMap<String, String>,
}

impl<E> Hit<E> {
    /// Create a hit without excerpts
    pub fn new(reference: EntityRef, entity: E) -> Self {
        Hit {
            reference,
            entity,
            excerpts: BTreeMap::new(),
        }
    }

    /// The entity reference this hit was resolved from
    pub fn reference(&self) -> &EntityRef {
        &self.reference
    }

    /// The resolved domain entity
    pub fn entity(&self) -> &E {
        &self.entity
    }

    /// Unwrap the domain entity
    pub fn into_entity(self) -> E {
        self.entity
    }

    /// The highlighted excerpt for `field`, if one was built
    pub fn excerpt(&self, field: &str) -> Option<&str> {
        self.excerpts.get(field).map(String::as_str)
    }

    /// All excerpts by field name
    pub fn excerpts(&self) -> &BTreeMap<String, String> {
        &self.excerpts
    }

    pub(crate) fn set_excerpt(&mut self, field: impl Into<String>, text: String) {
        self.excerpts.insert(field.into(), text);
    }
}

impl<E: Excerptable> Hit<E> {
    /// Read `field`, preferring the excerpt over the entity's own content.
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.excerpts.get(name) {
            Some(text) => Some(Cow::Borrowed(text.as_str())),
            None => self.entity.field(name),
        }
    }
}

/// Decodes matches and resolves them into hits.
pub struct ResultMapper<'a> {
    class_map: &'a ClassIdMap,
}

impl<'a> ResultMapper<'a> {
    /// Create a mapper over the given class mapping
    pub fn new(class_map: &'a ClassIdMap) -> Self {
        ResultMapper { class_map }
    }

    /// Decode matches into entity references, preserving rank order.
    pub fn map(&self, matches: &[RawMatch]) -> Vec<EntityRef> {
        let codec = self.class_map.codec();

        matches
            .iter()
            .filter_map(|m| {
                let Some((class_id, primary_key)) = codec.decode(m.document_id) else {
                    warn!(document_id = m.document_id, "No entity types mapped, dropping match");
                    return None;
                };
                if class_id != m.class_id {
                    warn!(
                        document_id = m.document_id,
                        decoded = class_id,
                        attribute = m.class_id,
                        "Document id disagrees with its class id, dropping match"
                    );
                    return None;
                }
                match self.class_map.name_of(class_id) {
                    Some(name) => Some(EntityRef::new(name, primary_key)),
                    None => {
                        warn!(class_id, "Unmapped class id, dropping match");
                        None
                    }
                }
            })
            .collect()
    }

    /// Resolve references into hits, one lookup per entity type.
    ///
    /// The output follows the order of `refs`; records the resolver cannot
    /// find are dropped.
    pub fn resolve<R: EntityResolver>(
        &self,
        resolver: &R,
        refs: &[EntityRef],
    ) -> Result<Vec<Hit<R::Entity>>> {
        // Keys per type, in first-appearance order
        let mut batches: Vec<(&str, Vec<u64>)> = Vec::new();
        for r in refs {
            match batches.iter_mut().find(|(name, _)| *name == r.class_name) {
                Some((_, keys)) => keys.push(r.primary_key),
                None => batches.push((r.class_name.as_str(), vec![r.primary_key])),
            }
        }

        let mut resolved: HashMap<EntityRef, R::Entity> = HashMap::with_capacity(refs.len());
        for (class_name, keys) in batches {
            let records = match resolver.resolve_cached(class_name, &keys) {
                Some(result) => result,
                None => resolver.resolve(class_name, &keys),
            }
            .map_err(|e| SearchError::Resolve {
                class_name: class_name.to_string(),
                reason: e.to_string(),
            })?;

            if records.len() != keys.len() {
                return Err(SearchError::Resolve {
                    class_name: class_name.to_string(),
                    reason: format!("{} records returned for {} keys", records.len(), keys.len()),
                });
            }

            for (key, record) in keys.into_iter().zip(records) {
                match record {
                    Some(entity) => {
                        resolved.insert(EntityRef::new(class_name, key), entity);
                    }
                    None => debug!(class_name, key, "Indexed record no longer exists"),
                }
            }
        }

        Ok(refs
            .iter()
            .filter_map(|r| resolved.remove(r).map(|entity| Hit::new(r.clone(), entity)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Record, StubResolver};

    fn class_map() -> ClassIdMap {
        ClassIdMap::from_pairs([("Seller", 0), ("User", 1), ("State", 2)])
    }

    #[test]
    fn test_map_preserves_rank_order() {
        let map = class_map();
        let codec = map.codec();
        let matches = vec![
            RawMatch::new(codec.encode(1, 10), 1, 9),
            RawMatch::new(codec.encode(0, 3), 0, 7),
            RawMatch::new(codec.encode(1, 2), 1, 5),
            RawMatch::new(codec.encode(2, 44), 2, 1),
        ];

        let refs = ResultMapper::new(&map).map(&matches);
        assert_eq!(
            refs,
            vec![
                EntityRef::new("User", 10),
                EntityRef::new("Seller", 3),
                EntityRef::new("User", 2),
                EntityRef::new("State", 44),
            ]
        );
    }

    #[test]
    fn test_map_drops_unmapped_classes() {
        // Three types in the index, but only two known here
        let map = ClassIdMap::from_pairs([("Seller", 0), ("User", 1)]);
        let matches = vec![
            RawMatch::new(2 * 5 + 1, 1, 3),
            RawMatch::new(2 * 5 + 2, 2, 2),
            RawMatch::new(2 * 6, 0, 1),
        ];

        let refs = ResultMapper::new(&map).map(&matches);
        assert_eq!(
            refs,
            vec![EntityRef::new("User", 5), EntityRef::new("Seller", 6)]
        );
    }

    #[test]
    fn test_map_with_empty_class_map() {
        let map = ClassIdMap::empty();
        let refs = ResultMapper::new(&map).map(&[RawMatch::new(7, 1, 1)]);
        assert!(refs.is_empty());
    }

    #[test]
    fn test_resolve_batches_by_type_and_keeps_order() {
        let map = class_map();
        let resolver = StubResolver::new()
            .with_record(Record::new("User", 10).with_field("name", "ann"))
            .with_record(Record::new("Seller", 3).with_field("name", "acme"))
            .with_record(Record::new("User", 2).with_field("name", "bob"));

        let refs = vec![
            EntityRef::new("User", 10),
            EntityRef::new("Seller", 3),
            EntityRef::new("User", 2),
        ];
        let hits = ResultMapper::new(&map).resolve(&resolver, &refs).unwrap();

        let names: Vec<_> = hits
            .iter()
            .map(|h| h.field("name").unwrap().into_owned())
            .collect();
        assert_eq!(names, vec!["ann", "acme", "bob"]);

        let calls = resolver.calls();
        assert_eq!(
            calls,
            vec![
                ("User".to_string(), vec![10, 2]),
                ("Seller".to_string(), vec![3]),
            ]
        );
    }

    #[test]
    fn test_resolve_drops_missing_records() {
        let map = class_map();
        let resolver = StubResolver::new().with_record(Record::new("User", 2));

        let refs = vec![EntityRef::new("User", 10), EntityRef::new("User", 2)];
        let hits = ResultMapper::new(&map).resolve(&resolver, &refs).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].reference(), &EntityRef::new("User", 2));
    }

    #[test]
    fn test_cached_lookup_is_preferred() {
        let map = class_map();
        let resolver = StubResolver::new()
            .with_record(Record::new("User", 2))
            .with_cache();

        let hits = ResultMapper::new(&map)
            .resolve(&resolver, &[EntityRef::new("User", 2)])
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(resolver.cached_calls(), 1);
        assert!(resolver.calls().is_empty());
    }

    #[test]
    fn test_resolver_failure_is_reported() {
        let map = class_map();
        let resolver = StubResolver::new().failing();

        let err = ResultMapper::new(&map)
            .resolve(&resolver, &[EntityRef::new("User", 2)])
            .unwrap_err();
        assert!(matches!(err, SearchError::Resolve { .. }));
    }
}
