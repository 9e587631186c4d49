/*
    record_set.rs - Ordered collection of records

    Insertion order is preserved. Membership and lookup go through identity
    only; a duplicate identity is rejected rather than coalesced. Records
    without an identity are never members of anything, so any number of them
    may coexist.
*/

use super::record::{Record, RecordId};
use crate::core_sync::store::errors::ConsistencyViolation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Ordered set of records keyed by identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Record>", into = "Vec<Record>")]
pub struct RecordSet {
    records: Vec<Record>,
    index: HashMap<RecordId, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, failing on the first duplicate identity
    pub fn from_records(
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self, ConsistencyViolation> {
        let mut set = Self::new();
        for record in records {
            set.insert(record)?;
        }
        Ok(set)
    }

    /// Append a record. Fails if its identity is already present.
    pub fn insert(&mut self, record: Record) -> Result<(), ConsistencyViolation> {
        if let Some(id) = record.identity() {
            if self.index.contains_key(&id) {
                return Err(ConsistencyViolation::DuplicateIdentity(id));
            }
            self.index.insert(id, self.records.len());
        }
        self.records.push(record);
        Ok(())
    }

    /// Replace the record with the same identity in place, or append.
    /// Returns the replaced record.
    pub fn upsert(&mut self, record: Record) -> Option<Record> {
        match record.identity().and_then(|id| self.index.get(&id).copied()) {
            Some(pos) => Some(std::mem::replace(&mut self.records[pos], record)),
            None => {
                if let Some(id) = record.identity() {
                    self.index.insert(id, self.records.len());
                }
                self.records.push(record);
                None
            }
        }
    }

    pub fn remove(&mut self, id: RecordId) -> Option<Record> {
        let pos = self.index.remove(&id)?;
        let removed = self.records.remove(pos);
        self.reindex();
        Some(removed)
    }

    /// Drop every record matching the predicate
    pub fn retain(&mut self, mut keep: impl FnMut(&Record) -> bool) {
        self.records.retain(|r| keep(r));
        self.reindex();
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.index.get(&id).map(|&pos| &self.records[pos])
    }

    /// Mutable access for attribute/content edits. Identity cannot be
    /// changed through `&mut Record`, so the index stays valid.
    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        match self.index.get(&id) {
            Some(&pos) => Some(&mut self.records[pos]),
            None => None,
        }
    }

    pub fn contains_id(&self, id: RecordId) -> bool {
        self.index.contains_key(&id)
    }

    /// Identity-based membership
    pub fn contains(&self, record: &Record) -> bool {
        record.identity().map(|id| self.contains_id(id)).unwrap_or(false)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().filter_map(Record::identity).collect()
    }

    /// Live records only
    pub fn active(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| !r.is_tombstone())
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_tombstone())
    }

    pub fn is_tombstoned(&self, id: RecordId) -> bool {
        self.get(id).map(Record::is_tombstone).unwrap_or(false)
    }

    /// Same identities, each pair identical. Order is ignored; identity-less
    /// records are compared positionally among themselves.
    pub fn same_contents(&self, other: &RecordSet) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let keyed_match = self.records.iter().filter(|r| !r.is_pending()).all(|r| {
            r.identity()
                .and_then(|id| other.get(id))
                .map(|o| o.identical(r))
                .unwrap_or(false)
        });
        let ours = self.records.iter().filter(|r| r.is_pending());
        let theirs: Vec<&Record> = other.records.iter().filter(|r| r.is_pending()).collect();
        keyed_match
            && ours.clone().count() == theirs.len()
            && ours.zip(theirs).all(|(a, b)| a.identical(b))
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(pos, r)| r.identity().map(|id| (id, pos)))
            .collect();
    }
}

impl TryFrom<Vec<Record>> for RecordSet {
    type Error = ConsistencyViolation;

    fn try_from(records: Vec<Record>) -> Result<Self, Self::Error> {
        RecordSet::from_records(records)
    }
}

impl From<RecordSet> for Vec<Record> {
    fn from(set: RecordSet) -> Self {
        set.records
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.records.iter().map(Record::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordSet {
        RecordSet::from_records(vec![
            Record::with_id(1, "one"),
            Record::with_id(2, "two"),
            Record::with_id(3, "three"),
        ])
        .unwrap()
    }

    #[test]
    fn test_insert_rejects_duplicate_identity() {
        let mut set = sample();
        let err = set.insert(Record::with_id(2, "other")).unwrap_err();
        assert!(matches!(err, ConsistencyViolation::DuplicateIdentity(RecordId(2))));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_pending_records_coexist() {
        let mut set = RecordSet::new();
        set.insert(Record::pending("a")).unwrap();
        set.insert(Record::pending("a")).unwrap();
        assert_eq!(set.len(), 2);
        assert!(!set.contains(&Record::pending("a")));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut set = sample();
        let old = set.upsert(Record::with_id(2, "two v2")).unwrap();
        assert_eq!(old.content().unwrap().to_string(), "two");
        assert_eq!(set.ids(), vec![RecordId(1), RecordId(2), RecordId(3)]);
        assert_eq!(set.get(RecordId(2)).unwrap().content().unwrap().to_string(), "two v2");

        assert!(set.upsert(Record::with_id(4, "four")).is_none());
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_remove_keeps_order_and_index() {
        let mut set = sample();
        assert!(set.remove(RecordId(1)).is_some());
        assert!(set.remove(RecordId(1)).is_none());
        assert_eq!(set.ids(), vec![RecordId(2), RecordId(3)]);
        assert!(set.get(RecordId(3)).is_some());
    }

    #[test]
    fn test_get_mut_edits_attributes() {
        let mut set = sample();
        set.get_mut(RecordId(3)).unwrap().mark_read();
        assert!(set.get(RecordId(3)).unwrap().is_read());
    }

    #[test]
    fn test_same_contents_ignores_order() {
        let a = sample();
        let b = RecordSet::from_records(vec![
            Record::with_id(3, "three"),
            Record::with_id(1, "one"),
            Record::with_id(2, "two"),
        ])
        .unwrap();
        assert!(a.same_contents(&b));

        let mut c = b.clone();
        c.get_mut(RecordId(1)).unwrap().mark_important();
        assert!(!a.same_contents(&c));
    }

    #[test]
    fn test_tombstone_helpers() {
        let mut set = sample();
        set.upsert(Record::tombstone(RecordId(2)));
        assert!(set.is_tombstoned(RecordId(2)));
        assert!(!set.is_tombstoned(RecordId(1)));
        assert_eq!(set.active().count(), 2);
        assert_eq!(set.tombstones().count(), 1);
    }

    #[test]
    fn test_deserialize_rejects_duplicates() {
        let json = serde_json::to_string(&vec![
            Record::with_id(1, "a"),
            Record::with_id(1, "b"),
        ])
        .unwrap();
        let decoded: Result<RecordSet, _> = serde_json::from_str(&json);
        assert!(decoded.is_err());

        let roundtrip: RecordSet = serde_json::from_str(&serde_json::to_string(&sample()).unwrap()).unwrap();
        assert!(roundtrip.same_contents(&sample()));
    }
}
