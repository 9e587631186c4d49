/*
    record.rs - The synchronized unit

    Defines:
    - RecordId: stable identity assigned by a replica backend
    - Content: opaque payload, compared byte-wise
    - Attributes: named boolean flags (absent reads as false)
    - Record: identity + Active/Tombstoned state

    Identity-equality and full equality are separate operations on purpose:
    membership in a RecordSet uses `same_identity`, change detection uses
    `identical`. Record does not implement PartialEq.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a record within a replica pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn new(id: u64) -> Self {
        RecordId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId(id)
    }
}

/// Opaque record payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Content(pub Vec<u8>);

impl Content {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Content(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content(s.as_bytes().to_vec())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content(s.into_bytes())
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Named boolean flags on a record.
///
/// Only flags that are set are stored, so two attribute maps compare equal
/// whenever every name reads the same.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<String, bool>);

impl Attributes {
    pub const READ: &'static str = "read";
    pub const IMPORTANT: &'static str = "important";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    pub fn set(&mut self, name: impl Into<String>, value: bool) {
        let name = name.into();
        if value {
            self.0.insert(name, true);
        } else {
            self.0.remove(&name);
        }
    }

    /// Flip a flag and return its new value
    pub fn toggle(&mut self, name: &str) -> bool {
        let value = !self.get(name);
        self.set(name, value);
        value
    }

    /// Names of all flags currently set
    pub fn set_flags(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = self.set_flags().collect();
        write!(f, "{{{}}}", flags.join(","))
    }
}

/// Whether a record is live or marks a deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    Active { content: Content, attributes: Attributes },
    Tombstoned,
}

/// A synchronized record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    identity: Option<RecordId>,
    state: RecordState,
}

impl Record {
    /// Create an active record with all attributes unset
    pub fn new(identity: Option<RecordId>, content: impl Into<Content>) -> Self {
        Record {
            identity,
            state: RecordState::Active {
                content: content.into(),
                attributes: Attributes::new(),
            },
        }
    }

    /// Create an active record with an identity
    pub fn with_id(id: impl Into<RecordId>, content: impl Into<Content>) -> Self {
        Self::new(Some(id.into()), content)
    }

    /// Create a record pending creation on the peer (no identity yet)
    pub fn pending(content: impl Into<Content>) -> Self {
        Self::new(None, content)
    }

    /// Deletion marker for `id`
    pub fn tombstone(id: RecordId) -> Self {
        Record {
            identity: Some(id),
            state: RecordState::Tombstoned,
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: &str, value: bool) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Copy of this record carrying an assigned identity
    pub fn with_identity(&self, id: RecordId) -> Self {
        Record {
            identity: Some(id),
            state: self.state.clone(),
        }
    }

    pub fn identity(&self) -> Option<RecordId> {
        self.identity
    }

    pub fn state(&self) -> &RecordState {
        &self.state
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.state, RecordState::Tombstoned)
    }

    pub fn is_pending(&self) -> bool {
        self.identity.is_none()
    }

    pub fn content(&self) -> Option<&Content> {
        match &self.state {
            RecordState::Active { content, .. } => Some(content),
            RecordState::Tombstoned => None,
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match &self.state {
            RecordState::Active { attributes, .. } => Some(attributes),
            RecordState::Tombstoned => None,
        }
    }

    /// Identity-equality. A missing identity never matches, not even another
    /// missing identity.
    pub fn same_identity(&self, other: &Record) -> bool {
        match (self.identity, other.identity) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Full equality: identity, state, content and attributes all match.
    /// Two pending records are identical when their payloads match.
    pub fn identical(&self, other: &Record) -> bool {
        self.identity == other.identity && self.same_payload(other)
    }

    /// State, content and attributes match, identity ignored
    pub fn same_payload(&self, other: &Record) -> bool {
        self.state == other.state
    }

    pub fn attribute(&self, name: &str) -> bool {
        self.attributes().map(|a| a.get(name)).unwrap_or(false)
    }

    /// Set a named attribute. No-op on a tombstone.
    pub fn set_attribute(&mut self, name: &str, value: bool) {
        if let RecordState::Active { attributes, .. } = &mut self.state {
            attributes.set(name, value);
        }
    }

    /// Flip a named attribute. Returns the new value (false on a tombstone).
    pub fn toggle_attribute(&mut self, name: &str) -> bool {
        match &mut self.state {
            RecordState::Active { attributes, .. } => attributes.toggle(name),
            RecordState::Tombstoned => false,
        }
    }

    pub fn is_read(&self) -> bool {
        self.attribute(Attributes::READ)
    }

    pub fn is_important(&self) -> bool {
        self.attribute(Attributes::IMPORTANT)
    }

    pub fn mark_read(&mut self) {
        self.set_attribute(Attributes::READ, true);
    }

    pub fn unmark_read(&mut self) {
        self.set_attribute(Attributes::READ, false);
    }

    pub fn mark_important(&mut self) {
        self.set_attribute(Attributes::IMPORTANT, true);
    }

    pub fn unmark_important(&mut self) {
        self.set_attribute(Attributes::IMPORTANT, false);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self
            .identity
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        match &self.state {
            RecordState::Active { content, attributes } => {
                write!(f, "<Record {} {} '{}'>", id, attributes, content)
            }
            RecordState::Tombstoned => write!(f, "<Tombstone {}>", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_no_flags() {
        let record = Record::with_id(1, "body");
        assert!(!record.is_read());
        assert!(!record.is_important());
        assert!(record.attributes().unwrap().is_empty());
    }

    #[test]
    fn test_same_identity_ignores_content() {
        let a = Record::with_id(1, "one");
        let b = Record::with_id(1, "two");
        assert!(a.same_identity(&b));
        assert!(!a.identical(&b));
    }

    #[test]
    fn test_missing_identity_never_matches() {
        let a = Record::pending("body");
        let b = Record::pending("body");
        assert!(!a.same_identity(&b));
        assert!(!a.same_identity(&a));
    }

    #[test]
    fn test_identical_checks_attributes() {
        let a = Record::with_id(2, "body");
        let mut b = Record::with_id(2, "body");
        assert!(a.identical(&b));

        b.mark_read();
        assert!(!a.identical(&b));

        b.unmark_read();
        assert!(a.identical(&b));
    }

    #[test]
    fn test_explicit_false_equals_absent() {
        let a = Record::with_id(3, "body");
        let b = Record::with_id(3, "body").with_attribute(Attributes::READ, false);
        assert!(a.identical(&b));
    }

    #[test]
    fn test_toggle_attribute() {
        let mut record = Record::with_id(1, "body");
        assert!(record.toggle_attribute("flagged"));
        assert!(record.attribute("flagged"));
        assert!(!record.toggle_attribute("flagged"));
        assert!(!record.attribute("flagged"));
    }

    #[test]
    fn test_tombstone_ignores_attribute_mutation() {
        let mut tomb = Record::tombstone(RecordId(4));
        tomb.mark_read();
        assert!(tomb.is_tombstone());
        assert!(!tomb.is_read());
        assert!(tomb.content().is_none());
    }

    #[test]
    fn test_tombstone_not_identical_to_active() {
        let active = Record::with_id(4, "body");
        let tomb = Record::tombstone(RecordId(4));
        assert!(active.same_identity(&tomb));
        assert!(!active.identical(&tomb));
    }

    #[test]
    fn test_with_identity_keeps_payload() {
        let pending = Record::pending("new").with_attribute(Attributes::IMPORTANT, true);
        let assigned = pending.with_identity(RecordId(9));
        assert_eq!(assigned.identity(), Some(RecordId(9)));
        assert!(pending.same_payload(&assigned));
        assert!(pending.is_pending());
    }

    #[test]
    fn test_display() {
        let record = Record::with_id(1, "1 body").with_attribute(Attributes::READ, true);
        assert_eq!(record.to_string(), "<Record 1 {read} '1 body'>");
        assert_eq!(Record::tombstone(RecordId(7)).to_string(), "<Tombstone 7>");
    }
}
