use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque key naming a monitored entity (a contract address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Trims surrounding whitespace. Returns `None` for an empty identifier.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The trimmed identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of dedup and journal membership: an identifier plus the reference
/// metric it was reported with.
///
/// Equality and hashing use the bit pattern of the reference value, so the
/// same identifier reported at two different values is two different keys.
/// Serialized as a two-element array `["id", 100000.0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "KeyRecord", into = "KeyRecord")]
pub struct WorkKey {
    identifier: Identifier,
    reference: f64,
}

#[derive(Serialize, Deserialize)]
struct KeyRecord(Identifier, f64);

impl From<KeyRecord> for WorkKey {
    fn from(record: KeyRecord) -> Self {
        WorkKey::new(record.0, record.1)
    }
}

impl From<WorkKey> for KeyRecord {
    fn from(key: WorkKey) -> Self {
        KeyRecord(key.identifier, key.reference)
    }
}

impl WorkKey {
    /// Pair an identifier with its reference metric. `-0.0` normalizes to `0.0`.
    pub fn new(identifier: Identifier, reference: f64) -> Self {
        // -0.0 and 0.0 must hash identically
        let reference = if reference == 0.0 { 0.0 } else { reference };
        Self {
            identifier,
            reference,
        }
    }

    /// The identifier half of the key.
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The reference metric reported at admission.
    pub fn reference(&self) -> f64 {
        self.reference
    }
}

impl PartialEq for WorkKey {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.reference.to_bits() == other.reference.to_bits()
    }
}

impl Eq for WorkKey {}

impl Hash for WorkKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
        self.reference.to_bits().hash(state);
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn identifier_trims_and_rejects_empty() {
        assert_eq!(id("  abc ").as_str(), "abc");
        assert!(Identifier::new("   ").is_none());
        assert!(Identifier::new("").is_none());
    }

    #[test]
    fn same_identifier_different_reference_is_distinct() {
        let a = WorkKey::new(id("X"), 100_000.0);
        let b = WorkKey::new(id("X"), 100_001.0);
        let mut set = HashSet::new();
        assert!(set.insert(a.clone()));
        assert!(set.insert(b));
        assert!(!set.insert(a));
    }

    #[test]
    fn negative_zero_matches_zero() {
        assert_eq!(WorkKey::new(id("X"), -0.0), WorkKey::new(id("X"), 0.0));
    }

    #[test]
    fn serializes_as_pair() {
        let key = WorkKey::new(id("X"), 100_000.0);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["X",100000.0]"#);
        let back: WorkKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
