use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a tradable instrument.
///
/// Ordering is lexicographic on the inner string. Every per-instrument map in
/// the engine is a `BTreeMap<InstrumentId, _>`, so iteration order (and with it
/// floating-point summation order) never depends on how the universe was listed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for InstrumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Deterministic dataset hash (BLAKE3 over a minute tape's contents)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// First 12 hex characters, used in artifact directory names.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_ids_order_lexicographically() {
        let mut ids = vec![
            InstrumentId::from("MSFT"),
            InstrumentId::from("AAPL"),
            InstrumentId::from("GOOGL"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "AAPL");
        assert_eq!(ids[2].as_str(), "MSFT");
    }

    #[test]
    fn instrument_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&InstrumentId::from("SPY")).unwrap();
        assert_eq!(json, "\"SPY\"");
    }

    #[test]
    fn dataset_hash_short_prefix() {
        let hash = DatasetHash::from_hash("0123456789abcdef");
        assert_eq!(hash.short(), "0123456789ab");
        assert_eq!(DatasetHash::from_hash("abc").short(), "abc");
    }
}
