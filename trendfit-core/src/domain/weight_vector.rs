//! WeightVector: target fractional allocation per instrument.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::InstrumentId;

/// Mapping from instrument to a non-negative target weight.
///
/// Produced by the weight synthesizer (sums to 1.0 over a non-empty candidate
/// set) and pruned by the drawdown guard (sums to at most 1.0 afterwards).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<InstrumentId, f64>);

impl WeightVector {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_map(weights: BTreeMap<InstrumentId, f64>) -> Self {
        Self(weights)
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<f64> {
        self.0.get(instrument).copied()
    }

    pub fn contains(&self, instrument: &InstrumentId) -> bool {
        self.0.contains_key(instrument)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, f64)> {
        self.0.iter().map(|(id, w)| (id, *w))
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.0.keys()
    }

    /// Sum of all weights, accumulated in instrument order.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn remove(&mut self, instrument: &InstrumentId) -> Option<f64> {
        self.0.remove(instrument)
    }

    pub fn as_map(&self) -> &BTreeMap<InstrumentId, f64> {
        &self.0
    }
}

impl FromIterator<(InstrumentId, f64)> for WeightVector {
    fn from_iter<I: IntoIterator<Item = (InstrumentId, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vector_totals_zero() {
        let weights = WeightVector::new();
        assert!(weights.is_empty());
        assert_eq!(weights.total(), 0.0);
    }

    #[test]
    fn remove_drops_instrument() {
        let mut weights: WeightVector = [
            (InstrumentId::from("AAPL"), 0.25),
            (InstrumentId::from("MSFT"), 0.75),
        ]
        .into_iter()
        .collect();

        assert_eq!(weights.remove(&InstrumentId::from("AAPL")), Some(0.25));
        assert_eq!(weights.len(), 1);
        assert_eq!(weights.total(), 0.75);
        assert!(!weights.contains(&InstrumentId::from("AAPL")));
    }

    #[test]
    fn serializes_as_flat_object() {
        let weights: WeightVector = [(InstrumentId::from("SPY"), 1.0)].into_iter().collect();
        let json = serde_json::to_string(&weights).unwrap();
        assert_eq!(json, r#"{"SPY":1.0}"#);
    }
}
