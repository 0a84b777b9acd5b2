//! Named scores and score maps

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A metric value, optionally composed from nested operands
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NamedScore {
    pub value: f64,
    pub op_name: String,
    pub description: String,
    /// Id of the document this score was computed against
    pub ref_id: String,
    pub operands: Vec<NamedScore>,
}

impl NamedScore {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn with_op(mut self, op_name: impl Into<String>) -> Self {
        self.op_name = op_name.into();
        self
    }

    pub fn with_ref(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = ref_id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_operand(mut self, operand: NamedScore) -> Self {
        self.operands.push(operand);
        self
    }

    /// Depth of the operand tree (1 for a leaf score)
    pub fn depth(&self) -> usize {
        1 + self.operands.iter().map(NamedScore::depth).max().unwrap_or(0)
    }
}

/// Metric name to score, one entry per name
///
/// Inserting an existing metric replaces the previous score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreMap {
    entries: BTreeMap<String, NamedScore>,
}

impl ScoreMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a metric, returning the replaced score
    pub fn insert(&mut self, metric: impl Into<String>, score: NamedScore) -> Option<NamedScore> {
        self.entries.insert(metric.into(), score)
    }

    pub fn get(&self, metric: &str) -> Option<&NamedScore> {
        self.entries.get(metric)
    }

    pub fn remove(&mut self, metric: &str) -> Option<NamedScore> {
        self.entries.remove(metric)
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.entries.contains_key(metric)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamedScore)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, NamedScore)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (String, NamedScore)>>(iter: I) -> Self {
        let mut map = ScoreMap::new();
        for (metric, score) in iter {
            map.insert(metric, score);
        }
        map
    }
}
