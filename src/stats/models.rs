use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single leaf in a stat dataset.
///
/// Source files are loosely typed, so a leaf may hold any JSON scalar. Only
/// numeric variants take part in resolution and totals; booleans and text are
/// carried through merges but resolve as a type mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl StatValue {
    /// Integer view of the value used by the resolver.
    ///
    /// Floats are truncated toward zero; non-finite floats, booleans and text
    /// have no integer view.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            StatValue::Int(value) => Some(*value),
            StatValue::Float(value) if value.is_finite() => Some(value.trunc() as i64),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, StatValue::Int(_) | StatValue::Float(_))
    }

    /// Combine a leaf seen in an earlier partition with the same leaf from a
    /// later one: numbers add up, anything else is replaced by the later value.
    pub fn merged_with(&self, later: StatValue) -> StatValue {
        match (self, &later) {
            (StatValue::Int(a), StatValue::Int(b)) => StatValue::Int(a.saturating_add(*b)),
            (StatValue::Int(a), StatValue::Float(b)) => StatValue::Float(*a as f64 + b),
            (StatValue::Float(a), StatValue::Int(b)) => StatValue::Float(a + *b as f64),
            (StatValue::Float(a), StatValue::Float(b)) => StatValue::Float(a + b),
            _ => later,
        }
    }
}

impl From<i64> for StatValue {
    fn from(value: i64) -> Self {
        StatValue::Int(value)
    }
}

impl From<i32> for StatValue {
    fn from(value: i32) -> Self {
        StatValue::Int(i64::from(value))
    }
}

impl From<f64> for StatValue {
    fn from(value: f64) -> Self {
        StatValue::Float(value)
    }
}

impl From<bool> for StatValue {
    fn from(value: bool) -> Self {
        StatValue::Bool(value)
    }
}

impl From<&str> for StatValue {
    fn from(value: &str) -> Self {
        StatValue::Text(value.to_string())
    }
}

pub type StatCategory = BTreeMap<String, StatValue>;

/// Per-entity stats: category name -> leaf-stat name -> value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatDataset {
    categories: BTreeMap<String, StatCategory>,
}

impl StatDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stat(
        mut self,
        category: impl Into<String>,
        stat: impl Into<String>,
        value: impl Into<StatValue>,
    ) -> Self {
        self.insert(category, stat, value);
        self
    }

    pub fn insert(
        &mut self,
        category: impl Into<String>,
        stat: impl Into<String>,
        value: impl Into<StatValue>,
    ) {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(stat.into(), value.into());
    }

    pub fn get(&self, category: &str, stat: &str) -> Option<&StatValue> {
        self.categories.get(category)?.get(stat)
    }

    pub fn category(&self, category: &str) -> Option<&StatCategory> {
        self.categories.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&String, &StatCategory)> {
        self.categories.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|category| category.is_empty())
    }

    /// Fold another partition of the same entity into this dataset.
    pub fn merge(&mut self, other: StatDataset) {
        for (category_name, leaves) in other.categories {
            let target = self.categories.entry(category_name).or_default();
            for (stat, value) in leaves {
                let merged = match target.get(&stat) {
                    Some(existing) => existing.merged_with(value),
                    None => value,
                };
                target.insert(stat, merged);
            }
        }
    }
}

impl From<BTreeMap<String, StatCategory>> for StatDataset {
    fn from(categories: BTreeMap<String, StatCategory>) -> Self {
        Self { categories }
    }
}
