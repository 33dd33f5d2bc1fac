use std::fmt;
use tracing::{trace, warn};

use super::{
    aliases::{aliases_for, NAMESPACE_PREFIX},
    StatDataset, StatsError,
};

/// Leaf name that asks for the sum of a whole category.
pub const TOTAL_STAT: &str = "total";

/// A parsed `category.stat` or `category.namespace.stat` path.
///
/// The three-segment form addresses a namespaced leaf, so
/// `mined.minecraft.stone` reads the `minecraft:stone` leaf of `mined`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatPath {
    pub category: String,
    pub stat: String,
}

impl StatPath {
    pub fn parse(path: &str) -> Result<Self, StatsError> {
        let segments: Vec<&str> = path.split('.').collect();
        if (2..=3).contains(&segments.len()) && segments.iter().any(|segment| segment.is_empty())
        {
            return Err(StatsError::EmptySegment {
                path: path.to_string(),
            });
        }

        match segments.as_slice() {
            [category, stat] => Ok(Self {
                category: category.to_string(),
                stat: stat.to_string(),
            }),
            [category, namespace, stat] => Ok(Self {
                category: category.to_string(),
                stat: format!("{namespace}:{stat}"),
            }),
            _ => Err(StatsError::InvalidPath {
                path: path.to_string(),
                segments: segments.len(),
            }),
        }
    }

    pub fn is_total(&self) -> bool {
        self.stat == TOTAL_STAT
    }

    /// Same path with `prefix` on both segments. Segments that already carry
    /// a namespace, and the `total` marker, are left alone.
    fn namespaced(&self, prefix: &str) -> Self {
        let qualify = |segment: &str| {
            if segment.contains(':') {
                segment.to_string()
            } else {
                format!("{prefix}{segment}")
            }
        };

        Self {
            category: qualify(&self.category),
            stat: if self.is_total() {
                self.stat.clone()
            } else {
                qualify(&self.stat)
            },
        }
    }
}

impl fmt::Display for StatPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.stat)
    }
}

/// Looks up metric stat paths inside a [`StatDataset`].
///
/// Lookup order for a path:
/// 1. the exact `category`/`stat` leaf,
/// 2. for `category.total`, the sum of every numeric leaf in the category,
/// 3. the same two steps for every registered alias of the path,
/// 4. steps 1-3 again with the namespace prefix on both segments.
///
/// A miss of any kind is `None`; callers treat it as zero / ineligible.
#[derive(Debug, Clone)]
pub struct StatResolver {
    namespace: String,
}

impl Default for StatResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StatResolver {
    pub fn new() -> Self {
        Self {
            namespace: NAMESPACE_PREFIX.to_string(),
        }
    }

    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn resolve(&self, dataset: &StatDataset, path: &str) -> Option<i64> {
        let primary = match StatPath::parse(path) {
            Ok(primary) => primary,
            Err(err) => {
                warn!(error = %err, "Skipping malformed stat path");
                return None;
            }
        };

        let mut candidates = vec![primary];
        for alias in aliases_for(path) {
            match StatPath::parse(alias) {
                Ok(parsed) => candidates.push(parsed),
                Err(err) => warn!(error = %err, path, "Ignoring malformed alias"),
            }
        }

        let direct = candidates
            .iter()
            .find_map(|candidate| Self::lookup(dataset, candidate));
        if direct.is_some() {
            return direct;
        }

        let namespaced = candidates
            .iter()
            .map(|candidate| candidate.namespaced(&self.namespace))
            .find_map(|candidate| Self::lookup(dataset, &candidate));

        if namespaced.is_none() {
            trace!(path, "Stat path not present in dataset");
        }
        namespaced
    }

    fn lookup(dataset: &StatDataset, path: &StatPath) -> Option<i64> {
        if let Some(value) = dataset
            .get(&path.category, &path.stat)
            .and_then(|value| value.as_integer())
        {
            return Some(value);
        }

        if !path.is_total() {
            return None;
        }

        // A category summing to zero is reported the same as a missing one.
        let sum = dataset
            .category(&path.category)?
            .values()
            .filter_map(|value| value.as_integer())
            .fold(0i64, |acc, value| acc.saturating_add(value));

        (sum != 0).then_some(sum)
    }
}

/// Every concrete `category.stat` path present in `dataset`.
pub fn available_stats(dataset: &StatDataset) -> impl Iterator<Item = String> + '_ {
    dataset.categories().flat_map(|(category, leaves)| {
        leaves
            .keys()
            .map(move |stat| format!("{category}.{stat}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn resolver() -> StatResolver {
        StatResolver::new()
    }

    #[test]
    fn resolves_exact_path() {
        let dataset = StatDataset::new().with_stat("custom", "jump", 42);
        assert_eq!(resolver().resolve(&dataset, "custom.jump"), Some(42));
    }

    #[test]
    fn category_total_sums_numeric_leaves() {
        let dataset = StatDataset::new()
            .with_stat("custom", "a", 3)
            .with_stat("custom", "b", 5)
            .with_stat("custom", "label", "ignored");
        assert_eq!(resolver().resolve(&dataset, "custom.total"), Some(8));
    }

    #[test]
    fn empty_category_total_is_not_found() {
        let mut dataset = StatDataset::new();
        dataset.insert("other", "x", 1);
        let empty: StatDataset = serde_json::from_str(r#"{"custom": {}}"#).unwrap();

        assert_eq!(resolver().resolve(&empty, "custom.total"), None);
        assert_eq!(resolver().resolve(&dataset, "custom.total"), None);
    }

    #[test]
    fn zero_sum_total_is_not_found() {
        let dataset = StatDataset::new()
            .with_stat("custom", "gain", 4)
            .with_stat("custom", "loss", -4);
        assert_eq!(resolver().resolve(&dataset, "custom.total"), None);
    }

    #[test]
    fn explicit_total_leaf_wins_over_sum() {
        let dataset = StatDataset::new()
            .with_stat("custom", "total", 100)
            .with_stat("custom", "a", 1);
        assert_eq!(resolver().resolve(&dataset, "custom.total"), Some(100));
    }

    #[test]
    fn falls_back_to_alias() {
        let dataset = StatDataset::new().with_stat("custom", "walk_cm", 1234);
        assert_eq!(resolver().resolve(&dataset, "custom.walk_one_cm"), Some(1234));
    }

    #[test]
    fn exact_path_takes_precedence_over_alias() {
        let dataset = StatDataset::new()
            .with_stat("custom", "walk_one_cm", 10)
            .with_stat("custom", "walk_cm", 99);
        assert_eq!(resolver().resolve(&dataset, "custom.walk_one_cm"), Some(10));
    }

    #[test]
    fn falls_back_to_namespaced_path() {
        let dataset = StatDataset::new().with_stat("minecraft:custom", "minecraft:jump", 7);
        assert_eq!(resolver().resolve(&dataset, "custom.jump"), Some(7));
    }

    #[test]
    fn namespaced_alias_and_total() {
        let dataset = StatDataset::new()
            .with_stat("minecraft:custom", "minecraft:play_one_minute", 72000)
            .with_stat("minecraft:mined", "minecraft:stone", 30)
            .with_stat("minecraft:mined", "minecraft:dirt", 12);

        assert_eq!(resolver().resolve(&dataset, "custom.play_time"), Some(72000));
        assert_eq!(resolver().resolve(&dataset, "mined.total"), Some(42));
    }

    #[test]
    fn three_segment_path_addresses_namespaced_leaf() {
        let dataset = StatDataset::new().with_stat("minecraft:mined", "minecraft:diamond_ore", 3);
        assert_eq!(
            resolver().resolve(&dataset, "mined.minecraft.diamond_ore"),
            Some(3)
        );
    }

    #[rstest]
    #[case("custom")]
    #[case("a.b.c.d")]
    #[case("custom.")]
    #[case(".jump")]
    #[case("")]
    fn malformed_paths_are_not_found(#[case] path: &str) {
        let dataset = StatDataset::new().with_stat("custom", "jump", 1);
        assert_eq!(resolver().resolve(&dataset, path), None);
    }

    #[test]
    fn parse_reports_segment_count() {
        assert_eq!(
            StatPath::parse("a.b.c.d"),
            Err(StatsError::InvalidPath {
                path: "a.b.c.d".into(),
                segments: 4
            })
        );
    }

    #[test]
    fn type_mismatch_is_not_found() {
        let dataset = StatDataset::new()
            .with_stat("custom", "flag", true)
            .with_stat("custom", "name", "steve");
        assert_eq!(resolver().resolve(&dataset, "custom.flag"), None);
        assert_eq!(resolver().resolve(&dataset, "custom.name"), None);
    }

    #[test]
    fn available_stats_lists_every_leaf() {
        let dataset = StatDataset::new()
            .with_stat("mined", "stone", 1)
            .with_stat("custom", "jump", 2)
            .with_stat("custom", "deaths", 0);

        let paths: Vec<String> = available_stats(&dataset).collect();
        assert_eq!(paths, vec!["custom.deaths", "custom.jump", "mined.stone"]);
    }
}
