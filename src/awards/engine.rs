use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use super::{
    EntityAggregate, MedalAward, MedalType, MetricDefinition, PointTable, PopulationMember,
    Ranking, RankingEntry,
};
use crate::stats::StatResolver;

/// Rankings and aggregates produced from one population snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    pub rankings: BTreeMap<String, Ranking>,
    pub aggregates: BTreeMap<String, EntityAggregate>,
}

/// Ranks a population per metric and turns podium places into medals.
#[derive(Debug, Clone)]
pub struct RankingEngine {
    resolver: StatResolver,
    point_table: PointTable,
}

impl RankingEngine {
    pub fn new(resolver: StatResolver, point_table: PointTable) -> Self {
        Self {
            resolver,
            point_table,
        }
    }

    pub fn point_table(&self) -> &PointTable {
        &self.point_table
    }

    pub fn resolver(&self) -> &StatResolver {
        &self.resolver
    }

    /// Order eligible entities best-first.
    ///
    /// Entities whose stat is missing or not positive are left out. Equal
    /// values are ordered by entity id so the result does not depend on the
    /// order the population was gathered in.
    pub fn rank(&self, metric: &MetricDefinition, population: &[PopulationMember]) -> Ranking {
        let mut entries: Vec<RankingEntry> = population
            .iter()
            .filter_map(|member| {
                let value = self.resolver.resolve(&member.dataset, &metric.stat_path)?;
                (value > 0).then(|| RankingEntry {
                    entity_id: member.entity_id.clone(),
                    display_name: member.display_name.clone(),
                    value,
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        debug!(
            metric_id = %metric.id,
            ranked = entries.len(),
            population = population.len(),
            "Ranked metric"
        );

        Ranking {
            metric_id: metric.id.clone(),
            entries,
        }
    }

    /// Medals for the top three entries of `ranking`, paired with the
    /// receiving entity id.
    pub fn assign_medals(
        &self,
        metric: &MetricDefinition,
        ranking: &Ranking,
        awarded_at: DateTime<Utc>,
    ) -> Vec<(String, MedalAward)> {
        ranking
            .entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                let medal = MedalType::for_position(position)?;
                Some((
                    entry.entity_id.clone(),
                    MedalAward {
                        metric_id: metric.id.clone(),
                        medal,
                        points: self.point_table.points(metric.tier, medal),
                        rank: medal.rank(),
                        value: entry.value,
                        awarded_at,
                    },
                ))
            })
            .collect()
    }

    /// Run every enabled metric over the same population.
    ///
    /// Every member gets an aggregate, medals or not, and the totals are
    /// rebuilt from scratch once all metrics have been processed.
    pub fn compute(
        &self,
        metrics: &[MetricDefinition],
        population: &[PopulationMember],
        awarded_at: DateTime<Utc>,
    ) -> PassOutcome {
        let mut aggregates: BTreeMap<String, EntityAggregate> = population
            .iter()
            .map(|member| {
                (
                    member.entity_id.clone(),
                    EntityAggregate::new(&member.entity_id, &member.display_name),
                )
            })
            .collect();
        let mut rankings = BTreeMap::new();

        for metric in metrics.iter().filter(|metric| metric.enabled) {
            let ranking = self.rank(metric, population);
            for (entity_id, award) in self.assign_medals(metric, &ranking, awarded_at) {
                if let Some(aggregate) = aggregates.get_mut(&entity_id) {
                    aggregate.medals.push(award);
                }
            }
            rankings.insert(metric.id.clone(), ranking);
        }

        for aggregate in aggregates.values_mut() {
            aggregate.recompute();
        }

        PassOutcome {
            rankings,
            aggregates,
        }
    }
}
