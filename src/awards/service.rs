use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{
    AwardError, AwardSnapshot, EntityAggregate, MetricDefinition, PointTable, PopulationMember,
    Ranking, RankingEngine,
};
use crate::source::{EntityRef, LogNotificationSink, Notification, NotificationSink, StatSource};
use crate::stats::{available_stats, StatResolver};
use crate::storage::{self, AwardStore};
use crate::sync::{AggregateMode, SyncCounters, SyncHandle, SyncOperation};

/// Which entities a full pass reloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopulationScope {
    /// Refresh connected entities from their live stats; everyone else
    /// keeps their last dataset.
    #[default]
    Online,
    /// Reload every known entity from persisted stats and drop records of
    /// entities that are gone.
    All,
}

impl fmt::Display for PopulationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulationScope::Online => write!(f, "online"),
            PopulationScope::All => write!(f, "all"),
        }
    }
}

impl TryFrom<&str> for PopulationScope {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "online" => Ok(PopulationScope::Online),
            "all" => Ok(PopulationScope::All),
            other => Err(format!("Unknown population scope: {other}")),
        }
    }
}

/// What one calculation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub population: usize,
    /// Entities left out because their stats could not be read.
    pub skipped: usize,
    pub metrics: usize,
    pub changed: usize,
    pub saved: usize,
    pub save_failures: usize,
    pub cleared: usize,
    pub sync_operations: usize,
    pub notifications: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub queued: usize,
    pub counters: SyncCounters,
}

/// Drives calculation passes and serves their results.
///
/// Readers always see a complete [`AwardSnapshot`]; a pass builds the next
/// one off to the side and swaps it in as a whole.
pub struct AwardService {
    metrics: Vec<MetricDefinition>,
    engine: RankingEngine,
    source: Arc<dyn StatSource>,
    store: Arc<dyn AwardStore>,
    sync: Option<SyncHandle>,
    notifier: Arc<dyn NotificationSink>,
    snapshot: RwLock<Arc<AwardSnapshot>>,
    population: RwLock<BTreeMap<String, PopulationMember>>,
    /// Entities whose latest aggregate has not reached the local store.
    unsaved: RwLock<BTreeSet<String>>,
}

impl AwardService {
    pub fn builder(
        source: Arc<dyn StatSource>,
        store: Arc<dyn AwardStore>,
    ) -> AwardServiceBuilder {
        AwardServiceBuilder::new(source, store)
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    pub fn sync(&self) -> Option<&SyncHandle> {
        self.sync.as_ref()
    }

    pub async fn snapshot(&self) -> Arc<AwardSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Load persisted aggregates so they can be served before the first pass.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<usize, AwardError> {
        let aggregates = self.store.load_all().await?;
        let count = aggregates.len();

        if let Some(sync) = &self.sync {
            for aggregate in &aggregates {
                sync.names()
                    .remember(&aggregate.entity_id, &aggregate.display_name)
                    .await;
            }
        }

        let mut guard = self.snapshot.write().await;
        let mut next = AwardSnapshot::clone(&guard);
        next.aggregates.extend(
            aggregates
                .into_iter()
                .map(|aggregate| (aggregate.entity_id.clone(), aggregate)),
        );
        *guard = Arc::new(next);

        info!(count, "Restored award records");
        Ok(count)
    }

    /// Recalculate every metric over the population selected by `scope`.
    #[instrument(skip(self))]
    pub async fn calculate_all(&self, scope: PopulationScope) -> Result<PassSummary, AwardError> {
        let started = Instant::now();
        let online = self.source.online_entities().await?;
        let online_ids: HashSet<String> = online.iter().map(|entity| entity.id.clone()).collect();

        let entities = match scope {
            PopulationScope::Online => online,
            PopulationScope::All => self.source.known_entities().await?,
        };
        let known: Option<HashSet<String>> = (scope == PopulationScope::All)
            .then(|| entities.iter().map(|entity| entity.id.clone()).collect());
        let (members, skipped) = self.load_members(&entities, scope).await;

        let population: Vec<PopulationMember> = {
            let mut cache = self.population.write().await;
            if scope == PopulationScope::All {
                cache.clear();
            }
            for member in members {
                cache.insert(member.entity_id.clone(), member);
            }
            cache.values().cloned().collect()
        };

        let mut summary = self
            .run_pass(population, &online_ids, known.as_ref())
            .await;
        summary.skipped = skipped;

        info!(
            %scope,
            population = summary.population,
            changed = summary.changed,
            save_failures = summary.save_failures,
            cleared = summary.cleared,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Calculation pass finished"
        );
        Ok(summary)
    }

    /// Reload one entity's stats and re-rank the cached population around it.
    #[instrument(skip(self))]
    pub async fn calculate_for_entity(&self, entity_id: &str) -> Result<EntityAggregate, AwardError> {
        let dataset = self
            .source
            .live_dataset(entity_id)
            .await?
            .ok_or_else(|| AwardError::UnknownEntity(entity_id.to_string()))?;
        let online = self.source.online_entities().await?;
        let display_name = self.display_name_for(entity_id, &online).await;
        let online_ids: HashSet<String> = online.into_iter().map(|entity| entity.id).collect();

        let population: Vec<PopulationMember> = {
            let mut cache = self.population.write().await;
            cache.insert(
                entity_id.to_string(),
                PopulationMember::new(entity_id, display_name, dataset),
            );
            cache.values().cloned().collect()
        };

        let summary = self.run_pass(population, &online_ids, None).await;
        debug!(changed = summary.changed, "Single-entity pass finished");

        self.get_aggregate(entity_id).await
    }

    pub async fn get_ranking(&self, metric_id: &str) -> Result<Ranking, AwardError> {
        if !self.metrics.iter().any(|metric| metric.id == metric_id) {
            return Err(AwardError::UnknownMetric(metric_id.to_string()));
        }
        Ok(self
            .snapshot()
            .await
            .ranking(metric_id)
            .cloned()
            .unwrap_or_else(|| Ranking::empty(metric_id)))
    }

    pub async fn get_aggregate(&self, entity_id: &str) -> Result<EntityAggregate, AwardError> {
        self.snapshot()
            .await
            .aggregate(entity_id)
            .cloned()
            .ok_or_else(|| AwardError::UnknownEntity(entity_id.to_string()))
    }

    /// Every `category.stat` path present in the entity's current dataset.
    pub async fn get_available_stats(&self, entity_id: &str) -> Result<Vec<String>, AwardError> {
        let dataset = match self.source.live_dataset(entity_id).await? {
            Some(dataset) => dataset,
            None => self
                .population
                .read()
                .await
                .get(entity_id)
                .map(|member| member.dataset.clone())
                .ok_or_else(|| AwardError::UnknownEntity(entity_id.to_string()))?,
        };
        Ok(available_stats(&dataset).collect())
    }

    /// Delete an entity's local records and drop it from the snapshot. The
    /// next pass that includes the entity awards it afresh.
    #[instrument(skip(self))]
    pub async fn clear(&self, entity_id: &str) -> Result<(), AwardError> {
        self.store.clear(entity_id).await?;
        self.unsaved.write().await.remove(entity_id);

        let removed = {
            let mut guard = self.snapshot.write().await;
            let mut next = AwardSnapshot::clone(&guard);
            let removed = next.aggregates.remove(entity_id);
            *guard = Arc::new(next);
            removed
        };

        if let (Some(sync), Some(previous)) = (&self.sync, &removed) {
            let emptied = EntityAggregate::new(&previous.entity_id, &previous.display_name);
            sync.mirror(Some(previous), &emptied);
        }

        info!(had_record = removed.is_some(), "Cleared entity awards");
        Ok(())
    }

    /// Push every aggregate in the snapshot to the remote, overwriting its
    /// totals, and wait for the queue to drain.
    #[instrument(skip(self))]
    pub async fn sync_now(&self) -> Result<SyncReport, AwardError> {
        let sync = self.sync.as_ref().ok_or(AwardError::SyncDisabled)?;
        let snapshot = self.snapshot().await;

        let mut queued = 0;
        for aggregate in snapshot.aggregates.values() {
            sync.names()
                .remember(&aggregate.entity_id, &aggregate.display_name)
                .await;
            for operation in SyncOperation::for_aggregate(AggregateMode::Snapshot, None, aggregate)
            {
                if sync.enqueue(operation) {
                    queued += 1;
                }
            }
        }

        sync.flush().await;
        let counters = sync.counters();
        info!(queued, ?counters, "Full sync finished");
        Ok(SyncReport { queued, counters })
    }

    /// Connected entities are read from live stats, a full reload only from
    /// what the host has persisted.
    async fn load_members(
        &self,
        entities: &[EntityRef],
        scope: PopulationScope,
    ) -> (Vec<PopulationMember>, usize) {
        let mut members = Vec::with_capacity(entities.len());
        let mut skipped = 0;

        for entity in entities {
            let dataset = match scope {
                PopulationScope::Online => self.source.live_dataset(&entity.id).await,
                PopulationScope::All => self.source.stored_dataset(&entity.id).await,
            };
            match dataset {
                Ok(Some(dataset)) => members.push(PopulationMember::new(
                    &entity.id,
                    &entity.display_name,
                    dataset,
                )),
                Ok(None) => debug!(entity_id = %entity.id, "No stats recorded for entity"),
                Err(err) => {
                    skipped += 1;
                    warn!(entity_id = %entity.id, error = %err, "Skipping entity with unreadable stats");
                }
            }
        }

        (members, skipped)
    }

    async fn display_name_for(&self, entity_id: &str, online: &[EntityRef]) -> String {
        if let Some(entity) = online.iter().find(|entity| entity.id == entity_id) {
            return entity.display_name.clone();
        }
        if let Some(member) = self.population.read().await.get(entity_id) {
            return member.display_name.clone();
        }
        self.snapshot()
            .await
            .aggregate(entity_id)
            .map(|aggregate| aggregate.display_name.clone())
            .unwrap_or_else(|| entity_id.to_string())
    }

    /// Rank `population`, swap in the new snapshot, then persist, mirror and
    /// announce whatever changed. When `known` is given, aggregates of
    /// entities outside it are removed.
    ///
    /// A pass replaces every medal of the metrics it ranks: entities held in
    /// the snapshot but not ranked this time lose those medals.
    async fn run_pass(
        &self,
        population: Vec<PopulationMember>,
        online: &HashSet<String>,
        known: Option<&HashSet<String>>,
    ) -> PassSummary {
        let now = Utc::now();
        let previous = self.snapshot().await;
        let outcome = self.engine.compute(&self.metrics, &population, now);

        let mut summary = PassSummary {
            population: population.len(),
            metrics: outcome.rankings.len(),
            ..PassSummary::default()
        };

        let ranked: HashSet<String> = outcome.rankings.keys().cloned().collect();
        let evaluated: HashSet<String> = outcome.aggregates.keys().cloned().collect();

        let mut aggregates = previous.aggregates.clone();
        let mut changed = Vec::new();
        for (entity_id, mut aggregate) in outcome.aggregates {
            let before = previous.aggregate(&entity_id);
            keep_award_timestamps(&mut aggregate, before);
            let is_changed = match before {
                Some(before) => *before != aggregate,
                None => aggregate.has_medals(),
            };
            if is_changed {
                changed.push(aggregate.clone());
            }
            aggregates.insert(entity_id, aggregate);
        }

        let stale: Vec<EntityAggregate> = match known {
            Some(known) => previous
                .aggregates
                .values()
                .filter(|aggregate| !known.contains(&aggregate.entity_id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        for aggregate in &stale {
            aggregates.remove(&aggregate.entity_id);
        }

        for (entity_id, aggregate) in aggregates.iter_mut() {
            if evaluated.contains(entity_id)
                || !aggregate
                    .medals
                    .iter()
                    .any(|award| ranked.contains(&award.metric_id))
            {
                continue;
            }
            aggregate
                .medals
                .retain(|award| !ranked.contains(&award.metric_id));
            aggregate.recompute();
            debug!(entity_id = %entity_id, "Dropped medals of an entity outside the pass");
            changed.push(aggregate.clone());
        }

        let mut to_save = changed.clone();
        let retry: BTreeSet<String> = std::mem::take(&mut *self.unsaved.write().await);
        for entity_id in retry {
            if changed.iter().any(|aggregate| aggregate.entity_id == entity_id) {
                continue;
            }
            if let Some(aggregate) = aggregates.get(&entity_id) {
                debug!(entity_id = %entity_id, "Retrying award record save");
                to_save.push(aggregate.clone());
            }
        }

        *self.snapshot.write().await = Arc::new(AwardSnapshot {
            rankings: outcome.rankings,
            aggregates,
            computed_at: Some(now),
        });

        summary.changed = changed.len();
        let saved = storage::save_all(self.store.as_ref(), &to_save).await;
        summary.saved = saved.succeeded;
        summary.save_failures = saved.failed;
        self.unsaved.write().await.extend(saved.failed_ids);

        let stale_ids: Vec<String> = stale
            .iter()
            .map(|aggregate| aggregate.entity_id.clone())
            .collect();
        let cleared = storage::clear_all(self.store.as_ref(), stale_ids).await;
        summary.cleared = cleared.succeeded;

        if let Some(sync) = &self.sync {
            for aggregate in &changed {
                sync.names()
                    .remember(&aggregate.entity_id, &aggregate.display_name)
                    .await;
                summary.sync_operations +=
                    sync.mirror(previous.aggregate(&aggregate.entity_id), aggregate);
            }
            for aggregate in &stale {
                let emptied = EntityAggregate::new(&aggregate.entity_id, &aggregate.display_name);
                summary.sync_operations += sync.mirror(Some(aggregate), &emptied);
            }
        }

        summary.notifications = self.announce(&previous, &changed, online);
        summary
    }

    /// Tell connected entities about medals they did not hold before and
    /// about point gains.
    fn announce(
        &self,
        previous: &AwardSnapshot,
        changed: &[EntityAggregate],
        online: &HashSet<String>,
    ) -> usize {
        let mut sent = 0;

        for aggregate in changed
            .iter()
            .filter(|aggregate| online.contains(&aggregate.entity_id))
        {
            let before = previous.aggregate(&aggregate.entity_id);
            let entity = EntityRef::new(&aggregate.entity_id, &aggregate.display_name);

            for award in &aggregate.medals {
                let held = before
                    .and_then(|before| before.medal_for(&award.metric_id))
                    .is_some_and(|old| old.medal == award.medal);
                if !held {
                    self.notifier.notify(Notification::MedalUnlocked {
                        entity: entity.clone(),
                        award: award.clone(),
                    });
                    sent += 1;
                }
            }

            let previous_points = before.map_or(0.0, |before| before.total_points);
            if aggregate.total_points > previous_points {
                self.notifier.notify(Notification::PointsIncreased {
                    entity,
                    previous: previous_points,
                    current: aggregate.total_points,
                });
                sent += 1;
            }
        }

        sent
    }
}

/// Awards whose placement did not move keep the time they were first given.
fn keep_award_timestamps(current: &mut EntityAggregate, previous: Option<&EntityAggregate>) {
    let Some(previous) = previous else {
        return;
    };
    for award in &mut current.medals {
        if let Some(old) = previous.medal_for(&award.metric_id) {
            if old.same_placement(award) {
                award.awarded_at = old.awarded_at;
            }
        }
    }
}

pub struct AwardServiceBuilder {
    source: Arc<dyn StatSource>,
    store: Arc<dyn AwardStore>,
    metrics: Vec<MetricDefinition>,
    point_table: PointTable,
    resolver: StatResolver,
    sync: Option<SyncHandle>,
    notifier: Arc<dyn NotificationSink>,
}

impl AwardServiceBuilder {
    fn new(source: Arc<dyn StatSource>, store: Arc<dyn AwardStore>) -> Self {
        Self {
            source,
            store,
            metrics: Vec::new(),
            point_table: PointTable::default(),
            resolver: StatResolver::new(),
            sync: None,
            notifier: Arc::new(LogNotificationSink),
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<MetricDefinition>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_metric(mut self, metric: MetricDefinition) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_point_table(mut self, point_table: PointTable) -> Self {
        self.point_table = point_table;
        self
    }

    pub fn with_resolver(mut self, resolver: StatResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_sync(mut self, sync: SyncHandle) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> AwardService {
        AwardService {
            metrics: self.metrics,
            engine: RankingEngine::new(self.resolver, self.point_table),
            source: self.source,
            store: self.store,
            sync: self.sync,
            notifier: self.notifier,
            snapshot: RwLock::new(Arc::new(AwardSnapshot::default())),
            population: RwLock::new(BTreeMap::new()),
            unsaved: RwLock::new(BTreeSet::new()),
        }
    }
}
