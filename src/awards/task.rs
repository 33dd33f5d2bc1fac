use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument};

use super::{AwardService, PassSummary, PopulationScope};

/// Configuration for the recalculation task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalculationConfig {
    /// How often to run a full pass
    pub interval: Duration,
    pub scope: PopulationScope,
}

impl Default for RecalculationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60), // 10 minutes
            scope: PopulationScope::All,
        }
    }
}

/// Starts the background task that periodically recalculates every metric.
/// The first pass runs immediately.
#[instrument(skip(service))]
pub async fn start_recalculation_task(service: Arc<AwardService>, config: RecalculationConfig) {
    info!(
        interval_secs = config.interval.as_secs(),
        scope = %config.scope,
        "Starting award recalculation background task"
    );

    let mut ticker = interval(config.interval);
    // A slow pass should not be followed by a burst of catch-up passes.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_scheduled_pass(&service, config.scope).await;
    }
}

async fn run_scheduled_pass(service: &AwardService, scope: PopulationScope) -> Option<PassSummary> {
    match service.calculate_all(scope).await {
        Ok(summary) => {
            info!(
                population = summary.population,
                changed = summary.changed,
                "Scheduled recalculation completed"
            );
            Some(summary)
        }
        Err(e) => {
            error!(error = %e, "Scheduled recalculation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awards::{MetricDefinition, Tier};
    use crate::source::{EntityRef, InMemoryStatSource, SourceError, StatSource};
    use crate::stats::StatDataset;
    use crate::storage::InMemoryAwardStore;
    use async_trait::async_trait;

    struct BrokenSource;

    #[async_trait]
    impl StatSource for BrokenSource {
        async fn online_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
            Err(SourceError::Unavailable("host not ready".into()))
        }
        async fn known_entities(&self) -> Result<Vec<EntityRef>, SourceError> {
            Err(SourceError::Unavailable("host not ready".into()))
        }
        async fn live_dataset(&self, _: &str) -> Result<Option<StatDataset>, SourceError> {
            Ok(None)
        }
        async fn stored_dataset(&self, _: &str) -> Result<Option<StatDataset>, SourceError> {
            Ok(None)
        }
    }

    async fn service(store: InMemoryAwardStore) -> Arc<AwardService> {
        let source = InMemoryStatSource::new();
        source
            .insert(
                EntityRef::new("a", "Alice"),
                StatDataset::new().with_stat("custom", "jump", 5),
            )
            .await;
        Arc::new(
            AwardService::builder(Arc::new(source), Arc::new(store))
                .with_metric(MetricDefinition::new("jumper", Tier::Iron, "custom.jump"))
                .build(),
        )
    }

    #[tokio::test]
    async fn test_scheduled_pass_persists_awards() {
        let store = InMemoryAwardStore::new();
        let service = service(store.clone()).await;

        let summary = run_scheduled_pass(&service, PopulationScope::All)
            .await
            .unwrap();

        assert_eq!(summary.population, 1);
        assert!(store.get("a").await.is_some());
    }

    #[tokio::test]
    async fn test_scheduled_pass_survives_source_failure() {
        let service =
            AwardService::builder(Arc::new(BrokenSource), Arc::new(InMemoryAwardStore::new()))
                .build();

        assert!(run_scheduled_pass(&service, PopulationScope::All)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_task_runs_first_pass_immediately() {
        let store = InMemoryAwardStore::new();
        let service = service(store.clone()).await;

        let handle = tokio::spawn(start_recalculation_task(
            service,
            RecalculationConfig {
                interval: Duration::from_secs(3600),
                scope: PopulationScope::All,
            },
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(store.len().await, 1);
    }
}
