use std::sync::Arc;

use medalboard::{
    awards::{AwardService, MetricDefinition, PointTable, Tier},
    source::{EntityRef, InMemoryStatSource},
    storage::{AwardStore, InMemoryAwardStore},
    sync::SyncHandle,
};

use super::mocks::{score, RecordingSink};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub const SCORE_METRIC: &str = "score";

pub struct TestSetup {
    pub service: Arc<AwardService>,
    pub source: InMemoryStatSource,
    pub store: InMemoryAwardStore,
    pub sink: RecordingSink,
}

pub struct TestSetupBuilder {
    entities: Vec<(String, i64, bool)>,
    metrics: Vec<MetricDefinition>,
    point_table: PointTable,
    store: Option<Arc<dyn AwardStore>>,
    sync: Option<SyncHandle>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            metrics: vec![MetricDefinition::new(
                SCORE_METRIC,
                Tier::Iron,
                "custom.score",
            )],
            point_table: PointTable::default(),
            store: None,
            sync: None,
        }
    }

    /// Offline entity whose `custom.score` is `value`.
    pub fn with_entity(mut self, id: &str, value: i64) -> Self {
        self.entities.push((id.to_string(), value, false));
        self
    }

    pub fn with_online_entity(mut self, id: &str, value: i64) -> Self {
        self.entities.push((id.to_string(), value, true));
        self
    }

    /// A=100, B=80, C=50, D=10, all offline.
    pub fn with_podium_population(self) -> Self {
        self.with_entity("A", 100)
            .with_entity("B", 80)
            .with_entity("C", 50)
            .with_entity("D", 10)
    }

    pub fn with_metrics(mut self, metrics: Vec<MetricDefinition>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_point_table(mut self, point_table: PointTable) -> Self {
        self.point_table = point_table;
        self
    }

    /// Persist through `store` instead of the in-memory store.
    pub fn with_store(mut self, store: Arc<dyn AwardStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sync(mut self, sync: SyncHandle) -> Self {
        self.sync = Some(sync);
        self
    }

    pub async fn build(self) -> TestSetup {
        let source = InMemoryStatSource::new();
        for (id, value, online) in &self.entities {
            source
                .insert(EntityRef::new(id, format!("Player {id}")), score(*value))
                .await;
            source.set_online(id, *online).await;
        }

        let store = InMemoryAwardStore::new();
        let sink = RecordingSink::new();
        let store_handle: Arc<dyn AwardStore> = match self.store {
            Some(store) => store,
            None => Arc::new(store.clone()),
        };

        let mut builder = AwardService::builder(Arc::new(source.clone()), store_handle)
            .with_metrics(self.metrics)
            .with_point_table(self.point_table)
            .with_notifier(Arc::new(sink.clone()));
        if let Some(sync) = self.sync {
            builder = builder.with_sync(sync);
        }

        TestSetup {
            service: Arc::new(builder.build()),
            source,
            store,
            sink,
        }
    }
}
