use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use super::{
    AggregateMode, AwardRow, Disposition, MedalCountRow, MedalDelta, NameResolver, PointTotalRow,
    RemoteStore, SyncConfig, SyncError, SyncOperation, SyncTables, AWARD_KEY, ENTITY_KEY,
    METRIC_COLUMN,
};
use crate::awards::{EntityAggregate, MedalCounts};

enum SyncJob {
    Mirror(SyncOperation),
    Flush(oneshot::Sender<()>),
}

/// Request outcome counters, shared between the worker and its handles.
#[derive(Debug, Default)]
struct SyncStats {
    succeeded: AtomicU64,
    conflicts: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounters {
    /// Requests the remote accepted.
    pub succeeded: u64,
    /// Upserts answered with 409 and counted as done.
    pub conflicts: u64,
    /// Extra attempts made after a transient failure.
    pub retries: u64,
    /// Requests given up on.
    pub dropped: u64,
}

impl SyncStats {
    fn snapshot(&self) -> SyncCounters {
        SyncCounters {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Sending side of the mirror queue.
#[derive(Clone)]
pub struct SyncHandle {
    sender: mpsc::UnboundedSender<SyncJob>,
    stats: Arc<SyncStats>,
    names: NameResolver,
    mode: AggregateMode,
}

impl SyncHandle {
    /// Queue an operation. Returns false when the worker is gone.
    pub fn enqueue(&self, operation: SyncOperation) -> bool {
        let entity_id = operation.entity_id().to_string();
        let kind = operation.kind();
        match self.sender.send(SyncJob::Mirror(operation)) {
            Ok(()) => {
                debug!(entity_id = %entity_id, kind, "Queued sync operation");
                true
            }
            Err(_) => {
                warn!(entity_id = %entity_id, kind, "Sync worker stopped, dropping operation");
                false
            }
        }
    }

    /// Queue whatever brings the remote in line with `current`.
    pub fn mirror(&self, previous: Option<&EntityAggregate>, current: &EntityAggregate) -> usize {
        SyncOperation::for_aggregate(self.mode, previous, current)
            .into_iter()
            .filter(|operation| self.enqueue(operation.clone()))
            .count()
    }

    /// Resolves once every operation queued before this call has been handled.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(SyncJob::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn counters(&self) -> SyncCounters {
        self.stats.snapshot()
    }

    pub fn names(&self) -> &NameResolver {
        &self.names
    }

    pub fn mode(&self) -> AggregateMode {
        self.mode
    }
}

enum Attempt<T> {
    Done(T),
    Conflict,
}

/// Background worker that mirrors local award state to the remote store.
///
/// Operations are executed one at a time in queue order with a fixed pause
/// after every request. Transient failures back off exponentially up to
/// `max_retries`; after that, or on a permanent failure, the request is
/// logged and dropped.
pub struct SyncGateway {
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    tables: SyncTables,
    names: NameResolver,
    stats: Arc<SyncStats>,
}

impl SyncGateway {
    pub fn spawn(remote: Arc<dyn RemoteStore>, config: SyncConfig) -> SyncHandle {
        let names =
            NameResolver::new(config.placeholder_name.clone()).with_names_table(config.tables().names);
        Self::spawn_with_names(remote, config, names)
    }

    pub fn spawn_with_names(
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        names: NameResolver,
    ) -> SyncHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(SyncStats::default());
        let mode = config.mode;

        info!(
            tables = %config.table_prefix,
            delay_ms = config.request_delay_ms,
            max_retries = config.max_retries,
            ?mode,
            "Starting sync worker"
        );

        let gateway = SyncGateway {
            remote,
            tables: config.tables(),
            config,
            names: names.clone(),
            stats: stats.clone(),
        };
        tokio::spawn(gateway.run(receiver));

        SyncHandle {
            sender,
            stats,
            names,
            mode,
        }
    }

    async fn run(self, mut receiver: mpsc::UnboundedReceiver<SyncJob>) {
        while let Some(job) = receiver.recv().await {
            match job {
                SyncJob::Mirror(operation) => self.execute(operation).await,
                SyncJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        info!("Sync worker stopped");
    }

    #[instrument(skip(self, operation), fields(entity_id = %operation.entity_id(), kind = operation.kind()))]
    async fn execute(&self, operation: SyncOperation) {
        match operation {
            SyncOperation::UpsertAwards {
                entity_id,
                display_name,
                awards,
            } => {
                let name = self.display_name(&entity_id, display_name.as_deref()).await;
                let rows: Vec<AwardRow> = awards
                    .iter()
                    .map(|award| AwardRow::new(&entity_id, &name, award))
                    .collect();
                self.upsert(&self.tables.awards, AWARD_KEY, &rows).await;
            }
            SyncOperation::RemoveAwards {
                entity_id,
                metric_ids,
            } => {
                if metric_ids.is_empty() {
                    return;
                }
                let filters = [
                    (ENTITY_KEY, format!("eq.{entity_id}")),
                    (METRIC_COLUMN, format!("in.({})", metric_ids.join(","))),
                ];
                self.delete(&self.tables.awards, &filters).await;
            }
            SyncOperation::UpsertAggregate {
                entity_id,
                display_name,
                counts,
                total_points,
            } => {
                let name = self.display_name(&entity_id, display_name.as_deref()).await;
                let now = chrono::Utc::now();
                self.upsert(
                    &self.tables.medals,
                    ENTITY_KEY,
                    &[medal_row(&entity_id, &name, &counts, now)],
                )
                .await;
                self.upsert(
                    &self.tables.points,
                    ENTITY_KEY,
                    &[PointTotalRow {
                        entity_id: entity_id.clone(),
                        display_name: name,
                        total_points,
                        updated_at: Some(now),
                    }],
                )
                .await;
            }
            SyncOperation::ApplyAggregateDelta {
                entity_id,
                display_name,
                medals,
                points,
            } => {
                let name = self.display_name(&entity_id, display_name.as_deref()).await;
                self.apply_medal_delta(&entity_id, &name, medals).await;
                self.apply_point_delta(&entity_id, &name, points).await;
            }
        }
    }

    /// Explicit name, then a known one, then the remote names table, then
    /// the placeholder.
    async fn display_name(&self, entity_id: &str, explicit: Option<&str>) -> String {
        if let Some(name) = self.names.local(entity_id, explicit).await {
            return name;
        }

        if let Some(table) = self.names.names_table() {
            if let Some(Some(row)) = self.fetch::<Value>(table, entity_id).await {
                if let Some(name) = row
                    .get("display_name")
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty())
                {
                    self.names.remember(entity_id, name).await;
                    return name.to_string();
                }
            }
        }

        self.names.placeholder().to_string()
    }

    /// GET the remote medal row, add the change, write it back.
    async fn apply_medal_delta(&self, entity_id: &str, name: &str, delta: MedalDelta) {
        if delta.is_zero() {
            return;
        }
        let Some(current) = self
            .fetch::<MedalCountRow>(&self.tables.medals, entity_id)
            .await
        else {
            return;
        };

        let (gold, silver, bronze) = current
            .map(|row| (row.gold, row.silver, row.bronze))
            .unwrap_or_default();
        let gold = (gold + delta.gold).max(0);
        let silver = (silver + delta.silver).max(0);
        let bronze = (bronze + delta.bronze).max(0);
        let row = MedalCountRow {
            entity_id: entity_id.to_string(),
            display_name: name.to_string(),
            gold,
            silver,
            bronze,
            total: gold + silver + bronze,
            updated_at: Some(chrono::Utc::now()),
        };
        self.upsert(&self.tables.medals, ENTITY_KEY, &[row]).await;
    }

    async fn apply_point_delta(&self, entity_id: &str, name: &str, delta: f64) {
        if delta == 0.0 {
            return;
        }
        let Some(current) = self
            .fetch::<PointTotalRow>(&self.tables.points, entity_id)
            .await
        else {
            return;
        };

        let previous = current.map(|row| row.total_points).unwrap_or_default();
        let row = PointTotalRow {
            entity_id: entity_id.to_string(),
            display_name: name.to_string(),
            total_points: (previous + delta).max(0.0),
            updated_at: Some(chrono::Utc::now()),
        };
        self.upsert(&self.tables.points, ENTITY_KEY, &[row]).await;
    }

    /// Upsert `rows`, retrying transient failures.
    async fn upsert<T: Serialize>(&self, table: &str, on_conflict: &str, rows: &[T]) {
        if rows.is_empty() {
            return;
        }
        let body = match serde_json::to_value(rows) {
            Ok(body) => body,
            Err(err) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                error!(table, error = %err, "Could not encode rows, dropping");
                return;
            }
        };

        self.with_retry(table, || self.remote.upsert(table, on_conflict, &body))
            .await;
        tokio::time::sleep(self.config.request_delay()).await;
    }

    async fn delete(&self, table: &str, filters: &[(&str, String)]) {
        self.with_retry(table, || self.remote.delete(table, filters))
            .await;
        tokio::time::sleep(self.config.request_delay()).await;
    }

    /// Read one row. `None` means the read failed and the caller should
    /// give up; `Some(None)` means the row does not exist yet.
    async fn fetch<T: DeserializeOwned>(&self, table: &str, entity_id: &str) -> Option<Option<T>> {
        let outcome = self
            .with_retry(table, || self.remote.fetch(table, ENTITY_KEY, entity_id))
            .await;
        tokio::time::sleep(self.config.request_delay()).await;

        let Some(value) = outcome? else {
            return Some(None);
        };
        match decode_row::<T>(value) {
            Ok(row) => Some(Some(row)),
            Err(err) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                error!(table, entity_id, error = %err, "Unreadable remote row, skipping update");
                None
            }
        }
    }

    /// Run `request` until it succeeds, conflicts, fails permanently or runs
    /// out of retries. `None` means the request was dropped; a conflict
    /// yields `Some(T::default())`.
    async fn with_retry<T, F, Fut>(&self, table: &str, mut request: F) -> Option<T>
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let err = match request().await {
                Ok(value) => return Some(self.record(Attempt::Done(value), table, attempt)),
                Err(err) => err,
            };

            match err.disposition() {
                Disposition::Accepted => {
                    return Some(self.record(Attempt::Conflict, table, attempt));
                }
                Disposition::Drop => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(table, error = %err, "Remote rejected request, dropping");
                    return None;
                }
                Disposition::Retry if attempt < max_retries => {
                    let delay = self.config.backoff_for(attempt);
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        table,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Remote request failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Disposition::Retry => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        table,
                        attempts = attempt + 1,
                        error = %err,
                        "Remote request still failing after retries, dropping"
                    );
                    return None;
                }
            }
        }

        None
    }

    fn record<T: Default>(&self, attempt: Attempt<T>, table: &str, index: u32) -> T {
        match attempt {
            Attempt::Done(value) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                if index > 0 {
                    info!(table, attempt = index + 1, "Remote request succeeded after retry");
                }
                value
            }
            Attempt::Conflict => {
                self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(table, "Row already present, treating conflict as success");
                T::default()
            }
        }
    }
}

fn medal_row(
    entity_id: &str,
    name: &str,
    counts: &MedalCounts,
    now: chrono::DateTime<chrono::Utc>,
) -> MedalCountRow {
    MedalCountRow {
        entity_id: entity_id.to_string(),
        display_name: name.to_string(),
        gold: i64::from(counts.gold),
        silver: i64::from(counts.silver),
        bronze: i64::from(counts.bronze),
        total: i64::from(counts.total()),
        updated_at: Some(now),
    }
}

fn decode_row<T: DeserializeOwned>(value: Value) -> Result<T, SyncError> {
    serde_json::from_value(value).map_err(|err| SyncError::Decode(err.to_string()))
}
