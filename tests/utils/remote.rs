use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

// ============================================================================
// HTTP mock of the remote REST store
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub table: String,
    pub query: HashMap<String, String>,
    pub api_key: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone, Default)]
struct MockState {
    script: Arc<Mutex<VecDeque<u16>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    rows: Arc<Mutex<HashMap<(String, String), Value>>>,
}

impl MockState {
    /// The scripted status for the next request, if any is left.
    async fn next_failure(&self) -> Option<StatusCode> {
        let status = self.script.lock().await.pop_front()?;
        StatusCode::from_u16(status)
            .ok()
            .filter(|status| !status.is_success())
    }
}

/// A PostgREST-like server on 127.0.0.1 with an ephemeral port.
///
/// Every request consumes one scripted status; once the script is empty
/// requests succeed. Upserted rows are kept per table and served back by GET.
pub struct MockRemote {
    pub base_url: String,
    state: MockState,
    _server: JoinHandle<()>,
}

impl MockRemote {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/:table", get(fetch_rows).post(upsert_rows).delete(delete_rows))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{address}"),
            state,
            _server: server,
        }
    }

    pub async fn script(&self, statuses: &[u16]) {
        self.state.script.lock().await.extend(statuses.iter().copied());
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().await.clone()
    }

    pub async fn posts_to(&self, table: &str) -> usize {
        self.count(table, "POST").await
    }

    pub async fn deletes_from(&self, table: &str) -> usize {
        self.count(table, "DELETE").await
    }

    async fn count(&self, table: &str, method: &str) -> usize {
        self.requests()
            .await
            .iter()
            .filter(|request| request.method == method && request.table == table)
            .count()
    }

    pub async fn row(&self, table: &str, key: &str) -> Option<Value> {
        self.state
            .rows
            .lock()
            .await
            .get(&(table.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn seed(&self, table: &str, key: &str, row: Value) {
        self.state
            .rows
            .lock()
            .await
            .insert((table.to_string(), key.to_string()), row);
    }
}

fn row_key(row: &Value) -> String {
    let entity_id = row["entity_id"].as_str().unwrap_or_default();
    match row.get("metric_id").and_then(Value::as_str) {
        Some(metric_id) => format!("{entity_id}:{metric_id}"),
        None => entity_id.to_string(),
    }
}

async fn upsert_rows(
    State(state): State<MockState>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.requests.lock().await.push(RecordedRequest {
        method: "POST",
        table: table.clone(),
        query,
        api_key: api_key(&headers),
        body: Some(body.clone()),
    });

    if let Some(status) = state.next_failure().await {
        return (status, Json(json!({"message": "scripted failure"}))).into_response();
    }

    let mut rows = state.rows.lock().await;
    for row in body.as_array().cloned().unwrap_or_default() {
        rows.insert((table.clone(), row_key(&row)), row);
    }
    StatusCode::CREATED.into_response()
}

async fn fetch_rows(
    State(state): State<MockState>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.requests.lock().await.push(RecordedRequest {
        method: "GET",
        table: table.clone(),
        query: query.clone(),
        api_key: api_key(&headers),
        body: None,
    });

    if let Some(status) = state.next_failure().await {
        return (status, Json(json!({"message": "scripted failure"}))).into_response();
    }

    let key = query
        .get("entity_id")
        .and_then(|filter| filter.strip_prefix("eq."))
        .unwrap_or_default()
        .to_string();
    let rows: Vec<Value> = state
        .rows
        .lock()
        .await
        .get(&(table, key))
        .cloned()
        .into_iter()
        .collect();
    Json(rows).into_response()
}

async fn delete_rows(
    State(state): State<MockState>,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.requests.lock().await.push(RecordedRequest {
        method: "DELETE",
        table: table.clone(),
        query: query.clone(),
        api_key: api_key(&headers),
        body: None,
    });

    if let Some(status) = state.next_failure().await {
        return (status, Json(json!({"message": "scripted failure"}))).into_response();
    }

    let entity_id = query
        .get("entity_id")
        .and_then(|filter| filter.strip_prefix("eq."))
        .unwrap_or_default()
        .to_string();
    let keys: Vec<String> = match query
        .get("metric_id")
        .and_then(|filter| filter.strip_prefix("in.("))
        .and_then(|list| list.strip_suffix(')'))
    {
        Some(list) => list
            .split(',')
            .map(|metric_id| format!("{entity_id}:{metric_id}"))
            .collect(),
        None => vec![entity_id],
    };

    let mut rows = state.rows.lock().await;
    for key in keys {
        rows.remove(&(table.clone(), key));
    }
    StatusCode::NO_CONTENT.into_response()
}

fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("apikey")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
