use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{SyncConfig, SyncError};

const MAX_ERROR_BODY: usize = 200;

/// A REST-style table store that supports upserts.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert `rows` into `table`, merging into existing rows that collide on
    /// the `on_conflict` columns.
    async fn upsert(&self, table: &str, on_conflict: &str, rows: &Value) -> Result<(), SyncError>;

    /// The first row whose `column` equals `key`, if any.
    async fn fetch(&self, table: &str, column: &str, key: &str)
        -> Result<Option<Value>, SyncError>;

    /// Delete the rows of `table` matching every filter. Filters use the
    /// PostgREST operator syntax, e.g. `("metric_id", "in.(a,b)")`.
    async fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<(), SyncError>;
}

/// [`RemoteStore`] over a PostgREST-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestRemoteStore {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        if config.base_url.trim().is_empty() {
            return Err(SyncError::Config("base_url is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| SyncError::Config(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|index| body.is_char_boundary(*index))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(SyncError::status(status.as_u16(), body))
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    #[instrument(skip(self, rows))]
    async fn upsert(&self, table: &str, on_conflict: &str, rows: &Value) -> Result<(), SyncError> {
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);

        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        debug!("Upsert accepted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch(
        &self,
        table: &str,
        column: &str,
        key: &str,
    ) -> Result<Option<Value>, SyncError> {
        let filter = format!("eq.{key}");
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[(column, filter.as_str()), ("select", "*"), ("limit", "1")]);

        let response = Self::check(self.authorize(request).send().await?).await?;
        let rows: Vec<Value> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<(), SyncError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(filters)
            .header("Prefer", "return=minimal");

        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        debug!("Delete accepted");
        Ok(())
    }
}
