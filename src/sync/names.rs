use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Picks the display name sent with outbound rows.
///
/// Precedence: the name supplied with the operation, then a locally known
/// name, then a lookup in the remote names table, then the placeholder.
/// Blank names count as missing at every step. The remote lookup itself is
/// made by the sync worker so it is paced like every other request.
#[derive(Clone)]
pub struct NameResolver {
    known: Arc<RwLock<HashMap<String, String>>>,
    names_table: Option<String>,
    placeholder: String,
}

impl NameResolver {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            known: Arc::new(RwLock::new(HashMap::new())),
            names_table: None,
            placeholder: placeholder.into(),
        }
    }

    pub fn with_names_table(mut self, names_table: impl Into<String>) -> Self {
        self.names_table = Some(names_table.into());
        self
    }

    pub fn names_table(&self) -> Option<&str> {
        self.names_table.as_deref()
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub async fn remember(&self, entity_id: &str, display_name: &str) {
        if display_name.trim().is_empty() {
            return;
        }
        self.known
            .write()
            .await
            .insert(entity_id.to_string(), display_name.to_string());
    }

    /// The explicit or locally known name, if there is one.
    pub async fn local(&self, entity_id: &str, explicit: Option<&str>) -> Option<String> {
        if let Some(name) = explicit.filter(|name| !name.trim().is_empty()) {
            return Some(name.to_string());
        }
        self.known.read().await.get(entity_id).cloned()
    }
}
