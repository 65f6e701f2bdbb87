//! In-memory tracker backend.
//!
//! A complete, thread-safe implementation of the [`Provider`] contract
//! against process-local state. It backs the sync rehearsal mode (run a
//! full sync without touching a real tracker) and the engine test
//! suites. Remote ids are opaque UUIDs; human keys are `#1`, `#2`, ... in
//! creation order, like an issue tracker would assign.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CreateItemInput, Provider, ProviderError, RemoteItem, SearchFilters, UpdateItemInput,
};

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<String, RemoteItem>,
    /// Insertion order, so search results are stable.
    order: Vec<String>,
    /// child remote id -> parent remote id.
    parents: HashMap<String, String>,
    /// (item remote id, blocked-by remote id).
    dependencies: BTreeSet<(String, String)>,
    next_key: u64,
    /// When set, mutating calls answer `NotSupported`. Used to model a
    /// backend with a reduced capability surface.
    frozen: bool,
}

/// Process-local [`Provider`] implementation.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    base_url: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::new(Mutex::new(MemoryState {
                next_key: 1,
                ..MemoryState::default()
            })),
        }
    }

    /// Disallow further mutations; mutating calls answer `NotSupported`.
    pub async fn freeze(&self) {
        self.state.lock().await.frozen = true;
    }

    /// Number of stored items.
    pub async fn item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// Snapshot of parent links as (child id, parent id) pairs.
    pub async fn parent_links(&self) -> Vec<(String, String)> {
        let state = self.state.lock().await;
        state.parents.iter().map(|(c, p)| (c.clone(), p.clone())).collect()
    }

    /// Snapshot of dependency edges as (item id, blocked-by id) pairs.
    pub async fn dependency_edges(&self) -> BTreeSet<(String, String)> {
        self.state.lock().await.dependencies.clone()
    }

    fn not_supported(&self, capability: &str) -> ProviderError {
        ProviderError::NotSupported {
            provider: "memory".to_owned(),
            capability: capability.to_owned(),
        }
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search_items(
        &self,
        filters: &SearchFilters,
    ) -> Result<Vec<RemoteItem>, ProviderError> {
        let state = self.state.lock().await;
        let matches = state
            .order
            .iter()
            .filter_map(|id| state.items.get(id))
            .filter(|item| {
                filters
                    .body_contains
                    .as_deref()
                    .is_none_or(|needle| item.body.contains(needle))
            })
            .filter(|item| filters.labels.iter().all(|l| item.labels.contains(l)))
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn create_item(&self, input: &CreateItemInput) -> Result<RemoteItem, ProviderError> {
        if input.title.trim().is_empty() {
            return Err(ProviderError::InvalidInput("title must not be empty".to_owned()));
        }
        let mut state = self.state.lock().await;
        if state.frozen {
            return Err(self.not_supported("create_item"));
        }

        let id = Uuid::new_v4().to_string();
        let key_number = state.next_key;
        state.next_key += 1;
        let item = RemoteItem {
            id: id.clone(),
            key: format!("#{key_number}"),
            url: format!("{}/items/{key_number}", self.base_url),
            title: input.title.clone(),
            body: input.body.clone(),
            labels: Vec::new(),
        };
        state.items.insert(id.clone(), item.clone());
        state.order.push(id);
        Ok(item)
    }

    async fn update_item(
        &self,
        id: &str,
        input: &UpdateItemInput,
    ) -> Result<RemoteItem, ProviderError> {
        let mut state = self.state.lock().await;
        if state.frozen {
            return Err(self.not_supported("update_item"));
        }
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))?;
        if let Some(title) = &input.title {
            item.title = title.clone();
        }
        if let Some(body) = &input.body {
            item.body = body.clone();
        }
        if let Some(labels) = &input.labels {
            item.labels = labels.clone();
        }
        Ok(item.clone())
    }

    async fn get_item(&self, id: &str) -> Result<RemoteItem, ProviderError> {
        let state = self.state.lock().await;
        state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))
    }

    async fn delete_item(&self, id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.frozen {
            return Err(self.not_supported("delete_item"));
        }
        if state.items.remove(id).is_none() {
            return Err(ProviderError::NotFound(id.to_owned()));
        }
        state.order.retain(|o| o != id);
        state.parents.remove(id);
        state
            .dependencies
            .retain(|(a, b)| a != id && b != id);
        Ok(())
    }

    async fn set_parent(&self, child_id: &str, parent_id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.frozen {
            return Err(self.not_supported("set_parent"));
        }
        for id in [child_id, parent_id] {
            if !state.items.contains_key(id) {
                return Err(ProviderError::NotFound(id.to_owned()));
            }
        }
        if state.parents.get(child_id).map(String::as_str) == Some(parent_id) {
            return Err(ProviderError::AlreadyExists(format!(
                "parent link {child_id} -> {parent_id}"
            )));
        }
        state.parents.insert(child_id.to_owned(), parent_id.to_owned());
        Ok(())
    }

    async fn add_dependency(
        &self,
        item_id: &str,
        blocked_by_id: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state.frozen {
            return Err(self.not_supported("add_dependency"));
        }
        for id in [item_id, blocked_by_id] {
            if !state.items.contains_key(id) {
                return Err(ProviderError::NotFound(id.to_owned()));
            }
        }
        let edge = (item_id.to_owned(), blocked_by_id.to_owned());
        if !state.dependencies.insert(edge) {
            return Err(ProviderError::AlreadyExists(format!(
                "dependency {item_id} blocked by {blocked_by_id}"
            )));
        }
        Ok(())
    }
}
