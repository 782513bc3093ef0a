use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use dux_core::{CounterState, PokeState, Store};
use dux_fetch::{ApiSnapshot, HttpPokeClient, HttpTodosClient, TodosApi};

use crate::config::Config;

/// The composed store: the reducer slices, the query cache slice, and the
/// clients the asynchronous operations read through.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub poke_client: Arc<HttpPokeClient>,
    pub todos_api: TodosApi,
}

/// Read surface: the whole state tree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub counter: CounterState,
    pub poke: PokeState,
    pub todos_api: ApiSnapshot,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let todos_client = Arc::new(HttpTodosClient::new(config.todos_api_url.clone()));
        Self {
            store: Arc::new(Store::new()),
            poke_client: Arc::new(HttpPokeClient::new(config.poke_api_url.clone())),
            todos_api: TodosApi::new(todos_client, config.keep_unused_for),
        }
    }

    /// Start the background eviction sweep of the query cache. The caller
    /// owns the handle and aborts it on shutdown.
    pub fn spawn_cache_sweeper(&self, config: &Config) -> JoinHandle<()> {
        self.todos_api.spawn_sweeper(config.sweep_interval)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let root = self.store.state();
        StoreSnapshot {
            counter: (*root.counter).clone(),
            poke: (*root.poke).clone(),
            todos_api: self.todos_api.snapshot(),
        }
    }
}
