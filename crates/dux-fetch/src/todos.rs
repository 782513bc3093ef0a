use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::client::TodosClient;
use crate::query::{QueryCache, QueryState, QuerySubscription};

/// How long an entry with no subscribers stays cached.
pub const DEFAULT_KEEP_UNUSED_FOR: Duration = Duration::from_secs(60);

/// A todo item as served by the todos endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    pub title: String,
    pub completed: bool,
}

/// Snapshot of every cached query, keyed by cache key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiSnapshot {
    pub queries: BTreeMap<String, QueryState<serde_json::Value>>,
}

/// The `todosApi` slice: two named queries over the todos endpoints.
#[derive(Clone)]
pub struct TodosApi {
    get_todos: QueryCache<(), Vec<Todo>>,
    get_todo_by_id: QueryCache<u32, Todo>,
}

impl TodosApi {
    pub const REDUCER_PATH: &'static str = "todosApi";

    pub fn new<C: TodosClient + 'static>(client: Arc<C>, keep_unused_for: Duration) -> Self {
        let get_todos = QueryCache::new("getTodos", keep_unused_for, {
            let client = client.clone();
            move |()| {
                let client = client.clone();
                async move { client.get_todos().await }
            }
        });

        let get_todo_by_id = QueryCache::new("getTodoById", keep_unused_for, move |id: u32| {
            let client = client.clone();
            async move { client.get_todo(id).await }
        });

        Self {
            get_todos,
            get_todo_by_id,
        }
    }

    pub fn use_get_todos_query(&self) -> QuerySubscription<(), Vec<Todo>> {
        self.get_todos.use_query(())
    }

    pub fn use_get_todo_by_id_query(&self, id: u32) -> QuerySubscription<u32, Todo> {
        self.get_todo_by_id.use_query(id)
    }

    pub fn todos_cache(&self) -> &QueryCache<(), Vec<Todo>> {
        &self.get_todos
    }

    pub fn todo_by_id_cache(&self) -> &QueryCache<u32, Todo> {
        &self.get_todo_by_id
    }

    /// Evict idle entries from both queries.
    pub fn evict_expired(&self) -> usize {
        self.get_todos.evict_expired() + self.get_todo_by_id.evict_expired()
    }

    /// Periodically evict idle entries until the task is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let api = self.clone();
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let evicted = api.evict_expired();
                if evicted > 0 {
                    tracing::debug!("{} evicted {} idle queries", Self::REDUCER_PATH, evicted);
                }
            }
        })
    }

    pub fn snapshot(&self) -> ApiSnapshot {
        let mut snapshot = ApiSnapshot::default();
        self.get_todos.snapshot_into(&mut snapshot.queries);
        self.get_todo_by_id.snapshot_into(&mut snapshot.queries);
        snapshot
    }
}
