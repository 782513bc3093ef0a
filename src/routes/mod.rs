pub mod counter;
pub mod poke;
pub mod store;
pub mod todos;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Whole-tree reads and generic dispatch
        .route("/state", get(store::get_state))
        .route("/state/counter", get(store::get_counter))
        .route("/state/poke", get(store::get_poke))
        .route("/dispatch", post(store::dispatch))
        // Counter transitions
        .route("/counter/increment", post(counter::increment))
        .route("/counter/decrement", post(counter::decrement))
        .route("/counter/increment-by/{amount}", post(counter::increment_by_amount))
        .route("/counter/reset", post(counter::reset))
        // Page thunk
        .route("/poke/pages/{page}", post(poke::get_page))
        // Cached queries
        .route("/todos", get(todos::get_todos))
        .route("/todos/refetch", post(todos::refetch_todos))
        .route("/todos/{id}", get(todos::get_todo_by_id))
        .route("/todos/{id}/refetch", post(todos::refetch_todo_by_id))
        // Health check
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
