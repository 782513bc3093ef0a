use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use dux_fetch::QueryState;

use crate::state::AppState;

/// Rejected queries are reported as a bad gateway, with the query state
/// as body either way.
fn query_response<V: Serialize>(query: QueryState<V>) -> Response {
    let status = if query.is_error() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    (status, Json(query)).into_response()
}

/// GET /todos - The `getTodos` query.
pub async fn get_todos(State(state): State<AppState>) -> Response {
    let mut sub = state.todos_api.use_get_todos_query();
    query_response(sub.settled().await)
}

/// GET /todos/{id} - The `getTodoById` query, cached per id.
pub async fn get_todo_by_id(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    let mut sub = state.todos_api.use_get_todo_by_id_query(id);
    query_response(sub.settled().await)
}

/// POST /todos/refetch - Re-request `getTodos`. A query that is not cached
/// yet, or whose retry is already running, is fetched only once.
pub async fn refetch_todos(State(state): State<AppState>) -> Response {
    let mut sub = state.todos_api.use_get_todos_query();
    sub.refetch();
    query_response(sub.settled().await)
}

/// POST /todos/{id}/refetch
pub async fn refetch_todo_by_id(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    let mut sub = state.todos_api.use_get_todo_by_id_query(id);
    sub.refetch();
    query_response(sub.settled().await)
}
