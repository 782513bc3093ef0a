use axum::{extract::State, Json};

use dux_core::{Action, CounterState, PokeState};

use crate::state::{AppState, StoreSnapshot};

/// GET /state - Snapshot of the whole state tree.
pub async fn get_state(State(state): State<AppState>) -> Json<StoreSnapshot> {
    Json(state.snapshot())
}

/// GET /state/counter
pub async fn get_counter(State(state): State<AppState>) -> Json<CounterState> {
    Json((*state.store.counter()).clone())
}

/// GET /state/poke
pub async fn get_poke(State(state): State<AppState>) -> Json<PokeState> {
    Json((*state.store.poke()).clone())
}

/// POST /dispatch - Apply one action, e.g.
/// `{"type": "counter/incrementByAmount", "payload": 5}`.
pub async fn dispatch(
    State(state): State<AppState>,
    Json(action): Json<Action>,
) -> Json<StoreSnapshot> {
    tracing::info!("Dispatching {}", action.kind());
    state.store.dispatch(action);
    Json(state.snapshot())
}
