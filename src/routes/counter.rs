use axum::{
    extract::{Path, State},
    Json,
};

use dux_core::{CounterAction, CounterState};

use crate::state::AppState;

fn apply(state: &AppState, action: CounterAction) -> Json<CounterState> {
    state.store.dispatch(action);
    Json((*state.store.counter()).clone())
}

pub async fn increment(State(state): State<AppState>) -> Json<CounterState> {
    apply(&state, CounterAction::Increment)
}

pub async fn decrement(State(state): State<AppState>) -> Json<CounterState> {
    apply(&state, CounterAction::Decrement)
}

/// POST /counter/increment-by/{amount} - Any integer, applied as given.
pub async fn increment_by_amount(
    State(state): State<AppState>,
    Path(amount): Path<i64>,
) -> Json<CounterState> {
    apply(&state, CounterAction::IncrementByAmount(amount))
}

pub async fn reset(State(state): State<AppState>) -> Json<CounterState> {
    apply(&state, CounterAction::Reset)
}
