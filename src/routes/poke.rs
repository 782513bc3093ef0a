use axum::{
    extract::{Path, State},
    Json,
};

use dux_core::PokeState;
use dux_fetch::get_pokemons;

use crate::error::AppError;
use crate::state::AppState;

/// POST /poke/pages/{page} - Fetch one listing page into the `poke` slice.
///
/// Responds once the request has finished. If a newer page request was
/// issued meanwhile, the returned state reflects that one.
pub async fn get_page(
    State(state): State<AppState>,
    Path(page): Path<u32>,
) -> Result<Json<PokeState>, AppError> {
    let poke = get_pokemons(&state.store, state.poke_client.as_ref(), page).await?;
    Ok(Json((*poke).clone()))
}
