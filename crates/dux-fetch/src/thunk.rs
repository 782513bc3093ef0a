use std::sync::Arc;

use dux_core::{PokeAction, PokeState, RequestId, Store};

use crate::client::PokeClient;
use crate::error::FetchError;

/// Items per listing page.
pub const POKE_PAGE_SIZE: u32 = 10;

/// Fetch one page of the listing into the `poke` slice.
///
/// Dispatches `startFetch`, then `setPokemons` once the page arrives, then
/// `stopFetch`. A newer call supersedes any call still in flight: results
/// of the older request are ignored by the slice.
pub async fn get_pokemons<P: PokeClient>(
    store: &Store,
    client: &P,
    page: u32,
) -> Result<Arc<PokeState>, FetchError> {
    let request_id = RequestId::new();
    store.dispatch(PokeAction::StartFetch { request_id });
    // Clears `loading` on success, on failure, and when this future is
    // dropped mid-request.
    let guard = scopeguard::guard(request_id, |request_id| {
        store.dispatch(PokeAction::StopFetch { request_id });
    });

    let offset = u64::from(page) * u64::from(POKE_PAGE_SIZE);
    let pokemons = match client.list_pokemon(POKE_PAGE_SIZE, offset).await {
        Ok(pokemons) => pokemons,
        Err(e) => {
            tracing::warn!("Failed to fetch pokemon page {}: {}", page, e);
            return Err(e);
        }
    };

    tracing::debug!("Fetched {} pokemon for page {}", pokemons.len(), page);
    store.dispatch(PokeAction::SetPokemons {
        request_id,
        page,
        pokemons,
    });

    drop(guard);
    Ok(store.poke())
}
