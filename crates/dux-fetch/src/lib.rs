//! Dux Fetch - Network-backed state: the page thunk and the query cache.

pub mod client;
pub mod error;
pub mod query;
pub mod thunk;
pub mod todos;

pub use client::{HttpPokeClient, HttpTodosClient, PokeClient, TodosClient};
pub use error::FetchError;
pub use query::{QueryCache, QueryState, QueryStatus, QuerySubscription};
pub use thunk::{get_pokemons, POKE_PAGE_SIZE};
pub use todos::{ApiSnapshot, Todo, TodosApi, DEFAULT_KEEP_UNUSED_FOR};
