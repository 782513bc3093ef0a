use serde::de::DeserializeOwned;
use serde::Deserialize;

use dux_core::Pokemon;

use crate::error::FetchError;
use crate::todos::Todo;

/// Trait for reading pages of the Pokémon listing.
pub trait PokeClient: Send + Sync {
    fn list_pokemon(
        &self,
        limit: u32,
        offset: u64,
    ) -> impl std::future::Future<Output = Result<Vec<Pokemon>, FetchError>> + Send;
}

/// Trait for reading todos.
pub trait TodosClient: Send + Sync {
    fn get_todos(&self) -> impl std::future::Future<Output = Result<Vec<Todo>, FetchError>> + Send;

    fn get_todo(
        &self,
        id: u32,
    ) -> impl std::future::Future<Output = Result<Todo, FetchError>> + Send;
}

#[derive(Debug, Deserialize)]
struct PokemonListResponse {
    results: Vec<Pokemon>,
}

/// HTTP client for the Pokémon listing endpoint.
pub struct HttpPokeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPokeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn page_url(&self, limit: u32, offset: u64) -> String {
        format!(
            "{}/pokemon?limit={}&offset={}",
            self.base_url.trim_end_matches('/'),
            limit,
            offset
        )
    }
}

impl PokeClient for HttpPokeClient {
    async fn list_pokemon(&self, limit: u32, offset: u64) -> Result<Vec<Pokemon>, FetchError> {
        let url = self.page_url(limit, offset);
        let page: PokemonListResponse = get_json(&self.client, &url).await?;
        Ok(page.results)
    }
}

/// HTTP client for the todos endpoints.
pub struct HttpTodosClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTodosClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl TodosClient for HttpTodosClient {
    async fn get_todos(&self) -> Result<Vec<Todo>, FetchError> {
        get_json(&self.client, &self.url("/todos")).await
    }

    async fn get_todo(&self, id: u32) -> Result<Todo, FetchError> {
        get_json(&self.client, &self.url(&format!("/todos/{}", id))).await
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, FetchError> {
    tracing::debug!("GET {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    response.json().await.map_err(|e| FetchError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
