use serde::{Deserialize, Serialize};

use crate::request::RequestId;
use crate::store::Slice;

/// One item of a Pokémon listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pokemon {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Pokemon {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }
}

/// State of the `poke` slice.
///
/// `pokemons` holds only the most recently applied page; pages never
/// accumulate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokeState {
    pub page: u32,
    pub pokemons: Vec<Pokemon>,
    pub loading: bool,
    /// The request this slice currently accepts results from.
    #[serde(skip)]
    pub in_flight: Option<RequestId>,
}

/// Transitions of the `poke` slice, emitted in the order
/// `startFetch`, `setPokemons`, `stopFetch` for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PokeAction {
    /// Marks `request_id` as the latest request, superseding any other.
    #[serde(rename = "poke/startFetch")]
    StartFetch {
        #[serde(rename = "requestId")]
        request_id: RequestId,
    },
    #[serde(rename = "poke/setPokemons")]
    SetPokemons {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        page: u32,
        pokemons: Vec<Pokemon>,
    },
    #[serde(rename = "poke/stopFetch")]
    StopFetch {
        #[serde(rename = "requestId")]
        request_id: RequestId,
    },
}

impl PokeAction {
    pub fn kind(&self) -> &'static str {
        match self {
            PokeAction::StartFetch { .. } => "poke/startFetch",
            PokeAction::SetPokemons { .. } => "poke/setPokemons",
            PokeAction::StopFetch { .. } => "poke/stopFetch",
        }
    }
}

impl PokeState {
    fn accepts(&self, request_id: RequestId) -> bool {
        self.in_flight == Some(request_id)
    }
}

impl Slice for PokeState {
    const NAME: &'static str = "poke";
    type Action = PokeAction;

    fn reduce(&mut self, action: &PokeAction) {
        match action {
            PokeAction::StartFetch { request_id } => {
                self.loading = true;
                self.in_flight = Some(*request_id);
            }
            PokeAction::SetPokemons {
                request_id,
                page,
                pokemons,
            } => {
                if self.accepts(*request_id) {
                    self.page = *page;
                    self.pokemons = pokemons.clone();
                }
            }
            PokeAction::StopFetch { request_id } => {
                if self.accepts(*request_id) {
                    self.loading = false;
                    self.in_flight = None;
                }
            }
        }
    }
}
