use serde::{Deserialize, Serialize};

use crate::counter::CounterAction;
use crate::poke::PokeAction;

/// A named, payload-carrying transition addressed to one slice.
///
/// On the wire an action is `{"type": "<slice>/<transition>", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    Counter(CounterAction),
    Poke(PokeAction),
}

impl Action {
    /// The action type, e.g. `counter/increment`.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Counter(a) => a.kind(),
            Action::Poke(a) => a.kind(),
        }
    }
}

impl From<CounterAction> for Action {
    fn from(action: CounterAction) -> Self {
        Action::Counter(action)
    }
}

impl From<PokeAction> for Action {
    fn from(action: PokeAction) -> Self {
        Action::Poke(action)
    }
}
