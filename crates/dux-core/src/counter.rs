use serde::{Deserialize, Serialize};

use crate::store::Slice;

/// State of the `counter` slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub counter: i64,
}

/// Transitions of the `counter` slice.
///
/// Arithmetic wraps at the `i64` bounds, so every transition is total and
/// `increment` followed by `decrement` always restores the previous value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CounterAction {
    #[serde(rename = "counter/increment")]
    Increment,
    #[serde(rename = "counter/decrement")]
    Decrement,
    /// Applied literally: zero and negative amounts are accepted.
    #[serde(rename = "counter/incrementByAmount")]
    IncrementByAmount(i64),
    #[serde(rename = "counter/reset")]
    Reset,
}

impl CounterAction {
    pub fn kind(&self) -> &'static str {
        match self {
            CounterAction::Increment => "counter/increment",
            CounterAction::Decrement => "counter/decrement",
            CounterAction::IncrementByAmount(_) => "counter/incrementByAmount",
            CounterAction::Reset => "counter/reset",
        }
    }
}

impl Slice for CounterState {
    const NAME: &'static str = "counter";
    type Action = CounterAction;

    fn reduce(&mut self, action: &CounterAction) {
        match *action {
            CounterAction::Increment => self.counter = self.counter.wrapping_add(1),
            CounterAction::Decrement => self.counter = self.counter.wrapping_sub(1),
            CounterAction::IncrementByAmount(amount) => {
                self.counter = self.counter.wrapping_add(amount)
            }
            CounterAction::Reset => self.counter = 0,
        }
    }
}
