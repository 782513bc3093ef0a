use std::sync::Arc;

use tokio::sync::watch;

use crate::action::Action;
use crate::counter::CounterState;
use crate::poke::PokeState;

/// A named partition of the state tree plus the transitions that mutate it.
pub trait Slice: Clone + Default + Send + Sync + 'static {
    /// Key of this slice in the state tree.
    const NAME: &'static str;

    type Action;

    /// Apply one transition in place.
    fn reduce(&mut self, action: &Self::Action);
}

/// The whole state tree.
///
/// Slices are shared copy-on-write: cloning a `RootState` is cheap, and a
/// transition replaces only the target slice, so snapshots taken before a
/// dispatch keep observing the old values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootState {
    pub counter: Arc<CounterState>,
    pub poke: Arc<PokeState>,
}

impl RootState {
    /// Produce the next tree for `action`. Non-target slices are carried
    /// over pointer-equal.
    pub fn reduce(&self, action: &Action) -> RootState {
        let mut next = self.clone();
        match action {
            Action::Counter(a) => apply_to(&mut next.counter, a),
            Action::Poke(a) => apply_to(&mut next.poke, a),
        }
        next
    }
}

fn apply_to<S: Slice>(slice: &mut Arc<S>, action: &S::Action) {
    tracing::trace!("reducing {}", S::NAME);
    Arc::make_mut(slice).reduce(action);
}

/// Process-wide state container.
///
/// Dispatch is the only write path; every dispatch is applied atomically
/// with respect to other dispatches and readers.
pub struct Store {
    state: watch::Sender<RootState>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_state(RootState::default())
    }

    pub fn with_state(initial: RootState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// Route `action` to its slice reducer.
    pub fn dispatch(&self, action: impl Into<Action>) {
        let action = action.into();
        tracing::trace!("dispatch {}", action.kind());
        self.state.send_modify(|root| *root = root.reduce(&action));
    }

    /// Snapshot of the whole tree.
    pub fn state(&self) -> RootState {
        self.state.borrow().clone()
    }

    pub fn counter(&self) -> Arc<CounterState> {
        self.state.borrow().counter.clone()
    }

    pub fn poke(&self) -> Arc<PokeState> {
        self.state.borrow().poke.clone()
    }

    /// Receiver notified after every dispatch.
    pub fn subscribe(&self) -> watch::Receiver<RootState> {
        self.state.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
