use serde::{Deserialize, Serialize};

/// States of the circuit guard state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

/// `StateChangeListener` listens on the circuit guard state change event.
/// Listeners are injected at guard construction and are invoked synchronously
/// while the transition is performed, so implementations should return quickly.
pub trait StateChangeListener: Sync + Send {
    /// `on_transform_to_closed` is triggered when the guard state transformed to Closed.
    fn on_transform_to_closed(&self, prev: State);

    /// `on_transform_to_open` is triggered when the guard state transformed to Open.
    /// `consecutive_failures` indicates the triggered value when the transformation occurs.
    fn on_transform_to_open(&self, prev: State, consecutive_failures: u64);

    /// `on_transform_to_half_open` is triggered when the guard state transformed to HalfOpen.
    fn on_transform_to_half_open(&self, prev: State);
}
