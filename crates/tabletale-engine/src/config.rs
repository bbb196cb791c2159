//! Engine settings.

/// Default capacity of the turn event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Settings for a [`TurnEngine`](crate::TurnEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
    /// Save every committed turn to the durable store.
    pub snapshot_each_turn: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            snapshot_each_turn: true,
        }
    }
}
