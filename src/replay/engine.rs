use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;
use crate::game::state::PlayerId;
use crate::game::{apply, fold, GameEvent, GameStateSnapshot};

/// Recorded game as served by the debug endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayHistory {
    #[serde(alias = "initialGameState")]
    pub reconstructed_game_state: GameStateSnapshot,
    #[serde(default)]
    pub event_history: Vec<Value>,
}

/// Folds a fixed history from its initial snapshot. `position` counts the
/// events applied so far, so `0` is the initial state and `len()` the end.
/// Produces no effects.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    initial: GameStateSnapshot,
    history: Vec<GameEvent>,
    viewer: PlayerId,
    position: usize,
    current: GameStateSnapshot,
}

impl ReplayEngine {
    pub fn new(initial: GameStateSnapshot, history: Vec<GameEvent>, viewer: impl Into<PlayerId>) -> Self {
        Self {
            current: initial.clone(),
            initial,
            history,
            viewer: viewer.into(),
            position: 0,
        }
    }

    /// Viewer comes from the snapshot's perspective id, falling back to the
    /// first player. Undecodable entries become `Unknown` and keep their slot.
    pub fn from_history(history: ReplayHistory) -> Self {
        let initial = history.reconstructed_game_state;
        let viewer = initial
            .viewer
            .clone()
            .unwrap_or_else(|| initial.player1_state.player_id.clone());
        let events = history
            .event_history
            .into_iter()
            .map(|entry| GameEvent::from_value(entry).0)
            .collect();
        Self::new(initial, events, viewer)
    }

    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        let history: ReplayHistory =
            serde_json::from_value(value).map_err(|error| ClientError::decode("replay history", error))?;
        Ok(Self::from_history(history))
    }

    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        let history: ReplayHistory =
            serde_json::from_str(json).map_err(|error| ClientError::decode("replay history", error))?;
        Ok(Self::from_history(history))
    }

    /// State after the first `index` events, or `None` past the end.
    pub fn state_at(&self, index: usize) -> Option<GameStateSnapshot> {
        let prefix = self.history.get(..index)?;
        Some(fold(&self.initial, prefix, &self.viewer))
    }

    pub fn step_forward(&mut self) -> bool {
        let Some(event) = self.history.get(self.position) else {
            return false;
        };
        self.current = apply(&self.current, event, &self.viewer);
        self.position += 1;
        true
    }

    pub fn step_backward(&mut self) -> bool {
        if self.position == 0 {
            return false;
        }
        self.seek(self.position - 1);
        true
    }

    /// Jumps to `index`, clamped to the history. Returns the new position.
    pub fn seek(&mut self, index: usize) -> usize {
        let index = index.min(self.history.len());
        if index >= self.position {
            while self.position < index {
                self.step_forward();
            }
        } else {
            self.current = fold(&self.initial, &self.history[..index], &self.viewer);
            self.position = index;
        }
        self.position
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_at_end(&self) -> bool {
        self.position == self.history.len()
    }

    pub fn current(&self) -> &GameStateSnapshot {
        &self.current
    }

    /// The event that produced the current state, if any.
    pub fn last_event(&self) -> Option<&GameEvent> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.history.get(index))
    }

    pub fn history(&self) -> &[GameEvent] {
        &self.history
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }
}
