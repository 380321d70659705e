use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::events::StatKind;

/// Number of field slots per player. Empty slots are `None`.
pub const FIELD_SLOTS: usize = 4;

/// Unique id of one concrete card occurrence. Never reused.
pub type InstanceId = String;
/// Template reference shared by every copy of a card.
pub type CardId = String;
/// Player identity as issued by the server.
pub type PlayerId = String;

/// One player's row of field slots.
pub type FieldRow = [Option<Arc<CardInstance>>; FIELD_SLOTS];

/// Which of the two player states a player occupies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    pub const BOTH: [Seat; 2] = [Seat::One, Seat::Two];

    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }
}

/// Position of a card on the table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CardLocation {
    pub seat: Seat,
    pub slot: usize,
}

/// Display-only highlight of the stats touched by the most recent event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatChanges {
    #[serde(skip_serializing_if = "is_false")]
    pub attack: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub defense: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub life: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl StatChanges {
    pub fn only(stat: StatKind) -> Self {
        let mut changes = Self::default();
        match stat {
            StatKind::Attack => changes.attack = true,
            StatKind::Defense => changes.defense = true,
            StatKind::Life | StatKind::MaxLife => changes.life = true,
            StatKind::Other => {}
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        !(self.attack || self.defense || self.life)
    }
}

/// A card on the field or in the viewing player's hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardInstance {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub card_id: CardId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub current_attack: i32,
    #[serde(default)]
    pub current_defense: i32,
    #[serde(default)]
    pub current_life: i32,
    #[serde(default)]
    pub base_attack: i32,
    #[serde(default)]
    pub base_defense: i32,
    #[serde(default)]
    pub base_life: i32,
    #[serde(default)]
    pub is_exhausted: bool,
    #[serde(default)]
    pub is_dying: bool,
    #[serde(default, skip_serializing_if = "StatChanges::is_empty")]
    pub stat_changes: StatChanges,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub effect_flags: BTreeMap<String, Value>,
}

impl CardInstance {
    pub fn new(
        instance_id: impl Into<InstanceId>,
        card_id: impl Into<CardId>,
        name: impl Into<String>,
        attack: i32,
        defense: i32,
        life: i32,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            card_id: card_id.into(),
            name: name.into(),
            current_attack: attack,
            current_defense: defense,
            current_life: life,
            base_attack: attack,
            base_defense: defense,
            base_life: life,
            ..Self::default()
        }
    }

    /// Copy of a hand or wire card as it should sit on the field: exhausted,
    /// base stats pinned to the stats it entered with, no display markers.
    pub fn normalized_for_field(&self) -> Self {
        Self {
            base_attack: self.current_attack,
            base_defense: self.current_defense,
            base_life: self.current_life,
            is_exhausted: true,
            is_dying: false,
            stat_changes: StatChanges::default(),
            ..self.clone()
        }
    }

    pub fn stat(&self, stat: StatKind) -> Option<i32> {
        match stat {
            StatKind::Attack => Some(self.current_attack),
            StatKind::Defense => Some(self.current_defense),
            StatKind::Life => Some(self.current_life),
            StatKind::MaxLife => Some(self.base_life),
            StatKind::Other => None,
        }
    }
}

/// Per-player view. `hand` is only populated for the viewing player.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub player_id: PlayerId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hand: Vec<Arc<CardInstance>>,
    #[serde(default)]
    pub hand_size: u32,
    #[serde(default)]
    pub deck_size: u32,
    #[serde(default)]
    pub discard_pile_size: u32,
    #[serde(default, deserialize_with = "deserialize_field_row")]
    pub field: FieldRow,
    #[serde(default)]
    pub attacks_declared_this_turn: u32,
}

impl PlayerState {
    pub fn new(player_id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn field_cards(&self) -> impl Iterator<Item = (usize, &CardInstance)> {
        self.field
            .iter()
            .enumerate()
            .filter_map(|(slot, card)| card.as_deref().map(|card| (slot, card)))
    }

    pub fn find_hand_index(&self, instance_id: &str) -> Option<usize> {
        self.hand
            .iter()
            .position(|card| card.instance_id == instance_id)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// The server sends the field as a list; pad or truncate it to the fixed row.
fn deserialize_field_row<'de, D>(deserializer: D) -> Result<FieldRow, D::Error>
where
    D: Deserializer<'de>,
{
    let cards: Vec<Option<Arc<CardInstance>>> = null_as_default(deserializer)?;
    let mut row = FieldRow::default();
    for (slot, card) in cards.into_iter().take(FIELD_SLOTS).enumerate() {
        row[slot] = card;
    }
    Ok(row)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_player_id: Option<PlayerId>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("instance `{instance_id}` appears more than once")]
    DuplicateInstance { instance_id: InstanceId },
    #[error("current player `{player_id}` is not seated")]
    UnknownCurrentPlayer { player_id: PlayerId },
    #[error("card index disagrees with the field at `{instance_id}`")]
    IndexOutOfSync { instance_id: InstanceId },
}

/// Field lookup by instance id, kept alongside the snapshot so event
/// application never scans both rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardIndex {
    slots: HashMap<InstanceId, CardLocation>,
}

impl CardIndex {
    fn build(player1: &PlayerState, player2: &PlayerState) -> Self {
        let mut slots = HashMap::new();
        for (seat, player) in [(Seat::One, player1), (Seat::Two, player2)] {
            for (slot, card) in player.field_cards() {
                slots.insert(card.instance_id.clone(), CardLocation { seat, slot });
            }
        }
        Self { slots }
    }

    pub fn locate(&self, instance_id: &str) -> Option<CardLocation> {
        self.slots.get(instance_id).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Complete state of the table as seen from one perspective.
///
/// Updates go through [`crate::game::reconstruct::apply`], which clones the
/// snapshot (a handful of `Arc` bumps) and copies on write only the player
/// rows and cards it actually touches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "SnapshotWire")]
pub struct GameStateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    pub turn_number: u32,
    pub current_player_id: PlayerId,
    pub player1_state: Arc<PlayerState>,
    pub player2_state: Arc<PlayerState>,
    #[serde(
        rename = "viewingPlayerPerspectiveId",
        skip_serializing_if = "Option::is_none"
    )]
    pub viewer: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
    #[serde(skip)]
    index: Arc<CardIndex>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotWire {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    turn_number: u32,
    #[serde(default)]
    current_player_id: PlayerId,
    #[serde(default)]
    player1_state: PlayerState,
    #[serde(default)]
    player2_state: PlayerState,
    #[serde(default, rename = "viewingPlayerPerspectiveId")]
    viewer: Option<PlayerId>,
    #[serde(default)]
    outcome: Option<GameOutcome>,
}

impl From<SnapshotWire> for GameStateSnapshot {
    fn from(wire: SnapshotWire) -> Self {
        let mut snapshot = GameStateSnapshot::new(wire.player1_state, wire.player2_state);
        snapshot.game_id = wire.game_id;
        snapshot.turn_number = wire.turn_number;
        snapshot.current_player_id = wire.current_player_id;
        snapshot.viewer = wire.viewer;
        snapshot.outcome = wire.outcome;
        snapshot
    }
}

impl GameStateSnapshot {
    pub fn new(player1: PlayerState, player2: PlayerState) -> Self {
        let index = CardIndex::build(&player1, &player2);
        Self {
            game_id: None,
            turn_number: 0,
            current_player_id: player1.player_id.clone(),
            player1_state: Arc::new(player1),
            player2_state: Arc::new(player2),
            viewer: None,
            outcome: None,
            index: Arc::new(index),
        }
    }

    pub fn with_turn(mut self, turn_number: u32, current_player_id: impl Into<PlayerId>) -> Self {
        self.turn_number = turn_number;
        self.current_player_id = current_player_id.into();
        self
    }

    pub fn with_viewer(mut self, viewer: impl Into<PlayerId>) -> Self {
        self.viewer = Some(viewer.into());
        self
    }

    pub fn player(&self, seat: Seat) -> &PlayerState {
        match seat {
            Seat::One => &self.player1_state,
            Seat::Two => &self.player2_state,
        }
    }

    /// Copy-on-write access to one player row. Field slots must be changed
    /// through [`Self::place`] so the index stays in step.
    pub(crate) fn player_mut(&mut self, seat: Seat) -> &mut PlayerState {
        match seat {
            Seat::One => Arc::make_mut(&mut self.player1_state),
            Seat::Two => Arc::make_mut(&mut self.player2_state),
        }
    }

    pub fn seat_of(&self, player_id: &str) -> Option<Seat> {
        Seat::BOTH
            .into_iter()
            .find(|seat| self.player(*seat).player_id == player_id)
    }

    pub fn player_by_id(&self, player_id: &str) -> Option<&PlayerState> {
        self.seat_of(player_id).map(|seat| self.player(seat))
    }

    pub fn index(&self) -> &CardIndex {
        &self.index
    }

    pub fn locate(&self, instance_id: &str) -> Option<CardLocation> {
        self.index.locate(instance_id)
    }

    pub fn card_at(&self, location: CardLocation) -> Option<&CardInstance> {
        self.player(location.seat)
            .field
            .get(location.slot)
            .and_then(|card| card.as_deref())
    }

    pub fn card(&self, instance_id: &str) -> Option<&CardInstance> {
        self.locate(instance_id)
            .and_then(|location| self.card_at(location))
    }

    pub(crate) fn card_at_mut(&mut self, location: CardLocation) -> Option<&mut CardInstance> {
        self.player_mut(location.seat)
            .field
            .get_mut(location.slot)?
            .as_mut()
            .map(Arc::make_mut)
    }

    /// Puts `card` (or nothing) into a field slot and returns the previous
    /// occupant. Out-of-range slots are left alone and return `None`.
    pub(crate) fn place(
        &mut self,
        location: CardLocation,
        card: Option<CardInstance>,
    ) -> Option<Arc<CardInstance>> {
        if location.slot >= FIELD_SLOTS {
            return None;
        }
        let new_id = card.as_ref().map(|card| card.instance_id.clone());
        let previous = std::mem::replace(
            &mut self.player_mut(location.seat).field[location.slot],
            card.map(Arc::new),
        );

        let index = Arc::make_mut(&mut self.index);
        if let Some(previous) = &previous {
            if index.locate(&previous.instance_id) == Some(location) {
                index.slots.remove(&previous.instance_id);
            }
        }
        if let Some(new_id) = new_id {
            index.slots.insert(new_id, location);
        }
        previous
    }

    /// Nulls the slot holding `instance_id` if that card is marked dying.
    pub(crate) fn remove_dying(&mut self, instance_id: &str) -> bool {
        let Some(location) = self.locate(instance_id) else {
            return false;
        };
        let dying = self
            .card_at(location)
            .map(|card| card.is_dying)
            .unwrap_or(false);
        if dying {
            self.place(location, None);
        }
        dying
    }

    pub fn is_game_over(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.seat_of(&self.current_player_id).is_none() && !self.current_player_id.is_empty() {
            return Err(IntegrityError::UnknownCurrentPlayer {
                player_id: self.current_player_id.clone(),
            });
        }

        let mut seen = HashSet::new();
        let mut on_field = 0;
        for seat in Seat::BOTH {
            let player = self.player(seat);
            for (slot, card) in player.field_cards() {
                on_field += 1;
                if !seen.insert(card.instance_id.as_str()) {
                    return Err(IntegrityError::DuplicateInstance {
                        instance_id: card.instance_id.clone(),
                    });
                }
                if self.locate(&card.instance_id) != Some(CardLocation { seat, slot }) {
                    return Err(IntegrityError::IndexOutOfSync {
                        instance_id: card.instance_id.clone(),
                    });
                }
            }
            for card in &player.hand {
                if !seen.insert(card.instance_id.as_str()) {
                    return Err(IntegrityError::DuplicateInstance {
                        instance_id: card.instance_id.clone(),
                    });
                }
            }
        }

        if self.index.len() != on_field {
            let stale = self
                .index
                .slots
                .iter()
                .find(|(id, location)| {
                    self.card_at(**location).map(|card| card.instance_id.as_str())
                        != Some(id.as_str())
                })
                .map(|(id, _)| id.clone())
                .unwrap_or_default();
            return Err(IntegrityError::IndexOutOfSync { instance_id: stale });
        }

        Ok(())
    }

    /// Small two-player table used by tests and the JS debug tooling.
    pub fn sample() -> Self {
        let mut capy = PlayerState::new("p1", "Capy");
        capy.hand = vec![
            Arc::new(CardInstance::new("p1-h1", "CAP006", "Aop", 2, 1, 4)),
            Arc::new(CardInstance::new("p1-h2", "CAP006", "Aop", 2, 1, 4)),
        ];
        capy.hand_size = 2;
        capy.deck_size = 14;
        capy.field[0] = Some(Arc::new(CardInstance::new("p1-f0", "CAP020", "Makachu", 3, 1, 5)));
        capy.field[1] = Some(Arc::new(CardInstance::new("p1-f1", "CAP015", "PH", 1, 2, 3)));

        let mut bara = PlayerState::new("p2", "Bara");
        bara.hand_size = 3;
        bara.deck_size = 13;
        bara.field[0] = Some(Arc::new(CardInstance::new("p2-f0", "CAP018", "Gloire", 2, 1, 5)));
        bara.field[2] = Some(Arc::new(CardInstance::new("p2-f2", "CAP024", "Kizer", 4, 0, 2)));

        let mut snapshot = GameStateSnapshot::new(capy, bara)
            .with_turn(3, "p1")
            .with_viewer("p1");
        snapshot.game_id = Some("sample".into());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_passes_integrity_check() {
        let snapshot = GameStateSnapshot::sample();
        snapshot
            .integrity_check()
            .expect("sample snapshot should be consistent");
        assert_eq!(snapshot.index().len(), 4);
        assert_eq!(
            snapshot.locate("p2-f2"),
            Some(CardLocation {
                seat: Seat::Two,
                slot: 2
            })
        );
    }

    #[test]
    fn place_keeps_index_in_step() {
        let mut snapshot = GameStateSnapshot::sample();
        let slot = CardLocation {
            seat: Seat::One,
            slot: 0,
        };
        let previous = snapshot.place(slot, Some(CardInstance::new("fresh", "CAP027", "GGaego", 1, 1, 1)));

        assert_eq!(previous.map(|card| card.instance_id.clone()), Some("p1-f0".to_string()));
        assert_eq!(snapshot.locate("p1-f0"), None);
        assert_eq!(snapshot.locate("fresh"), Some(slot));
        snapshot
            .integrity_check()
            .expect("index should follow placements");
    }

    #[test]
    fn clones_share_untouched_rows() {
        let base = GameStateSnapshot::sample();
        let mut next = base.clone();
        next.player_mut(Seat::Two).deck_size = 0;

        assert!(Arc::ptr_eq(&base.player1_state, &next.player1_state));
        assert!(!Arc::ptr_eq(&base.player2_state, &next.player2_state));
        assert_eq!(base.player2_state.deck_size, 13, "original must not change");
    }

    #[test]
    fn deserializes_server_shape_and_pads_field() {
        let json = r#"{
            "gameId": "g-1",
            "turnNumber": 2,
            "currentPlayerId": "a",
            "viewingPlayerPerspectiveId": "a",
            "player1State": {
                "playerId": "a",
                "displayName": "Alice",
                "hand": [{"instanceId": "h1", "cardId": "C1", "currentAttack": 1, "currentDefense": 0, "currentLife": 2}],
                "handSize": 1,
                "deckSize": 10,
                "discardPileSize": 0,
                "field": [{"instanceId": "f1", "cardId": "C2", "currentAttack": 2, "currentDefense": 1, "currentLife": 3}, null]
            },
            "player2State": {
                "playerId": "b",
                "displayName": "Bob",
                "hand": null,
                "handSize": 4,
                "deckSize": 9,
                "discardPileSize": 1,
                "field": [null, null, null, null, null]
            }
        }"#;

        let snapshot: GameStateSnapshot =
            serde_json::from_str(json).expect("server snapshot should decode");
        assert_eq!(snapshot.player1_state.field.len(), FIELD_SLOTS);
        assert!(snapshot.player2_state.hand.is_empty());
        assert_eq!(snapshot.viewer.as_deref(), Some("a"));
        assert_eq!(
            snapshot.locate("f1"),
            Some(CardLocation {
                seat: Seat::One,
                slot: 0
            })
        );
    }
}
