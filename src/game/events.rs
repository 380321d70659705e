use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::{CardInstance, GameStateSnapshot, InstanceId, PlayerId};
use crate::error::ClientError;

/// Stat named by buff, debuff and stat-set events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum StatKind {
    Attack,
    Defense,
    Life,
    MaxLife,
    /// A stat this client does not know how to display.
    Other,
}

impl From<String> for StatKind {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ATK" | "ATTACK" => StatKind::Attack,
            "DEF" | "DEFENSE" => StatKind::Defense,
            "LIFE" => StatKind::Life,
            "MAX_LIFE" => StatKind::MaxLife,
            _ => StatKind::Other,
        }
    }
}

impl From<StatKind> for String {
    fn from(stat: StatKind) -> Self {
        stat.as_str().to_string()
    }
}

impl StatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatKind::Attack => "ATK",
            StatKind::Defense => "DEF",
            StatKind::Life => "LIFE",
            StatKind::MaxLife => "MAX_LIFE",
            StatKind::Other => "OTHER",
        }
    }
}

/// Server event stream. Numeric fields are values *after* the event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "eventType",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum GameEvent {
    GameStarted {
        #[serde(default)]
        player1_id: PlayerId,
        #[serde(default)]
        player2_id: PlayerId,
        starting_player_id: PlayerId,
    },
    TurnStarted {
        new_turn_player_id: PlayerId,
        new_turn_number: u32,
    },
    TurnEnded {
        ended_turn_player_id: PlayerId,
    },
    PlayerDrewCard {
        player_id: PlayerId,
        new_hand_size: u32,
        new_deck_size: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        card: Option<CardInstance>,
    },
    PlayerOverdrewCard {
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        discarded_card: Option<CardInstance>,
        new_deck_size: u32,
        new_discard_pile_size: u32,
    },
    CardAddedToDeck {
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        card: Option<CardInstance>,
        new_deck_size: u32,
        #[serde(default)]
        placement: String,
    },
    CardPlayed {
        player_id: PlayerId,
        card: CardInstance,
        from_hand_index: usize,
        to_field_slot: usize,
        new_hand_size: u32,
    },
    AttackDeclared {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attacker_player_id: Option<PlayerId>,
        attacker_instance_id: InstanceId,
        #[serde(default)]
        attacker_card_name: String,
        defender_instance_id: InstanceId,
        #[serde(default)]
        defender_card_name: String,
    },
    CombatDamageDealt {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attacker_instance_id: Option<InstanceId>,
        defender_instance_id: InstanceId,
        #[serde(default)]
        damage_amount: i32,
        damage_after_defense: i32,
        #[serde(default)]
        defender_life_before: i32,
        defender_life_after: i32,
    },
    CardDestroyed {
        card: CardInstance,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_player_id: Option<PlayerId>,
    },
    CardBuffed {
        target_instance_id: InstanceId,
        stat: StatKind,
        amount: i32,
        #[serde(default)]
        is_permanent: bool,
        stat_after: i32,
    },
    CardDebuffed {
        target_instance_id: InstanceId,
        stat: StatKind,
        amount: i32,
        #[serde(default)]
        is_permanent: bool,
        stat_after: i32,
    },
    CardStatsChanged {
        target_instance_id: InstanceId,
        new_attack: i32,
        new_defense: i32,
        new_life: i32,
        #[serde(default)]
        reason: String,
    },
    CardStatSet {
        target_instance_id: InstanceId,
        stat: StatKind,
        value: i32,
    },
    CardHealed {
        target_instance_id: InstanceId,
        amount: i32,
        life_after: i32,
    },
    CardFlagChanged {
        target_instance_id: InstanceId,
        flag_name: String,
        #[serde(default)]
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<String>,
    },
    CardTransformed {
        original_instance_id: InstanceId,
        new_card_dto: CardInstance,
    },
    CardVanished {
        instance_id: InstanceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_player_id: Option<PlayerId>,
    },
    CardReappeared {
        card: CardInstance,
        owner_player_id: PlayerId,
        to_field_slot: usize,
    },
    AbilityActivated {
        source_id: InstanceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<InstanceId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ability_index: Option<u32>,
    },
    GameLogMessage {
        message: String,
        #[serde(default)]
        level: String,
    },
    GameOver {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_player_id: Option<PlayerId>,
        #[serde(default)]
        reason: String,
    },
    /// Any event tag this client does not recognise.
    #[serde(other)]
    Unknown,
}

impl GameEvent {
    /// Wire tag of the event, for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::GameStarted { .. } => "GAME_STARTED",
            GameEvent::TurnStarted { .. } => "TURN_STARTED",
            GameEvent::TurnEnded { .. } => "TURN_ENDED",
            GameEvent::PlayerDrewCard { .. } => "PLAYER_DREW_CARD",
            GameEvent::PlayerOverdrewCard { .. } => "PLAYER_OVERDREW_CARD",
            GameEvent::CardAddedToDeck { .. } => "CARD_ADDED_TO_DECK",
            GameEvent::CardPlayed { .. } => "CARD_PLAYED",
            GameEvent::AttackDeclared { .. } => "ATTACK_DECLARED",
            GameEvent::CombatDamageDealt { .. } => "COMBAT_DAMAGE_DEALT",
            GameEvent::CardDestroyed { .. } => "CARD_DESTROYED",
            GameEvent::CardBuffed { .. } => "CARD_BUFFED",
            GameEvent::CardDebuffed { .. } => "CARD_DEBUFFED",
            GameEvent::CardStatsChanged { .. } => "CARD_STATS_CHANGED",
            GameEvent::CardStatSet { .. } => "CARD_STAT_SET",
            GameEvent::CardHealed { .. } => "CARD_HEALED",
            GameEvent::CardFlagChanged { .. } => "CARD_FLAG_CHANGED",
            GameEvent::CardTransformed { .. } => "CARD_TRANSFORMED",
            GameEvent::CardVanished { .. } => "CARD_VANISHED",
            GameEvent::CardReappeared { .. } => "CARD_REAPPEARED",
            GameEvent::AbilityActivated { .. } => "ABILITY_ACTIVATED",
            GameEvent::GameLogMessage { .. } => "GAME_LOG_MESSAGE",
            GameEvent::GameOver { .. } => "GAME_OVER",
            GameEvent::Unknown => "UNKNOWN",
        }
    }

    /// Decodes one event. A payload that names a known tag but does not fit
    /// its shape becomes `Unknown` so batch and history positions are kept.
    pub fn from_value(value: Value) -> (GameEvent, bool) {
        match serde_json::from_value::<GameEvent>(value) {
            Ok(event) => (event, true),
            Err(error) => {
                warn!("Undecodable event treated as unknown: {error}");
                (GameEvent::Unknown, false)
            }
        }
    }
}

/// One delivery from the server: an ordered event list, optionally with a
/// full snapshot that is authoritative for the resulting state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub events: Vec<GameEvent>,
    pub snapshot: Option<GameStateSnapshot>,
    /// Entries that could not be decoded and were replaced by `Unknown`.
    pub undecodable: usize,
}

impl EventBatch {
    pub fn new(events: Vec<GameEvent>) -> Self {
        Self {
            events,
            snapshot: None,
            undecodable: 0,
        }
    }

    pub fn with_snapshot(mut self, snapshot: GameStateSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Accepts either a bare event array or `{ "events": [...], "snapshot": {...} }`.
    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        let (entries, snapshot) = match value {
            Value::Array(entries) => (entries, None),
            Value::Object(mut object) => {
                let entries = match object.remove("events") {
                    Some(Value::Array(entries)) => entries,
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(ClientError::MalformedBatch {
                            reason: "`events` is not an array".into(),
                        })
                    }
                };
                let snapshot = match object.remove("snapshot") {
                    Some(Value::Null) | None => None,
                    Some(raw) => Some(serde_json::from_value::<GameStateSnapshot>(raw).map_err(
                        |error| ClientError::MalformedBatch {
                            reason: format!("snapshot: {error}"),
                        },
                    )?),
                };
                (entries, snapshot)
            }
            other => {
                return Err(ClientError::MalformedBatch {
                    reason: format!("expected an array, got {}", json_type(&other)),
                })
            }
        };

        if entries.is_empty() && snapshot.is_none() {
            return Err(ClientError::MalformedBatch {
                reason: "empty batch".into(),
            });
        }

        let mut undecodable = 0;
        let events = entries
            .into_iter()
            .map(|entry| {
                let (event, decoded) = GameEvent::from_value(entry);
                if !decoded {
                    undecodable += 1;
                }
                event
            })
            .collect();

        Ok(Self {
            events,
            snapshot,
            undecodable,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        let value: Value = serde_json::from_str(json).map_err(|error| ClientError::MalformedBatch {
            reason: error.to_string(),
        })?;
        Self::from_value(value)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
