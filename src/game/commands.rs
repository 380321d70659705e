use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{GameStateSnapshot, InstanceId, PlayerId, PlayerState, Seat, FIELD_SLOTS};

/// Player intent sent to the server. The server stays authoritative; the
/// gate below only filters out what is certainly invalid from here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "actionType",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    PlayCard {
        hand_card_index: usize,
        target_field_slot: usize,
    },
    Attack {
        attacker_field_index: usize,
        defender_field_index: usize,
    },
    ActivateAbility {
        source_card_instance_id: InstanceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_card_instance_id: Option<InstanceId>,
        #[serde(default)]
        ability_option_index: u32,
    },
    EndTurn,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::PlayCard { .. } => "PLAY_CARD",
            Command::Attack { .. } => "ATTACK",
            Command::ActivateAbility { .. } => "ACTIVATE_ABILITY",
            Command::EndTurn => "END_TURN",
        }
    }
}

/// Wire form of an outbound command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum CommandRejection {
    #[error("input is locked while effects play")]
    InputLocked,
    #[error("session has been torn down")]
    SessionClosed,
    #[error("the game is over")]
    GameOver,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("hand index {index} is out of range for a hand of {hand_size}")]
    InvalidHandIndex { index: usize, hand_size: usize },
    #[error("field slot {slot} does not exist")]
    InvalidFieldSlot { slot: usize },
    #[error("field slot {slot} is empty")]
    EmptyFieldSlot { slot: usize },
    #[error("field slot {slot} is already taken")]
    OccupiedFieldSlot { slot: usize },
    #[error("the card in field slot {slot} is exhausted")]
    AttackerExhausted { slot: usize },
    #[error("card instance `{instance_id}` is not on the field")]
    UnknownInstance { instance_id: InstanceId },
    #[error("command JSON could not be decoded: {reason}")]
    Malformed { reason: String },
}

pub struct CommandGate;

impl CommandGate {
    /// Validates `command` for `viewer`. The input lock is checked before
    /// anything else so no command slips through while effects play.
    pub fn check(
        command: &Command,
        snapshot: &GameStateSnapshot,
        viewer: &str,
        input_locked: bool,
    ) -> Result<(), CommandRejection> {
        if input_locked {
            return Err(CommandRejection::InputLocked);
        }
        if snapshot.is_game_over() {
            return Err(CommandRejection::GameOver);
        }
        let seat = Self::ensure_turn_owner(snapshot, viewer)?;
        let own = snapshot.player(seat);

        match command {
            Command::PlayCard {
                hand_card_index,
                target_field_slot,
            } => {
                Self::ensure_hand_index(own, *hand_card_index)?;
                Self::ensure_vacant(own, *target_field_slot)?;
            }
            Command::Attack {
                attacker_field_index,
                defender_field_index,
            } => {
                Self::ensure_ready_attacker(own, *attacker_field_index)?;
                Self::ensure_occupied(snapshot.player(seat.other()), *defender_field_index)?;
            }
            Command::ActivateAbility {
                source_card_instance_id,
                target_card_instance_id,
                ..
            } => {
                Self::ensure_on_field(snapshot, source_card_instance_id)?;
                if let Some(target) = target_card_instance_id {
                    Self::ensure_on_field(snapshot, target)?;
                }
            }
            Command::EndTurn => {}
        }
        Ok(())
    }

    fn ensure_turn_owner(snapshot: &GameStateSnapshot, viewer: &str) -> Result<Seat, CommandRejection> {
        if snapshot.current_player_id != viewer {
            return Err(CommandRejection::NotYourTurn);
        }
        snapshot
            .seat_of(viewer)
            .ok_or(CommandRejection::NotYourTurn)
    }

    fn ensure_hand_index(player: &PlayerState, index: usize) -> Result<(), CommandRejection> {
        if index >= player.hand.len() {
            return Err(CommandRejection::InvalidHandIndex {
                index,
                hand_size: player.hand.len(),
            });
        }
        Ok(())
    }

    fn ensure_slot(slot: usize) -> Result<(), CommandRejection> {
        if slot >= FIELD_SLOTS {
            return Err(CommandRejection::InvalidFieldSlot { slot });
        }
        Ok(())
    }

    fn ensure_occupied(player: &PlayerState, slot: usize) -> Result<(), CommandRejection> {
        Self::ensure_slot(slot)?;
        match &player.field[slot] {
            Some(card) if !card.is_dying => Ok(()),
            _ => Err(CommandRejection::EmptyFieldSlot { slot }),
        }
    }

    fn ensure_vacant(player: &PlayerState, slot: usize) -> Result<(), CommandRejection> {
        Self::ensure_slot(slot)?;
        if player.field[slot].is_some() {
            return Err(CommandRejection::OccupiedFieldSlot { slot });
        }
        Ok(())
    }

    fn ensure_ready_attacker(player: &PlayerState, slot: usize) -> Result<(), CommandRejection> {
        Self::ensure_occupied(player, slot)?;
        match &player.field[slot] {
            Some(card) if card.is_exhausted => Err(CommandRejection::AttackerExhausted { slot }),
            _ => Ok(()),
        }
    }

    fn ensure_on_field(snapshot: &GameStateSnapshot, instance_id: &str) -> Result<(), CommandRejection> {
        match snapshot.card(instance_id) {
            Some(card) if !card.is_dying => Ok(()),
            _ => Err(CommandRejection::UnknownInstance {
                instance_id: instance_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{CardLocation, GameOutcome};

    fn every_kind() -> Vec<Command> {
        vec![
            Command::PlayCard {
                hand_card_index: 0,
                target_field_slot: 2,
            },
            Command::Attack {
                attacker_field_index: 0,
                defender_field_index: 0,
            },
            Command::ActivateAbility {
                source_card_instance_id: "p1-f0".into(),
                target_card_instance_id: Some("p2-f0".into()),
                ability_option_index: 0,
            },
            Command::EndTurn,
        ]
    }

    #[test]
    fn valid_commands_pass() {
        let table = GameStateSnapshot::sample();
        for command in every_kind() {
            CommandGate::check(&command, &table, "p1", false)
                .unwrap_or_else(|error| panic!("{} should pass: {error}", command.kind()));
        }
    }

    #[test]
    fn input_lock_rejects_every_kind_first() {
        let mut table = GameStateSnapshot::sample();
        table.outcome = Some(GameOutcome {
            winner_player_id: None,
            reason: "draw".into(),
        });
        for command in every_kind() {
            assert_eq!(
                CommandGate::check(&command, &table, "p2", true),
                Err(CommandRejection::InputLocked),
                "{} must be locked",
                command.kind()
            );
        }
    }

    #[test]
    fn opponent_turn_is_rejected() {
        let table = GameStateSnapshot::sample();
        assert_eq!(
            CommandGate::check(&Command::EndTurn, &table, "p2", false),
            Err(CommandRejection::NotYourTurn)
        );
    }

    #[test]
    fn slot_and_hand_checks() {
        let table = GameStateSnapshot::sample();
        assert_eq!(
            CommandGate::check(
                &Command::PlayCard {
                    hand_card_index: 5,
                    target_field_slot: 2
                },
                &table,
                "p1",
                false
            ),
            Err(CommandRejection::InvalidHandIndex {
                index: 5,
                hand_size: 2
            })
        );
        assert_eq!(
            CommandGate::check(
                &Command::Attack {
                    attacker_field_index: 2,
                    defender_field_index: 0
                },
                &table,
                "p1",
                false
            ),
            Err(CommandRejection::EmptyFieldSlot { slot: 2 })
        );
        assert_eq!(
            CommandGate::check(
                &Command::Attack {
                    attacker_field_index: 0,
                    defender_field_index: 7
                },
                &table,
                "p1",
                false
            ),
            Err(CommandRejection::InvalidFieldSlot { slot: 7 })
        );
    }

    #[test]
    fn play_into_taken_slot_is_rejected() {
        let table = GameStateSnapshot::sample();
        assert_eq!(
            CommandGate::check(
                &Command::PlayCard {
                    hand_card_index: 0,
                    target_field_slot: 1
                },
                &table,
                "p1",
                false
            ),
            Err(CommandRejection::OccupiedFieldSlot { slot: 1 })
        );
    }

    #[test]
    fn exhausted_attacker_is_rejected() {
        let mut table = GameStateSnapshot::sample();
        if let Some(card) = table.card_at_mut(CardLocation {
            seat: Seat::One,
            slot: 0,
        }) {
            card.is_exhausted = true;
        }
        assert_eq!(
            CommandGate::check(
                &Command::Attack {
                    attacker_field_index: 0,
                    defender_field_index: 0
                },
                &table,
                "p1",
                false
            ),
            Err(CommandRejection::AttackerExhausted { slot: 0 })
        );
    }

    #[test]
    fn envelope_matches_server_shape() {
        let envelope = CommandEnvelope {
            game_id: Some("g".into()),
            player_id: "p1".into(),
            command: Command::Attack {
                attacker_field_index: 1,
                defender_field_index: 3,
            },
        };
        let json = serde_json::to_value(&envelope).expect("envelope should serialize");
        assert_eq!(json["actionType"], "ATTACK");
        assert_eq!(json["attackerFieldIndex"], 1);
        assert_eq!(json["playerId"], "p1");

        let back: CommandEnvelope = serde_json::from_value(json).expect("envelope should decode");
        assert_eq!(back, envelope);
    }
}
