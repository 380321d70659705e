//! Pure fold of server events into the local snapshot.
//!
//! `apply` never panics and never reads a clock. An event that points at a
//! card or player this snapshot does not contain leaves the snapshot exactly
//! as it was; `apply_traced` reports why so callers can count desyncs.
//!
//! A card the server puts into a slot still held by a dying card takes the
//! slot. The dying card leaves early and the fold reports it as displaced;
//! its destroy effect still carries the card's last-seen data.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::events::{GameEvent, StatKind};
use super::state::{
    CardInstance, CardLocation, GameOutcome, GameStateSnapshot, InstanceId, PlayerId, Seat,
    StatChanges, FIELD_SLOTS,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum SyncAnomaly {
    #[error("{event} references unknown card instance `{instance_id}`")]
    UnknownInstance {
        event: String,
        instance_id: InstanceId,
    },
    #[error("{event} references unknown player `{player_id}`")]
    UnknownPlayer { event: String, player_id: PlayerId },
    #[error("{event} addresses field slot {slot}, outside the row")]
    SlotOutOfRange { event: String, slot: usize },
    #[error("{event} would put a second copy of instance `{instance_id}` on the table")]
    DuplicateInstance {
        event: String,
        instance_id: InstanceId,
    },
    #[error("{event} put a card over dying instance `{instance_id}` in slot {slot}")]
    DyingCardDisplaced {
        event: String,
        instance_id: InstanceId,
        slot: usize,
    },
}

/// Result of applying one event. `anomaly` is why it was skipped when
/// `applied` is false, or what went wrong alongside an applied event.
#[derive(Debug, Clone)]
pub struct Fold {
    pub state: GameStateSnapshot,
    pub anomaly: Option<SyncAnomaly>,
    pub applied: bool,
}

pub fn apply(state: &GameStateSnapshot, event: &GameEvent, viewer: &str) -> GameStateSnapshot {
    let fold = apply_traced(state, event, viewer);
    match &fold.anomaly {
        Some(anomaly) if fold.applied => warn!("{anomaly}"),
        Some(anomaly) => warn!("Skipped event: {anomaly}"),
        None => {}
    }
    fold.state
}

pub fn apply_traced(state: &GameStateSnapshot, event: &GameEvent, viewer: &str) -> Fold {
    let mut next = state.clone();
    match mutate(&mut next, event, viewer) {
        Ok(displaced) => Fold {
            state: next,
            anomaly: displaced,
            applied: true,
        },
        Err(anomaly) => Fold {
            state: state.clone(),
            anomaly: Some(anomaly),
            applied: false,
        },
    }
}

/// Applies `events` in order starting from `initial`.
pub fn fold<'a, I>(initial: &GameStateSnapshot, events: I, viewer: &str) -> GameStateSnapshot
where
    I: IntoIterator<Item = &'a GameEvent>,
{
    events
        .into_iter()
        .fold(initial.clone(), |state, event| apply(&state, event, viewer))
}

/// `Ok` carries a note for an applied event that displaced a dying card.
fn mutate(
    state: &mut GameStateSnapshot,
    event: &GameEvent,
    viewer: &str,
) -> Result<Option<SyncAnomaly>, SyncAnomaly> {
    let kind = event.kind();
    let mut displaced = None;
    match event {
        GameEvent::GameStarted {
            starting_player_id,
            ..
        } => {
            seat_of(state, starting_player_id, kind)?;
            state.turn_number = 1;
            state.current_player_id = starting_player_id.clone();
        }
        GameEvent::TurnStarted {
            new_turn_player_id,
            new_turn_number,
        } => {
            let seat = seat_of(state, new_turn_player_id, kind)?;
            state.turn_number = *new_turn_number;
            state.current_player_id = new_turn_player_id.clone();

            let player = state.player_mut(seat);
            player.attacks_declared_this_turn = 0;
            for card in player.field.iter_mut().flatten() {
                if card.is_exhausted || !card.stat_changes.is_empty() {
                    let card = Arc::make_mut(card);
                    card.is_exhausted = false;
                    card.stat_changes = StatChanges::default();
                }
            }
        }
        GameEvent::TurnEnded {
            ended_turn_player_id,
        } => {
            seat_of(state, ended_turn_player_id, kind)?;
        }
        GameEvent::PlayerDrewCard {
            player_id,
            new_hand_size,
            new_deck_size,
            card,
        } => {
            let seat = seat_of(state, player_id, kind)?;
            let revealed = card
                .as_ref()
                .filter(|_| player_id == viewer)
                .filter(|card| !already_held(state, seat, &card.instance_id));

            let player = state.player_mut(seat);
            player.hand_size = *new_hand_size;
            player.deck_size = *new_deck_size;
            if let Some(card) = revealed {
                player.hand.push(Arc::new(card.clone()));
            }
        }
        GameEvent::PlayerOverdrewCard {
            player_id,
            new_deck_size,
            new_discard_pile_size,
            ..
        } => {
            let seat = seat_of(state, player_id, kind)?;
            let player = state.player_mut(seat);
            player.deck_size = *new_deck_size;
            player.discard_pile_size = *new_discard_pile_size;
        }
        GameEvent::CardAddedToDeck {
            player_id,
            new_deck_size,
            ..
        } => {
            let seat = seat_of(state, player_id, kind)?;
            state.player_mut(seat).deck_size = *new_deck_size;
        }
        GameEvent::CardPlayed {
            player_id,
            card,
            from_hand_index,
            to_field_slot,
            new_hand_size,
        } => {
            let seat = seat_of(state, player_id, kind)?;
            let slot = field_slot(*to_field_slot, kind)?;
            ensure_absent(state, &card.instance_id, kind)?;

            let player = state.player_mut(seat);
            if player_id == viewer {
                if *from_hand_index < player.hand.len() {
                    player.hand.remove(*from_hand_index);
                } else {
                    warn!(
                        "CARD_PLAYED removes hand index {from_hand_index} but the hand holds {} cards",
                        player.hand.len()
                    );
                }
            }
            player.hand_size = *new_hand_size;
            displaced = place_arrival(state, CardLocation { seat, slot }, card, kind);
        }
        GameEvent::AttackDeclared {
            attacker_instance_id,
            ..
        } => {
            let location = locate(state, attacker_instance_id, kind)?;
            update_card(state, location, |card| card.is_exhausted = true);
            state.player_mut(location.seat).attacks_declared_this_turn += 1;
        }
        GameEvent::CombatDamageDealt {
            defender_instance_id,
            defender_life_after,
            ..
        } => {
            let location = locate(state, defender_instance_id, kind)?;
            update_card(state, location, |card| {
                card.current_life = *defender_life_after;
                card.stat_changes = StatChanges::only(StatKind::Life);
            });
        }
        GameEvent::CardDestroyed { card, .. } => {
            let location = locate(state, &card.instance_id, kind)?;
            let already_dying = state
                .card_at(location)
                .map(|card| card.is_dying)
                .unwrap_or(false);
            if already_dying {
                debug!("Repeated CARD_DESTROYED for {}", card.instance_id);
                return Ok(None);
            }
            update_card(state, location, |card| card.is_dying = true);
            state.player_mut(location.seat).discard_pile_size += 1;
        }
        GameEvent::CardBuffed {
            target_instance_id,
            stat,
            amount,
            stat_after,
            ..
        } => {
            let location = locate(state, target_instance_id, kind)?;
            update_card(state, location, |card| {
                write_buff(card, *stat, *amount, *stat_after)
            });
        }
        GameEvent::CardDebuffed {
            target_instance_id,
            stat,
            amount,
            stat_after,
            ..
        } => {
            let location = locate(state, target_instance_id, kind)?;
            update_card(state, location, |card| {
                write_buff(card, *stat, amount.saturating_neg(), *stat_after)
            });
        }
        GameEvent::CardStatsChanged {
            target_instance_id,
            new_attack,
            new_defense,
            new_life,
            ..
        } => {
            let location = locate(state, target_instance_id, kind)?;
            update_card(state, location, |card| {
                card.stat_changes = StatChanges {
                    attack: card.current_attack != *new_attack,
                    defense: card.current_defense != *new_defense,
                    life: card.current_life != *new_life,
                };
                card.current_attack = *new_attack;
                card.current_defense = *new_defense;
                card.current_life = *new_life;
            });
        }
        GameEvent::CardStatSet {
            target_instance_id,
            stat,
            value,
        } => {
            let location = locate(state, target_instance_id, kind)?;
            update_card(state, location, |card| {
                match stat {
                    StatKind::Attack => card.current_attack = *value,
                    StatKind::Defense => card.current_defense = *value,
                    StatKind::Life => card.current_life = *value,
                    StatKind::MaxLife => card.base_life = *value,
                    StatKind::Other => {}
                }
                card.stat_changes = StatChanges::only(*stat);
            });
        }
        GameEvent::CardHealed {
            target_instance_id,
            life_after,
            ..
        } => {
            let location = locate(state, target_instance_id, kind)?;
            update_card(state, location, |card| {
                card.current_life = *life_after;
                card.stat_changes = StatChanges::only(StatKind::Life);
            });
        }
        GameEvent::CardFlagChanged {
            target_instance_id,
            flag_name,
            value,
            ..
        } => {
            let location = locate(state, target_instance_id, kind)?;
            update_card(state, location, |card| {
                if value.is_null() {
                    card.effect_flags.remove(flag_name);
                } else {
                    card.effect_flags.insert(flag_name.clone(), value.clone());
                }
            });
        }
        GameEvent::CardTransformed {
            original_instance_id,
            new_card_dto,
        } => {
            let location = locate(state, original_instance_id, kind)?;
            if new_card_dto.instance_id != *original_instance_id {
                ensure_absent(state, &new_card_dto.instance_id, kind)?;
            }
            state.place(location, Some(new_card_dto.normalized_for_field()));
        }
        GameEvent::CardVanished { instance_id, .. } => {
            let location = locate(state, instance_id, kind)?;
            state.place(location, None);
        }
        GameEvent::CardReappeared {
            card,
            owner_player_id,
            to_field_slot,
        } => {
            let seat = seat_of(state, owner_player_id, kind)?;
            let slot = field_slot(*to_field_slot, kind)?;
            ensure_absent(state, &card.instance_id, kind)?;
            displaced = place_arrival(state, CardLocation { seat, slot }, card, kind);
        }
        GameEvent::GameOver {
            winner_player_id,
            reason,
        } => {
            state.outcome = Some(GameOutcome {
                winner_player_id: winner_player_id.clone(),
                reason: reason.clone(),
            });
        }
        GameEvent::AbilityActivated { .. } | GameEvent::GameLogMessage { .. } => {}
        GameEvent::Unknown => {
            debug!("Ignoring unrecognised event");
        }
    }
    Ok(displaced)
}

/// Puts a newly arrived card on the field. Returns the displaced dying
/// occupant, if there was one.
fn place_arrival(
    state: &mut GameStateSnapshot,
    location: CardLocation,
    card: &CardInstance,
    event: &str,
) -> Option<SyncAnomaly> {
    let previous = state.place(location, Some(card.normalized_for_field()))?;
    if !previous.is_dying {
        debug!("{event} replaced {} in slot {}", previous.instance_id, location.slot);
        return None;
    }
    Some(SyncAnomaly::DyingCardDisplaced {
        event: event.to_string(),
        instance_id: previous.instance_id.clone(),
        slot: location.slot,
    })
}

fn write_buff(card: &mut CardInstance, stat: StatKind, signed_amount: i32, stat_after: i32) {
    match stat {
        StatKind::Attack => card.current_attack = stat_after,
        StatKind::Defense => card.current_defense = stat_after,
        StatKind::Life => card.current_life = stat_after,
        StatKind::MaxLife => {
            card.current_life = stat_after;
            card.base_life = card.base_life.saturating_add(signed_amount);
        }
        StatKind::Other => {}
    }
    card.stat_changes = StatChanges::only(stat);
}

fn update_card<F>(state: &mut GameStateSnapshot, location: CardLocation, update: F)
where
    F: FnOnce(&mut CardInstance),
{
    if let Some(card) = state.card_at_mut(location) {
        update(card);
    }
}

fn seat_of(state: &GameStateSnapshot, player_id: &str, event: &str) -> Result<Seat, SyncAnomaly> {
    state
        .seat_of(player_id)
        .ok_or_else(|| SyncAnomaly::UnknownPlayer {
            event: event.to_string(),
            player_id: player_id.to_string(),
        })
}

fn locate(state: &GameStateSnapshot, instance_id: &str, event: &str) -> Result<CardLocation, SyncAnomaly> {
    state
        .locate(instance_id)
        .ok_or_else(|| SyncAnomaly::UnknownInstance {
            event: event.to_string(),
            instance_id: instance_id.to_string(),
        })
}

fn field_slot(slot: usize, event: &str) -> Result<usize, SyncAnomaly> {
    if slot < FIELD_SLOTS {
        Ok(slot)
    } else {
        Err(SyncAnomaly::SlotOutOfRange {
            event: event.to_string(),
            slot,
        })
    }
}

fn ensure_absent(state: &GameStateSnapshot, instance_id: &str, event: &str) -> Result<(), SyncAnomaly> {
    if state.locate(instance_id).is_some() {
        return Err(SyncAnomaly::DuplicateInstance {
            event: event.to_string(),
            instance_id: instance_id.to_string(),
        });
    }
    Ok(())
}

fn already_held(state: &GameStateSnapshot, seat: Seat, instance_id: &str) -> bool {
    state.locate(instance_id).is_some() || state.player(seat).find_hand_index(instance_id).is_some()
}
