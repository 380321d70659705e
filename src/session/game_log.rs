use std::collections::VecDeque;

use serde::Serialize;

use crate::game::{GameEvent, GameStateSnapshot};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub sequence: u64,
    pub turn_number: u32,
    pub message: String,
}

/// Bounded, newest-first feed of human-readable lines. Lines of one batch
/// keep their event order at the top of the feed.
#[derive(Debug, Clone)]
pub struct GameLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
    next_sequence: u64,
}

impl GameLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            next_sequence: 0,
        }
    }

    /// Prepends the lines for one batch, each paired with the turn number
    /// in effect once its event was applied.
    pub fn record_batch<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = (u32, String)>,
    {
        let lines: Vec<(u32, String)> = lines.into_iter().collect();
        let first = self.next_sequence;
        self.next_sequence += lines.len() as u64;
        for (offset, (turn_number, message)) in lines.into_iter().enumerate().rev() {
            self.entries.push_front(LogEntry {
                sequence: first + offset as u64,
                turn_number,
                message,
            });
        }
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn player_name<'a>(state: &'a GameStateSnapshot, player_id: &str) -> &'a str {
    state
        .player_by_id(player_id)
        .map(|player| player.display_name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("Unknown Player")
}

pub fn describe(event: &GameEvent, state: &GameStateSnapshot) -> Option<String> {
    let line = match event {
        GameEvent::TurnStarted {
            new_turn_player_id,
            new_turn_number,
        } => format!(
            "Turn {new_turn_number} begins. It's {}'s turn.",
            player_name(state, new_turn_player_id)
        ),
        GameEvent::CardPlayed {
            player_id, card, ..
        } => format!("{} played {}.", player_name(state, player_id), card.name),
        GameEvent::PlayerOverdrewCard {
            player_id,
            discarded_card,
            ..
        } => {
            let who = player_name(state, player_id);
            match discarded_card {
                Some(card) => format!("Hand was full! {who} discarded {}.", card.name),
                None => format!("Hand was full! {who} discarded a card."),
            }
        }
        GameEvent::AttackDeclared {
            attacker_card_name,
            defender_card_name,
            ..
        } => format!("{attacker_card_name} attacks {defender_card_name}."),
        GameEvent::CombatDamageDealt {
            damage_after_defense,
            ..
        } => {
            if *damage_after_defense > 0 {
                format!("A card took {damage_after_defense} damage.")
            } else {
                "An attack was blocked!".to_string()
            }
        }
        GameEvent::CardDestroyed { card, .. } => format!("{} was destroyed.", card.name),
        GameEvent::CardHealed { amount, .. } => format!("A card was healed for {amount}."),
        GameEvent::CardBuffed { stat, amount, .. } => {
            format!("A card's {} was buffed by {amount}.", stat.as_str())
        }
        GameEvent::CardDebuffed { stat, amount, .. } => {
            format!("A card's {} was debuffed by {amount}.", stat.as_str())
        }
        GameEvent::CardTransformed { new_card_dto, .. } => {
            let name = if new_card_dto.name.is_empty() {
                &new_card_dto.card_id
            } else {
                &new_card_dto.name
            };
            format!("A card transformed into {name}!")
        }
        GameEvent::GameLogMessage { message, .. } => format!("Effect: {message}"),
        GameEvent::CardVanished { .. } => "A card vanished from the field.".to_string(),
        GameEvent::CardReappeared { .. } => "A card reappeared on the field.".to_string(),
        GameEvent::GameOver {
            winner_player_id,
            reason,
        } => match winner_player_id {
            Some(winner) => format!("{} wins! {reason}", player_name(state, winner)),
            None => format!("Game over. {reason}"),
        },
        GameEvent::GameStarted { .. }
        | GameEvent::TurnEnded { .. }
        | GameEvent::PlayerDrewCard { .. }
        | GameEvent::CardAddedToDeck { .. }
        | GameEvent::CardStatsChanged { .. }
        | GameEvent::CardStatSet { .. }
        | GameEvent::CardFlagChanged { .. }
        | GameEvent::AbilityActivated { .. }
        | GameEvent::Unknown => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(number: u32, player: &str) -> GameEvent {
        GameEvent::TurnStarted {
            new_turn_player_id: player.into(),
            new_turn_number: number,
        }
    }

    fn lines(events: &[GameEvent], table: &GameStateSnapshot) -> Vec<(u32, String)> {
        events
            .iter()
            .filter_map(|event| describe(event, table))
            .map(|message| (table.turn_number, message))
            .collect()
    }

    #[test]
    fn newest_batch_first_with_batch_order_kept() {
        let table = GameStateSnapshot::sample();
        let mut log = GameLog::new(10);
        log.record_batch(lines(&[turn(1, "p1")], &table));
        log.record_batch(lines(
            &[
                turn(2, "p2"),
                GameEvent::TurnEnded {
                    ended_turn_player_id: "p2".into(),
                },
                GameEvent::GameLogMessage {
                    message: "Aura fades".into(),
                    level: String::new(),
                },
            ],
            &table,
        ));

        let messages: Vec<_> = log.entries().map(|entry| entry.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Turn 2 begins. It's Bara's turn.",
                "Effect: Aura fades",
                "Turn 1 begins. It's Capy's turn.",
            ]
        );
    }

    #[test]
    fn entries_keep_their_own_turn() {
        let mut log = GameLog::new(10);
        log.record_batch(vec![(4, "last of four".to_string()), (5, "Turn 5 begins.".to_string())]);
        let turns: Vec<_> = log.entries().map(|entry| entry.turn_number).collect();
        assert_eq!(turns, vec![4, 5]);
    }

    #[test]
    fn capacity_drops_oldest() {
        let table = GameStateSnapshot::sample();
        let mut log = GameLog::new(2);
        for number in 1..=5 {
            log.record_batch(lines(&[turn(number, "p1")], &table));
        }
        assert_eq!(log.len(), 2);
        let first = log.entries().next().expect("newest entry");
        assert_eq!(first.sequence, 4);
        assert!(first.message.starts_with("Turn 5"));
    }

    #[test]
    fn unknown_player_has_placeholder_name() {
        let table = GameStateSnapshot::sample();
        assert_eq!(
            describe(&turn(3, "zz"), &table).as_deref(),
            Some("Turn 3 begins. It's Unknown Player's turn.")
        );
    }
}
