//! Live path: takes server batches, keeps the authoritative local snapshot
//! and feeds the effect queue.
//!
//! A batch without a snapshot is folded locally. A batch that carries a
//! snapshot is a resync checkpoint: its events only drive the effect
//! translator and the game log, and the snapshot replaces local state.
//! Cards still waiting for their destroy animation survive the swap.

mod game_log;

pub use game_log::{describe, GameLog, LogEntry};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::game::{
    apply_traced, Command, CommandEnvelope, CommandGate, CommandRejection, EffectSequencer,
    EffectStart, EffectTicket, EffectTranslator, EventBatch, FinishOutcome, GameStateSnapshot,
    PlayerState, SyncAnomaly,
};
use crate::game::state::{InstanceId, PlayerId};

/// Running counters for desync and payload problems.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub batches_received: u64,
    pub events_applied: u64,
    pub dangling_references: u64,
    pub dying_cards_displaced: u64,
    pub malformed_batches: u64,
    pub malformed_events: u64,
    pub resyncs: u64,
    pub effects_enqueued: u64,
    pub effects_discarded: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub events: usize,
    pub effects_enqueued: usize,
    pub anomalies: Vec<SyncAnomaly>,
    pub resynced: bool,
}

pub struct ClientSession {
    viewer: PlayerId,
    config: ClientConfig,
    translator: EffectTranslator,
    snapshot: GameStateSnapshot,
    sequencer: EffectSequencer,
    log: GameLog,
    diagnostics: Diagnostics,
    closed: bool,
}

impl ClientSession {
    /// Session over an empty table. Feed it a snapshot before events.
    pub fn new(viewer: impl Into<PlayerId>, config: ClientConfig) -> Self {
        let viewer = viewer.into();
        let snapshot = GameStateSnapshot::new(PlayerState::default(), PlayerState::default())
            .with_viewer(viewer.clone());
        Self {
            translator: config.translator(),
            sequencer: EffectSequencer::new(config.sequencer),
            log: GameLog::new(config.log_capacity),
            viewer,
            config,
            snapshot,
            diagnostics: Diagnostics::default(),
            closed: false,
        }
    }

    pub fn with_snapshot(mut self, snapshot: GameStateSnapshot) -> Self {
        if let Err(error) = snapshot.integrity_check() {
            warn!("Initial snapshot is inconsistent: {error}");
        }
        self.snapshot = snapshot;
        self
    }

    pub fn receive_batch(&mut self, batch: EventBatch) -> Result<BatchReport, ClientError> {
        self.ensure_open()?;
        self.diagnostics.batches_received += 1;
        self.diagnostics.malformed_events += batch.undecodable as u64;

        let mut report = BatchReport {
            events: batch.events.len(),
            ..BatchReport::default()
        };
        let mut state = self.snapshot.clone();
        let mut effects = Vec::new();
        let mut lines = Vec::new();
        for event in &batch.events {
            effects.extend(self.translator.translate(event, &state, &self.viewer));
            let message = describe(event, &state);
            let fold = apply_traced(&state, event, &self.viewer);
            match fold.anomaly {
                Some(anomaly) if fold.applied => {
                    warn!("{anomaly}");
                    self.diagnostics.dying_cards_displaced += 1;
                    report.anomalies.push(anomaly);
                }
                Some(anomaly) => {
                    warn!("Skipped event: {anomaly}");
                    self.diagnostics.dangling_references += 1;
                    report.anomalies.push(anomaly);
                }
                None => {}
            }
            if fold.applied {
                self.diagnostics.events_applied += 1;
            }
            state = fold.state;
            if let Some(message) = message {
                lines.push((state.turn_number, message));
            }
        }

        self.log.record_batch(lines);
        report.effects_enqueued = effects.len();
        self.diagnostics.effects_enqueued += effects.len() as u64;
        self.sequencer.enqueue(effects);

        match batch.snapshot {
            Some(authoritative) => {
                self.adopt(authoritative, &state);
                report.resynced = true;
            }
            None => self.snapshot = state,
        }

        debug!(
            "Batch of {} events queued {} effects",
            report.events, report.effects_enqueued
        );
        Ok(report)
    }

    /// Decodes and applies one raw batch. Malformed payloads are counted,
    /// logged and otherwise ignored.
    pub fn receive_value(&mut self, value: Value) -> Result<BatchReport, ClientError> {
        self.ensure_open()?;
        let batch = EventBatch::from_value(value).map_err(|error| self.reject_batch(error))?;
        self.receive_batch(batch)
    }

    pub fn receive_json(&mut self, json: &str) -> Result<BatchReport, ClientError> {
        self.ensure_open()?;
        let batch = EventBatch::from_json(json).map_err(|error| self.reject_batch(error))?;
        self.receive_batch(batch)
    }

    /// Replaces local state with a full server snapshot.
    pub fn resync(&mut self, snapshot: GameStateSnapshot) -> Result<(), ClientError> {
        self.ensure_open()?;
        let local = self.snapshot.clone();
        self.adopt(snapshot, &local);
        Ok(())
    }

    pub fn pump(&mut self) -> Option<EffectStart> {
        if self.closed {
            return None;
        }
        self.sequencer.pump()
    }

    pub fn effect_finished(&mut self, ticket: EffectTicket) -> FinishOutcome {
        if self.closed {
            return FinishOutcome::Ignored;
        }
        let outcome = self.sequencer.finish(ticket, &mut self.snapshot);
        if let FinishOutcome::TargetMissing { instance_id } = &outcome {
            debug!("Nothing to clean up for {instance_id}");
        }
        outcome
    }

    /// Validates a command and wraps it for the server.
    pub fn submit(&self, command: Command) -> Result<CommandEnvelope, CommandRejection> {
        if self.closed {
            return Err(CommandRejection::SessionClosed);
        }
        CommandGate::check(
            &command,
            &self.snapshot,
            &self.viewer,
            self.sequencer.is_input_locked(),
        )?;
        Ok(CommandEnvelope {
            game_id: self.snapshot.game_id.clone(),
            player_id: self.viewer.clone(),
            command,
        })
    }

    pub fn submit_json(&self, json: &str) -> Result<CommandEnvelope, CommandRejection> {
        let command: Command =
            serde_json::from_str(json).map_err(|error| CommandRejection::Malformed {
                reason: error.to_string(),
            })?;
        self.submit(command)
    }

    /// Stops the session. Queued and playing effects are dropped without
    /// their deferred cleanups, and every later call is ignored.
    pub fn teardown(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;
        let discarded = self.sequencer.teardown();
        self.diagnostics.effects_discarded += discarded as u64;
        info!("Session for {} torn down, {discarded} effects discarded", self.viewer);
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> &GameStateSnapshot {
        &self.snapshot
    }

    pub fn current_effect(&self) -> Option<&EffectStart> {
        self.sequencer.current()
    }

    pub fn pending_effects(&self) -> usize {
        self.sequencer.pending()
    }

    pub fn is_input_locked(&self) -> bool {
        self.sequencer.is_input_locked()
    }

    pub fn game_log(&self) -> &GameLog {
        &self.log
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::SessionClosed);
        }
        Ok(())
    }

    fn reject_batch(&mut self, error: ClientError) -> ClientError {
        self.diagnostics.malformed_batches += 1;
        warn!("Ignoring batch: {error}");
        error
    }

    /// Installs `authoritative`, carrying over dying cards from `local`
    /// whose cleanup effect has not finished yet.
    fn adopt(&mut self, mut authoritative: GameStateSnapshot, local: &GameStateSnapshot) {
        let pending: Vec<InstanceId> = self.sequencer.pending_cleanups().cloned().collect();
        for instance_id in pending {
            let Some(location) = local.locate(&instance_id) else {
                continue;
            };
            let Some(card) = local.card_at(location).filter(|card| card.is_dying) else {
                continue;
            };
            if authoritative.locate(&instance_id).is_none() && authoritative.card_at(location).is_none() {
                authoritative.place(location, Some(card.clone()));
            }
        }

        if authoritative.viewer.is_none() {
            authoritative.viewer = Some(self.viewer.clone());
        }
        if let Err(error) = authoritative.integrity_check() {
            warn!("Resync snapshot is inconsistent: {error}");
        }
        self.snapshot = authoritative;
        self.diagnostics.resyncs += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{fold, EffectKind, GameEvent, Seat, Wait};

    fn session() -> ClientSession {
        ClientSession::new("p1", ClientConfig::default()).with_snapshot(GameStateSnapshot::sample())
    }

    fn lethal_attack() -> Vec<GameEvent> {
        let kizer = GameStateSnapshot::sample()
            .card("p2-f2")
            .cloned()
            .expect("sample has Kizer");
        vec![
            GameEvent::AttackDeclared {
                attacker_player_id: Some("p1".into()),
                attacker_instance_id: "p1-f0".into(),
                attacker_card_name: "Makachu".into(),
                defender_instance_id: "p2-f2".into(),
                defender_card_name: "Kizer".into(),
            },
            GameEvent::CombatDamageDealt {
                attacker_instance_id: Some("p1-f0".into()),
                defender_instance_id: "p2-f2".into(),
                damage_amount: 3,
                damage_after_defense: 3,
                defender_life_before: 2,
                defender_life_after: -1,
            },
            GameEvent::CardDestroyed {
                card: kizer,
                owner_player_id: Some("p2".into()),
            },
        ]
    }

    /// Plays every queued effect to completion, returning their kinds.
    fn drain(session: &mut ClientSession) -> Vec<EffectKind> {
        let mut played = Vec::new();
        while let Some(start) = session.pump() {
            played.push(start.effect.kind);
            session.effect_finished(start.ticket);
        }
        played
    }

    #[test]
    fn effects_play_in_event_order() {
        let mut session = session();
        let report = session
            .receive_batch(EventBatch::new(lethal_attack()))
            .expect("batch should apply");
        assert_eq!(report.effects_enqueued, 3);
        assert!(report.anomalies.is_empty());
        assert!(session.is_input_locked());

        assert_eq!(
            drain(&mut session),
            vec![
                EffectKind::AttackLunge,
                EffectKind::Damage,
                EffectKind::CardDestroyed
            ]
        );
        assert!(!session.is_input_locked());
    }

    #[test]
    fn dying_card_is_removed_when_its_effect_finishes() {
        let mut session = session();
        session
            .receive_batch(EventBatch::new(lethal_attack()))
            .expect("batch should apply");

        let kizer = session.snapshot().card("p2-f2").expect("still on the field");
        assert!(kizer.is_dying);
        assert_eq!(session.snapshot().player(Seat::Two).discard_pile_size, 1);

        let lunge = session.pump().expect("lunge");
        assert!(matches!(lunge.wait, Wait::Signal { .. }));
        session.effect_finished(lunge.ticket);
        let damage = session.pump().expect("damage");
        session.effect_finished(damage.ticket);
        assert!(session.snapshot().card("p2-f2").is_some());

        let destroy = session.pump().expect("destroy");
        assert_eq!(
            session.effect_finished(destroy.ticket),
            FinishOutcome::CleanedUp {
                instance_id: "p2-f2".into()
            }
        );
        assert!(session.snapshot().player(Seat::Two).field[2].is_none());
        assert_eq!(session.effect_finished(destroy.ticket), FinishOutcome::Ignored);
    }

    #[test]
    fn state_does_not_depend_on_effect_progress() {
        let events = lethal_attack();
        let expected = fold(&GameStateSnapshot::sample(), &events, "p1");

        let mut session = session();
        session
            .receive_batch(EventBatch::new(events))
            .expect("batch should apply");
        assert_eq!(session.snapshot(), &expected);
    }

    #[test]
    fn opponent_draw_stays_hidden() {
        let mut session = session();
        session
            .receive_json(
                r#"[{"eventType": "PLAYER_DREW_CARD", "playerId": "p2", "newHandSize": 4, "newDeckSize": 12,
                     "card": {"instanceId": "secret", "cardId": "CAP001", "name": "Frog"}}]"#,
            )
            .expect("batch should apply");
        let opponent = session.snapshot().player(Seat::Two);
        assert_eq!(opponent.hand_size, 4);
        assert!(opponent.hand.is_empty());
    }

    #[test]
    fn snapshot_batch_is_authoritative_but_keeps_pending_dying_card() {
        let mut session = session();
        let mut server = GameStateSnapshot::sample();
        server.place(
            crate::game::CardLocation {
                seat: Seat::Two,
                slot: 2,
            },
            None,
        );
        server.player_mut(Seat::Two).discard_pile_size = 1;
        server.turn_number = 9;

        let report = session
            .receive_batch(EventBatch::new(lethal_attack()).with_snapshot(server))
            .expect("batch should apply");
        assert!(report.resynced);
        assert_eq!(session.snapshot().turn_number, 9);
        let kept = session
            .snapshot()
            .card("p2-f2")
            .expect("dying card must survive until its effect ends");
        assert!(kept.is_dying);

        assert_eq!(drain(&mut session).len(), 3);
        assert!(session.snapshot().card("p2-f2").is_none());
        assert_eq!(session.diagnostics().resyncs, 1);
    }

    #[test]
    fn dangling_and_malformed_input_is_counted() {
        let mut session = session();
        let before = session.snapshot().clone();

        assert!(session.receive_json("{\"nope\": true}").is_err());
        assert!(session.receive_json("[]").is_err());
        let report = session
            .receive_json(r#"[{"eventType": "CARD_HEALED", "targetInstanceId": "ghost", "amount": 1, "lifeAfter": 3}]"#)
            .expect("batch decodes even if it points nowhere");

        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(session.snapshot(), &before);
        let diagnostics = session.diagnostics();
        assert_eq!(diagnostics.malformed_batches, 2);
        assert_eq!(diagnostics.dangling_references, 1);
        assert_eq!(diagnostics.batches_received, 1);
    }

    #[test]
    fn refilled_slot_reports_the_displaced_dying_card() {
        let mut session = session();
        let mut events = lethal_attack();
        events.push(GameEvent::CardPlayed {
            player_id: "p2".into(),
            card: crate::game::CardInstance::new("p2-new", "CAP001", "Frog", 1, 1, 1),
            from_hand_index: 0,
            to_field_slot: 2,
            new_hand_size: 2,
        });

        let report = session
            .receive_batch(EventBatch::new(events))
            .expect("batch should apply");
        assert_eq!(
            report.anomalies,
            vec![SyncAnomaly::DyingCardDisplaced {
                event: "CARD_PLAYED".into(),
                instance_id: "p2-f2".into(),
                slot: 2,
            }]
        );
        let diagnostics = session.diagnostics();
        assert_eq!(diagnostics.dying_cards_displaced, 1);
        assert_eq!(diagnostics.dangling_references, 0);
        assert_eq!(diagnostics.events_applied, 4);

        let kinds = drain(&mut session);
        assert_eq!(kinds.last(), Some(&EffectKind::CardPlayed));
        assert_eq!(
            session
                .snapshot()
                .player(Seat::Two)
                .field[2]
                .as_deref()
                .map(|card| card.instance_id.as_str()),
            Some("p2-new"),
            "the destroy cleanup must not remove the newcomer"
        );
    }

    #[test]
    fn skipped_events_are_not_counted_as_applied() {
        let mut session = session();
        session
            .receive_json(
                r#"[{"eventType": "CARD_HEALED", "targetInstanceId": "ghost", "amount": 1, "lifeAfter": 3},
                    {"eventType": "TURN_ENDED", "endedTurnPlayerId": "p1"}]"#,
            )
            .expect("batch should apply");
        let diagnostics = session.diagnostics();
        assert_eq!(diagnostics.events_applied, 1);
        assert_eq!(diagnostics.dangling_references, 1);
    }

    #[test]
    fn game_log_stamps_each_line_with_its_own_turn() {
        let mut session = session();
        session
            .receive_batch(EventBatch::new(vec![
                GameEvent::GameLogMessage {
                    message: "Aura fades".into(),
                    level: String::new(),
                },
                GameEvent::TurnStarted {
                    new_turn_player_id: "p2".into(),
                    new_turn_number: 4,
                },
            ]))
            .expect("batch should apply");
        let stamped: Vec<_> = session
            .game_log()
            .entries()
            .map(|entry| (entry.turn_number, entry.message.as_str()))
            .collect();
        assert_eq!(
            stamped,
            vec![
                (3, "Effect: Aura fades"),
                (4, "Turn 4 begins. It's Bara's turn."),
            ]
        );
    }

    #[test]
    fn commands_are_gated_by_the_effect_queue() {
        let mut session = session();
        let envelope = session.submit(Command::EndTurn).expect("idle session accepts");
        assert_eq!(envelope.player_id, "p1");
        assert_eq!(envelope.game_id.as_deref(), Some("sample"));

        session
            .receive_batch(EventBatch::new(lethal_attack()))
            .expect("batch should apply");
        assert_eq!(
            session.submit_json(r#"{"actionType": "END_TURN"}"#),
            Err(CommandRejection::InputLocked)
        );
        drain(&mut session);
        assert!(session.submit(Command::EndTurn).is_ok());
    }

    #[test]
    fn teardown_drops_effects_and_ignores_late_completions() {
        let mut session = session();
        session
            .receive_batch(EventBatch::new(lethal_attack()))
            .expect("batch should apply");
        let lunge = session.pump().expect("lunge");
        let frozen = session.snapshot().clone();

        assert_eq!(session.teardown(), 3);
        assert_eq!(session.effect_finished(lunge.ticket), FinishOutcome::Ignored);
        assert!(session.pump().is_none());
        assert_eq!(session.snapshot(), &frozen);
        assert!(!session.is_input_locked());
        assert_eq!(
            session.receive_batch(EventBatch::new(lethal_attack())),
            Err(ClientError::SessionClosed)
        );
        assert_eq!(
            session.submit(Command::EndTurn),
            Err(CommandRejection::SessionClosed)
        );
    }

    #[test]
    fn game_log_reads_newest_first() {
        let mut session = session();
        session
            .receive_batch(EventBatch::new(lethal_attack()))
            .expect("batch should apply");
        let lines: Vec<_> = session
            .game_log()
            .entries()
            .map(|entry| entry.message.clone())
            .collect();
        assert_eq!(
            lines,
            vec![
                "Makachu attacks Kizer.".to_string(),
                "A card took 3 damage.".to_string(),
                "Kizer was destroyed.".to_string(),
            ]
        );
    }
}
