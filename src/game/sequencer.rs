use std::collections::VecDeque;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::effects::{Completion, EffectDescriptor};
use super::state::{GameStateSnapshot, InstanceId};

/// Handle for the effect currently playing. Completing with any other
/// ticket is a no-op, so a late timer can never finish the wrong effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EffectTicket(pub u32);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Wait {
    Timer {
        ms: u32,
    },
    Signal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback_ms: Option<u32>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectStart {
    pub ticket: EffectTicket,
    pub effect: EffectDescriptor,
    pub wait: Wait,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum FinishOutcome {
    Completed,
    /// The dying card was removed from its slot.
    CleanedUp { instance_id: InstanceId },
    /// Cleanup was due but the slot no longer held that dying card.
    TargetMissing { instance_id: InstanceId },
    /// Stale or repeated ticket.
    Ignored,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SequencerSettings {
    /// Used for timer effects that carry no duration of their own.
    pub default_duration_ms: u32,
    /// Upper bound on waiting for a renderer signal. `None` waits forever.
    pub signal_fallback_ms: Option<u32>,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            default_duration_ms: 2500,
            signal_fallback_ms: Some(2500),
        }
    }
}

/// Single-consumer FIFO of visual effects. Plays one at a time and owns
/// the deferred removal of dying cards.
#[derive(Debug, Clone, Default)]
pub struct EffectSequencer {
    settings: SequencerSettings,
    queue: VecDeque<EffectDescriptor>,
    current: Option<EffectStart>,
    next_ticket: u32,
}

impl EffectSequencer {
    pub fn new(settings: SequencerSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &SequencerSettings {
        &self.settings
    }

    pub fn enqueue<I>(&mut self, effects: I)
    where
        I: IntoIterator<Item = EffectDescriptor>,
    {
        self.queue.extend(effects);
    }

    /// Starts the next effect if nothing is playing.
    pub fn pump(&mut self) -> Option<EffectStart> {
        if self.current.is_some() {
            return None;
        }
        let effect = self.queue.pop_front()?;

        self.next_ticket = self.next_ticket.wrapping_add(1);
        let ticket = EffectTicket(self.next_ticket);
        let wait = match effect.completion {
            Completion::Timer => Wait::Timer {
                ms: effect
                    .duration_ms
                    .unwrap_or(self.settings.default_duration_ms),
            },
            Completion::Signal => Wait::Signal {
                fallback_ms: self.settings.signal_fallback_ms,
            },
        };

        debug!("Effect {:?} started with ticket {}", effect.kind, ticket.0);
        let start = EffectStart {
            ticket,
            effect,
            wait,
        };
        self.current = Some(start.clone());
        Some(start)
    }

    /// Completes the current effect and performs its deferred cleanup.
    pub fn finish(&mut self, ticket: EffectTicket, snapshot: &mut GameStateSnapshot) -> FinishOutcome {
        if self.current.as_ref().map(|current| current.ticket) != Some(ticket) {
            debug!("Ignoring completion for stale ticket {}", ticket.0);
            return FinishOutcome::Ignored;
        }
        let Some(done) = self.current.take() else {
            return FinishOutcome::Ignored;
        };

        if !done.effect.is_cleanup_required {
            return FinishOutcome::Completed;
        }
        let Some(instance_id) = done.effect.target_id else {
            warn!("Cleanup effect {:?} has no target", done.effect.kind);
            return FinishOutcome::Completed;
        };

        if snapshot.remove_dying(&instance_id) {
            FinishOutcome::CleanedUp { instance_id }
        } else {
            debug!("Cleanup target {instance_id} already gone");
            FinishOutcome::TargetMissing { instance_id }
        }
    }

    pub fn current(&self) -> Option<&EffectStart> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_input_locked(&self) -> bool {
        self.current.is_some() || !self.queue.is_empty()
    }

    /// Targets of cleanup effects that have not completed yet.
    pub fn pending_cleanups(&self) -> impl Iterator<Item = &InstanceId> {
        self.current
            .iter()
            .map(|start| &start.effect)
            .chain(self.queue.iter())
            .filter(|effect| effect.is_cleanup_required)
            .filter_map(|effect| effect.target_id.as_ref())
    }

    /// Drops everything without running cleanups. Returns how many effects
    /// were discarded, including the one playing.
    pub fn teardown(&mut self) -> usize {
        let discarded = self.queue.len() + usize::from(self.current.is_some());
        self.queue.clear();
        self.current = None;
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::effects::EffectKind;
    use crate::game::events::GameEvent;
    use crate::game::reconstruct::apply;

    fn floating(target: &str) -> EffectDescriptor {
        EffectDescriptor::new(EffectKind::FloatingText)
            .with_target(target)
            .with_duration(100)
    }

    fn dying_table() -> GameStateSnapshot {
        let before = GameStateSnapshot::sample();
        let victim = before.card("p2-f2").cloned().expect("victim exists");
        apply(
            &before,
            &GameEvent::CardDestroyed {
                card: victim,
                owner_player_id: Some("p2".into()),
            },
            "p1",
        )
    }

    fn destroy_effect() -> EffectDescriptor {
        EffectDescriptor::new(EffectKind::CardDestroyed)
            .with_target("p2-f2")
            .cleanup_required()
    }

    #[test]
    fn plays_in_fifo_order_one_at_a_time() {
        let mut sequencer = EffectSequencer::default();
        let mut table = GameStateSnapshot::sample();
        sequencer.enqueue([floating("a"), floating("b"), floating("c")]);

        let mut order = Vec::new();
        while let Some(start) = sequencer.pump() {
            assert!(sequencer.pump().is_none(), "only one effect may play");
            order.push(start.effect.target_id.clone().expect("target"));
            assert_eq!(
                sequencer.finish(start.ticket, &mut table),
                FinishOutcome::Completed
            );
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(!sequencer.is_input_locked());
    }

    #[test]
    fn cleanup_runs_exactly_once() {
        let mut table = dying_table();
        let mut sequencer = EffectSequencer::default();
        sequencer.enqueue([destroy_effect()]);

        let start = sequencer.pump().expect("cleanup effect should start");
        assert!(
            table.card("p2-f2").is_some(),
            "dying card stays addressable while its effect plays"
        );
        assert_eq!(
            sequencer.finish(start.ticket, &mut table),
            FinishOutcome::CleanedUp {
                instance_id: "p2-f2".into()
            }
        );
        assert!(table.player(crate::game::state::Seat::Two).field[2].is_none());

        let after_first = table.clone();
        assert_eq!(
            sequencer.finish(start.ticket, &mut table),
            FinishOutcome::Ignored
        );
        assert_eq!(table, after_first);
    }

    #[test]
    fn cleanup_of_missing_target_changes_nothing() {
        let mut table = GameStateSnapshot::sample();
        let mut sequencer = EffectSequencer::default();
        sequencer.enqueue([EffectDescriptor::new(EffectKind::CardDestroyed)
            .with_target("ghost")
            .cleanup_required()]);
        let start = sequencer.pump().expect("effect");
        let before = table.clone();
        assert_eq!(
            sequencer.finish(start.ticket, &mut table),
            FinishOutcome::TargetMissing {
                instance_id: "ghost".into()
            }
        );
        assert_eq!(table, before);
    }

    #[test]
    fn cleanup_leaves_live_card_alone() {
        // Same id, but the card is not dying: nothing to remove.
        let mut table = GameStateSnapshot::sample();
        let mut sequencer = EffectSequencer::default();
        sequencer.enqueue([destroy_effect()]);
        let start = sequencer.pump().expect("effect");
        assert!(matches!(
            sequencer.finish(start.ticket, &mut table),
            FinishOutcome::TargetMissing { .. }
        ));
        assert!(table.card("p2-f2").is_some());
    }

    #[test]
    fn stale_ticket_is_ignored() {
        let mut table = GameStateSnapshot::sample();
        let mut sequencer = EffectSequencer::default();
        sequencer.enqueue([floating("a"), floating("b")]);

        let first = sequencer.pump().expect("first");
        sequencer.finish(first.ticket, &mut table);
        let second = sequencer.pump().expect("second");

        assert_eq!(
            sequencer.finish(first.ticket, &mut table),
            FinishOutcome::Ignored
        );
        assert_eq!(
            sequencer.current().map(|start| start.ticket),
            Some(second.ticket),
            "a late completion must not end the next effect"
        );
    }

    #[test]
    fn waits_follow_completion_mode() {
        let mut sequencer = EffectSequencer::new(SequencerSettings {
            default_duration_ms: 900,
            signal_fallback_ms: None,
        });
        let mut table = GameStateSnapshot::sample();
        sequencer.enqueue([
            EffectDescriptor::new(EffectKind::GameOver),
            EffectDescriptor::new(EffectKind::AttackLunge).awaiting_signal(),
        ]);

        let timer = sequencer.pump().expect("timer effect");
        assert_eq!(timer.wait, Wait::Timer { ms: 900 });
        sequencer.finish(timer.ticket, &mut table);

        let signal = sequencer.pump().expect("signal effect");
        assert_eq!(signal.wait, Wait::Signal { fallback_ms: None });
    }

    #[test]
    fn input_lock_tracks_queue_and_current() {
        let mut table = GameStateSnapshot::sample();
        let mut sequencer = EffectSequencer::default();
        assert!(!sequencer.is_input_locked());

        sequencer.enqueue([floating("a")]);
        assert!(sequencer.is_input_locked(), "queued effect locks input");
        let start = sequencer.pump().expect("effect");
        assert!(sequencer.is_input_locked(), "playing effect locks input");
        sequencer.finish(start.ticket, &mut table);
        assert!(!sequencer.is_input_locked());
    }

    #[test]
    fn teardown_discards_without_cleanup() {
        let mut table = dying_table();
        let mut sequencer = EffectSequencer::default();
        sequencer.enqueue([destroy_effect(), floating("a")]);
        let start = sequencer.pump().expect("effect");
        assert_eq!(sequencer.pending_cleanups().count(), 1);

        assert_eq!(sequencer.teardown(), 2);
        assert!(!sequencer.is_input_locked());
        assert_eq!(
            sequencer.finish(start.ticket, &mut table),
            FinishOutcome::Ignored
        );
        assert!(
            table.card("p2-f2").is_some(),
            "teardown must not perform deferred removals"
        );
    }
}
