use serde::{Deserialize, Serialize};

use super::events::{GameEvent, StatKind};
use super::state::{CardInstance, GameStateSnapshot, InstanceId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectKind {
    Unexhaust,
    CardPlayed,
    AttackLunge,
    Damage,
    ZeroDamage,
    Heal,
    StatChange,
    CardDestroyed,
    FloatingText,
    Transform,
    Vanish,
    Reappear,
    AuraPulse,
    GameOver,
}

/// How the sequencer learns that an effect is done.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Completion {
    /// Finishes after `durationMs`.
    #[default]
    Timer,
    /// Finishes when the renderer reports the animation landed.
    Signal,
}

/// One transient visual effect. Purely presentational: nothing in the
/// snapshot depends on it except the deferred cleanup of dying cards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectDescriptor {
    #[serde(rename = "type")]
    pub kind: EffectKind,
    /// Card instance the effect plays on. Player-level effects carry the
    /// player id here instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u32>,
    #[serde(default)]
    pub is_cleanup_required: bool,
    #[serde(default)]
    pub completion: Completion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardInstance>,
}

impl EffectDescriptor {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            target_id: None,
            source_id: None,
            amount: None,
            text: None,
            color: None,
            duration_ms: None,
            is_cleanup_required: false,
            completion: Completion::Timer,
            card: None,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<InstanceId>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_source(mut self, source_id: impl Into<InstanceId>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_amount(mut self, amount: i32) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u32) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_card(mut self, card: CardInstance) -> Self {
        self.card = Some(card);
        self
    }

    /// Marks the effect as the one that removes its dying target on completion.
    pub fn cleanup_required(mut self) -> Self {
        self.is_cleanup_required = true;
        self
    }

    pub fn awaiting_signal(mut self) -> Self {
        self.completion = Completion::Signal;
        self
    }
}

/// Durations in milliseconds per effect family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectTimings {
    pub unexhaust_ms: u32,
    pub card_played_ms: u32,
    pub attack_lunge_ms: u32,
    pub impact_ms: u32,
    pub destroy_ms: u32,
    pub floating_text_ms: u32,
    pub transform_ms: u32,
    pub vanish_ms: u32,
    pub aura_ms: u32,
    pub game_over_ms: u32,
}

impl Default for EffectTimings {
    fn default() -> Self {
        Self {
            unexhaust_ms: 400,
            card_played_ms: 800,
            attack_lunge_ms: 600,
            impact_ms: 1200,
            destroy_ms: 1500,
            floating_text_ms: 1200,
            transform_ms: 1000,
            vanish_ms: 800,
            aura_ms: 900,
            game_over_ms: 2500,
        }
    }
}

/// CSS colours handed to the renderer with each effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectPalette {
    pub damage: String,
    pub heal: String,
    pub buff: String,
    pub debuff: String,
    pub block: String,
    pub aura: String,
    pub text: String,
}

impl Default for EffectPalette {
    fn default() -> Self {
        Self {
            damage: "#ff4136".into(),
            heal: "#2ecc40".into(),
            buff: "#7fdbff".into(),
            debuff: "#b10dc9".into(),
            block: "#d3d3d3".into(),
            aura: "#ff00ff".into(),
            text: "#ffffff".into(),
        }
    }
}

/// Maps server events to visual effects. Reads the snapshot as it was
/// *before* the event so it can still see cards the event removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectTranslator {
    pub timings: EffectTimings,
    pub palette: EffectPalette,
}

impl EffectTranslator {
    pub fn new(timings: EffectTimings, palette: EffectPalette) -> Self {
        Self { timings, palette }
    }

    pub fn translate(
        &self,
        event: &GameEvent,
        before: &GameStateSnapshot,
        viewer: &str,
    ) -> Vec<EffectDescriptor> {
        let timings = &self.timings;
        match event {
            GameEvent::TurnStarted {
                new_turn_player_id,
                ..
            } => {
                if new_turn_player_id != viewer {
                    return Vec::new();
                }
                before
                    .player_by_id(viewer)
                    .map(|player| {
                        player
                            .field_cards()
                            .filter(|(_, card)| !card.is_dying)
                            .map(|(_, card)| {
                                EffectDescriptor::new(EffectKind::Unexhaust)
                                    .with_target(card.instance_id.clone())
                                    .with_duration(timings.unexhaust_ms)
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }
            GameEvent::CardPlayed { card, .. } => vec![EffectDescriptor::new(EffectKind::CardPlayed)
                .with_target(card.instance_id.clone())
                .with_card(card.normalized_for_field())
                .with_duration(timings.card_played_ms)],
            GameEvent::AttackDeclared {
                attacker_instance_id,
                defender_instance_id,
                ..
            } => vec![EffectDescriptor::new(EffectKind::AttackLunge)
                .with_source(attacker_instance_id.clone())
                .with_target(defender_instance_id.clone())
                .with_duration(timings.attack_lunge_ms)
                .awaiting_signal()],
            GameEvent::CombatDamageDealt {
                attacker_instance_id,
                defender_instance_id,
                damage_after_defense,
                ..
            } => {
                let effect = if *damage_after_defense > 0 {
                    self.life_loss(defender_instance_id, *damage_after_defense)
                } else {
                    EffectDescriptor::new(EffectKind::ZeroDamage)
                        .with_target(defender_instance_id.clone())
                        .with_amount(0)
                        .with_text("Blocked")
                        .with_color(self.palette.block.clone())
                        .with_duration(timings.impact_ms)
                };
                let effect = match attacker_instance_id {
                    Some(attacker) => effect.with_source(attacker.clone()),
                    None => effect,
                };
                vec![effect]
            }
            GameEvent::CardDestroyed { card, .. } => {
                let last_seen = before
                    .card(&card.instance_id)
                    .cloned()
                    .unwrap_or_else(|| card.clone());
                vec![EffectDescriptor::new(EffectKind::CardDestroyed)
                    .with_target(card.instance_id.clone())
                    .with_card(last_seen)
                    .with_duration(timings.destroy_ms)
                    .cleanup_required()]
            }
            GameEvent::CardBuffed {
                target_instance_id,
                stat,
                amount,
                ..
            } => vec![self.stat_change(target_instance_id, *stat, *amount)],
            GameEvent::CardDebuffed {
                target_instance_id,
                stat,
                amount,
                ..
            } => vec![self.stat_change(target_instance_id, *stat, amount.saturating_neg())],
            GameEvent::CardStatsChanged {
                target_instance_id,
                new_attack,
                new_defense,
                new_life,
                ..
            } => {
                let Some(card) = before.card(target_instance_id) else {
                    return Vec::new();
                };
                [
                    (StatKind::Attack, new_attack.saturating_sub(card.current_attack)),
                    (StatKind::Defense, new_defense.saturating_sub(card.current_defense)),
                    (StatKind::Life, new_life.saturating_sub(card.current_life)),
                ]
                .into_iter()
                .filter(|(_, delta)| *delta != 0)
                .map(|(stat, delta)| self.delta_effect(target_instance_id, stat, delta))
                .collect()
            }
            GameEvent::CardStatSet {
                target_instance_id,
                stat,
                value,
            } => before
                .card(target_instance_id)
                .and_then(|card| card.stat(*stat))
                .map(|previous| value.saturating_sub(previous))
                .filter(|delta| *delta != 0)
                .map(|delta| self.delta_effect(target_instance_id, *stat, delta))
                .into_iter()
                .collect(),
            GameEvent::CardHealed {
                target_instance_id,
                amount,
                ..
            } => vec![self.life_gain(target_instance_id, *amount)],
            GameEvent::CardFlagChanged {
                target_instance_id,
                flag_name,
                ..
            } => vec![self.floating_text(target_instance_id, flag_name)],
            GameEvent::CardTransformed {
                original_instance_id,
                new_card_dto,
            } => vec![EffectDescriptor::new(EffectKind::Transform)
                .with_source(original_instance_id.clone())
                .with_target(new_card_dto.instance_id.clone())
                .with_card(new_card_dto.normalized_for_field())
                .with_duration(timings.transform_ms)],
            GameEvent::CardVanished { instance_id, .. } => {
                let effect = EffectDescriptor::new(EffectKind::Vanish)
                    .with_target(instance_id.clone())
                    .with_duration(timings.vanish_ms);
                match before.card(instance_id) {
                    Some(card) => vec![effect.with_card(card.clone())],
                    None => vec![effect],
                }
            }
            GameEvent::CardReappeared { card, .. } => vec![EffectDescriptor::new(EffectKind::Reappear)
                .with_target(card.instance_id.clone())
                .with_card(card.normalized_for_field())
                .with_duration(timings.vanish_ms)],
            GameEvent::AbilityActivated {
                source_id,
                target_id,
                ..
            } => {
                let effect = EffectDescriptor::new(EffectKind::AuraPulse)
                    .with_source(source_id.clone())
                    .with_color(self.palette.aura.clone())
                    .with_duration(timings.aura_ms);
                match target_id {
                    Some(target) => vec![effect.with_target(target.clone())],
                    None => vec![effect],
                }
            }
            GameEvent::PlayerOverdrewCard { player_id, .. } => {
                vec![self.floating_text(player_id, "Overdraw")]
            }
            GameEvent::GameOver { reason, .. } => vec![EffectDescriptor::new(EffectKind::GameOver)
                .with_text(reason.clone())
                .with_duration(timings.game_over_ms)],
            GameEvent::GameStarted { .. }
            | GameEvent::TurnEnded { .. }
            | GameEvent::PlayerDrewCard { .. }
            | GameEvent::CardAddedToDeck { .. }
            | GameEvent::GameLogMessage { .. }
            | GameEvent::Unknown => Vec::new(),
        }
    }

    fn delta_effect(&self, target: &str, stat: StatKind, delta: i32) -> EffectDescriptor {
        match stat {
            StatKind::Life if delta < 0 => self.life_loss(target, delta.saturating_neg()),
            StatKind::Life => self.life_gain(target, delta),
            _ => self.stat_change(target, stat, delta),
        }
    }

    fn life_loss(&self, target: &str, amount: i32) -> EffectDescriptor {
        EffectDescriptor::new(EffectKind::Damage)
            .with_target(target)
            .with_amount(amount)
            .with_text(format!("-{amount}"))
            .with_color(self.palette.damage.clone())
            .with_duration(self.timings.impact_ms)
    }

    fn life_gain(&self, target: &str, amount: i32) -> EffectDescriptor {
        EffectDescriptor::new(EffectKind::Heal)
            .with_target(target)
            .with_amount(amount)
            .with_text(format!("+{amount}"))
            .with_color(self.palette.heal.clone())
            .with_duration(self.timings.impact_ms)
    }

    fn stat_change(&self, target: &str, stat: StatKind, signed_amount: i32) -> EffectDescriptor {
        let color = if signed_amount < 0 {
            &self.palette.debuff
        } else {
            &self.palette.buff
        };
        EffectDescriptor::new(EffectKind::StatChange)
            .with_target(target)
            .with_amount(signed_amount)
            .with_text(format!("{signed_amount:+} {}", stat.as_str()))
            .with_color(color.clone())
            .with_duration(self.timings.floating_text_ms)
    }

    fn floating_text(&self, target: &str, text: &str) -> EffectDescriptor {
        EffectDescriptor::new(EffectKind::FloatingText)
            .with_target(target)
            .with_text(text)
            .with_color(self.palette.text.clone())
            .with_duration(self.timings.floating_text_ms)
    }
}
