use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::game::{EffectPalette, EffectTimings, EffectTranslator, SequencerSettings};

/// Overall animation speed. Scales every effect duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnimationPace {
    Fast,
    Normal,
    Slow,
}

impl AnimationPace {
    fn percent(self) -> u32 {
        match self {
            AnimationPace::Fast => 50,
            AnimationPace::Normal => 100,
            AnimationPace::Slow => 150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub sequencer: SequencerSettings,
    pub timings: EffectTimings,
    pub palette: EffectPalette,
    /// Maximum number of game log lines kept.
    pub log_capacity: usize,
    pub log_level: LevelFilter,
}

impl ClientConfig {
    pub fn from_pace(pace: AnimationPace) -> Self {
        let base = EffectTimings::default();
        let scale = |ms: u32| ms.saturating_mul(pace.percent()) / 100;
        let timings = EffectTimings {
            unexhaust_ms: scale(base.unexhaust_ms),
            card_played_ms: scale(base.card_played_ms),
            attack_lunge_ms: scale(base.attack_lunge_ms),
            impact_ms: scale(base.impact_ms),
            destroy_ms: scale(base.destroy_ms),
            floating_text_ms: scale(base.floating_text_ms),
            transform_ms: scale(base.transform_ms),
            vanish_ms: scale(base.vanish_ms),
            aura_ms: scale(base.aura_ms),
            game_over_ms: scale(base.game_over_ms),
        };
        let defaults = SequencerSettings::default();
        Self {
            sequencer: SequencerSettings {
                default_duration_ms: scale(defaults.default_duration_ms),
                signal_fallback_ms: defaults.signal_fallback_ms.map(scale),
            },
            timings,
            palette: EffectPalette::default(),
            log_capacity: 100,
            log_level: LevelFilter::Info,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json).map_err(|error| ClientError::decode("client config", error))
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_default_duration(mut self, ms: u32) -> Self {
        self.sequencer.default_duration_ms = ms;
        self
    }

    /// `None` makes signal effects wait for the renderer indefinitely.
    pub fn with_signal_fallback(mut self, ms: Option<u32>) -> Self {
        self.sequencer.signal_fallback_ms = ms;
        self
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    pub fn translator(&self) -> EffectTranslator {
        EffectTranslator::new(self.timings, self.palette.clone())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::from_pace(AnimationPace::Normal)
    }
}
