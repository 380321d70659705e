//! Table state, the server event vocabulary and everything that folds or
//! animates it.

pub mod commands;
pub mod effects;
pub mod events;
pub mod reconstruct;
pub mod sequencer;
pub mod state;

pub use commands::{Command, CommandEnvelope, CommandGate, CommandRejection};
pub use effects::{
    Completion,
    EffectDescriptor,
    EffectKind,
    EffectPalette,
    EffectTimings,
    EffectTranslator,
};
pub use events::{EventBatch, GameEvent, StatKind};
pub use reconstruct::{apply, apply_traced, fold, Fold, SyncAnomaly};
pub use sequencer::{
    EffectSequencer,
    EffectStart,
    EffectTicket,
    FinishOutcome,
    SequencerSettings,
    Wait,
};
pub use state::{
    CardIndex,
    CardInstance,
    CardLocation,
    GameOutcome,
    GameStateSnapshot,
    IntegrityError,
    PlayerState,
    Seat,
    StatChanges,
    FIELD_SLOTS,
};
