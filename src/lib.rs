pub mod config;
pub mod error;
pub mod game;
pub mod logging;
pub mod replay;
pub mod session;

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;
use web_sys::js_sys::Function;

pub use config::{AnimationPace, ClientConfig};
pub use error::ClientError;
pub use game::{
    apply, apply_traced, fold, CardInstance, CardLocation, Command, CommandEnvelope, CommandGate,
    CommandRejection, Completion, EffectDescriptor, EffectKind, EffectPalette, EffectSequencer,
    EffectStart, EffectTicket, EffectTimings, EffectTranslator, EventBatch, FinishOutcome,
    GameEvent, GameOutcome, GameStateSnapshot, IntegrityError, PlayerState, Seat,
    SequencerSettings, StatKind, SyncAnomaly, Wait,
};
pub use replay::{ReplayEngine, ReplayHistory};
pub use session::{BatchReport, ClientSession, Diagnostics, GameLog, LogEntry};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    logging::init(LevelFilter::Info);
}

/// Objects as plain JS objects, not `Map`s, so the renderer can read them directly.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn to_js_error<E: Serialize + Display>(error: E) -> JsValue {
    to_js(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn from_js_or_default<T: DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_null() || value.is_undefined() {
        return Ok(T::default());
    }
    from_value(value).map_err(JsValue::from)
}

/// Session plus the browser timer for the effect that is playing.
struct Driver {
    session: ClientSession,
    timer: Option<Timeout>,
    // A timeout that already fired. Kept until the next one is armed so it
    // is never dropped from inside its own callback.
    spent: Option<Timeout>,
    listener: Option<Function>,
}

type SharedDriver = Rc<RefCell<Driver>>;

/// Starts the next effect if the queue is idle, arms its timer and tells
/// the listener. The listener runs with no borrow held so it may call back in.
fn advance(driver: &SharedDriver) {
    let (start, listener) = {
        let mut inner = driver.borrow_mut();
        let Some(start) = inner.session.pump() else {
            return;
        };
        let delay = match start.wait {
            Wait::Timer { ms } => Some(ms),
            Wait::Signal { fallback_ms } => fallback_ms,
        };
        inner.spent = None;
        inner.timer = delay.map(|ms| {
            let weak = Rc::downgrade(driver);
            let ticket = start.ticket;
            Timeout::new(ms, move || {
                if let Some(driver) = weak.upgrade() {
                    complete(&driver, ticket, true);
                }
            })
        });
        (start, inner.listener.clone())
    };

    if let Some(listener) = listener {
        match to_js(&start) {
            Ok(payload) => {
                if let Err(error) = listener.call1(&JsValue::NULL, &payload) {
                    log::error!("Effect listener threw: {error:?}");
                }
            }
            Err(error) => log::error!("Could not serialize effect: {error:?}"),
        }
    }
}

fn complete(driver: &SharedDriver, ticket: EffectTicket, fired: bool) -> FinishOutcome {
    let (outcome, timer) = {
        let mut inner = driver.borrow_mut();
        let is_current = inner
            .session
            .current_effect()
            .map(|start| start.ticket == ticket)
            .unwrap_or(false);
        if !is_current {
            return inner.session.effect_finished(ticket);
        }
        let timer = inner.timer.take();
        (inner.session.effect_finished(ticket), timer)
    };

    if fired {
        if let Some(timer) = timer {
            advance(driver);
            driver.borrow_mut().spent = Some(timer);
            return outcome;
        }
    } else {
        // Renderer finished first; dropping cancels the fallback.
        drop(timer);
    }
    advance(driver);
    outcome
}

#[wasm_bindgen]
pub struct GameClient {
    driver: SharedDriver,
}

#[wasm_bindgen]
impl GameClient {
    /// `initial_state` and `config` may be `null`/`undefined`.
    #[wasm_bindgen(constructor)]
    pub fn new(viewer: String, initial_state: JsValue, config: JsValue) -> Result<GameClient, JsValue> {
        let config: ClientConfig = from_js_or_default(config)?;
        logging::init(config.log_level);

        let mut session = ClientSession::new(viewer, config);
        if !(initial_state.is_null() || initial_state.is_undefined()) {
            let snapshot: GameStateSnapshot = from_value(initial_state).map_err(JsValue::from)?;
            session = session.with_snapshot(snapshot);
        }

        Ok(GameClient {
            driver: Rc::new(RefCell::new(Driver {
                session,
                timer: None,
                spent: None,
                listener: None,
            })),
        })
    }

    /// Called with every effect as it starts.
    #[wasm_bindgen(js_name = "setEffectListener")]
    pub fn set_effect_listener(&self, listener: Option<Function>) {
        self.driver.borrow_mut().listener = listener;
    }

    pub fn receive(&self, batch: JsValue) -> Result<JsValue, JsValue> {
        let value: Value = from_value(batch).map_err(JsValue::from)?;
        let report = self
            .driver
            .borrow_mut()
            .session
            .receive_value(value)
            .map_err(to_js_error)?;
        advance(&self.driver);
        to_js(&report)
    }

    #[wasm_bindgen(js_name = "receiveJson")]
    pub fn receive_json(&self, json: &str) -> Result<JsValue, JsValue> {
        let report = self
            .driver
            .borrow_mut()
            .session
            .receive_json(json)
            .map_err(to_js_error)?;
        advance(&self.driver);
        to_js(&report)
    }

    pub fn resync(&self, snapshot: JsValue) -> Result<(), JsValue> {
        let snapshot: GameStateSnapshot = from_value(snapshot).map_err(JsValue::from)?;
        self.driver
            .borrow_mut()
            .session
            .resync(snapshot)
            .map_err(to_js_error)
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_js(self.driver.borrow().session.snapshot())
    }

    #[wasm_bindgen(js_name = "currentEffect")]
    pub fn current_effect(&self) -> Result<JsValue, JsValue> {
        match self.driver.borrow().session.current_effect() {
            Some(start) => to_js(start),
            None => Ok(JsValue::NULL),
        }
    }

    /// Renderer signal that the effect with `ticket` finished. Stale
    /// tickets are ignored.
    #[wasm_bindgen(js_name = "effectFinished")]
    pub fn effect_finished(&self, ticket: u32) -> Result<JsValue, JsValue> {
        let outcome = complete(&self.driver, EffectTicket(ticket), false);
        to_js(&outcome)
    }

    #[wasm_bindgen(js_name = "isInputLocked")]
    pub fn is_input_locked(&self) -> bool {
        self.driver.borrow().session.is_input_locked()
    }

    /// Returns the envelope to send, or throws the rejection.
    #[wasm_bindgen(js_name = "submitCommand")]
    pub fn submit_command(&self, command: JsValue) -> Result<JsValue, JsValue> {
        let command: Command = from_value(command).map_err(|error| {
            to_js_error(CommandRejection::Malformed {
                reason: error.to_string(),
            })
        })?;
        let envelope = self
            .driver
            .borrow()
            .session
            .submit(command)
            .map_err(to_js_error)?;
        to_js(&envelope)
    }

    #[wasm_bindgen(js_name = "gameLog")]
    pub fn game_log(&self) -> Result<JsValue, JsValue> {
        let inner = self.driver.borrow();
        let entries: Vec<&LogEntry> = inner.session.game_log().entries().collect();
        to_js(&entries)
    }

    pub fn diagnostics(&self) -> Result<JsValue, JsValue> {
        to_js(&self.driver.borrow().session.diagnostics())
    }

    /// Cancels timers and drops queued effects. Returns how many were dropped.
    pub fn teardown(&self) -> u32 {
        let (discarded, timer, spent) = {
            let mut inner = self.driver.borrow_mut();
            inner.listener = None;
            (inner.session.teardown(), inner.timer.take(), inner.spent.take())
        };
        drop(timer);
        drop(spent);
        u32::try_from(discarded).unwrap_or(u32::MAX)
    }
}

#[wasm_bindgen]
pub struct ReplayViewer {
    engine: ReplayEngine,
}

#[wasm_bindgen]
impl ReplayViewer {
    /// Takes the debug payload `{ reconstructedGameState, eventHistory }`.
    #[wasm_bindgen(constructor)]
    pub fn new(history: JsValue) -> Result<ReplayViewer, JsValue> {
        let value: Value = from_value(history).map_err(JsValue::from)?;
        let engine = ReplayEngine::from_value(value).map_err(to_js_error)?;
        Ok(ReplayViewer { engine })
    }

    #[wasm_bindgen(js_name = "stepForward")]
    pub fn step_forward(&mut self) -> bool {
        self.engine.step_forward()
    }

    #[wasm_bindgen(js_name = "stepBackward")]
    pub fn step_backward(&mut self) -> bool {
        self.engine.step_backward()
    }

    pub fn seek(&mut self, index: usize) -> usize {
        self.engine.seek(index)
    }

    pub fn position(&self) -> usize {
        self.engine.position()
    }

    pub fn len(&self) -> usize {
        self.engine.len()
    }

    #[wasm_bindgen(js_name = "isEmpty")]
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    pub fn current(&self) -> Result<JsValue, JsValue> {
        to_js(self.engine.current())
    }

    #[wasm_bindgen(js_name = "stateAt")]
    pub fn state_at(&self, index: usize) -> Result<JsValue, JsValue> {
        match self.engine.state_at(index) {
            Some(state) => to_js(&state),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = "lastEvent")]
    pub fn last_event(&self) -> Result<JsValue, JsValue> {
        match self.engine.last_event() {
            Some(event) => to_js(event),
            None => Ok(JsValue::NULL),
        }
    }
}

/// Small two-player table for renderer debugging.
#[wasm_bindgen(js_name = "createSampleSnapshot")]
pub fn create_sample_snapshot() -> Result<JsValue, JsValue> {
    to_js(&GameStateSnapshot::sample())
}

/// Applies one event and returns the next snapshot.
#[wasm_bindgen(js_name = "applyEvent")]
pub fn apply_event(state: JsValue, event: JsValue, viewer: &str) -> Result<JsValue, JsValue> {
    let state: GameStateSnapshot = from_value(state).map_err(JsValue::from)?;
    let event: GameEvent = from_value(event).map_err(JsValue::from)?;
    to_js(&apply(&state, &event, viewer))
}

/// Effects an event would queue, given the state before it.
#[wasm_bindgen(js_name = "translateEvent")]
pub fn translate_event(
    event: JsValue,
    state: JsValue,
    viewer: &str,
    config: JsValue,
) -> Result<JsValue, JsValue> {
    let event: GameEvent = from_value(event).map_err(JsValue::from)?;
    let state: GameStateSnapshot = from_value(state).map_err(JsValue::from)?;
    let config: ClientConfig = from_js_or_default(config)?;
    to_js(&config.translator().translate(&event, &state, viewer))
}

#[wasm_bindgen(js_name = "validateSnapshot")]
pub fn validate_snapshot(state: JsValue) -> Result<(), JsValue> {
    let state: GameStateSnapshot = from_value(state).map_err(JsValue::from)?;
    state.integrity_check().map_err(to_js_error)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
