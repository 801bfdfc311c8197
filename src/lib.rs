pub mod ai;
pub mod config;
pub mod game;
pub mod presenter;

use gloo_timers::future::TimeoutFuture;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use config::{BattleConfig, ConfigError, CrashPolicy, Tweak, WavePolicy};
pub use game::{
    Act, ActParams, ActTarget, ActionKind, Battle, BattleError, BattleState, Direction, Fault,
    Outcome, Player, PlayerId, RoundReport, Snapshot, TeamId,
};
pub use presenter::{Arg, Message, Presenter, RecordingPresenter, Style};

const DEFAULT_MAX_ROUNDS: u32 = 500;

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

/// Everything the front end needs to render one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundResolution {
    pub report: RoundReport,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// Full record of a simulated battle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    pub rounds: Vec<RoundResolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub survivors: Vec<Player>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Fault>,
}

impl Transcript {
    fn close(&mut self, battle: &Battle<RecordingPresenter>) {
        let state = battle.state();
        self.outcome = state.outcome.clone();
        self.survivors = state.players.values().cloned().collect();
        self.diagnostics = state.diagnostics.clone();
    }
}

fn to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(to_js_error)
}

fn parse_config(config_json: Option<&str>) -> Result<BattleConfig, ConfigError> {
    match config_json {
        Some(json) => BattleConfig::from_json(json),
        None => BattleConfig::default().validated(),
    }
}

fn new_battle(
    config: BattleConfig,
    seed: Option<u64>,
) -> Result<Battle<RecordingPresenter>, ConfigError> {
    match seed {
        Some(seed) => Battle::with_seed(config, RecordingPresenter::new(), seed),
        None => Battle::new(config, RecordingPresenter::new()),
    }
}

fn resolve_round(battle: &mut Battle<RecordingPresenter>) -> Result<RoundResolution, BattleError> {
    let report = battle.play_round()?;
    let messages = battle.presenter_mut().drain_messages();
    Ok(RoundResolution {
        outcome: report.outcome.clone(),
        report,
        messages,
    })
}

/// Plays an all-AI battle to the end, or until `max_rounds`.
pub fn simulate(
    mut config: BattleConfig,
    seed: Option<u64>,
    max_rounds: u32,
) -> Result<Transcript, ConfigError> {
    config.human_players = 0;
    let mut battle = new_battle(config, seed)?;
    let mut transcript = Transcript::default();
    for _ in 0..max_rounds {
        let Ok(resolution) = resolve_round(&mut battle) else {
            break;
        };
        let finished = resolution.outcome.is_some();
        transcript.rounds.push(resolution);
        if finished {
            break;
        }
    }
    transcript.close(&battle);
    Ok(transcript)
}

#[wasm_bindgen]
pub struct BattleEngine {
    battle: Battle<RecordingPresenter>,
}

#[wasm_bindgen]
impl BattleEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>, seed: Option<u64>) -> Result<BattleEngine, JsValue> {
        let config = parse_config(config_json.as_deref()).map_err(to_js_error)?;
        Ok(BattleEngine {
            battle: new_battle(config, seed).map_err(to_js_error)?,
        })
    }

    /// Queues a line answering the next human prompt.
    pub fn queue_input(&mut self, line: &str) {
        self.battle.presenter_mut().push_input(line);
    }

    pub fn play_round(&mut self) -> Result<String, JsValue> {
        let resolution = resolve_round(&mut self.battle).map_err(to_js_error)?;
        for fault in &resolution.report.faults {
            web_sys::console::warn_1(&fault.to_string().into());
        }
        to_json(&resolution)
    }

    pub fn round(&self) -> u32 {
        self.battle.state().round
    }

    pub fn is_finished(&self) -> bool {
        self.battle.outcome().is_some()
    }

    pub fn players_json(&self) -> Result<String, JsValue> {
        let players: Vec<&Player> = self.battle.state().players.values().collect();
        to_json(&players)
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        to_json(&self.battle.state().snapshot)
    }

    pub fn diagnostics_json(&self) -> Result<String, JsValue> {
        to_json(&self.battle.state().diagnostics)
    }

    pub fn outcome_json(&self) -> Result<String, JsValue> {
        to_json(&self.battle.outcome())
    }

    /// Prompts the last round left for the front end, e.g. a human's death notice.
    pub fn prompts_json(&mut self) -> Result<String, JsValue> {
        let prompts = std::mem::take(&mut self.battle.presenter_mut().prompts);
        to_json(&prompts)
    }
}

/// 返回默认对战配置，方便前端初始化设置界面。
#[wasm_bindgen(js_name = "defaultConfig")]
pub fn default_config() -> Result<JsValue, JsValue> {
    to_value(&BattleConfig::default()).map_err(JsValue::from)
}

/// 校验并规范化配置，返回修正后的结果。
#[wasm_bindgen(js_name = "validateConfig")]
pub fn validate_config(config: JsValue) -> Result<JsValue, JsValue> {
    let config: BattleConfig = from_value(config).map_err(JsValue::from)?;
    let config = config.validated().map_err(to_js_error)?;
    to_value(&config).map_err(JsValue::from)
}

/// 以 AI 全自动方式模拟整场对战，每回合之间等待 `round_delay_ms` 毫秒。
#[wasm_bindgen(js_name = "simulateBattle")]
pub fn simulate_battle(
    config_json: Option<String>,
    seed: Option<u64>,
    round_delay_ms: Option<u32>,
    max_rounds: Option<u32>,
) -> Promise {
    let delay = round_delay_ms.unwrap_or(0);
    let max_rounds = max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS);

    future_to_promise(async move {
        let mut config = parse_config(config_json.as_deref()).map_err(to_js_error)?;
        config.human_players = 0;
        let mut battle = new_battle(config, seed).map_err(to_js_error)?;
        let mut transcript = Transcript::default();

        for _ in 0..max_rounds {
            let resolution = resolve_round(&mut battle).map_err(to_js_error)?;
            let finished = resolution.outcome.is_some();
            transcript.rounds.push(resolution);
            if finished {
                break;
            }
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
        }

        transcript.close(&battle);
        for fault in &transcript.diagnostics {
            web_sys::console::warn_1(&fault.to_string().into());
        }
        Ok(JsValue::from_str(&to_json(&transcript)?))
    })
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
