#![cfg(target_arch = "wasm32")]

use energy_battle::{default_config, validate_config, BattleEngine, RoundResolution};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn engine_plays_scripted_rounds() {
    let config = r#"{ "num_players": 2, "human_players": 2 }"#;
    let mut engine = BattleEngine::new(Some(config.to_owned()), Some(1)).expect("engine");
    engine.queue_input("1");
    engine.queue_input("1");

    let json = engine.play_round().expect("round");
    let resolution: RoundResolution = serde_json::from_str(&json).expect("resolution json");
    assert_eq!(resolution.report.round, 1);
    assert_eq!(resolution.report.registered, 2);
    assert_eq!(resolution.messages[0].key, "round.title");
    assert!(!engine.is_finished());
    assert_eq!(engine.round(), 1);
}

#[wasm_bindgen_test]
fn surrender_finishes_the_engine() {
    let mut engine = BattleEngine::new(None, Some(2)).expect("engine");
    engine.queue_input("bk");
    engine.play_round().expect("round");
    assert!(engine.is_finished());
    assert!(engine.outcome_json().expect("outcome").contains("abandoned"));
    assert!(engine.play_round().is_err());
}

#[wasm_bindgen_test]
fn config_helpers_round_trip() {
    let config = default_config().expect("default config");
    let validated = validate_config(config).expect("defaults validate");
    assert!(validated.is_object());
    assert!(validate_config(JsValue::from_str("nope")).is_err());
}

#[wasm_bindgen_test]
fn invalid_config_is_rejected() {
    assert!(BattleEngine::new(Some("{ \"map_half_height\": 500 }".into()), None).is_err());
}
