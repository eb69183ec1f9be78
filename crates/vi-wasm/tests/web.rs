//! Browser tests; run with `wasm-pack test --headless --firefox`.

#![cfg(target_arch = "wasm32")]

use vi_wasm::{validate, version, WasmSession};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const LAMP: &str = r#"{
    "state": {"status": "idle"},
    "functions": {"blink": {"body": [
        {"type": "assign", "target": "status", "value": "on"},
        {"type": "expr_stmt", "expr": {"type": "call", "name": "wait_sec", "args": [2]}},
        {"type": "assign", "target": "status", "value": "off"}
    ]}},
    "tree": {"widget": "Container", "name": "lamp", "props": {"text": "{status}", "width": 50}}
}"#;

fn parse(response: &str) -> serde_json::Value {
    serde_json::from_str(response).unwrap()
}

#[wasm_bindgen_test]
fn renders_into_the_viewport() {
    let mut session = WasmSession::new(LAMP, 400.0, 300.0, "").unwrap();
    let frame = parse(&session.render());
    assert_eq!(frame["output"]["root"]["width"], serde_json::json!({"type": "fixed", "value": 200.0}));

    let frame = parse(&session.resize(100.0, 300.0));
    assert_eq!(frame["output"]["root"]["width"]["value"], 50.0);
}

#[wasm_bindgen_test]
fn timers_follow_the_virtual_clock() {
    let mut session = WasmSession::new(LAMP, 400.0, 300.0, "").unwrap();
    let frame = parse(&session.dispatch("blink", "[]"));
    assert_eq!(frame["output"]["root"]["text"], "on");

    let frame = parse(&session.advance(2.0));
    assert_eq!(frame["output"]["root"]["text"], "off");
    assert_eq!(session.now(), 2.0);
    assert!(session.state().unwrap().is_object());
}

#[wasm_bindgen_test]
fn invalid_documents_are_rejected() {
    assert!(WasmSession::new("{", 1.0, 1.0, "").is_err());
    assert_eq!(parse(&validate("{}"))["success"], false);
    assert!(!version().is_empty());
}
