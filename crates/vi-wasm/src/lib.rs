//! Vi interpreter as a WASM module for browser environments.
//!
//! This crate exposes a [`Session`] via `wasm-bindgen`. Everything crosses
//! the boundary as JSON so the page only needs `JSON.parse`.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { WasmSession } from 'vi-wasm';
//!
//! await init();
//!
//! const session = new WasmSession(documentJson, 360, 640, "");
//! let frame = JSON.parse(session.render());
//! frame = JSON.parse(session.tap(frame.output.root.events.on_click));
//! // { success: true, output: { root, callbacks, diagnostics }, effects: [], diagnostics: [] }
//! ```

use serde::Serialize;
use vi_eval::{AvailableSize, CallbackId, Diagnostic, Effect, EngineConfig, Host, RenderOutput, Session, SessionResult};
use vi_types::Value;
use wasm_bindgen::prelude::*;

/// Host side of the browser binding: a fixed viewport plus the effects
/// collected since the last response.
struct PageHost {
    size: AvailableSize,
    effects: Vec<Effect>,
}

impl Host for PageHost {
    fn available_size(&self) -> AvailableSize {
        self.size
    }

    // The page pulls the output from the response instead.
    fn present(&mut self, _output: &RenderOutput) {}

    fn perform(&mut self, effect: &Effect) {
        self.effects.push(effect.clone());
    }
}

/// JSON shape returned by every session method.
#[derive(Serialize)]
struct Response<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a RenderOutput>,
    effects: Vec<Effect>,
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[wasm_bindgen]
pub struct WasmSession {
    session: Session,
    host: PageHost,
}

#[wasm_bindgen]
impl WasmSession {
    /// Load a compiled document into a `width` × `height` viewport.
    ///
    /// `config` is an `EngineConfig` as JSON; an empty string uses the
    /// defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(document: &str, width: f64, height: f64, config: &str) -> Result<WasmSession, JsError> {
        Self::open(document, width, height, config).map_err(|e| JsError::new(&e))
    }

    /// Resolve the tree and return the output.
    pub fn render(&mut self) -> String {
        let result = self.session.render(&mut self.host).map(|_| ());
        self.respond(result)
    }

    /// Fire a callback id taken from the last output.
    pub fn tap(&mut self, id: u32) -> String {
        let result = self.session.tap(CallbackId(id), &mut self.host);
        self.respond(result)
    }

    /// Call a function by name. `args` is a JSON list of values.
    pub fn dispatch(&mut self, function: &str, args: &str) -> String {
        let args: Vec<Value> = if args.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str(args) {
                Ok(args) => args,
                Err(e) => return self.fail(format!("invalid arguments: {e}")),
            }
        };
        let result = self.session.dispatch(function, args, &mut self.host);
        self.respond(result)
    }

    /// Advance the virtual clock by `dt` seconds.
    pub fn advance(&mut self, dt: f64) -> String {
        let result = self.session.advance(dt, &mut self.host);
        self.respond(result)
    }

    /// Change the viewport and re-render.
    pub fn resize(&mut self, width: f64, height: f64) -> String {
        self.host.size = AvailableSize::new(width, height);
        self.render()
    }

    /// Current state as a JS object.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.session.state()).map_err(Into::into)
    }

    /// Current state as a JSON string.
    #[wasm_bindgen(js_name = stateJson)]
    pub fn state_json(&self) -> String {
        serde_json::to_string(self.session.state()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Seconds on the virtual clock.
    pub fn now(&self) -> f64 {
        self.session.now()
    }
}

impl WasmSession {
    fn open(document: &str, width: f64, height: f64, config: &str) -> Result<Self, String> {
        let config: EngineConfig = if config.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_json::from_str(config).map_err(|e| format!("invalid engine config: {e}"))?
        };
        let session = Session::load(document, config).map_err(|e| e.to_string())?;
        Ok(Self {
            session,
            host: PageHost {
                size: AvailableSize::new(width, height),
                effects: Vec::new(),
            },
        })
    }

    fn respond(&mut self, result: SessionResult<()>) -> String {
        match result {
            Ok(()) => {
                let effects = std::mem::take(&mut self.host.effects);
                let diagnostics = self.session.take_diagnostics();
                let response = Response {
                    success: true,
                    output: self.session.output(),
                    effects,
                    diagnostics,
                    error: None,
                };
                serialize(&response)
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn fail(&mut self, error: String) -> String {
        let response = Response {
            success: false,
            output: None,
            effects: std::mem::take(&mut self.host.effects),
            diagnostics: self.session.take_diagnostics(),
            error: Some(error),
        };
        serialize(&response)
    }
}

fn serialize(response: &Response<'_>) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"effects":[],"diagnostics":[],"error":"Serialization error: {}"}}"#,
            e
        )
    })
}

/// Check that a document decodes, without starting a session.
///
/// Returns `{"success": true}` or `{"success": false, "error": "..."}`.
#[wasm_bindgen]
pub fn validate(document: &str) -> String {
    match vi_types::parse_document(document) {
        Ok(_) => r#"{"success":true}"#.to_string(),
        Err(e) => serde_json::json!({"success": false, "error": e.to_string()}).to_string(),
    }
}

/// Return the interpreter version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: &str = r#"{
        "state": {"count": {"initial": {"type": "literal", "value": 0}}},
        "functions": {"increment": {"body": [
            {"type": "assign", "target": "count",
             "value": {"type": "binary_op", "op": "+", "left": {"type": "var", "name": "count"}, "right": 1}},
            {"type": "expr_stmt", "expr": {"type": "call", "name": "play", "args": ["click.wav"]}}
        ]}},
        "tree": {"widget": "ElevatedButton", "name": "button", "props": {
            "text": "{count}",
            "events": {"on_click": {"type": "call", "name": "increment", "args": []}}
        }}
    }"#;

    fn parse(response: &str) -> serde_json::Value {
        serde_json::from_str(response).unwrap()
    }

    #[test]
    fn tap_round_trip() {
        let mut session = WasmSession::open(COUNTER, 200.0, 100.0, "").unwrap();
        let frame = parse(&session.render());
        assert_eq!(frame["success"], true);
        assert_eq!(frame["output"]["root"]["text"], "0");
        let id = frame["output"]["root"]["events"]["on_click"].as_u64().unwrap() as u32;

        let frame = parse(&session.tap(id));
        assert_eq!(frame["output"]["root"]["text"], "1");
        assert_eq!(frame["effects"][0], serde_json::json!({"effect": "play", "media": "click.wav"}));
        assert_eq!(session.state_json(), r#"{"count":1.0}"#);
    }

    #[test]
    fn bad_inputs_are_reported() {
        assert!(WasmSession::open("{}", 200.0, 100.0, "").is_err());
        assert!(WasmSession::open(COUNTER, 200.0, 100.0, "{\"gas_limit\": \"lots\"}").is_err());

        let mut session = WasmSession::open(COUNTER, 200.0, 100.0, r#"{"gas_limit": 5000}"#).unwrap();
        let frame = parse(&session.dispatch("increment", "not json"));
        assert_eq!(frame["success"], false);

        assert_eq!(parse(&validate(COUNTER))["success"], true);
        assert_eq!(parse(&validate("{}"))["success"], false);
    }
}
