//! Interpreter context: the single mutable object every evaluation step
//! receives explicitly.
//!
//! Holds program state, the immutable [`Program`] (function table and
//! widget registry), the [`OverrideStore`], recorded diagnostics and host
//! effects, plus the per-event gas and call-depth budgets.

use crate::config::EngineConfig;
use crate::error::{Diagnostic, DiagnosticKind, EvalResult, Fault};
use crate::host::Effect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use vi_types::ast::{Document, FunctionDef, Repetition, WidgetNode};
use vi_types::Value;

/// Map attribute aliases used by imperative overrides onto the names the
/// resolver reads.
pub fn canonical_attr(key: &str) -> &str {
    match key {
        "text_content" | "text_expr" => "text",
        "color_expr" => "color",
        other => other,
    }
}

/// `true` when `name` is `<parent>_X…`, i.e. a cell stamped from a
/// dynamic repetition named `parent`.
pub(crate) fn is_generated_name(parent: &str, name: &str) -> bool {
    name.strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix("_X"))
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Program
// ══════════════════════════════════════════════════════════════════════════════

/// The immutable part of a loaded document, shared by reference count
/// between the live context and its resolution forks.
#[derive(Debug)]
pub struct Program {
    tree: WidgetNode,
    functions: BTreeMap<String, FunctionDef>,
    /// Widget name → names of its named children and repeated instances.
    widgets: BTreeMap<String, Vec<String>>,
    /// Names of repetitions whose instances are stamped at resolution time.
    dynamic: Vec<String>,
}

impl Program {
    pub fn new(document: &Document) -> Self {
        let mut widgets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut dynamic = Vec::new();
        document.tree.walk(&mut |node| {
            let Some(name) = &node.name else { return };
            let mut members: Vec<String> = node.children.iter().filter_map(|c| c.name.clone()).collect();
            match &node.repeat {
                Some(Repetition::Expanded(instances)) => {
                    members.extend(instances.iter().filter_map(|i| i.name.clone()));
                }
                Some(Repetition::Template { .. }) => dynamic.push(name.clone()),
                None => {}
            }
            widgets.entry(name.clone()).or_default().extend(members);
        });
        Self {
            tree: document.tree.clone(),
            functions: document.functions.clone(),
            widgets,
            dynamic,
        }
    }

    pub fn tree(&self) -> &WidgetNode {
        &self.tree
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Declared widget names, plus cells of dynamic repetitions.
    pub fn is_widget(&self, name: &str) -> bool {
        self.widgets.contains_key(name) || self.dynamic.iter().any(|parent| is_generated_name(parent, name))
    }

    pub fn widget_members(&self, name: &str) -> &[String] {
        self.widgets.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Override store
// ══════════════════════════════════════════════════════════════════════════════

/// Imperatively applied attribute values, keyed by widget name.
///
/// Entries win over declared attributes and live for the whole session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideStore {
    entries: BTreeMap<String, BTreeMap<String, Value>>,
}

impl OverrideStore {
    pub fn get(&self, widget: &str) -> Option<&BTreeMap<String, Value>> {
        self.entries.get(widget)
    }

    pub fn attr(&self, widget: &str, attr: &str) -> Option<&Value> {
        self.entries.get(widget).and_then(|attrs| attrs.get(attr))
    }

    /// Last write wins per attribute.
    pub fn set(&mut self, widget: &str, attr: &str, value: Value) {
        self.entries
            .entry(widget.to_string())
            .or_default()
            .insert(canonical_attr(attr).to_string(), value);
    }

    pub fn contains(&self, widget: &str) -> bool {
        self.entries.get(widget).is_some_and(|attrs| !attrs.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, Value>)> {
        self.entries.iter()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Context
// ══════════════════════════════════════════════════════════════════════════════

/// State, overrides and RNG position captured before an event, restored on
/// abort.
#[derive(Debug, Clone)]
pub struct Snapshot {
    state: BTreeMap<String, Value>,
    overrides: OverrideStore,
    rng: StdRng,
}

#[derive(Debug, Clone)]
pub struct InterpreterContext {
    state: BTreeMap<String, Value>,
    program: Arc<Program>,
    overrides: OverrideStore,
    diagnostics: Vec<Diagnostic>,
    effects: Vec<Effect>,
    dirty: bool,
    gas: u64,
    call_depth: usize,
    config: EngineConfig,
    rng: StdRng,
}

impl InterpreterContext {
    pub fn new(program: Arc<Program>, config: EngineConfig) -> Self {
        Self {
            state: BTreeMap::new(),
            program,
            overrides: OverrideStore::default(),
            diagnostics: Vec::new(),
            effects: Vec::new(),
            dirty: false,
            gas: 0,
            call_depth: 0,
            config,
            rng: StdRng::seed_from_u64(config.rng_seed),
        }
    }

    /// A scratch copy for resolution: same state, overrides and RNG
    /// position, empty diagnostics, fresh gas. Nothing done to the fork is
    /// visible in `self`.
    pub fn fork(&self) -> Self {
        Self {
            diagnostics: Vec::new(),
            effects: Vec::new(),
            dirty: false,
            gas: 0,
            call_depth: 0,
            ..self.clone()
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub(crate) fn program_arc(&self) -> Arc<Program> {
        Arc::clone(&self.program)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── State ──────────────────────────────────────────────────────────

    pub fn state(&self) -> &BTreeMap<String, Value> {
        &self.state
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.state.get(name)
    }

    /// Write a state variable and mark the state as changed.
    pub fn set(&mut self, name: &str, value: Value) {
        self.state.insert(name.to_string(), value);
        self.dirty = true;
    }

    // ── Overrides ──────────────────────────────────────────────────────

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    pub fn set_override(&mut self, widget: &str, attr: &str, value: Value) {
        self.overrides.set(widget, attr, value);
        self.dirty = true;
    }

    /// Read-only view of a widget for expressions: its name, member names
    /// and current overrides.
    pub fn widget_handle(&self, name: &str) -> Value {
        let mut fields = BTreeMap::new();
        if let Some(attrs) = self.overrides.get(name) {
            fields.extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        fields.insert("name".to_string(), Value::String(name.to_string()));
        fields.insert(
            "children".to_string(),
            Value::List(
                self.program
                    .widget_members(name)
                    .iter()
                    .map(|m| Value::String(m.clone()))
                    .collect(),
            ),
        );
        Value::Map(fields)
    }

    // ── Change tracking ────────────────────────────────────────────────

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Return and clear the state-changed flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            overrides: self.overrides.clone(),
            rng: self.rng.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.state = snapshot.state;
        self.overrides = snapshot.overrides;
        self.rng = snapshot.rng;
    }

    // ── Diagnostics & effects ──────────────────────────────────────────

    pub fn record(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(kind, message);
        warn!(kind = kind.as_str(), "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    pub fn record_fault(&mut self, fault: &Fault) {
        self.record(fault.kind(), fault.to_string());
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn push_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ── Budgets ────────────────────────────────────────────────────────

    /// Consume one unit of gas.
    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        self.gas += 1;
        if self.gas > self.config.gas_limit {
            Err(Fault::GasExhausted(self.config.gas_limit))
        } else {
            Ok(())
        }
    }

    pub fn reset_gas(&mut self) {
        self.gas = 0;
    }

    pub fn gas_used(&self) -> u64 {
        self.gas
    }

    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    pub(crate) fn enter_call(&mut self) -> EvalResult<()> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(Fault::CallDepthExceeded(self.config.max_call_depth));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    pub(crate) fn reset_call_depth(&mut self) {
        self.call_depth = 0;
    }

    /// Uniform integer in `[lo, hi]` from the seeded generator.
    pub(crate) fn random_int(&mut self, lo: i64, hi: i64) -> i64 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        self.rng.gen_range(lo..=hi)
    }
}
