//! Session: a loaded document plus its event queue.
//!
//! Events run one at a time to completion in FIFO order. Every event that
//! changes state or overrides triggers a full re-resolution of the tree,
//! which is then presented to the host. An event that exhausts its step
//! budget is rolled back as a whole.

use crate::config::EngineConfig;
use crate::context::{InterpreterContext, OverrideStore, Program};
use crate::descriptor::{CallbackId, RenderOutput};
use crate::error::{Diagnostic, DiagnosticKind, SessionError, SessionResult};
use crate::evaluator::{evaluate, invoke, BUILTINS};
use crate::executor::{execute_block, run_function, Flow};
use crate::host::Host;
use crate::resolver::resolve_tree;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use vi_types::ast::{Document, Stmt};
use vi_types::{parse_document, Value};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Call { function: String, args: Vec<Value> },
    /// The statements left over after a `wait_sec`.
    Resume(Vec<Stmt>),
}

/// An event due at a point on the virtual clock. Ties fire in the order
/// they were scheduled.
#[derive(Debug)]
struct Timer {
    due: f64,
    seq: u64,
    event: Event,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so that `BinaryHeap` pops the earliest timer first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Session {
    ctx: InterpreterContext,
    queue: VecDeque<Event>,
    timers: BinaryHeap<Timer>,
    /// Virtual clock, in seconds.
    now: f64,
    seq: u64,
    output: Option<RenderOutput>,
    diagnostics: Vec<Diagnostic>,
}

impl Session {
    /// Parse a compiled document and initialize its state.
    #[instrument(level = "debug", skip_all)]
    pub fn load(source: &str, config: EngineConfig) -> SessionResult<Self> {
        let document = parse_document(source)?;
        Self::from_document(&document, config)
    }

    /// Initialize state from a decoded document.
    ///
    /// Initial values are evaluated in name order; each may refer to the
    /// ones before it.
    pub fn from_document(document: &Document, config: EngineConfig) -> SessionResult<Self> {
        let program = Arc::new(Program::new(document));
        let mut ctx = InterpreterContext::new(program, config);
        for (name, initial) in &document.state {
            ctx.reset_gas();
            let value = evaluate(initial, &mut ctx).map_err(SessionError::Init)?;
            ctx.set(name, value);
        }
        ctx.take_dirty();
        let diagnostics = ctx.take_diagnostics();
        info!(
            state = document.state.len(),
            functions = document.functions.len(),
            "session initialized"
        );
        Ok(Self {
            ctx,
            queue: VecDeque::new(),
            timers: BinaryHeap::new(),
            now: 0.0,
            seq: 0,
            output: None,
            diagnostics,
        })
    }

    // ══════════════════════════════════════════════════════════════════════
    // Accessors
    // ══════════════════════════════════════════════════════════════════════

    pub fn state(&self) -> &BTreeMap<String, Value> {
        self.ctx.state()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.ctx.get(name)
    }

    pub fn overrides(&self) -> &OverrideStore {
        self.ctx.overrides()
    }

    pub fn context(&self) -> &InterpreterContext {
        &self.ctx
    }

    /// The most recently presented output.
    pub fn output(&self) -> Option<&RenderOutput> {
        self.output.as_ref()
    }

    /// Diagnostics recorded by initialization and events (not by
    /// resolution passes, which carry their own).
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    // ══════════════════════════════════════════════════════════════════════
    // Rendering
    // ══════════════════════════════════════════════════════════════════════

    /// Resolve the whole tree and present it.
    pub fn render(&mut self, host: &mut impl Host) -> SessionResult<&RenderOutput> {
        let output = resolve_tree(&self.ctx, host.available_size())?;
        host.present(&output);
        Ok(self.output.insert(output))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Events
    // ══════════════════════════════════════════════════════════════════════

    /// Fire the callback `id` of the last presented output.
    pub fn tap(&mut self, id: CallbackId, host: &mut impl Host) -> SessionResult<()> {
        let binding = self.output.as_ref().and_then(|output| output.callback(id)).cloned();
        match binding {
            Some(binding) => self.dispatch(&binding.function, binding.args, host),
            None => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnresolvedName,
                    format!("no callback with id {}", id.0),
                ));
                Ok(())
            }
        }
    }

    /// Enqueue a call and drain the queue.
    pub fn dispatch(&mut self, function: &str, args: Vec<Value>, host: &mut impl Host) -> SessionResult<()> {
        self.post(function, args);
        self.run_pending(host)
    }

    /// Enqueue a call without running it.
    pub fn post(&mut self, function: &str, args: Vec<Value>) {
        self.queue.push_back(Event::Call {
            function: function.to_string(),
            args,
        });
    }

    /// Call `function` after `delay` seconds of virtual time.
    pub fn schedule(&mut self, function: &str, delay: f64, args: Vec<Value>) {
        self.push_timer(
            delay,
            Event::Call {
                function: function.to_string(),
                args,
            },
        );
    }

    /// Move the virtual clock forward, firing every timer that falls due.
    pub fn advance(&mut self, dt: f64, host: &mut impl Host) -> SessionResult<()> {
        let target = self.now + dt.max(0.0);
        while self.timers.peek().is_some_and(|timer| timer.due <= target) {
            let Some(timer) = self.timers.pop() else { break };
            self.now = timer.due;
            self.queue.push_back(timer.event);
            if let Err(e) = self.run_pending(host) {
                // Unrun events stay queued for the next drain.
                self.now = target;
                return Err(e);
            }
        }
        self.now = target;
        Ok(())
    }

    /// Process queued events in order, re-rendering after each one that
    /// changed anything.
    pub fn run_pending(&mut self, host: &mut impl Host) -> SessionResult<()> {
        while let Some(event) = self.queue.pop_front() {
            if self.process(event, host) {
                self.render(host)?;
            }
        }
        Ok(())
    }

    fn push_timer(&mut self, delay: f64, event: Event) {
        let delay = if delay.is_finite() { delay.max(0.0) } else { 0.0 };
        self.seq += 1;
        debug!(due = self.now + delay, "timer scheduled");
        self.timers.push(Timer {
            due: self.now + delay,
            seq: self.seq,
            event,
        });
    }

    /// Run one event to completion. Returns whether state or overrides changed.
    #[instrument(level = "debug", skip_all)]
    fn process(&mut self, event: Event, host: &mut impl Host) -> bool {
        self.ctx.reset_gas();
        self.ctx.reset_call_depth();
        let snapshot = self.ctx.snapshot();

        let flow = match event {
            Event::Call { function, args } => {
                let program = self.ctx.program_arc();
                match program.function(&function) {
                    Some(def) => {
                        debug!(function = %function, "dispatch");
                        run_function(def, args, &mut self.ctx)
                    }
                    None if BUILTINS.contains(&function.as_str()) => {
                        invoke(&function, args, &mut self.ctx).map(|_| Flow::Normal)
                    }
                    None => {
                        self.ctx
                            .record(DiagnosticKind::UnresolvedName, format!("unknown function `{function}`"));
                        self.diagnostics.extend(self.ctx.take_diagnostics());
                        return false;
                    }
                }
            }
            Event::Resume(rest) => {
                debug!(statements = rest.len(), "resume");
                execute_block(&rest, &mut self.ctx)
            }
        };

        let changed = match flow {
            Ok(flow) => {
                if let Flow::Suspend { seconds, rest } = flow {
                    self.push_timer(seconds, Event::Resume(rest));
                }
                for effect in self.ctx.take_effects() {
                    host.perform(&effect);
                }
                self.ctx.take_dirty()
            }
            Err(fault) => {
                self.ctx.restore(snapshot);
                self.ctx.take_effects();
                self.ctx.take_dirty();
                self.ctx.reset_call_depth();
                self.ctx
                    .record(DiagnosticKind::BudgetExhausted, format!("event rolled back: {fault}"));
                false
            }
        };
        self.diagnostics.extend(self.ctx.take_diagnostics());
        changed
    }
}
