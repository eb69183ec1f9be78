//! Vi reactive interpreter.
//!
//! Loads a compiled UI document, keeps its state, evaluates event handlers
//! and resolves the widget tree into toolkit-neutral render descriptors.
//! The pieces are layered bottom-up: [`context`] → [`evaluator`] /
//! [`executor`] → [`resolver`] → [`session`].

pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod host;
pub mod palette;
pub mod resolver;
pub mod session;
pub mod text;

pub use config::EngineConfig;
pub use context::{InterpreterContext, OverrideStore, Program};
pub use descriptor::{AvailableSize, Axis, CallbackId, EventBinding, Extent, Layout, RenderDescriptor, RenderOutput};
pub use error::{Diagnostic, DiagnosticKind, EvalResult, Fault, ResolveError, SessionError, SessionResult};
pub use evaluator::{evaluate, evaluate_attribute};
pub use executor::{execute, execute_block, Flow};
pub use host::{mount, Effect, Host, Primitives};
pub use resolver::{resolve, resolve_tree};
pub use session::Session;
