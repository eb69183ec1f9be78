//! Shared types for the Vi interpreter.
//!
//! This crate defines the runtime [`Value`], the AST of compiled documents,
//! and the JSON decoder that turns compiler output into that AST.

mod error;
mod value;
pub mod ast;
pub mod document;

pub use document::{decode_document, decode_expr, decode_stmt, parse_document};
pub use error::{LoadError, LoadResult};
pub use value::Value;
