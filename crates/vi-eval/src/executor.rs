//! Statement execution.
//!
//! Statements run in order against the shared [`InterpreterContext`]. A
//! recoverable fault skips only the statement that raised it. `wait_sec` at
//! the top level of an event body suspends execution and hands back the
//! remaining statements as a continuation.

use crate::context::{canonical_attr, InterpreterContext};
use crate::error::{DiagnosticKind, EvalResult, Fault};
use crate::evaluator::{eval_expr, Mode};
use std::collections::BTreeMap;
use tracing::debug;
use vi_types::ast::{Expr, FunctionDef, Stmt};
use vi_types::Value;

/// How a statement or block finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
    /// `wait_sec(seconds)`: run `rest` after the delay.
    Suspend { seconds: f64, rest: Vec<Stmt> },
}

/// Execute statements in order until one returns or suspends.
///
/// A suspension picks up the statements after it, so enclosing blocks
/// each append their own remainder on the way out.
pub fn execute_block(stmts: &[Stmt], ctx: &mut InterpreterContext) -> EvalResult<Flow> {
    for (i, stmt) in stmts.iter().enumerate() {
        match execute(stmt, ctx)? {
            Flow::Normal => {}
            Flow::Return(value) => return Ok(Flow::Return(value)),
            Flow::Suspend { seconds, mut rest } => {
                rest.extend_from_slice(&stmts[i + 1..]);
                return Ok(Flow::Suspend { seconds, rest });
            }
        }
    }
    Ok(Flow::Normal)
}

/// Execute one statement, recording (and skipping on) recoverable faults.
pub fn execute(stmt: &Stmt, ctx: &mut InterpreterContext) -> EvalResult<Flow> {
    ctx.tick()?;
    match exec_stmt(stmt, ctx) {
        Err(fault) if !fault.is_abort() => {
            ctx.record_fault(&fault);
            Ok(Flow::Normal)
        }
        other => other,
    }
}

/// Run a function body as an event: parameters bound, call depth zero,
/// suspension allowed.
pub fn run_function(def: &FunctionDef, args: Vec<Value>, ctx: &mut InterpreterContext) -> EvalResult<Flow> {
    bind_params(def, args, ctx);
    execute_block(&def.body, ctx)
}

/// Parameters live in shared state, like loop variables. Missing
/// arguments bind `null`.
pub(crate) fn bind_params(def: &FunctionDef, args: Vec<Value>, ctx: &mut InterpreterContext) {
    let mut args = args.into_iter();
    for param in &def.params {
        ctx.set(param, args.next().unwrap_or_default());
    }
}

fn exec_stmt(stmt: &Stmt, ctx: &mut InterpreterContext) -> EvalResult<Flow> {
    match stmt {
        Stmt::Assign { target, value } => {
            match override_target(target, ctx) {
                Some((widget, attr)) => {
                    let value = eval_expr(value, ctx, Mode::Attribute)?;
                    ctx.set_override(&widget, &attr, value);
                }
                None => {
                    let value = eval_expr(value, ctx, Mode::Value)?;
                    write_path(target, value, ctx)?;
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::Return(value) => {
            let value = match value {
                Some(expr) => eval_expr(expr, ctx, Mode::Value)?,
                None => Value::Null,
            };
            Ok(Flow::Return(value))
        }
        Stmt::If {
            condition,
            then_body,
            else_body,
        } => {
            if eval_expr(condition, ctx, Mode::Value)?.is_truthy() {
                execute_block(then_body, ctx)
            } else {
                execute_block(else_body, ctx)
            }
        }
        Stmt::For { var, iterable, body } => {
            let items = match eval_expr(iterable, ctx, Mode::Value)? {
                Value::List(items) => items,
                other => {
                    return Err(Fault::mismatch(format!("cannot iterate over {}", other.type_name())));
                }
            };
            exec_for(var, items, body, ctx)
        }
        Stmt::Expr(expr) => {
            if let Some(seconds) = suspension(expr, ctx)? {
                debug!(seconds, "suspend");
                return Ok(Flow::Suspend {
                    seconds,
                    rest: Vec::new(),
                });
            }
            eval_expr(expr, ctx, Mode::Value)?;
            Ok(Flow::Normal)
        }
        Stmt::ModifyContainer { target, attributes } => {
            modify_container(target, attributes, ctx)?;
            Ok(Flow::Normal)
        }
    }
}

fn exec_for(var: &str, items: Vec<Value>, body: &[Stmt], ctx: &mut InterpreterContext) -> EvalResult<Flow> {
    let mut items = items.into_iter();
    while let Some(item) = items.next() {
        ctx.set(var, item);
        match execute_block(body, ctx)? {
            Flow::Normal => {}
            Flow::Return(value) => return Ok(Flow::Return(value)),
            Flow::Suspend { seconds, mut rest } => {
                let remaining: Vec<Value> = items.collect();
                if !remaining.is_empty() {
                    rest.push(Stmt::For {
                        var: var.to_string(),
                        iterable: Expr::Literal(Value::List(remaining)),
                        body: body.to_vec(),
                    });
                }
                return Ok(Flow::Suspend { seconds, rest });
            }
        }
    }
    Ok(Flow::Normal)
}

/// `wait_sec(s)` as a statement of an event body (not inside a nested
/// call, and not shadowed by a user function).
fn suspension(expr: &Expr, ctx: &mut InterpreterContext) -> EvalResult<Option<f64>> {
    let Expr::Call { function, args } = expr else {
        return Ok(None);
    };
    if function != "wait_sec" || ctx.call_depth() > 0 || ctx.program().has_function(function) {
        return Ok(None);
    }
    let seconds = match args.first() {
        Some(arg) => match eval_expr(arg, ctx, Mode::Value)? {
            Value::Number(n) => n,
            other => {
                return Err(Fault::mismatch(format!(
                    "`wait_sec` expects a number of seconds, got {}",
                    other.type_name()
                )))
            }
        },
        None => 0.0,
    };
    Ok(Some(if seconds.is_finite() { seconds.max(0.0) } else { 0.0 }))
}

// ══════════════════════════════════════════════════════════════════════════════
// Writes
// ══════════════════════════════════════════════════════════════════════════════

/// Assign to `name` or `root.field…`.
///
/// `w.attr = v` where `w` is a widget name, or a variable holding one,
/// writes an override instead of state.
pub(crate) fn write_path(path: &[String], value: Value, ctx: &mut InterpreterContext) -> EvalResult<()> {
    let Some((root, fields)) = path.split_first() else {
        return Ok(());
    };
    if fields.is_empty() {
        ctx.set(root, value);
        return Ok(());
    }
    if let Some((widget, attr)) = override_target(path, ctx) {
        ctx.set_override(&widget, &attr, value);
        return Ok(());
    }

    match ctx.get(root).cloned() {
        Some(Value::Map(map)) => {
            let updated = set_nested(map, fields, value)?;
            ctx.set(root, Value::Map(updated));
            Ok(())
        }
        Some(Value::Null) => {
            let updated = set_nested(BTreeMap::new(), fields, value)?;
            ctx.set(root, Value::Map(updated));
            Ok(())
        }
        Some(other) => Err(Fault::mismatch(format!(
            "cannot assign field `{}` of {}",
            fields[0],
            other.type_name()
        ))),
        None => {
            ctx.record(DiagnosticKind::UnresolvedName, format!("unknown variable `{root}`"));
            Ok(())
        }
    }
}

/// The `(widget, attribute)` an assignment to `path` overrides, if any:
/// `w.attr` where `w` is a variable holding a widget name, or a widget name
/// that is not a variable.
fn override_target(path: &[String], ctx: &InterpreterContext) -> Option<(String, String)> {
    let [root, attr] = path else { return None };
    let widget = match ctx.get(root) {
        Some(Value::String(held)) => held.clone(),
        Some(_) => return None,
        None => root.clone(),
    };
    ctx.program().is_widget(&widget).then(|| (widget, attr.clone()))
}

fn set_nested(mut map: BTreeMap<String, Value>, fields: &[String], value: Value) -> EvalResult<BTreeMap<String, Value>> {
    let Some((field, rest)) = fields.split_first() else {
        return Ok(map);
    };
    if rest.is_empty() {
        map.insert(field.clone(), value);
        return Ok(map);
    }
    let inner = match map.remove(field) {
        Some(Value::Map(inner)) => inner,
        None | Some(Value::Null) => BTreeMap::new(),
        Some(other) => {
            return Err(Fault::mismatch(format!(
                "cannot assign field `{}` of {}",
                rest[0],
                other.type_name()
            )))
        }
    };
    map.insert(field.clone(), Value::Map(set_nested(inner, rest, value)?));
    Ok(map)
}

fn modify_container(
    target: &Expr,
    attributes: &BTreeMap<String, Expr>,
    ctx: &mut InterpreterContext,
) -> EvalResult<()> {
    let widget = container_name(target, ctx)?;
    if !ctx.program().is_widget(&widget) {
        ctx.record(DiagnosticKind::UnresolvedName, format!("unknown widget `{widget}`"));
        return Ok(());
    }
    // Evaluate everything first so a fault leaves no partial update.
    let mut values = Vec::with_capacity(attributes.len());
    for (attr, expr) in attributes {
        values.push((canonical_attr(attr).to_string(), eval_expr(expr, ctx, Mode::Attribute)?));
    }
    for (attr, value) in values {
        ctx.set_override(&widget, &attr, value);
    }
    ctx.mark_dirty();
    Ok(())
}

/// The widget a `modify_container` statement targets: a literal name, the
/// string a variable holds, the variable's own name, or `grid.X1Y2` for the
/// repeated cell `grid_X1Y2`.
fn container_name(target: &Expr, ctx: &mut InterpreterContext) -> EvalResult<String> {
    match target {
        Expr::Literal(Value::String(name)) => Ok(name.clone()),
        Expr::Var(name) => Ok(match ctx.get(name) {
            Some(Value::String(held)) => held.clone(),
            _ => name.clone(),
        }),
        Expr::Member { object, field } => {
            let base = container_name(object, ctx)?;
            Ok(format!("{base}_{field}"))
        }
        other => match eval_expr(other, ctx, Mode::Attribute)? {
            Value::String(name) => Ok(name),
            value => Err(Fault::mismatch(format!(
                "container target must be a widget name, got {}",
                value.type_name()
            ))),
        },
    }
}
