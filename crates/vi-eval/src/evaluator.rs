//! Expression evaluation.
//!
//! [`evaluate`] is the outermost entry point: recoverable faults anywhere in
//! the expression make the whole expression `null` and leave exactly one
//! diagnostic behind. Budget faults escape as `Err` and abort the event.

use crate::context::InterpreterContext;
use crate::error::{DiagnosticKind, EvalResult, Fault};
use crate::executor::{bind_params, execute_block, write_path, Flow};
use crate::host::Effect;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::trace;
use vi_types::ast::{BinaryOp, Expr, FunctionDef, UnaryOp};
use vi_types::Value;

/// How a bare variable that names no state is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Unknown names are `null` (or a widget handle) plus a diagnostic.
    Value,
    /// Unknown names stand for themselves: `color: red`, `shape: circle`.
    Attribute,
}

/// Evaluate an expression, degrading recoverable faults to `null`.
pub fn evaluate(expr: &Expr, ctx: &mut InterpreterContext) -> EvalResult<Value> {
    recover(eval_expr(expr, ctx, Mode::Value), ctx)
}

/// Evaluate an expression in attribute position, where a bare identifier
/// that is not a state variable evaluates to its own name.
pub fn evaluate_attribute(expr: &Expr, ctx: &mut InterpreterContext) -> EvalResult<Value> {
    recover(eval_expr(expr, ctx, Mode::Attribute), ctx)
}

fn recover(result: EvalResult<Value>, ctx: &mut InterpreterContext) -> EvalResult<Value> {
    match result {
        Err(fault) if !fault.is_abort() => {
            ctx.record_fault(&fault);
            Ok(Value::Null)
        }
        other => other,
    }
}

/// Evaluate without recovery; faults propagate to the caller.
pub(crate) fn eval_expr(expr: &Expr, ctx: &mut InterpreterContext, mode: Mode) -> EvalResult<Value> {
    ctx.tick()?;
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => Ok(eval_var(name, ctx, mode)),
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, ctx, Mode::Value)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    other => Err(Fault::mismatch(format!("cannot negate {}", other.type_name()))),
                },
            }
        }
        Expr::Member { object, field } => {
            let object = eval_expr(object, ctx, Mode::Value)?;
            Ok(member(&object, field))
        }
        Expr::Index { object, index } => {
            let object = eval_expr(object, ctx, Mode::Value)?;
            let index = eval_expr(index, ctx, Mode::Value)?;
            eval_index(&object, &index)
        }
        Expr::Call { function, args } => {
            let args = eval_args(args, ctx)?;
            invoke(function, args, ctx)
        }
        Expr::MethodCall { object, method, args } => {
            let receiver = eval_expr(object, ctx, Mode::Value)?;
            let args = eval_args(args, ctx)?;
            eval_method(object, receiver, method, args, ctx)
        }
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            let condition = eval_expr(condition, ctx, Mode::Value)?;
            if condition.is_truthy() {
                eval_expr(then_branch, ctx, mode)
            } else {
                eval_expr(else_branch, ctx, mode)
            }
        }
        Expr::Array(elements) => eval_args(elements, ctx).map(Value::List),
        Expr::Object(entries) => {
            let mut fields = BTreeMap::new();
            for (key, value) in entries {
                fields.insert(key.clone(), eval_expr(value, ctx, mode)?);
            }
            Ok(Value::Map(fields))
        }
    }
}

fn eval_args(args: &[Expr], ctx: &mut InterpreterContext) -> EvalResult<Vec<Value>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(arg, ctx, Mode::Value)?);
    }
    Ok(values)
}

// ── Names ────────────────────────────────────────────────────────────────

fn eval_var(name: &str, ctx: &mut InterpreterContext, mode: Mode) -> Value {
    if let Some(value) = ctx.get(name) {
        return value.clone();
    }
    match mode {
        Mode::Attribute => Value::String(name.to_string()),
        Mode::Value if ctx.program().is_widget(name) => ctx.widget_handle(name),
        Mode::Value => {
            ctx.record(DiagnosticKind::UnresolvedName, format!("unknown variable `{name}`"));
            Value::Null
        }
    }
}

/// Field access never faults: anything but a mapping yields `null`.
fn member(object: &Value, field: &str) -> Value {
    match object {
        Value::Map(fields) => fields.get(field).cloned().unwrap_or_default(),
        _ => Value::Null,
    }
}

fn eval_index(object: &Value, index: &Value) -> EvalResult<Value> {
    match object {
        Value::List(items) => {
            let Value::Number(n) = index else {
                return Err(Fault::mismatch(format!("list index must be a number, got {}", index.type_name())));
            };
            if n.fract() != 0.0 || *n < 0.0 || *n >= items.len() as f64 {
                return Err(Fault::IndexOutOfRange {
                    index: *n,
                    len: items.len(),
                });
            }
            Ok(items[*n as usize].clone())
        }
        Value::Map(_) => Ok(member(object, &index.to_string())),
        _ => Ok(Value::Null),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &mut InterpreterContext) -> EvalResult<Value> {
    // Short-circuit forms evaluate the right operand only when needed.
    match op {
        BinaryOp::And => {
            if !eval_expr(left, ctx, Mode::Value)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval_expr(right, ctx, Mode::Value)?.is_truthy()));
        }
        BinaryOp::Or => {
            if eval_expr(left, ctx, Mode::Value)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval_expr(right, ctx, Mode::Value)?.is_truthy()));
        }
        _ => {}
    }

    let l = eval_expr(left, ctx, Mode::Value)?;
    let r = eval_expr(right, ctx, Mode::Value)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::NotEq => Ok(Value::Bool(l != r)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (a, b) = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => (*a, *b),
                _ => {
                    return Err(Fault::mismatch(format!(
                        "cannot apply `{}` to {} and {}",
                        op.symbol(),
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            Ok(Value::Number(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ if b == 0.0 => f64::INFINITY,
                _ => a / b,
            }))
        }
        BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEq | BinaryOp::GreaterEq => {
            let ordering = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(Fault::mismatch(format!(
                        "cannot compare {} with {}",
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            // NaN compares false both ways.
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Less => ordering == Ordering::Less,
                BinaryOp::Greater => ordering == Ordering::Greater,
                BinaryOp::LessEq => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Null),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════════

/// Call a user function, falling back to built-ins when the document
/// defines no function with that name.
pub(crate) fn invoke(name: &str, args: Vec<Value>, ctx: &mut InterpreterContext) -> EvalResult<Value> {
    let program = ctx.program_arc();
    match program.function(name) {
        Some(def) => call_user(def, args, ctx),
        None => call_builtin(name, args, ctx),
    }
}

fn call_user(def: &FunctionDef, args: Vec<Value>, ctx: &mut InterpreterContext) -> EvalResult<Value> {
    ctx.enter_call()?;
    trace!(function = %def.name, depth = ctx.call_depth(), "call");
    bind_params(def, args, ctx);
    let flow = execute_block(&def.body, ctx);
    ctx.exit_call();
    Ok(match flow? {
        Flow::Return(value) => value,
        Flow::Normal | Flow::Suspend { .. } => Value::Null,
    })
}

/// Names handled by [`call_builtin`].
pub const BUILTINS: &[&str] = &["length", "rgb", "random", "visit", "play", "wait_sec"];

fn call_builtin(name: &str, args: Vec<Value>, ctx: &mut InterpreterContext) -> EvalResult<Value> {
    match name {
        "length" => length(args.first().unwrap_or(&Value::Null)),
        "rgb" => {
            let channel = |i: usize| -> EvalResult<u32> { Ok(number_arg(&args, i, name)?.round().clamp(0.0, 255.0) as u32) };
            let argb = 0xFF00_0000 | channel(0)? << 16 | channel(1)? << 8 | channel(2)?;
            Ok(Value::Number(f64::from(argb)))
        }
        "random" => {
            let lo = number_arg(&args, 0, name)?;
            let hi = number_arg(&args, 1, name)?;
            let n = ctx.random_int(lo.ceil() as i64, hi.floor() as i64);
            Ok(Value::Number(n as f64))
        }
        "visit" => {
            let url = args.first().map(Value::to_string).unwrap_or_default();
            ctx.push_effect(Effect::Visit { url });
            Ok(Value::Null)
        }
        "play" => {
            let media = args.first().map(Value::to_string).unwrap_or_default();
            ctx.push_effect(Effect::Play { media });
            Ok(Value::Null)
        }
        "wait_sec" => {
            ctx.record(
                DiagnosticKind::TypeMismatch,
                "`wait_sec` only suspends at the top level of an event handler; delay ignored",
            );
            Ok(Value::Null)
        }
        _ => {
            ctx.record(DiagnosticKind::UnresolvedName, format!("unknown function `{name}`"));
            Ok(Value::Null)
        }
    }
}

fn number_arg(args: &[Value], index: usize, function: &str) -> EvalResult<f64> {
    match args.get(index) {
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(Fault::mismatch(format!(
            "`{function}` argument {} must be a number, got {}",
            index + 1,
            other.type_name()
        ))),
        None => Err(Fault::mismatch(format!("`{function}` expects at least {} arguments", index + 1))),
    }
}

fn length(value: &Value) -> EvalResult<Value> {
    let len = match value {
        Value::List(items) => items.len(),
        Value::String(s) => s.chars().count(),
        Value::Map(fields) => fields.len(),
        other => return Err(Fault::mismatch(format!("{} has no length", other.type_name()))),
    };
    Ok(Value::Number(len as f64))
}

// ── List methods ─────────────────────────────────────────────────────────

fn eval_method(
    object: &Expr,
    receiver: Value,
    method: &str,
    args: Vec<Value>,
    ctx: &mut InterpreterContext,
) -> EvalResult<Value> {
    let arg = args.into_iter().next().unwrap_or_default();
    match (method, receiver) {
        ("length", receiver) => length(&receiver),
        ("contains", Value::List(items)) => Ok(Value::Bool(items.contains(&arg))),
        ("contains", Value::String(s)) => Ok(Value::Bool(s.contains(arg.to_string().as_str()))),
        ("index", Value::List(items)) => Ok(Value::Number(
            items.iter().position(|item| *item == arg).map_or(-1.0, |i| i as f64),
        )),
        ("add", Value::List(mut items)) => {
            items.push(arg);
            write_back(object, Value::List(items), ctx)?;
            Ok(Value::Null)
        }
        ("remove", Value::List(mut items)) => {
            if let Some(position) = items.iter().position(|item| *item == arg) {
                items.remove(position);
                write_back(object, Value::List(items), ctx)?;
            }
            Ok(Value::Null)
        }
        ("add" | "remove" | "index" | "contains", other) => Err(Fault::mismatch(format!(
            "`{method}` is a list method, called on {}",
            other.type_name()
        ))),
        (_, _) => {
            ctx.record(DiagnosticKind::UnresolvedName, format!("unknown method `{method}`"));
            Ok(Value::Null)
        }
    }
}

/// Store a mutated receiver back where it was read from, when it was read
/// from a variable or a member path.
fn write_back(object: &Expr, value: Value, ctx: &mut InterpreterContext) -> EvalResult<()> {
    match target_path(object) {
        Some(path) => write_path(&path, value, ctx),
        None => Ok(()),
    }
}

/// `a.b.c` as `["a", "b", "c"]`.
pub(crate) fn target_path(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Var(name) => Some(vec![name.clone()]),
        Expr::Member { object, field } => {
            let mut path = target_path(object)?;
            path.push(field.clone());
            Some(path)
        }
        _ => None,
    }
}
