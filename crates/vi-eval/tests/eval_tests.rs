//! Integration tests for expression evaluation and statement execution.
//!
//! Covers:
//! - arithmetic, comparison and logical operators
//! - forgiving member/index access and recoverable faults
//! - user functions, built-ins and list methods
//! - assignment paths, loops, overrides and suspension
//! - gas and call-depth budgets

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use vi_eval::{
    evaluate, evaluate_attribute, execute_block, Diagnostic, DiagnosticKind, Effect, EngineConfig, Fault, Flow,
    InterpreterContext, Program,
};
use vi_types::ast::{BinaryOp, Expr, Stmt};
use vi_types::{decode_document, decode_expr, decode_stmt, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// A context over a document with the given tree and functions and no state.
fn context_with(tree: serde_json::Value, functions: serde_json::Value, config: EngineConfig) -> InterpreterContext {
    let doc = decode_document(&json!({ "tree": tree, "functions": functions })).expect("document should decode");
    InterpreterContext::new(Arc::new(Program::new(&doc)), config)
}

fn context() -> InterpreterContext {
    context_with(json!({"widget": "Box"}), json!({}), EngineConfig::default())
}

fn expr(json: serde_json::Value) -> Expr {
    decode_expr(&json).expect("expression should decode")
}

fn stmts(json: serde_json::Value) -> Vec<Stmt> {
    json.as_array()
        .expect("statement list")
        .iter()
        .map(|s| decode_stmt(s).expect("statement should decode"))
        .collect()
}

fn eval_in(ctx: &mut InterpreterContext, json: serde_json::Value) -> Value {
    evaluate(&expr(json), ctx).expect("no budget fault")
}

/// Evaluate in a fresh context, returning the value and its diagnostics.
fn eval(json: serde_json::Value) -> (Value, Vec<Diagnostic>) {
    let mut ctx = context();
    let value = eval_in(&mut ctx, json);
    (value, ctx.take_diagnostics())
}

fn kinds(diagnostics: &[Diagnostic]) -> Vec<DiagnosticKind> {
    diagnostics.iter().map(|d| d.kind).collect()
}

fn lit(value: serde_json::Value) -> serde_json::Value {
    json!({"type": "literal", "value": value})
}

fn var(name: &str) -> serde_json::Value {
    json!({"type": "var", "name": name})
}

fn bin(op: &str, left: serde_json::Value, right: serde_json::Value) -> serde_json::Value {
    json!({"type": "binary_op", "op": op, "left": left, "right": right})
}

fn call(name: &str, args: serde_json::Value) -> serde_json::Value {
    json!({"type": "call", "function": {"type": "var", "name": name}, "args": args})
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn arithmetic_precedence_is_structural() {
    let (value, diags) = eval(bin("+", lit(json!(2)), bin("*", lit(json!(3)), lit(json!(4)))));
    assert_eq!(value, Value::Number(14.0));
    assert!(diags.is_empty());
}

#[test]
fn division_by_zero_is_infinity() {
    let (value, diags) = eval(bin("/", lit(json!(10)), lit(json!(0))));
    assert_eq!(value, Value::Number(f64::INFINITY));
    assert_eq!(value.to_string(), "Infinity");
    assert!(diags.is_empty());
}

#[test]
fn adding_string_and_number_is_a_type_mismatch() {
    let (value, diags) = eval(bin("+", lit(json!("a")), lit(json!(1))));
    assert_eq!(value, Value::Null);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn fault_deep_in_expression_nulls_the_whole_expression_once() {
    // (1 + "x") * 2
    let (value, diags) = eval(bin("*", bin("+", lit(json!(1)), lit(json!("x"))), lit(json!(2))));
    assert_eq!(value, Value::Null);
    assert_eq!(diags.len(), 1);
}

#[test]
fn string_comparison_is_lexicographic() {
    assert_eq!(eval(bin("<", lit(json!("apple")), lit(json!("banana")))).0, Value::Bool(true));
    assert_eq!(eval(bin(">=", lit(json!(3)), lit(json!(3)))).0, Value::Bool(true));
    let (value, diags) = eval(bin("<", lit(json!(1)), lit(json!("1"))));
    assert_eq!(value, Value::Null);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn equality_is_structural() {
    let list = json!({"type": "array", "elements": [1, "a", [true]]});
    assert_eq!(eval(bin("==", list.clone(), list.clone())).0, Value::Bool(true));
    assert_eq!(eval(bin("!=", lit(json!(1)), lit(json!("1")))).0, Value::Bool(true));
    assert_eq!(eval(bin("==", lit(json!(null)), lit(json!(null)))).0, Value::Bool(true));
}

#[test]
fn logical_operators_short_circuit() {
    let (value, diags) = eval(bin("and", lit(json!(false)), call("missing", json!([]))));
    assert_eq!(value, Value::Bool(false));
    assert!(diags.is_empty());

    let (value, diags) = eval(bin("or", lit(json!(1)), call("missing", json!([]))));
    assert_eq!(value, Value::Bool(true));
    assert!(diags.is_empty());

    assert_eq!(eval(bin("and", lit(json!("x")), lit(json!([1])))).0, Value::Bool(true));
}

#[test]
fn unary_operators() {
    assert_eq!(eval(json!({"type": "unary_op", "op": "not", "operand": lit(json!(""))})).0, Value::Bool(true));
    assert_eq!(eval(json!({"type": "unary_op", "op": "-", "operand": lit(json!(4))})).0, Value::Number(-4.0));
    let (value, diags) = eval(json!({"type": "unary_op", "op": "-", "operand": lit(json!("4"))}));
    assert_eq!(value, Value::Null);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn ternary_evaluates_only_the_chosen_branch() {
    let (value, diags) = eval(json!({
        "type": "ternary",
        "condition": lit(json!(true)),
        "then": lit(json!(1)),
        "else": call("missing", json!([])),
    }));
    assert_eq!(value, Value::Number(1.0));
    assert!(diags.is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Names, members and indexing
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn unknown_variable_is_null_with_diagnostic() {
    let (value, diags) = eval(var("ghost"));
    assert_eq!(value, Value::Null);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::UnresolvedName]);
}

#[test]
fn attribute_keywords_stand_for_themselves() {
    let mut ctx = context();
    ctx.set("accent", Value::from("blue"));
    let pick = json!({"type": "ternary", "condition": lit(json!(true)), "then": var("red"), "else": var("accent")});
    assert_eq!(evaluate_attribute(&expr(pick), &mut ctx), Ok(Value::from("red")));
    assert_eq!(evaluate_attribute(&expr(var("accent")), &mut ctx), Ok(Value::from("blue")));
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn member_access_is_forgiving() {
    let mut ctx = context();
    ctx.set(
        "user",
        Value::Map(BTreeMap::from([("name".to_string(), Value::from("Ada"))])),
    );
    assert_eq!(eval_in(&mut ctx, json!({"type": "member", "object": var("user"), "field": "name"})), Value::from("Ada"));
    assert_eq!(eval_in(&mut ctx, json!({"type": "member", "object": var("user"), "field": "age"})), Value::Null);
    assert_eq!(eval_in(&mut ctx, json!({"type": "member", "object": lit(json!(5)), "field": "x"})), Value::Null);
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn list_index_out_of_range_faults() {
    let list = json!({"type": "array", "elements": [10, 20]});
    let (value, diags) = eval(json!({"type": "index", "object": list.clone(), "index": lit(json!(1))}));
    assert_eq!(value, Value::Number(20.0));
    assert!(diags.is_empty());

    let (value, diags) = eval(json!({"type": "index", "object": list.clone(), "index": lit(json!(2))}));
    assert_eq!(value, Value::Null);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::IndexOutOfRange]);

    let (_, diags) = eval(json!({"type": "index", "object": list, "index": lit(json!("0"))}));
    assert_eq!(kinds(&diags), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn mapping_index_uses_display_form() {
    let object = json!({"type": "object", "properties": {"1": "one"}});
    let (value, _) = eval(json!({"type": "index", "object": object, "index": lit(json!(1))}));
    assert_eq!(value, Value::from("one"));
}

#[test]
fn widget_names_evaluate_to_handles() {
    let tree = json!({
        "widget": "Repeated",
        "name": "grid",
        "instances": [
            {"widget": "Container", "name": "grid_X0Y0"},
            {"widget": "Container", "name": "grid_X1Y0"},
        ],
    });
    let mut ctx = context_with(tree, json!({}), EngineConfig::default());
    let fields = match eval_in(&mut ctx, var("grid")) {
        Value::Map(fields) => fields,
        other => panic!("expected a widget handle, got {other:?}"),
    };
    assert_eq!(fields["name"], Value::from("grid"));
    assert_eq!(
        fields["children"],
        Value::List(vec![Value::from("grid_X0Y0"), Value::from("grid_X1Y0")])
    );
    assert!(ctx.diagnostics().is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn user_function_binds_params_into_state() {
    let functions = json!({
        "double": {"params": ["n"], "body": [
            {"type": "return", "value": bin("*", var("n"), lit(json!(2)))}
        ]}
    });
    let mut ctx = context_with(json!({"widget": "Box"}), functions, EngineConfig::default());
    assert_eq!(eval_in(&mut ctx, call("double", json!([lit(json!(4))]))), Value::Number(8.0));
    assert_eq!(ctx.get("n"), Some(&Value::Number(4.0)));
}

#[test]
fn function_without_return_yields_null() {
    let functions = json!({"noop": {"body": []}});
    let mut ctx = context_with(json!({"widget": "Box"}), functions, EngineConfig::default());
    assert_eq!(eval_in(&mut ctx, call("noop", json!([]))), Value::Null);
}

#[test]
fn unknown_function_is_null_with_one_diagnostic() {
    let (value, diags) = eval(call("nowhere", json!([lit(json!(1))])));
    assert_eq!(value, Value::Null);
    assert_eq!(kinds(&diags), vec![DiagnosticKind::UnresolvedName]);
}

#[test]
fn builtin_length_and_rgb() {
    assert_eq!(
        eval(call("length", json!([{"type": "array", "elements": [1, 2, 3]}]))).0,
        Value::Number(3.0)
    );
    assert_eq!(eval(call("length", json!([lit(json!("héllo"))]))).0, Value::Number(5.0));
    assert_eq!(
        eval(call("rgb", json!([lit(json!(255)), lit(json!(0)), lit(json!(0))]))).0,
        Value::Number(f64::from(0xFFFF0000u32))
    );
}

#[test]
fn random_is_seeded_and_in_range() {
    let roll = call("random", json!([lit(json!(1)), lit(json!(6))]));
    let sample = |seed: u64| -> Vec<Value> {
        let mut ctx = context_with(json!({"widget": "Box"}), json!({}), EngineConfig::default().with_rng_seed(seed));
        (0..20).map(|_| eval_in(&mut ctx, roll.clone())).collect()
    };
    let first = sample(7);
    assert_eq!(first, sample(7));
    for value in &first {
        let n = value.as_number().expect("number");
        assert!((1.0..=6.0).contains(&n) && n.fract() == 0.0, "{n} out of range");
    }
}

#[test]
fn visit_and_play_request_host_effects() {
    let mut ctx = context();
    eval_in(&mut ctx, call("visit", json!([lit(json!("https://example.com"))])));
    eval_in(&mut ctx, call("play", json!([lit(json!("ding.mp3"))])));
    assert_eq!(
        ctx.take_effects(),
        vec![
            Effect::Visit {
                url: "https://example.com".to_string()
            },
            Effect::Play {
                media: "ding.mp3".to_string()
            },
        ]
    );
}

#[test]
fn list_methods_write_back_to_state() {
    let mut ctx = context();
    ctx.set("items", Value::List(vec![Value::from(1.0), Value::from(2.0)]));
    let method = |name: &str, arg: serde_json::Value| {
        json!({"type": "method_call", "object": var("items"), "method": name, "args": [arg]})
    };

    eval_in(&mut ctx, method("add", lit(json!(3))));
    assert_eq!(
        ctx.get("items"),
        Some(&Value::List(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]))
    );
    eval_in(&mut ctx, method("remove", lit(json!(1))));
    assert_eq!(ctx.get("items"), Some(&Value::List(vec![Value::from(2.0), Value::from(3.0)])));
    assert_eq!(eval_in(&mut ctx, method("index", lit(json!(3)))), Value::Number(1.0));
    assert_eq!(eval_in(&mut ctx, method("index", lit(json!(9)))), Value::Number(-1.0));
    assert_eq!(eval_in(&mut ctx, method("contains", lit(json!(2)))), Value::Bool(true));
    assert!(ctx.diagnostics().is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn assign_member_path_builds_nested_mappings() {
    let mut ctx = context();
    let body = stmts(json!([
        {"type": "assign", "target": {"type": "member", "object": {"type": "member", "object": var("user"), "field": "address"}, "field": "city"}, "value": lit(json!("Oslo"))},
    ]));
    // `user` is unknown: nothing is written.
    execute_block(&body, &mut ctx).unwrap();
    assert_eq!(ctx.get("user"), None);
    assert_eq!(kinds(ctx.diagnostics()), vec![DiagnosticKind::UnresolvedName]);

    ctx.take_diagnostics();
    ctx.set("user", Value::Null);
    execute_block(&body, &mut ctx).unwrap();
    let expected = json!({"address": {"city": "Oslo"}});
    assert_eq!(ctx.get("user").map(Value::to_json), Some(expected));
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn loop_variable_keeps_last_element() {
    let mut ctx = context();
    ctx.set("total", Value::from(0.0));
    let body = stmts(json!([
        {"type": "for", "var": "cell", "iterable": {"type": "array", "elements": [1, 2, 3]}, "body": [
            {"type": "assign", "target": "total", "value": bin("+", var("total"), var("cell"))}
        ]}
    ]));
    assert_eq!(execute_block(&body, &mut ctx), Ok(Flow::Normal));
    assert_eq!(ctx.get("total"), Some(&Value::Number(6.0)));
    assert_eq!(ctx.get("cell"), Some(&Value::Number(3.0)));
    assert!(ctx.is_dirty());
}

#[test]
fn faulting_statement_does_not_stop_the_next_one() {
    let mut ctx = context();
    let body = stmts(json!([
        {"type": "for", "var": "x", "iterable": lit(json!(5)), "body": []},
        {"type": "assign", "target": "after", "value": lit(json!(true))},
    ]));
    execute_block(&body, &mut ctx).unwrap();
    assert_eq!(ctx.get("after"), Some(&Value::Bool(true)));
    assert_eq!(kinds(ctx.diagnostics()), vec![DiagnosticKind::TypeMismatch]);
}

#[test]
fn return_short_circuits_the_body() {
    let mut ctx = context();
    let body = stmts(json!([
        {"type": "if", "condition": lit(json!(true)), "then": [{"type": "return", "value": lit(json!(1))}]},
        {"type": "assign", "target": "unreached", "value": lit(json!(true))},
    ]));
    assert_eq!(execute_block(&body, &mut ctx), Ok(Flow::Return(Value::Number(1.0))));
    assert_eq!(ctx.get("unreached"), None);
}

#[test]
fn wait_sec_suspends_with_the_remaining_statements() {
    let mut ctx = context();
    let body = stmts(json!([
        {"type": "assign", "target": "step", "value": lit(json!(1))},
        {"type": "expr_stmt", "expr": call("wait_sec", json!([lit(json!(2))]))},
        {"type": "assign", "target": "step", "value": lit(json!(2))},
    ]));
    let Ok(Flow::Suspend { seconds, rest }) = execute_block(&body, &mut ctx) else {
        panic!("expected suspension");
    };
    assert_eq!(seconds, 2.0);
    assert_eq!(rest, body[2..].to_vec());
    assert_eq!(ctx.get("step"), Some(&Value::Number(1.0)));
}

#[test]
fn wait_sec_inside_a_loop_carries_remaining_iterations() {
    let mut ctx = context();
    let body = stmts(json!([
        {"type": "for", "var": "i", "iterable": {"type": "array", "elements": [1, 2, 3]}, "body": [
            {"type": "expr_stmt", "expr": call("wait_sec", json!([lit(json!(1))]))},
        ]},
        {"type": "assign", "target": "done", "value": lit(json!(true))},
    ]));
    let Ok(Flow::Suspend { rest, .. }) = execute_block(&body, &mut ctx) else {
        panic!("expected suspension");
    };
    assert_eq!(ctx.get("i"), Some(&Value::Number(1.0)));
    assert_eq!(rest.len(), 2);
    let Stmt::For { iterable, .. } = &rest[0] else {
        panic!("expected the loop remainder first, got {:?}", rest[0]);
    };
    assert_eq!(
        iterable,
        &Expr::Literal(Value::List(vec![Value::from(2.0), Value::from(3.0)]))
    );
}

#[test]
fn wait_sec_in_nested_call_is_ignored_with_diagnostic() {
    let functions = json!({
        "pause": {"body": [{"type": "expr_stmt", "expr": call("wait_sec", json!([lit(json!(1))]))}]}
    });
    let mut ctx = context_with(json!({"widget": "Box"}), functions, EngineConfig::default());
    let body = stmts(json!([{"type": "expr_stmt", "expr": call("pause", json!([]))}]));
    assert_eq!(execute_block(&body, &mut ctx), Ok(Flow::Normal));
    assert_eq!(ctx.diagnostics().len(), 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Overrides
// ══════════════════════════════════════════════════════════════════════════════

fn grid_tree() -> serde_json::Value {
    json!({
        "widget": "Column",
        "children": [
            {"widget": "ElevatedButton", "name": "button"},
            {"widget": "Container", "name": "label"},
            {"widget": "Repeated", "name": "grid", "instances": [
                {"widget": "Container", "name": "grid_X0Y0"},
                {"widget": "Container", "name": "grid_X1Y2"},
            ]},
        ],
    })
}

#[test]
fn modify_container_targets() {
    let mut ctx = context_with(grid_tree(), json!({}), EngineConfig::default());
    ctx.set("target", Value::from("label"));
    let body = stmts(json!([
        {"type": "modify_container", "target": "button", "attributes": {"color": var("red")}},
        {"type": "modify_container", "target": var("target"), "attributes": {"text_content": lit(json!("hi"))}},
        {"type": "modify_container", "target": {"type": "member", "object": var("grid"), "field": "X1Y2"}, "attributes": {"visibility": lit(json!(false))}},
        {"type": "modify_container", "target": "nowhere", "attributes": {"color": var("red")}},
    ]));
    execute_block(&body, &mut ctx).unwrap();

    let overrides = ctx.overrides();
    assert_eq!(overrides.attr("button", "color"), Some(&Value::from("red")));
    assert_eq!(overrides.attr("label", "text"), Some(&Value::from("hi")));
    assert_eq!(overrides.attr("grid_X1Y2", "visibility"), Some(&Value::Bool(false)));
    assert!(!overrides.contains("nowhere"));
    assert!(!overrides.contains("grid_X0Y0"));
    assert_eq!(kinds(ctx.diagnostics()), vec![DiagnosticKind::UnresolvedName]);
}

#[test]
fn member_assign_on_widget_variable_writes_override() {
    let mut ctx = context_with(grid_tree(), json!({}), EngineConfig::default());
    let body = stmts(json!([
        {"type": "for", "var": "cell", "iterable": {"type": "array", "elements": ["grid_X0Y0", "grid_X1Y2"]}, "body": [
            {"type": "assign", "target": {"type": "member", "object": var("cell"), "field": "color"}, "value": lit(json!("green"))}
        ]},
        {"type": "assign", "target": {"type": "member", "object": var("label"), "field": "text"}, "value": lit(json!("done"))},
    ]));
    execute_block(&body, &mut ctx).unwrap();
    assert_eq!(ctx.overrides().attr("grid_X0Y0", "color"), Some(&Value::from("green")));
    assert_eq!(ctx.overrides().attr("grid_X1Y2", "color"), Some(&Value::from("green")));
    assert_eq!(ctx.overrides().attr("label", "text"), Some(&Value::from("done")));
    assert_eq!(ctx.get("cell"), Some(&Value::from("grid_X1Y2")));
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn member_assign_on_widget_reads_keywords() {
    let mut ctx = context_with(grid_tree(), json!({}), EngineConfig::default());
    let body = stmts(json!([
        {"type": "for", "var": "cell", "iterable": {"type": "array", "elements": ["grid_X0Y0", "grid_X1Y2"]}, "body": [
            {"type": "assign", "target": {"type": "member", "object": var("cell"), "field": "color"}, "value": var("red")}
        ]},
        {"type": "assign", "target": "shade", "value": var("red")},
    ]));
    execute_block(&body, &mut ctx).unwrap();
    assert_eq!(ctx.overrides().attr("grid_X0Y0", "color"), Some(&Value::from("red")));
    assert_eq!(ctx.overrides().attr("grid_X1Y2", "color"), Some(&Value::from("red")));
    // Plain state assignment still reads `red` as an unknown variable.
    assert_eq!(ctx.get("shade"), Some(&Value::Null));
    assert_eq!(kinds(ctx.diagnostics()), vec![DiagnosticKind::UnresolvedName]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Budgets
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn gas_exhaustion_escapes_as_error() {
    let mut ctx = context_with(json!({"widget": "Box"}), json!({}), EngineConfig::default().with_gas_limit(50));
    let items: Vec<i32> = (0..100).collect();
    let body = stmts(json!([
        {"type": "for", "var": "i", "iterable": {"type": "array", "elements": items}, "body": [
            {"type": "assign", "target": "last", "value": var("i")}
        ]}
    ]));
    assert_eq!(execute_block(&body, &mut ctx), Err(Fault::GasExhausted(50)));
}

#[test]
fn runaway_recursion_hits_call_depth() {
    let functions = json!({
        "forever": {"body": [{"type": "return", "value": call("forever", json!([]))}]}
    });
    let config = EngineConfig::default().with_max_call_depth(16);
    let mut ctx = context_with(json!({"widget": "Box"}), functions, config);
    let result = evaluate(&Expr::call("forever"), &mut ctx);
    assert_eq!(result, Err(Fault::CallDepthExceeded(16)));
    assert!(result.unwrap_err().is_abort());
}

#[test]
fn builder_expressions_match_decoded_ones() {
    let built = Expr::binary(BinaryOp::Add, Expr::var("a"), Expr::lit(1.0));
    assert_eq!(built, expr(bin("+", var("a"), lit(json!(1)))));
}
