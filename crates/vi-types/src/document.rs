//! JSON → AST decoding for compiled documents.
//!
//! Accepts both the short schema (`{"type": "call", "name": "f"}`) and the
//! shape emitted by the block compiler (`{"type": "call", "function":
//! {"type": "var", "name": "f"}, "args": []}`). Every error carries a
//! JSON-path-like location such as `$.tree.children[2].props.width`.

use crate::ast::*;
use crate::error::{LoadError, LoadResult};
use crate::Value;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

const EXPR_TAGS: &[&str] = &[
    "literal",
    "var",
    "binary_op",
    "unary_op",
    "member",
    "index",
    "call",
    "method_call",
    "ternary",
    "array",
    "object",
    "kvpair",
];

/// Parse and decode a document from JSON text.
pub fn parse_document(source: &str) -> LoadResult<Document> {
    let json: Json = serde_json::from_str(source)?;
    decode_document(&json)
}

/// Decode an already-parsed JSON document.
#[instrument(level = "debug", skip_all)]
pub fn decode_document(json: &Json) -> LoadResult<Document> {
    let root = as_object(json, "$")?;

    let tree_json = root
        .get("tree")
        .filter(|t| !t.is_null())
        .ok_or_else(|| LoadError::malformed("$", "missing widget tree"))?;
    let tree = decode_widget(tree_json, "$.tree")?;

    let mut state = BTreeMap::new();
    if let Some(decls) = optional_object(root, "state", "$")? {
        for (name, decl) in decls {
            let path = format!("$.state.{name}");
            let initial = match decl {
                Json::Object(fields) if fields.contains_key("initial") => {
                    decode_expr_at(&fields["initial"], &format!("{path}.initial"))?
                }
                other => decode_expr_at(other, &path)?,
            };
            state.insert(name.clone(), initial);
        }
    }

    let mut functions = BTreeMap::new();
    if let Some(defs) = optional_object(root, "functions", "$")? {
        for (name, def) in defs {
            let path = format!("$.functions.{name}");
            functions.insert(name.clone(), decode_function(name, def, &path)?);
        }
    }

    debug!(
        state = state.len(),
        functions = functions.len(),
        "document decoded"
    );
    Ok(Document {
        tree,
        state,
        functions,
    })
}

/// Decode a single expression (path reported as `$`).
pub fn decode_expr(json: &Json) -> LoadResult<Expr> {
    decode_expr_at(json, "$")
}

/// Decode a single statement (path reported as `$`).
pub fn decode_stmt(json: &Json) -> LoadResult<Stmt> {
    decode_stmt_at(json, "$")
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions & statements
// ══════════════════════════════════════════════════════════════════════════════

fn decode_function(name: &str, json: &Json, path: &str) -> LoadResult<FunctionDef> {
    let obj = as_object(json, path)?;
    let params = match obj.get("params") {
        None | Some(Json::Null) => Vec::new(),
        Some(Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| LoadError::malformed(&format!("{path}.params[{i}]"), "parameter must be a string"))
            })
            .collect::<LoadResult<_>>()?,
        Some(_) => return Err(LoadError::malformed(path, "`params` must be a list")),
    };
    let body = decode_block(obj.get("body"), &format!("{path}.body"))?;
    Ok(FunctionDef {
        name: name.to_string(),
        params,
        body,
    })
}

fn decode_block(json: Option<&Json>, path: &str) -> LoadResult<Vec<Stmt>> {
    match json {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, s)| decode_stmt_at(s, &format!("{path}[{i}]")))
            .collect(),
        Some(_) => Err(LoadError::malformed(path, "statement block must be a list")),
    }
}

fn decode_stmt_at(json: &Json, path: &str) -> LoadResult<Stmt> {
    let obj = as_object(json, path)?;
    let tag = type_tag(obj, path)?;
    match tag {
        "assign" => {
            let target = decode_assign_target(required(obj, "target", path)?, &format!("{path}.target"))?;
            let value = decode_expr_at(required(obj, "value", path)?, &format!("{path}.value"))?;
            Ok(Stmt::Assign { target, value })
        }
        "return" => {
            let value = match obj.get("value") {
                None | Some(Json::Null) => None,
                Some(v) => Some(decode_expr_at(v, &format!("{path}.value"))?),
            };
            Ok(Stmt::Return(value))
        }
        "if" => Ok(Stmt::If {
            condition: decode_expr_at(required(obj, "condition", path)?, &format!("{path}.condition"))?,
            then_body: decode_block(obj.get("then"), &format!("{path}.then"))?,
            else_body: decode_block(obj.get("else"), &format!("{path}.else"))?,
        }),
        "for" => {
            let var = required_str(obj, "var", path)?.to_string();
            if var.is_empty() {
                return Err(LoadError::malformed(path, "loop variable name is empty"));
            }
            Ok(Stmt::For {
                var,
                iterable: decode_expr_at(required(obj, "iterable", path)?, &format!("{path}.iterable"))?,
                body: decode_block(obj.get("body"), &format!("{path}.body"))?,
            })
        }
        "expr_stmt" => Ok(Stmt::Expr(decode_expr_at(
            required(obj, "expr", path)?,
            &format!("{path}.expr"),
        )?)),
        "modify_container" => {
            let target_json = required(obj, "target", path)?;
            let target = match target_json {
                Json::String(name) => Expr::Literal(Value::String(name.clone())),
                other => decode_expr_at(other, &format!("{path}.target"))?,
            };
            let attrs_path = format!("{path}.attributes");
            let mut attributes = BTreeMap::new();
            for (key, value) in as_object(required(obj, "attributes", path)?, &attrs_path)? {
                attributes.insert(key.clone(), decode_expr_at(value, &format!("{attrs_path}.{key}"))?);
            }
            Ok(Stmt::ModifyContainer { target, attributes })
        }
        other => Err(LoadError::malformed(path, format!("unknown statement type `{other}`"))),
    }
}

/// `x`, `{"type": "var", "name": "x"}` or a member chain `a.b.c`.
fn decode_assign_target(json: &Json, path: &str) -> LoadResult<Vec<String>> {
    if let Json::String(name) = json {
        return Ok(vec![name.clone()]);
    }
    let mut segments = Vec::new();
    let mut current = decode_expr_at(json, path)?;
    loop {
        match current {
            Expr::Var(name) => {
                segments.push(name);
                break;
            }
            Expr::Member { object, field } => {
                segments.push(field);
                current = *object;
            }
            _ => {
                return Err(LoadError::malformed(
                    path,
                    "assignment target must be a variable or member chain",
                ))
            }
        }
    }
    segments.reverse();
    Ok(segments)
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

fn decode_expr_at(json: &Json, path: &str) -> LoadResult<Expr> {
    let obj = match json {
        Json::Object(obj) => obj,
        // Bare values are literals.
        other => return Ok(Expr::Literal(Value::from(other))),
    };
    let tag = type_tag(obj, path)?;
    let sub = |key: &str| -> LoadResult<Expr> {
        decode_expr_at(required(obj, key, path)?, &format!("{path}.{key}"))
    };
    let boxed = |key: &str| -> LoadResult<Box<Expr>> { sub(key).map(Box::new) };

    match tag {
        "literal" => Ok(Expr::Literal(obj.get("value").map(Value::from).unwrap_or_default())),
        "var" => Ok(Expr::Var(required_str(obj, "name", path)?.to_string())),
        "binary_op" => {
            let symbol = required_str(obj, "op", path)?;
            let op = BinaryOp::from_symbol(symbol)
                .ok_or_else(|| LoadError::malformed(path, format!("unknown binary operator `{symbol}`")))?;
            Ok(Expr::Binary {
                op,
                left: boxed("left")?,
                right: boxed("right")?,
            })
        }
        "unary_op" => {
            let op = match required_str(obj, "op", path)? {
                "!" | "not" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                other => {
                    return Err(LoadError::malformed(path, format!("unknown unary operator `{other}`")))
                }
            };
            Ok(Expr::Unary {
                op,
                operand: boxed("operand")?,
            })
        }
        "member" => Ok(Expr::Member {
            object: boxed("object")?,
            field: required_str(obj, "field", path)?.to_string(),
        }),
        "index" => Ok(Expr::Index {
            object: boxed("object")?,
            index: boxed("index")?,
        }),
        "call" => {
            let function = call_target(obj, path)?;
            let args = decode_args(obj, path)?;
            Ok(Expr::Call { function, args })
        }
        "method_call" => Ok(Expr::MethodCall {
            object: boxed("object")?,
            method: required_str(obj, "method", path)?.to_string(),
            args: decode_args(obj, path)?,
        }),
        "ternary" => Ok(Expr::Ternary {
            condition: boxed("condition")?,
            then_branch: boxed("then")?,
            else_branch: boxed("else")?,
        }),
        "array" => decode_array(obj, path),
        "object" => {
            let props_path = format!("{path}.properties");
            let mut entries = Vec::new();
            if let Some(props) = optional_object(obj, "properties", path)? {
                for (key, value) in props {
                    entries.push((key.clone(), decode_expr_at(value, &format!("{props_path}.{key}"))?));
                }
            }
            Ok(Expr::Object(entries))
        }
        "kvpair" => Err(LoadError::malformed(path, "key/value pair outside of a list")),
        other => Err(LoadError::malformed(path, format!("unknown expression type `{other}`"))),
    }
}

/// The callee of a call: `"name": "f"`, `"function": "f"` or
/// `"function": {"type": "var", "name": "f"}`.
fn call_target(obj: &Map<String, Json>, path: &str) -> LoadResult<String> {
    if let Some(Json::String(name)) = obj.get("name") {
        return Ok(name.clone());
    }
    match obj.get("function") {
        Some(Json::String(name)) => Ok(name.clone()),
        Some(Json::Object(f)) if f.get("type").and_then(Json::as_str) == Some("var") => {
            Ok(required_str(f, "name", &format!("{path}.function"))?.to_string())
        }
        Some(_) => Err(LoadError::malformed(path, "call target must be a function name")),
        None => Err(LoadError::malformed(path, "call without a function name")),
    }
}

fn decode_args(obj: &Map<String, Json>, path: &str) -> LoadResult<Vec<Expr>> {
    match obj.get("args") {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, a)| decode_expr_at(a, &format!("{path}.args[{i}]")))
            .collect(),
        Some(_) => Err(LoadError::malformed(path, "`args` must be a list")),
    }
}

/// Lists of `key: value` pairs (as used for text styles) become objects.
fn decode_array(obj: &Map<String, Json>, path: &str) -> LoadResult<Expr> {
    let elements = match obj.get("elements") {
        None | Some(Json::Null) => return Ok(Expr::Array(Vec::new())),
        Some(Json::Array(items)) => items,
        Some(_) => return Err(LoadError::malformed(path, "`elements` must be a list")),
    };
    let is_pair = |e: &Json| e.get("type").and_then(Json::as_str) == Some("kvpair");
    let pairs = elements.iter().filter(|e| is_pair(e)).count();

    if pairs > 0 && pairs == elements.len() {
        let mut entries = Vec::with_capacity(pairs);
        for (i, element) in elements.iter().enumerate() {
            let element_path = format!("{path}.elements[{i}]");
            let pair = as_object(element, &element_path)?;
            let key = required_str(pair, "key", &element_path)?.to_string();
            let value = decode_expr_at(required(pair, "value", &element_path)?, &format!("{element_path}.value"))?;
            entries.push((key, value));
        }
        return Ok(Expr::Object(entries));
    }
    if pairs > 0 {
        return Err(LoadError::malformed(path, "list mixes key/value pairs and plain elements"));
    }
    elements
        .iter()
        .enumerate()
        .map(|(i, e)| decode_expr_at(e, &format!("{path}.elements[{i}]")))
        .collect::<LoadResult<_>>()
        .map(Expr::Array)
}

// ══════════════════════════════════════════════════════════════════════════════
// Widgets
// ══════════════════════════════════════════════════════════════════════════════

fn decode_widget(json: &Json, path: &str) -> LoadResult<WidgetNode> {
    let obj = as_object(json, path)?;
    let tag = required_str(obj, "widget", path)?.to_string();
    let kind = WidgetKind::from_tag(&tag);
    let name = match obj.get("name") {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) => Some(s.clone()),
        Some(_) => return Err(LoadError::malformed(path, "widget name must be a string")),
    };

    let attrs = match optional_object(obj, "props", path)? {
        Some(props) => decode_props(props, &format!("{path}.props"))?,
        None => BTreeMap::new(),
    };

    let children = decode_widget_list(obj.get("children"), &format!("{path}.children"))?;

    let has_instances = obj.get("instances").is_some_and(|v| !v.is_null());
    let has_template = obj.get("template").is_some_and(|v| !v.is_null());
    let repeat = if has_instances || has_template {
        if kind != WidgetKind::Repeated {
            return Err(LoadError::malformed(
                path,
                format!("`{tag}` widget cannot carry repeated instances"),
            ));
        }
        if has_instances {
            Some(Repetition::Expanded(decode_widget_list(
                obj.get("instances"),
                &format!("{path}.instances"),
            )?))
        } else {
            let template = decode_widget(&obj["template"], &format!("{path}.template"))?;
            let counts = match obj.get("repeat_expr") {
                Some(Json::Array(items)) => items
                    .iter()
                    .enumerate()
                    .map(|(i, e)| decode_expr_at(e, &format!("{path}.repeat_expr[{i}]")))
                    .collect::<LoadResult<Vec<_>>>()?,
                _ => return Err(LoadError::malformed(path, "template repetition needs `repeat_expr`")),
            };
            Some(Repetition::Template {
                template: Box::new(template),
                counts,
            })
        }
    } else if kind == WidgetKind::Repeated {
        return Err(LoadError::malformed(path, "repeated widget without instances"));
    } else {
        None
    };

    Ok(WidgetNode {
        kind,
        tag,
        name,
        attrs,
        children,
        repeat,
    })
}

fn decode_widget_list(json: Option<&Json>, path: &str) -> LoadResult<Vec<WidgetNode>> {
    match json {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, w)| decode_widget(w, &format!("{path}[{i}]")))
            .collect(),
        Some(_) => Err(LoadError::malformed(path, "expected a list of widgets")),
    }
}

/// Normalise compiler props into attributes.
///
/// `color_expr` and `text_expr` fold into `color` / `text` when no literal is
/// present, and the `events` map is flattened into `on_*` attributes.
fn decode_props(props: &Map<String, Json>, path: &str) -> LoadResult<BTreeMap<String, Attr>> {
    let mut attrs = BTreeMap::new();
    for (key, value) in props {
        let attr_path = format!("{path}.{key}");
        match key.as_str() {
            "width" | "height" => {
                attrs.insert(key.clone(), Attr::Dimension(decode_dimension(value, &attr_path)?));
            }
            "color_expr" | "text_expr" => {}
            "events" => {
                for (event, handler) in as_object(value, &attr_path)? {
                    attrs.insert(event.clone(), Attr::Expr(decode_expr_at(handler, &format!("{attr_path}.{event}"))?));
                }
            }
            _ => {
                attrs.insert(key.clone(), decode_attr(value, &attr_path)?);
            }
        }
    }
    for (folded, target) in [("color_expr", "color"), ("text_expr", "text")] {
        if let Some(expr) = props.get(folded) {
            if !attrs.contains_key(target) {
                attrs.insert(target.to_string(), Attr::Expr(decode_expr_at(expr, &format!("{path}.{folded}"))?));
            }
        }
    }
    Ok(attrs)
}

fn decode_attr(json: &Json, path: &str) -> LoadResult<Attr> {
    if is_expression(json) {
        Ok(Attr::Expr(decode_expr_at(json, path)?))
    } else {
        Ok(Attr::Literal(Value::from(json)))
    }
}

fn decode_dimension(json: &Json, path: &str) -> LoadResult<Dimension> {
    match json {
        Json::Number(n) => Ok(Dimension::Fixed(n.as_f64().unwrap_or(0.0))),
        Json::String(s) if s == "max" => Ok(Dimension::Infinity),
        Json::Null => Ok(Dimension::Auto),
        Json::Object(obj) => match obj.get("type").and_then(Json::as_str) {
            Some("fixed") => {
                let value = required(obj, "value", path)?
                    .as_f64()
                    .ok_or_else(|| LoadError::malformed(path, "fixed dimension needs a numeric value"))?;
                Ok(Dimension::Fixed(value))
            }
            Some("infinity") => Ok(Dimension::Infinity),
            Some("auto") => Ok(Dimension::Auto),
            Some("expression") => {
                let expr = decode_expr_at(required(obj, "expr", path)?, &format!("{path}.expr"))?;
                Ok(dimension_from_expr(expr))
            }
            Some(_) if is_expression(json) => Ok(dimension_from_expr(decode_expr_at(json, path)?)),
            Some(other) => Err(LoadError::malformed(path, format!("unknown dimension type `{other}`"))),
            None => Err(LoadError::malformed(path, "dimension without a type")),
        },
        _ => Err(LoadError::malformed(path, "dimension must be a number, `max` or an object")),
    }
}

fn dimension_from_expr(expr: Expr) -> Dimension {
    match expr {
        Expr::Var(name) if name == "max" => Dimension::Infinity,
        Expr::Literal(Value::String(s)) if s == "max" => Dimension::Infinity,
        Expr::Literal(Value::Number(n)) => Dimension::Fixed(n),
        other => Dimension::Expression(other),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// JSON helpers
// ══════════════════════════════════════════════════════════════════════════════

fn is_expression(json: &Json) -> bool {
    json.get("type")
        .and_then(Json::as_str)
        .is_some_and(|t| EXPR_TAGS.contains(&t))
}

fn as_object<'a>(json: &'a Json, path: &str) -> LoadResult<&'a Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| LoadError::malformed(path, format!("expected an object, found {}", json_kind(json))))
}

fn optional_object<'a>(
    obj: &'a Map<String, Json>,
    key: &str,
    path: &str,
) -> LoadResult<Option<&'a Map<String, Json>>> {
    match obj.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Object(inner)) => Ok(Some(inner)),
        Some(other) => Err(LoadError::malformed(
            &format!("{path}.{key}"),
            format!("expected an object, found {}", json_kind(other)),
        )),
    }
}

fn required<'a>(obj: &'a Map<String, Json>, key: &str, path: &str) -> LoadResult<&'a Json> {
    obj.get(key)
        .ok_or_else(|| LoadError::malformed(path, format!("missing field `{key}`")))
}

fn required_str<'a>(obj: &'a Map<String, Json>, key: &str, path: &str) -> LoadResult<&'a str> {
    required(obj, key, path)?
        .as_str()
        .ok_or_else(|| LoadError::malformed(path, format!("field `{key}` must be a string")))
}

fn type_tag<'a>(obj: &'a Map<String, Json>, path: &str) -> LoadResult<&'a str> {
    required_str(obj, "type", path)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "a list",
        Json::Object(_) => "an object",
    }
}
