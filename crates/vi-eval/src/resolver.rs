//! Widget resolution: compiled tree + state + overrides → [`RenderOutput`].
//!
//! A pass works on a fork of the interpreter context, so functions called
//! from attribute expressions cannot change the live state. The same
//! (document, state, overrides) always resolves to the same output.

use crate::context::InterpreterContext;
use crate::descriptor::{AvailableSize, Axis, CallbackId, EventBinding, Extent, Layout, RenderDescriptor, RenderOutput};
use crate::error::{DiagnosticKind, ResolveError};
use crate::evaluator::{evaluate, evaluate_attribute};
use crate::palette;
use crate::text;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};
use vi_types::ast::{Attr, Dimension, Expr, Repetition, WidgetKind, WidgetNode};
use vi_types::Value;

/// Upper bound on cells stamped from one dynamic repetition.
pub const MAX_INSTANCES: usize = 10_000;

/// Attributes the resolver interprets itself; everything else passes
/// through into `props`.
const CONSUMED: &[&str] = &["width", "height", "color", "text", "text_bindings", "visibility", "scrollable"];

/// Resolve the document's whole widget tree.
pub fn resolve_tree(ctx: &InterpreterContext, available: AvailableSize) -> Result<RenderOutput, ResolveError> {
    resolve(ctx.program().tree(), ctx, available)
}

/// Resolve `node` as the root of a pass.
#[instrument(level = "debug", skip_all)]
pub fn resolve(
    node: &WidgetNode,
    ctx: &InterpreterContext,
    available: AvailableSize,
) -> Result<RenderOutput, ResolveError> {
    let mut resolver = Resolver {
        ctx: ctx.fork(),
        callbacks: Vec::new(),
        ambiguous: BTreeSet::new(),
    };
    // Dynamic repetitions are stamped once, then the concrete tree is used
    // for both the ambiguity scan and resolution.
    let expanded;
    let node = if has_template(node) {
        expanded = expand(node, &mut resolver.ctx);
        &expanded
    } else {
        node
    };
    resolver.find_ambiguous(node);

    let root = resolver.widget(
        node,
        Frame {
            available,
            flex: None,
            root: true,
        },
    )?;
    let diagnostics = resolver.ctx.take_diagnostics();
    debug!(
        callbacks = resolver.callbacks.len(),
        diagnostics = diagnostics.len(),
        "resolution pass complete"
    );
    Ok(RenderOutput {
        root,
        callbacks: resolver.callbacks,
        diagnostics,
    })
}

/// Constraints handed from a parent to a child.
#[derive(Debug, Clone, Copy)]
struct Frame {
    available: AvailableSize,
    /// Main axis of the parent when it is a column or row.
    flex: Option<Axis>,
    root: bool,
}

/// Where a merged attribute came from.
enum Source<'a> {
    Declared(&'a Attr),
    Override(&'a Value),
}

fn source<'a>(node: &'a WidgetNode, overrides: &'a BTreeMap<String, Value>, key: &str) -> Option<Source<'a>> {
    overrides
        .get(key)
        .map(Source::Override)
        .or_else(|| node.attrs.get(key).map(Source::Declared))
}

struct Resolver {
    ctx: InterpreterContext,
    callbacks: Vec<EventBinding>,
    /// Names carried by more than one node in this pass that also have overrides.
    ambiguous: BTreeSet<String>,
}

impl Resolver {
    fn widget(&mut self, node: &WidgetNode, frame: Frame) -> Result<RenderDescriptor, ResolveError> {
        let overrides = match &node.name {
            Some(name) if !self.ambiguous.contains(name) => {
                self.ctx.overrides().get(name).cloned().unwrap_or_default()
            }
            _ => BTreeMap::new(),
        };

        let width = self.extent(node, &overrides, Axis::Horizontal, frame)?;
        let height = self.extent(node, &overrides, Axis::Vertical, frame)?;
        let color = self.color(node, &overrides);
        let text = self.text(node, &overrides);
        let visible = self.visible(node, &overrides);
        let events = self.events(node, &overrides);
        let props = self.props(node, &overrides);
        let scrollable = match source(node, &overrides, "scrollable") {
            Some(Source::Override(v)) | Some(Source::Declared(Attr::Literal(v))) => v.is_truthy(),
            Some(Source::Declared(Attr::Expr(e))) => self.eval_value(e).is_truthy(),
            _ => false,
        };

        let inner = AvailableSize {
            width: width.as_fixed().or(frame.available.width),
            height: height.as_fixed().or(frame.available.height),
        };

        let (layout, children) = match node.kind {
            WidgetKind::Repeated => self.repeated(node, inner)?,
            kind => {
                let direction = match kind {
                    WidgetKind::Column => Some(Axis::Vertical),
                    WidgetKind::Row => Some(Axis::Horizontal),
                    _ => None,
                };
                let layout = match (kind, direction) {
                    (WidgetKind::List, _) => Layout::Scroll {
                        direction: Axis::Vertical,
                    },
                    (_, Some(direction)) if scrollable => Layout::Scroll { direction },
                    (_, Some(direction)) => Layout::Flex { direction },
                    _ => Layout::Stack,
                };
                let flex = match layout {
                    Layout::Flex { direction } => Some(direction),
                    _ => None,
                };
                let children = self.children(&node.children, inner, flex)?;
                (layout, children)
            }
        };

        Ok(RenderDescriptor {
            kind: node.kind,
            tag: node.tag.clone(),
            name: node.name.clone(),
            width,
            height,
            color,
            text,
            visible,
            layout,
            events,
            props,
            children,
        })
    }

    fn children(
        &mut self,
        nodes: &[WidgetNode],
        available: AvailableSize,
        flex: Option<Axis>,
    ) -> Result<Vec<RenderDescriptor>, ResolveError> {
        let frame = Frame {
            available,
            flex,
            root: false,
        };
        nodes.iter().map(|child| self.widget(child, frame)).collect()
    }

    // ══════════════════════════════════════════════════════════════════════
    // Repetition
    // ══════════════════════════════════════════════════════════════════════

    fn repeated(
        &mut self,
        node: &WidgetNode,
        available: AvailableSize,
    ) -> Result<(Layout, Vec<RenderDescriptor>), ResolveError> {
        let mut children = self.children(&node.children, available, None)?;
        let instances: &[WidgetNode] = match &node.repeat {
            Some(Repetition::Expanded(instances)) => instances,
            // Templates are expanded before the pass starts.
            Some(Repetition::Template { .. }) | None => &[],
        };
        let mut cells = self.children(instances, available, None)?;

        let coords = node.name.as_deref().and_then(|parent| {
            if instances.is_empty() {
                return None;
            }
            instances
                .iter()
                .map(|i| i.name.as_deref().and_then(|name| grid_coords(parent, name)))
                .collect::<Option<Vec<_>>>()
        });

        let layout = match coords {
            Some(coords) => {
                let columns = coords.iter().map(|(x, _)| x + 1).max().unwrap_or(0);
                let rows = coords.iter().map(|(_, y)| y + 1).max().unwrap_or(0);
                let mut ordered: Vec<_> = coords.into_iter().zip(cells).collect();
                ordered.sort_by_key(|((x, y), _)| (*y, *x));
                cells = ordered.into_iter().map(|(_, cell)| cell).collect();
                Layout::Grid { columns, rows }
            }
            None => Layout::Wrap,
        };
        children.extend(cells);
        Ok((layout, children))
    }

    /// Record names shared by several nodes that also have overrides; those
    /// overrides are not applied this pass.
    fn find_ambiguous(&mut self, root: &WidgetNode) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        count_names(root, &mut counts);
        for (name, count) in counts {
            if count > 1 && self.ctx.overrides().contains(&name) {
                self.ctx.record(
                    DiagnosticKind::AmbiguousName,
                    format!("widget name `{name}` is used by {count} widgets; its overrides are ignored"),
                );
                self.ambiguous.insert(name);
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Attributes
    // ══════════════════════════════════════════════════════════════════════

    fn extent(
        &mut self,
        node: &WidgetNode,
        overrides: &BTreeMap<String, Value>,
        axis: Axis,
        frame: Frame,
    ) -> Result<Extent, ResolveError> {
        let key = axis_name(axis);
        let declared = match source(node, overrides, key) {
            None => return Ok(Extent::Unset),
            Some(Source::Declared(Attr::Dimension(d))) => d.clone(),
            Some(Source::Declared(Attr::Expr(e))) => Dimension::Expression(e.clone()),
            Some(Source::Override(v)) | Some(Source::Declared(Attr::Literal(v))) => {
                match self.dimension_of(v, node, key) {
                    Some(d) => d,
                    None => return Ok(Extent::Unset),
                }
            }
        };
        let dimension = match declared {
            Dimension::Expression(expr) => {
                let value = self.eval_value(&expr);
                match self.dimension_of(&value, node, key) {
                    Some(d) => d,
                    None => return Ok(Extent::Unset),
                }
            }
            other => other,
        };

        let percent = match dimension {
            Dimension::Auto | Dimension::Expression(_) => return Ok(Extent::Unset),
            Dimension::Infinity if frame.flex == Some(axis) => return Ok(Extent::Fill),
            Dimension::Infinity => 100.0,
            Dimension::Fixed(p) if p.is_nan() => {
                self.ctx.record(
                    DiagnosticKind::TypeMismatch,
                    format!("{} of {} is not a number", key, describe(node)),
                );
                return Ok(Extent::Unset);
            }
            Dimension::Fixed(p) => p.clamp(0.0, 100.0),
        };

        match frame.available.along(axis) {
            Some(available) => Ok(Extent::Fixed(available * percent / 100.0)),
            None if frame.root => Err(ResolveError::ConstraintMissing {
                widget: describe(node),
                axis: key,
            }),
            None => {
                self.ctx.record(
                    DiagnosticKind::ConstraintMissing,
                    format!("{} of {} needs an available {key}", key, describe(node)),
                );
                Ok(Extent::Unset)
            }
        }
    }

    /// Numbers are percentages, `max` fills, `auto` defers to content.
    fn dimension_of(&mut self, value: &Value, node: &WidgetNode, key: &str) -> Option<Dimension> {
        match value {
            Value::Number(p) => Some(Dimension::Fixed(*p)),
            Value::String(s) if s == "max" => Some(Dimension::Infinity),
            Value::String(s) if s == "auto" => Some(Dimension::Auto),
            Value::Null => None,
            other => {
                self.ctx.record(
                    DiagnosticKind::TypeMismatch,
                    format!("{key} of {} must be a number, got {}", describe(node), other.type_name()),
                );
                None
            }
        }
    }

    fn color(&mut self, node: &WidgetNode, overrides: &BTreeMap<String, Value>) -> Option<u32> {
        match source(node, overrides, "color")? {
            Source::Override(v) | Source::Declared(Attr::Literal(v)) => self.color_value(v),
            Source::Declared(Attr::Expr(expr)) => {
                if let Some(argb) = self.palette_shade(expr) {
                    return Some(argb);
                }
                let value = self.eval_attr(expr);
                self.color_value(&value)
            }
            Source::Declared(Attr::Dimension(_)) => None,
        }
    }

    /// `red[700]` where `red` is not a state variable.
    fn palette_shade(&mut self, expr: &Expr) -> Option<u32> {
        let Expr::Index { object, index } = expr else {
            return None;
        };
        let Expr::Var(name) = object.as_ref() else {
            return None;
        };
        if self.ctx.get(name).is_some() || !palette::is_palette_name(name) {
            return None;
        }
        match self.eval_value(index) {
            Value::Number(shade) if shade >= 0.0 => palette::shade(name, shade as u32),
            _ => None,
        }
    }

    fn color_value(&mut self, value: &Value) -> Option<u32> {
        match value {
            Value::Number(n) if n.is_finite() && *n >= 0.0 && *n <= f64::from(u32::MAX) => Some(*n as u32),
            Value::String(s) => {
                let argb = palette::parse_color(s);
                if argb.is_none() {
                    self.ctx.record(DiagnosticKind::TypeMismatch, format!("unknown color `{s}`"));
                }
                argb
            }
            Value::Null => None,
            other => {
                self.ctx.record(
                    DiagnosticKind::TypeMismatch,
                    format!("color must be a number or color name, got {}", other.type_name()),
                );
                None
            }
        }
    }

    fn text(&mut self, node: &WidgetNode, overrides: &BTreeMap<String, Value>) -> Option<String> {
        let bindings: Option<Vec<String>> = match source(node, overrides, "text_bindings") {
            Some(Source::Override(Value::List(items))) | Some(Source::Declared(Attr::Literal(Value::List(items)))) => {
                Some(items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            }
            _ => None,
        };
        let raw = match source(node, overrides, "text")? {
            Source::Override(v) | Source::Declared(Attr::Literal(v)) => display(v),
            Source::Declared(Attr::Expr(expr)) => {
                let value = self.eval_attr(expr);
                display(&value)
            }
            Source::Declared(Attr::Dimension(_)) => return None,
        };

        let state = self.ctx.state();
        Some(text::interpolate(&raw, |path| {
            if let Some(allowed) = &bindings {
                let root = path.split('.').next().unwrap_or(path);
                if !allowed.iter().any(|b| b == path || b == root) {
                    return None;
                }
            }
            lookup_path(state, path).map(|value| value.to_string())
        }))
    }

    fn visible(&mut self, node: &WidgetNode, overrides: &BTreeMap<String, Value>) -> bool {
        match source(node, overrides, "visibility") {
            None | Some(Source::Declared(Attr::Dimension(_))) => true,
            Some(Source::Override(v)) | Some(Source::Declared(Attr::Literal(v))) => v.is_truthy(),
            Some(Source::Declared(Attr::Expr(expr))) => self.eval_value(expr).is_truthy(),
        }
    }

    fn events(&mut self, node: &WidgetNode, overrides: &BTreeMap<String, Value>) -> BTreeMap<String, CallbackId> {
        let mut events = BTreeMap::new();
        for key in merged_keys(node, overrides).filter(|k| k.starts_with("on_")) {
            let Some(src) = source(node, overrides, key) else { continue };
            let (function, mut args) = match src {
                Source::Declared(Attr::Expr(Expr::Call { function, args })) => {
                    let args = args.iter().map(|arg| self.eval_value(arg)).collect::<Vec<_>>();
                    (function.clone(), args)
                }
                Source::Declared(Attr::Expr(Expr::Var(function)))
                | Source::Declared(Attr::Literal(Value::String(function)))
                | Source::Override(Value::String(function)) => (function.clone(), Vec::new()),
                _ => {
                    self.ctx.record(
                        DiagnosticKind::TypeMismatch,
                        format!("`{key}` of {} is not a function call", describe(node)),
                    );
                    continue;
                }
            };
            // A cell handler declared without arguments receives the cell.
            if args.is_empty() {
                let takes_params = self.ctx.program().function(&function).is_some_and(|def| !def.params.is_empty());
                if let (true, Some(name)) = (takes_params, &node.name) {
                    args.push(Value::String(name.clone()));
                }
            }
            let id = CallbackId(self.callbacks.len() as u32);
            self.callbacks.push(EventBinding { function, args });
            events.insert(key.to_string(), id);
        }
        events
    }

    fn props(&mut self, node: &WidgetNode, overrides: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        for key in merged_keys(node, overrides) {
            if CONSUMED.contains(&key) || key.starts_with("on_") {
                continue;
            }
            let value = match source(node, overrides, key) {
                Some(Source::Override(v)) | Some(Source::Declared(Attr::Literal(v))) => v.clone(),
                Some(Source::Declared(Attr::Expr(expr))) => self.eval_attr(expr),
                Some(Source::Declared(Attr::Dimension(_))) | None => continue,
            };
            props.insert(key.to_string(), value);
        }
        props
    }

    // ── Evaluation with a fresh budget per attribute ─────────────────────

    fn eval_value(&mut self, expr: &Expr) -> Value {
        self.ctx.reset_gas();
        let result = evaluate(expr, &mut self.ctx);
        self.settle(result)
    }

    fn eval_attr(&mut self, expr: &Expr) -> Value {
        self.ctx.reset_gas();
        let result = evaluate_attribute(expr, &mut self.ctx);
        self.settle(result)
    }

    fn settle(&mut self, result: crate::error::EvalResult<Value>) -> Value {
        result.unwrap_or_else(|fault| {
            self.ctx.reset_call_depth();
            self.ctx.record_fault(&fault);
            Value::Null
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Stamp the cells of a dynamic repetition.
///
/// Two counts are `[rows, columns]` and produce `<parent>_X<x>Y<y>`; three
/// are `[columns, rows, depth]` and add a `Z<z>` suffix; one count is a
/// single row.
fn stamp(ctx: &mut InterpreterContext, parent: &str, template: &WidgetNode, counts: &[Expr]) -> Vec<WidgetNode> {
    let mut sizes = Vec::with_capacity(counts.len());
    for count in counts {
        ctx.reset_gas();
        let value = evaluate(count, ctx).unwrap_or_else(|fault| {
            ctx.reset_call_depth();
            ctx.record_fault(&fault);
            Value::Null
        });
        match value {
            Value::Number(n) if n.is_finite() => sizes.push(n.floor().max(0.0) as usize),
            other => {
                ctx.record(
                    DiagnosticKind::TypeMismatch,
                    format!("repeat count of `{parent}` must be a number, got {}", other.type_name()),
                );
                sizes.push(0);
            }
        }
    }

    let names: Vec<String> = match sizes.as_slice() {
        [columns] => {
            if *columns > MAX_INSTANCES {
                return too_many(ctx, parent);
            }
            (0..*columns).map(|x| format!("{parent}_X{x}Y0")).collect()
        }
        [rows, columns] => {
            if rows.saturating_mul(*columns) > MAX_INSTANCES {
                return too_many(ctx, parent);
            }
            (0..*columns)
                .flat_map(|x| (0..*rows).map(move |y| format!("{parent}_X{x}Y{y}")))
                .collect()
        }
        [columns, rows, depth] => {
            if columns.saturating_mul(*rows).saturating_mul(*depth) > MAX_INSTANCES {
                return too_many(ctx, parent);
            }
            let mut names = Vec::new();
            for x in 0..*columns {
                for y in 0..*rows {
                    for z in 0..*depth {
                        names.push(format!("{parent}_X{x}Y{y}Z{z}"));
                    }
                }
            }
            names
        }
        _ => {
            ctx.record(
                DiagnosticKind::TypeMismatch,
                format!("repetition `{parent}` needs one to three counts, got {}", sizes.len()),
            );
            return Vec::new();
        }
    };

    names
        .into_iter()
        .map(|name| {
            let mut cell = template.clone();
            cell.name = Some(name);
            cell
        })
        .collect()
}

fn too_many(ctx: &mut InterpreterContext, parent: &str) -> Vec<WidgetNode> {
    ctx.record(
        DiagnosticKind::BudgetExhausted,
        format!("repetition `{parent}` exceeds {MAX_INSTANCES} instances"),
    );
    Vec::new()
}

fn has_template(node: &WidgetNode) -> bool {
    let mut found = false;
    node.walk(&mut |n| found |= matches!(n.repeat, Some(Repetition::Template { .. })));
    found
}

/// Copy of `node` with every template repetition replaced by its stamped
/// cells.
fn expand(node: &WidgetNode, ctx: &mut InterpreterContext) -> WidgetNode {
    let children = node.children.iter().map(|child| expand(child, ctx)).collect();
    let repeat = match &node.repeat {
        Some(Repetition::Expanded(instances)) => Some(Repetition::Expanded(
            instances.iter().map(|instance| expand(instance, ctx)).collect(),
        )),
        Some(Repetition::Template { template, counts }) => {
            let parent = node.name.as_deref().unwrap_or_default();
            let cells = stamp(ctx, parent, template, counts);
            Some(Repetition::Expanded(cells.iter().map(|cell| expand(cell, ctx)).collect()))
        }
        None => None,
    };
    WidgetNode {
        kind: node.kind,
        tag: node.tag.clone(),
        name: node.name.clone(),
        attrs: node.attrs.clone(),
        children,
        repeat,
    }
}

fn count_names(node: &WidgetNode, counts: &mut BTreeMap<String, usize>) {
    node.walk(&mut |n| {
        if let Some(name) = &n.name {
            *counts.entry(name.clone()).or_default() += 1;
        }
    });
}

/// `(x, y)` for `<parent>_X<x>Y<y>`.
fn grid_coords(parent: &str, name: &str) -> Option<(usize, usize)> {
    let rest = name.strip_prefix(parent)?.strip_prefix("_X")?;
    let (x, y) = rest.split_once('Y')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(x) || !digits(y) {
        return None;
    }
    Some((x.parse().ok()?, y.parse().ok()?))
}

fn merged_keys<'a>(node: &'a WidgetNode, overrides: &'a BTreeMap<String, Value>) -> impl Iterator<Item = &'a str> {
    let keys: BTreeSet<&str> = node
        .attrs
        .keys()
        .chain(overrides.keys())
        .map(String::as_str)
        .collect();
    keys.into_iter()
}

/// `a.b.c` through nested mappings in state.
fn lookup_path<'a>(state: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut value = state.get(segments.next()?)?;
    for segment in segments {
        match value {
            Value::Map(fields) => value = fields.get(segment)?,
            _ => return None,
        }
    }
    Some(value)
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn axis_name(axis: Axis) -> &'static str {
    match axis {
        Axis::Horizontal => "width",
        Axis::Vertical => "height",
    }
}

fn describe(node: &WidgetNode) -> String {
    match &node.name {
        Some(name) => format!("`{name}`"),
        None => format!("unnamed {}", node.tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_names() {
        assert_eq!(grid_coords("grid", "grid_X2Y10"), Some((2, 10)));
        assert_eq!(grid_coords("grid", "grid_X1Y2Z0"), None);
        assert_eq!(grid_coords("grid", "grid_X+1Y2"), None);
        assert_eq!(grid_coords("grid", "other_X1Y2"), None);
    }

    #[test]
    fn nested_state_lookup() {
        let mut state = BTreeMap::new();
        let user = Value::Map(BTreeMap::from([("name".to_string(), Value::from("Ada"))]));
        state.insert("user".to_string(), user);
        assert_eq!(lookup_path(&state, "user.name"), Some(&Value::from("Ada")));
        assert_eq!(lookup_path(&state, "user.age"), None);
        assert_eq!(lookup_path(&state, "user.name.first"), None);
    }
}
