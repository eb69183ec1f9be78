//! AST node types for compiled Vi documents.
//!
//! These are the typed forms of the JSON produced by the upstream compiler.
//! Nodes are immutable once decoded; large recursive types are boxed.
//! Maps that must be iterated deterministically use [`BTreeMap`].

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete compiled document: one widget tree, state declarations and functions.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub tree: WidgetNode,
    /// State variables with their initial-value expressions.
    pub state: BTreeMap<String, Expr>,
    pub functions: BTreeMap<String, FunctionDef>,
}

/// `name(params) { body }`
///
/// Parameters are bound into shared state when the function is called.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `object.field`
    Member {
        object: Box<Expr>,
        field: String,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// `function(args)`: user function or built-in.
    Call {
        function: String,
        args: Vec<Expr>,
    },
    /// `object.method(args)`: list helpers such as `add` and `remove`.
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// `if condition then_branch else else_branch`
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Array(Vec<Expr>),
    /// `{ key: value, ... }` and arrays made entirely of `key: value` pairs.
    Object(Vec<(String, Expr)>),
}

impl Expr {
    /// Shorthand for a call with no arguments.
    pub fn call(function: impl Into<String>) -> Self {
        Expr::Call {
            function: function.into(),
            args: Vec::new(),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    And,
    Or,
}

impl BinaryOp {
    /// Parse the operator spelling used in compiled documents.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "==" => Self::Eq,
            "!=" => Self::NotEq,
            "<" => Self::Less,
            ">" => Self::Greater,
            "<=" => Self::LessEq,
            ">=" => Self::GreaterEq,
            "and" | "&&" => Self::And,
            "or" | "||" => Self::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEq => "<=",
            Self::GreaterEq => ">=",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!x` / `not x`
    Not,
    /// `-x`
    Neg,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `target = value` where target is `name` or `name.field.field`.
    Assign { target: Vec<String>, value: Expr },
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// `for var in iterable { body }`; `var` is written into shared state.
    For {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Expr(Expr),
    /// `target: { attr: value, ... }`: imperative attribute override.
    ModifyContainer {
        target: Expr,
        attributes: BTreeMap<String, Expr>,
    },
}

// ══════════════════════════════════════════════════════════════════════════════
// Widgets
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Box,
    Column,
    Row,
    List,
    Button,
    Input,
    Repeated,
    Generic,
}

impl WidgetKind {
    /// Map a widget tag to its kind. Both the short names and the tags
    /// emitted by the block compiler are accepted; anything unknown is
    /// [`WidgetKind::Generic`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Box" | "box" | "Container" => Self::Box,
            "Column" | "column" => Self::Column,
            "Row" | "row" => Self::Row,
            "List" | "list" | "ListView" => Self::List,
            "Button" | "button" | "ElevatedButton" => Self::Button,
            "Input" | "input" | "TextField" => Self::Input,
            "Repeated" | "repeated" | "DynamicRepeated" => Self::Repeated,
            _ => Self::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Column => "column",
            Self::Row => "row",
            Self::List => "list",
            Self::Button => "button",
            Self::Input => "input",
            Self::Repeated => "repeated",
            Self::Generic => "generic",
        }
    }
}

/// A width or height declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Dimension {
    /// Percentage (0–100) of the available extent.
    Fixed(f64),
    /// `max`: the full available extent, or flex-fill inside a flex parent.
    Infinity,
    /// Evaluated at resolution time; must produce a percentage.
    Expression(Expr),
    Auto,
}

/// A declared attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    Literal(Value),
    Expr(Expr),
    Dimension(Dimension),
}

/// How a `Repeated` node gets its instances.
#[derive(Debug, Clone, PartialEq)]
pub enum Repetition {
    /// Instances expanded by the compiler.
    Expanded(Vec<WidgetNode>),
    /// Instances stamped from `template` once the counts are evaluated.
    Template {
        template: Box<WidgetNode>,
        counts: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetNode {
    pub kind: WidgetKind,
    /// Original widget tag (kept for `Generic` nodes and diagnostics).
    pub tag: String,
    pub name: Option<String>,
    pub attrs: BTreeMap<String, Attr>,
    pub children: Vec<WidgetNode>,
    /// Present only when `kind == Repeated`.
    pub repeat: Option<Repetition>,
}

impl WidgetNode {
    pub fn new(kind: WidgetKind) -> Self {
        Self {
            kind,
            tag: kind.as_str().to_string(),
            name: None,
            attrs: BTreeMap::new(),
            children: Vec::new(),
            repeat: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn attr(mut self, key: impl Into<String>, attr: Attr) -> Self {
        self.attrs.insert(key.into(), attr);
        self
    }

    pub fn child(mut self, child: WidgetNode) -> Self {
        self.children.push(child);
        self
    }

    /// Pre-expanded repeated instances.
    pub fn instances(mut self, instances: Vec<WidgetNode>) -> Self {
        self.repeat = Some(Repetition::Expanded(instances));
        self
    }

    /// Visit this node and all descendants (including repeated instances and
    /// templates) in pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a WidgetNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
        match &self.repeat {
            Some(Repetition::Expanded(instances)) => {
                for instance in instances {
                    instance.walk(f);
                }
            }
            Some(Repetition::Template { template, .. }) => template.walk(f),
            None => {}
        }
    }
}
