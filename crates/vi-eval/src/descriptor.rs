//! Resolved, toolkit-neutral render descriptors.
//!
//! A [`RenderOutput`] is produced fresh on every resolution pass and never
//! mutated afterwards.

use crate::error::Diagnostic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use vi_types::ast::WidgetKind;
use vi_types::Value;

/// Main axis of a flex or scroll layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Resolved size along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Extent {
    /// Let the host size the widget from its content.
    #[default]
    Unset,
    /// Logical pixels.
    Fixed(f64),
    /// Consume the remaining space along the parent's flex axis.
    Fill,
}

impl Extent {
    pub fn as_fixed(self) -> Option<f64> {
        match self {
            Extent::Fixed(px) => Some(px),
            _ => None,
        }
    }
}

/// Space a node may occupy. `None` on an axis means unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AvailableSize {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl AvailableSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn along(self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::Horizontal => self.width,
            Axis::Vertical => self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layout {
    /// Children stacked on top of each other.
    Stack,
    Flex { direction: Axis },
    Grid { columns: usize, rows: usize },
    Wrap,
    Scroll { direction: Axis },
}

/// Index into [`RenderOutput::callbacks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub u32);

/// A function to dispatch when an event fires, with arguments evaluated at
/// resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBinding {
    pub function: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderDescriptor {
    pub kind: WidgetKind,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub width: Extent,
    pub height: Extent,
    /// ARGB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub visible: bool,
    pub layout: Layout,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<String, CallbackId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RenderDescriptor>,
}

impl RenderDescriptor {
    /// Depth-first search by widget name.
    pub fn find(&self, name: &str) -> Option<&RenderDescriptor> {
        if self.name.as_deref() == Some(name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// One resolution pass: descriptor tree, callback table and the
/// diagnostics recorded while resolving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    pub root: RenderDescriptor,
    pub callbacks: Vec<EventBinding>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RenderOutput {
    pub fn find(&self, name: &str) -> Option<&RenderDescriptor> {
        self.root.find(name)
    }

    pub fn callback(&self, id: CallbackId) -> Option<&EventBinding> {
        self.callbacks.get(id.0 as usize)
    }

    /// The binding for `event` on the widget called `name`.
    pub fn binding(&self, name: &str, event: &str) -> Option<&EventBinding> {
        let id = *self.find(name)?.events.get(event)?;
        self.callback(id)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Hex SHA-256 over the serialized tree and callback table.
    ///
    /// Diagnostics are excluded: two passes that display the same thing have
    /// the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&self.root).unwrap_or_default());
        hasher.update(serde_json::to_vec(&self.callbacks).unwrap_or_default());
        hex::encode(hasher.finalize())
    }
}
