//! The boundary between the interpreter and a concrete UI toolkit.

use crate::descriptor::{AvailableSize, Axis, Layout, RenderDescriptor, RenderOutput};
use serde::{Deserialize, Serialize};
use vi_types::ast::WidgetKind;

/// A side effect requested by the program that only the host can perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// `visit(url)`: open a link.
    Visit { url: String },
    /// `play(media)`: play a sound or video asset.
    Play { media: String },
}

/// What a session needs from its host.
pub trait Host {
    /// Size of the root container in logical pixels.
    fn available_size(&self) -> AvailableSize;

    /// Show a freshly resolved tree.
    fn present(&mut self, output: &RenderOutput);

    fn perform(&mut self, _effect: &Effect) {}
}

/// Concrete widget constructors of a host toolkit.
///
/// [`mount`] walks a descriptor tree bottom-up and calls these, so
/// implementations only ever see already-built children.
pub trait Primitives {
    type Handle;

    fn create_box(&mut self, node: &RenderDescriptor, children: Vec<Self::Handle>) -> Self::Handle;

    /// Column, row, list, grid and wrap layouts.
    fn create_flex(&mut self, node: &RenderDescriptor, direction: Axis, children: Vec<Self::Handle>) -> Self::Handle;

    fn create_text(&mut self, node: &RenderDescriptor, text: &str) -> Self::Handle;

    fn create_button(&mut self, node: &RenderDescriptor, label: Option<Self::Handle>) -> Self::Handle;

    fn create_input(&mut self, node: &RenderDescriptor) -> Self::Handle;

    /// Wrap `inner` so that taps fire the node's `on_click` callback.
    fn create_tappable(&mut self, node: &RenderDescriptor, inner: Self::Handle) -> Self::Handle;
}

/// Build host widgets for a descriptor tree. Invisible nodes are skipped;
/// returns `None` only when the root itself is invisible.
pub fn mount<P: Primitives>(node: &RenderDescriptor, primitives: &mut P) -> Option<P::Handle> {
    if !node.visible {
        return None;
    }
    let mut children: Vec<P::Handle> = node.children.iter().filter_map(|c| mount(c, primitives)).collect();

    let handle = match node.kind {
        WidgetKind::Button => {
            let label = node.text.as_deref().map(|text| primitives.create_text(node, text));
            // Buttons are tappable on their own.
            return Some(primitives.create_button(node, label));
        }
        WidgetKind::Input => primitives.create_input(node),
        _ => match node.layout {
            Layout::Flex { direction } | Layout::Scroll { direction } => {
                primitives.create_flex(node, direction, children)
            }
            Layout::Grid { .. } | Layout::Wrap => primitives.create_flex(node, Axis::Horizontal, children),
            Layout::Stack => {
                if let Some(text) = node.text.as_deref() {
                    children.insert(0, primitives.create_text(node, text));
                }
                primitives.create_box(node, children)
            }
        },
    };

    if node.events.contains_key("on_click") {
        Some(primitives.create_tappable(node, handle))
    } else {
        Some(handle)
    }
}
