//! Include merging for `data-t-include`.
//!
//! A fetched fragment is either a **snippet** (no `data-t-content` markers),
//! which replaces the host's content verbatim, or a **layout**, whose marked
//! slots are filled from the host:
//!
//! - a host child tagged `data-t-content="name"` fills the slot of that name
//!   with its own children;
//! - the unnamed slot (`data-t-content=""` or `"default"`) receives the host's
//!   remaining untagged content;
//! - a slot with nothing to receive keeps its fallback content.

use markup5ever_rcdom::Handle;
use std::collections::HashMap;

use crate::dom;

pub const INCLUDE_ATTR: &str = "data-t-include";
pub const CONTENT_ATTR: &str = "data-t-content";

const DEFAULT_SLOT_NAMES: [&str; 2] = ["", "default"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeMode {
    Snippet,
    Layout,
}

/// Content the host provides to a layout.
#[derive(Debug, Default)]
struct HostSlots {
    default: Vec<Handle>,
    named: HashMap<String, Vec<Handle>>,
}

impl HostSlots {
    fn content_for(&self, slot_name: &str) -> Option<&[Handle]> {
        if let Some(content) = self.named.get(slot_name) {
            return Some(content);
        }
        let is_default = DEFAULT_SLOT_NAMES.contains(&slot_name);
        if is_default && has_meaningful_content(&self.default) {
            return Some(&self.default);
        }
        None
    }
}

/// Replace the content of `host` with `fragment_html`, merging slots when the
/// fragment is a layout.
pub fn merge_include(host: &Handle, fragment_html: &str) -> IncludeMode {
    let context_tag = dom::tag_name(host).unwrap_or_default();
    let nodes = dom::parse_fragment(fragment_html, &context_tag);

    let slots: Vec<Handle> = nodes
        .iter()
        .flat_map(|node| dom::find_with_attr(node, CONTENT_ATTR))
        .collect();

    if slots.is_empty() {
        dom::replace_children(host, nodes);
        return IncludeMode::Snippet;
    }

    let provided = extract_slots(host);

    for slot in &slots {
        let name = dom::get_attr(slot, CONTENT_ATTR).unwrap_or_default();
        if let Some(content) = provided.content_for(name.trim()) {
            let copies = content.iter().map(dom::deep_clone).collect();
            dom::replace_children(slot, copies);
        }
    }

    dom::replace_children(host, nodes);
    IncludeMode::Layout
}

fn extract_slots(host: &Handle) -> HostSlots {
    let mut slots = HostSlots::default();

    for child in dom::children(host) {
        match dom::get_attr(&child, CONTENT_ATTR) {
            Some(name) => slots
                .named
                .entry(name.trim().to_string())
                .or_default()
                .extend(dom::children(&child)),
            None => slots.default.push(child),
        }
    }

    slots
}

/// True unless every node is whitespace-only text or a comment.
fn has_meaningful_content(nodes: &[Handle]) -> bool {
    nodes.iter().any(|node| {
        if dom::is_element(node) {
            return true;
        }
        dom::text_of(node)
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    })
}
