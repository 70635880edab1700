//! Tree surgery over `markup5ever_rcdom`.
//!
//! rcdom keeps its own append/detach helpers private to the `TreeSink` impl,
//! so the directive walk goes through these instead. Every helper keeps the
//! parent back-pointer and the parent's child list in agreement.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::{Attribute, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use tendril::{StrTendril, TendrilSink};
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EngineError;

pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements whose text children are not markup and are never bound.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

// ═══════════════════════════════════════════════════════════════════════════════
// NODE KINDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Checkbox,
    Radio,
    Value,
}

/// Elements that take part in auto-binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormControl {
    Input(InputKind),
    Select,
    Textarea,
}

impl FormControl {
    pub fn of(node: &Handle) -> Option<Self> {
        match tag_name(node)?.as_str() {
            "input" => {
                let kind = match get_attr(node, "type")
                    .map(|t| t.to_ascii_lowercase())
                    .as_deref()
                {
                    Some("checkbox") => InputKind::Checkbox,
                    Some("radio") => InputKind::Radio,
                    _ => InputKind::Value,
                };
                Some(FormControl::Input(kind))
            }
            "select" => Some(FormControl::Select),
            "textarea" => Some(FormControl::Textarea),
            _ => None,
        }
    }
}

pub fn is_raw_text_element(node: &Handle) -> bool {
    tag_name(node)
        .map(|tag| RAW_TEXT_ELEMENTS.contains(&tag.as_str()))
        .unwrap_or(false)
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// Lowercase local name of an element.
pub fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn get_attr(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

pub fn has_attr(node: &Handle, name: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs.borrow().iter().any(|attr| &*attr.name.local == name),
        _ => false,
    }
}

pub fn set_attr(node: &Handle, name: &str, value: &str) {
    let NodeData::Element { attrs, .. } = &node.data else {
        return;
    };
    let mut attrs = attrs.borrow_mut();

    match attrs.iter_mut().find(|attr| &*attr.name.local == name) {
        Some(attr) => attr.value = StrTendril::from_slice(value),
        None => attrs.push(Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
            value: StrTendril::from_slice(value),
        }),
    }
}

pub fn remove_attr(node: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow_mut().retain(|attr| &*attr.name.local != name);
    }
}

/// Snapshot of `(name, value)` pairs in document order.
pub fn attributes(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT
// ═══════════════════════════════════════════════════════════════════════════════

pub fn new_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

pub fn text_of(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

pub fn set_text(node: &Handle, text: &str) {
    if let NodeData::Text { contents } = &node.data {
        *contents.borrow_mut() = StrTendril::from_slice(text);
    }
}

pub fn new_element(tag: &str) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag)),
        attrs: RefCell::new(Vec::new()),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURE
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of the child list. Mutating the tree while iterating this is safe.
pub fn children(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

pub fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .cloned()
        .collect()
}

pub fn parent(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

pub fn detach(node: &Handle) {
    if let Some(weak) = node.parent.take() {
        if let Some(parent) = weak.upgrade() {
            parent
                .children
                .borrow_mut()
                .retain(|child| !Rc::ptr_eq(child, node));
        }
    }
}

pub fn append(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

pub fn insert_at(parent: &Handle, index: usize, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    let index = index.min(children.len());
    children.insert(index, child);
}

pub fn next_sibling(node: &Handle) -> Option<Handle> {
    let parent = parent(node)?;
    let children = parent.children.borrow();
    let index = children.iter().position(|child| Rc::ptr_eq(child, node))?;
    children.get(index + 1).cloned()
}

/// Insert `child` before `reference`, or at the end when there is none.
pub fn insert_before(parent: &Handle, child: Handle, reference: Option<&Handle>) {
    let index = reference.and_then(|r| {
        parent
            .children
            .borrow()
            .iter()
            .position(|c| Rc::ptr_eq(c, r))
    });
    match index {
        Some(index) => insert_at(parent, index, child),
        None => append(parent, child),
    }
}

/// Drop every child of `node` and adopt `new_children` in order.
pub fn replace_children(node: &Handle, new_children: Vec<Handle>) {
    for old in node.children.borrow_mut().drain(..) {
        old.parent.set(None);
    }
    for child in new_children {
        append(node, child);
    }
}

/// Recursive copy with no parent.
pub fn deep_clone(node: &Handle) -> Handle {
    let data = match &node.data {
        NodeData::Document => NodeData::Document,
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => NodeData::Doctype {
            name: name.clone(),
            public_id: public_id.clone(),
            system_id: system_id.clone(),
        },
        NodeData::Text { contents } => NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        },
        NodeData::Comment { contents } => NodeData::Comment {
            contents: contents.clone(),
        },
        NodeData::Element {
            name,
            attrs,
            template_contents,
            mathml_annotation_xml_integration_point,
        } => NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(template_contents.borrow().as_ref().map(deep_clone)),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        },
        NodeData::ProcessingInstruction { target, contents } => NodeData::ProcessingInstruction {
            target: target.clone(),
            contents: contents.clone(),
        },
    };

    let copy = Node::new(data);
    for child in node.children.borrow().iter() {
        append(&copy, deep_clone(child));
    }
    copy
}

/// Elements carrying `attr`, in document order, starting at `root` itself.
pub fn find_with_attr(root: &Handle, attr: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_with_attr(root, attr, &mut found);
    found
}

fn collect_with_attr(node: &Handle, attr: &str, found: &mut Vec<Handle>) {
    if has_attr(node, attr) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_with_attr(child, attr, found);
    }
}

/// First element named `tag` in document order.
pub fn find_element(root: &Handle, tag: &str) -> Option<Handle> {
    if tag_name(root).as_deref() == Some(tag) {
        return Some(root.clone());
    }
    root.children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

/// Concatenated text of every descendant text node.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING & SERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a full document. Returns the document node.
pub fn parse_document(html: &str) -> Result<Handle, EngineError> {
    let dom = html5ever::parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| EngineError::Parse(e.to_string()))?;
    Ok(dom.document)
}

/// Parse `html` as the content of a `context_tag` element. The returned nodes
/// are detached and ready to be adopted.
pub fn parse_fragment(html: &str, context_tag: &str) -> Vec<Handle> {
    let context_tag = match context_tag {
        "" | "html" => "body",
        tag => tag,
    };

    let dom = html5ever::parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(context_tag)),
        Vec::new(),
    )
    .one(html);

    let Some(root) = find_element(&dom.document, "html") else {
        return Vec::new();
    };

    let nodes = children(&root);
    for node in &nodes {
        detach(node);
    }
    nodes
}

/// The `<html>` element of a parsed document.
pub fn document_element(document: &Handle) -> Option<Handle> {
    element_children(document)
        .into_iter()
        .find(|child| tag_name(child).as_deref() == Some("html"))
}

fn serialize_with(node: &Handle, scope: TraversalScope) -> Result<String, EngineError> {
    let mut bytes = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: scope,
        ..Default::default()
    };
    serialize(&mut bytes, &SerializableHandle::from(node.clone()), opts)
        .map_err(|e| EngineError::Serialize(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| EngineError::Serialize(e.to_string()))
}

pub fn outer_html(node: &Handle) -> Result<String, EngineError> {
    match node.data {
        NodeData::Document => serialize_with(node, TraversalScope::ChildrenOnly(None)),
        _ => serialize_with(node, TraversalScope::IncludeNode),
    }
}

pub fn inner_html(node: &Handle) -> Result<String, EngineError> {
    serialize_with(node, TraversalScope::ChildrenOnly(None))
}
