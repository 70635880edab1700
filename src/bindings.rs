//! Attribute, text and auto bindings applied to a single element.
//!
//! ## Invariants
//!
//! 1. Event handler attributes (`on*`) and directive attributes (`data-t-*`)
//!    are never rewritten.
//! 2. A placeholder-bearing URL attribute that resolves to a `javascript:`,
//!    `vbscript:` or `data:text/html` URL is replaced with `#`.
//! 3. Text inside `<script>` and `<style>` is never bound.
//! 4. Auto bindings only fire when the hydration guard allows it, and never for
//!    an undefined or `null` value.

use markup5ever_rcdom::{Handle, NodeData};
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, warn};

use crate::config::TraversalConfig;
use crate::context::DataContext;
use crate::dom::{self, FormControl, InputKind};
use crate::path::is_truthy;
use crate::resolve::{self, display, unescape_braces};

pub const DIRECTIVE_PREFIX: &str = "data-t-";

const URL_ATTRIBUTES: [&str; 4] = ["href", "src", "action", "formaction"];
const DANGEROUS_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:text/html"];
const SAFE_URL: &str = "#";

/// Every binding kind, in order.
pub fn apply_all(node: &Handle, ctx: &DataContext, config: &TraversalConfig) {
    apply_attribute_bindings(node, ctx);
    apply_text_bindings(node, ctx);
    apply_auto_bindings(node, ctx, config);
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn apply_attribute_bindings(node: &Handle, ctx: &DataContext) {
    for (name, value) in dom::attributes(node) {
        if name.starts_with("on") || name.starts_with(DIRECTIVE_PREFIX) || !value.contains('{') {
            continue;
        }

        let mut resolved = resolve::resolve_text(&value, ctx);
        if resolved == value {
            continue;
        }

        if URL_ATTRIBUTES.contains(&name.as_str()) && is_dangerous_url(&resolved) {
            warn!(attribute = %name, "blocked dangerous URL scheme in bound attribute");
            resolved = SAFE_URL.to_string();
        }

        dom::set_attr(node, &name, &resolved);

        if name == "value" && FormControl::of(node) == Some(FormControl::Select) {
            select_option(node, &resolved);
        }
    }
}

/// Scheme check tolerant of case, surrounding whitespace and embedded control
/// characters (`java\tscript:`).
pub fn is_dangerous_url(url: &str) -> bool {
    let normalized: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    DANGEROUS_SCHEMES
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn apply_text_bindings(node: &Handle, ctx: &DataContext) {
    if dom::is_raw_text_element(node) {
        return;
    }

    for child in dom::children(node) {
        let Some(text) = dom::text_of(&child) else {
            continue;
        };
        if !text.contains('{') {
            continue;
        }

        let resolved = resolve::resolve_text(&text, ctx);
        if resolved != text {
            dom::set_text(&child, &resolved);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTO BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bind a named form control to the context value under its `name`, falling
/// back to the query parameter of the same name.
pub fn apply_auto_bindings(node: &Handle, ctx: &DataContext, config: &TraversalConfig) {
    let Some(control) = FormControl::of(node) else {
        return;
    };
    let Some(name) = dom::get_attr(node, "name").filter(|n| !n.is_empty()) else {
        return;
    };

    if !config.allows_auto_binding() {
        debug!(name = %name, "auto-binding skipped outside scope");
        return;
    }

    let value: Option<Cow<'_, Value>> = ctx
        .get(&name)
        .or_else(|| ctx.query_param(&name).map(Cow::Borrowed));

    let value = match value {
        None => return,
        Some(v) if v.is_null() => return,
        Some(v) => v,
    };

    let text = display(&value);
    debug!(name = %name, control = ?control, value = %text, "auto-bind");

    match control {
        FormControl::Select => {
            dom::set_attr(node, "value", &text);
            select_option(node, &text);
        }
        FormControl::Input(InputKind::Checkbox) => {
            set_checked(node, is_truthy(Some(value.as_ref())));
        }
        FormControl::Input(InputKind::Radio) => {
            let matches = dom::get_attr(node, "value").as_deref() == Some(text.as_str());
            set_checked(node, matches);
        }
        FormControl::Input(InputKind::Value) => {
            dom::set_attr(node, "value", &text);
        }
        FormControl::Textarea => {
            dom::replace_children(node, vec![dom::new_text(&text)]);
        }
    }
}

fn set_checked(node: &Handle, checked: bool) {
    if checked {
        dom::set_attr(node, "checked", "checked");
    } else {
        dom::remove_attr(node, "checked");
    }
}

/// Mark the `<option>` whose value equals `value` as selected, clearing the rest.
fn select_option(select: &Handle, value: &str) {
    for option in options_of(select) {
        let option_value = dom::get_attr(&option, "value")
            .unwrap_or_else(|| dom::text_content(&option).trim().to_string());

        if option_value == value {
            dom::set_attr(&option, "selected", "");
        } else {
            dom::remove_attr(&option, "selected");
        }
    }
}

fn options_of(select: &Handle) -> Vec<Handle> {
    let mut options = Vec::new();
    let mut stack = dom::children(select);
    stack.reverse();

    while let Some(node) = stack.pop() {
        if dom::tag_name(&node).as_deref() == Some("option") {
            options.push(node.clone());
        }
        let mut children = dom::children(&node);
        children.reverse();
        stack.extend(children);
    }

    options
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNESCAPE PASS
// ═══════════════════════════════════════════════════════════════════════════════

/// Strip the backslash from `\{` and `\}` across a subtree. Runs once, after
/// the walk.
pub fn unescape_tree(node: &Handle) {
    match &node.data {
        NodeData::Text { .. } => {
            if let Some(text) = dom::text_of(node) {
                if let Cow::Owned(unescaped) = unescape_braces(&text) {
                    dom::set_text(node, &unescaped);
                }
            }
        }
        NodeData::Element { .. } => {
            for (name, value) in dom::attributes(node) {
                if let Cow::Owned(unescaped) = unescape_braces(&value) {
                    dom::set_attr(node, &name, &unescaped);
                }
            }
            if dom::is_raw_text_element(node) {
                return;
            }
            for child in dom::children(node) {
                unescape_tree(&child);
            }
        }
        _ => {
            for child in dom::children(node) {
                unescape_tree(&child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// First body element, with the document that owns it.
    fn first_element(html: &str) -> (Handle, Handle) {
        let doc = dom::parse_document(html).unwrap();
        let body = dom::find_element(&doc, "body").unwrap();
        let node = dom::element_children(&body).remove(0);
        (doc, node)
    }

    #[test]
    fn test_attribute_binding_skips_handlers_and_directives() {
        let (_doc, node) = first_element(
            "<a href=\"/u/{user.id}\" onclick=\"go({user.id})\" data-t-if=\"{user.id}\">x</a>",
        );
        apply_attribute_bindings(&node, &DataContext::new(json!({ "user": { "id": 7 } })));

        assert_eq!(dom::get_attr(&node, "href").as_deref(), Some("/u/7"));
        assert_eq!(dom::get_attr(&node, "onclick").as_deref(), Some("go({user.id})"));
        assert_eq!(dom::get_attr(&node, "data-t-if").as_deref(), Some("{user.id}"));
    }

    #[test]
    fn test_dangerous_urls_are_neutralized() {
        let (_doc, node) = first_element("<a href=\"{link}\" title=\"{link}\">x</a>");
        apply_attribute_bindings(&node, &DataContext::new(json!({ "link": " JavaScript:alert(1)" })));

        assert_eq!(dom::get_attr(&node, "href").as_deref(), Some("#"));
        assert_eq!(dom::get_attr(&node, "title").as_deref(), Some(" JavaScript:alert(1)"));
        assert!(is_dangerous_url("java\tscript:alert(1)"));
        assert!(is_dangerous_url("data:text/html;base64,xx"));
        assert!(!is_dangerous_url("/posts?id=1"));
    }

    #[test]
    fn test_text_binding_skips_script() {
        let (_doc, node) = first_element("<p>Hi {name}</p>");
        let ctx = DataContext::new(json!({ "name": "Ann" }));
        apply_text_bindings(&node, &ctx);
        assert_eq!(dom::outer_html(&node).unwrap(), "<p>Hi Ann</p>");

        let (_doc, wrapper) = first_element("<div><script>var x = {name};</script></div>");
        let script = dom::element_children(&wrapper).remove(0);
        apply_text_bindings(&script, &ctx);
        assert_eq!(dom::inner_html(&script).unwrap(), "var x = {name};");
    }

    #[test]
    fn test_auto_binding_controls() {
        let config = TraversalConfig::default();
        let ctx = DataContext::new(json!({
            "title": "Hello",
            "done": true,
            "color": "blue",
            "body": "Text",
            "size": "m",
            "_sys": { "query": { "q": "search" } }
        }));

        let (_doc, input) = first_element("<input name=\"title\" value=\"old\">");
        apply_auto_bindings(&input, &ctx, &config);
        assert_eq!(dom::get_attr(&input, "value").as_deref(), Some("Hello"));

        let (_doc, checkbox) = first_element("<input type=\"checkbox\" name=\"done\">");
        apply_auto_bindings(&checkbox, &ctx, &config);
        assert_eq!(dom::get_attr(&checkbox, "checked").as_deref(), Some("checked"));

        let (_doc, radio) = first_element("<input type=\"radio\" name=\"color\" value=\"red\" checked>");
        apply_auto_bindings(&radio, &ctx, &config);
        assert!(!dom::has_attr(&radio, "checked"));

        let (_doc, textarea) = first_element("<textarea name=\"body\">old</textarea>");
        apply_auto_bindings(&textarea, &ctx, &config);
        assert_eq!(dom::inner_html(&textarea).unwrap(), "Text");

        let (_doc, select) = first_element(
            "<select name=\"size\"><option value=\"s\" selected>S</option><option value=\"m\">M</option></select>",
        );
        apply_auto_bindings(&select, &ctx, &config);
        assert_eq!(
            dom::inner_html(&select).unwrap(),
            "<option value=\"s\">S</option><option value=\"m\" selected=\"\">M</option>"
        );

        let (_doc, query) = first_element("<input name=\"q\">");
        apply_auto_bindings(&query, &ctx, &config);
        assert_eq!(dom::get_attr(&query, "value").as_deref(), Some("search"));
    }

    #[test]
    fn test_auto_binding_ignores_null() {
        let (_doc, input) = first_element("<input name=\"nick\" value=\"SSR\">");
        let ctx = DataContext::new(json!({ "nick": null }));
        apply_auto_bindings(&input, &ctx, &TraversalConfig::default());
        assert_eq!(dom::get_attr(&input, "value").as_deref(), Some("SSR"));
    }

    #[test]
    fn test_unescape_tree() {
        let (_doc, node) = first_element("<p title=\"\\{a\\}\">\\{user.name\\}<style>.x \\{ }</style></p>");
        unescape_tree(&node);

        assert_eq!(dom::get_attr(&node, "title").as_deref(), Some("{a}"));
        assert_eq!(
            dom::inner_html(&node).unwrap(),
            "{user.name}<style>.x \\{ }</style>"
        );
    }
}
