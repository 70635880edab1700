//! Hydration support.
//!
//! The guard itself is [`TraversalConfig::allows_auto_binding`]: with
//! `requireScope` set, form controls are only auto-bound inside a List or
//! Scope subtree, so a top-level data key that merely shares a control's name
//! cannot overwrite a server-rendered value.
//!
//! This module carries the state a server render hands to the client: the
//! request data (`window._sys`) and every loaded source
//! (`window.__BRACIFY_DATA__`), embedded in a `<script>` in `<head>`.

use markup5ever_rcdom::Handle;
use serde_json::{json, Value};

use crate::config::TraversalConfig;
use crate::context::{DataContext, SYS_KEY};
use crate::dom;
use crate::processor::Engine;

pub const STATE_ATTR: &str = "data-t-state";
const SYS_GLOBAL: &str = "window._sys = ";
const DATA_GLOBAL: &str = "window.__BRACIFY_DATA__ = ";

/// JSON safe to embed in a `<script>` body.
fn script_json(value: &Value) -> String {
    value.to_string().replace('<', "\\u003c")
}

pub fn default_sys() -> Value {
    json!({ "query": {}, "params": {} })
}

/// Body of the hydration state script.
pub fn client_state_script(ctx: &DataContext) -> String {
    let sys = ctx.value().get(SYS_KEY).cloned().unwrap_or_else(default_sys);
    format!(
        "\n{}{};\n{}{};\n",
        SYS_GLOBAL,
        script_json(&sys),
        DATA_GLOBAL,
        script_json(ctx.value())
    )
}

/// Append (or refresh) the state script. It goes at the end of `<head>`, or at
/// the start of the document element when there is no head.
pub fn inject_client_state(document: &Handle, ctx: &DataContext) {
    let body = client_state_script(ctx);

    if let Some(existing) = dom::find_with_attr(document, STATE_ATTR).into_iter().next() {
        dom::replace_children(&existing, vec![dom::new_text(&body)]);
        return;
    }

    let script = dom::new_element("script");
    dom::set_attr(&script, STATE_ATTR, "");
    dom::append(&script, dom::new_text(&body));

    match dom::find_element(document, "head") {
        Some(head) => dom::append(&head, script),
        None => {
            let root = dom::document_element(document).unwrap_or_else(|| document.clone());
            dom::insert_at(&root, 0, script);
        }
    }
}

/// Read back the state written by [`inject_client_state`].
pub fn extract_client_state(document: &Handle) -> Option<DataContext> {
    let script = dom::find_with_attr(document, STATE_ATTR).into_iter().next()?;
    let text = dom::text_content(&script);

    text.lines()
        .filter_map(|line| line.trim().strip_prefix(DATA_GLOBAL))
        .map(|json| json.trim_end_matches(';'))
        .find_map(|json| serde_json::from_str::<Value>(json).ok())
        .map(DataContext::new)
}

/// Client-side pass over an already rendered tree: the same walk, with
/// auto-binding restricted to explicit scopes.
pub async fn hydrate(engine: &Engine, root: &Handle, ctx: &DataContext) -> DataContext {
    engine.process(root, ctx, TraversalConfig::hydration()).await
}
