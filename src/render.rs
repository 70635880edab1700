use tracing::debug;

use crate::bindings;
use crate::config::{RenderOptions, TraversalConfig};
use crate::context::DataContext;
use crate::dom;
use crate::error::EngineError;
use crate::hydration;
use crate::processor::Engine;

const DOCTYPE: &str = "<!DOCTYPE html>";

/// Render a full page: walk from `<html>` so `<head>` sources are seen,
/// unescape, optionally embed the hydration state, and serialize.
pub async fn render_html(
    engine: &Engine,
    html: &str,
    data: &DataContext,
    options: &RenderOptions,
) -> Result<String, EngineError> {
    let document = dom::parse_document(html)?;
    let root = dom::document_element(&document)
        .ok_or_else(|| EngineError::Parse("document has no <html> element".to_string()))?;

    let ctx = engine.process(&root, data, options.traversal).await;

    if options.unescape_braces {
        bindings::unescape_tree(&root);
    }
    if options.inject_state {
        hydration::inject_client_state(&document, &ctx);
    }

    let out = format!("{}{}", DOCTYPE, dom::outer_html(&root)?);
    debug!(bytes = out.len(), "rendered page");
    Ok(out)
}

/// Render a body fragment and return its serialized children.
pub async fn render_fragment(
    engine: &Engine,
    html: &str,
    data: &DataContext,
    options: &RenderOptions,
) -> Result<String, EngineError> {
    let host = dom::new_element("body");
    dom::replace_children(&host, dom::parse_fragment(html, "body"));

    engine.process(&host, data, options.traversal).await;

    if options.unescape_braces {
        bindings::unescape_tree(&host);
    }

    dom::inner_html(&host)
}

/// Include-only pass over a full page, leaving every binding in place.
pub async fn resolve_includes(engine: &Engine, html: &str) -> Result<String, EngineError> {
    let options = RenderOptions {
        traversal: TraversalConfig::includes_only(),
        unescape_braces: false,
        inject_state: false,
    };
    render_html(engine, html, &DataContext::default(), &options).await
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
mod native {
    use napi_derive::napi;
    use serde_json::Value;
    use std::collections::HashMap;

    use super::*;
    use crate::collaborators::StaticIncludes;
    use crate::sources::SourceRegistry;

    /// Synchronous page render for Node callers.
    ///
    /// `includes` maps include paths to markup; `sources` maps source names to
    /// data served through a session registry.
    #[napi]
    pub fn render_html_native(
        html: String,
        data: Value,
        includes: Option<HashMap<String, String>>,
        sources: Option<serde_json::Map<String, Value>>,
        options: Option<Value>,
    ) -> napi::Result<String> {
        let options: RenderOptions = match options {
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| napi::Error::from_reason(format!("invalid options: {}", e)))?,
            None => RenderOptions::server(),
        };

        let engine = Engine::new()
            .with_includes(StaticIncludes::from(includes.unwrap_or_default()))
            .with_fetcher(SourceRegistry::from_map(sources.unwrap_or_default()));

        futures::executor::block_on(render_html(
            &engine,
            &html,
            &DataContext::new(data),
            &options,
        ))
        .map_err(|e| napi::Error::from_reason(e.to_string()))
    }
}

#[cfg(feature = "napi")]
pub use native::render_html_native;
