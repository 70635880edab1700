//! Directive Processor
//!
//! Depth-first walk applying, per element and in this fixed order:
//!
//! 1. **Source** (`data-t-source`): fetch named data into the local context.
//! 2. **List** (`data-t-list`): one clone per item, each walked in scope.
//! 3. **Conditional** (`data-t-if`): a false condition removes the element.
//! 4. **Include** (`data-t-include`): snippet or layout merge.
//! 5. **Scope** (`data-t-scope`): narrow the context for the subtree.
//! 6. **Bindings**: attribute, text and auto bindings.
//! 7. **Recurse** into a snapshot of the element children.
//!
//! ## Invariants
//!
//! - Contexts and configurations are values. A narrowed context or a scoped
//!   configuration only ever flows down into the subtree that produced it.
//! - Collaborator failures are logged and treated as absence; the walk always
//!   completes.
//! - Each element is visited at most once per walk.

use futures::future::{join_all, FutureExt, LocalBoxFuture};
use markup5ever_rcdom::{Handle, NodeData};
use serde_json::{Map, Value};
use std::cell::RefCell;
use tracing::{debug, warn};

use crate::bindings;
use crate::collaborators::{DataFetcher, IncludeResolver, NoIncludes};
use crate::condition;
use crate::config::TraversalConfig;
use crate::context::DataContext;
use crate::dom;
use crate::layout::{self, INCLUDE_ATTR};
use crate::resolve;
use crate::sources::expand_query_shorthand;

pub const SOURCE_ATTR: &str = "data-t-source";
pub const LIST_ATTR: &str = "data-t-list";
pub const IF_ATTR: &str = "data-t-if";
pub const SCOPE_ATTR: &str = "data-t-scope";

/// State owned by a single `process` call and shared by every branch of it.
#[derive(Debug, Default)]
struct WalkState {
    /// Every source fetched by an element during the walk. The data only
    /// narrows its own subtree; this record is what the caller gets back.
    fetched: RefCell<Map<String, Value>>,
}

impl WalkState {
    fn record(&self, name: &str, data: &Value) {
        self.fetched
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| data.clone());
    }
}

/// The directive engine with its two collaborators.
pub struct Engine {
    includes: Box<dyn IncludeResolver>,
    fetcher: Option<Box<dyn DataFetcher>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            includes: Box::new(NoIncludes),
            fetcher: None,
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_includes<R: IncludeResolver + 'static>(mut self, includes: R) -> Self {
        self.includes = Box::new(includes);
        self
    }

    pub fn with_fetcher<F: DataFetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Preload `<link data-t-source>` data, then walk `root` once.
    ///
    /// Returns the root context plus every source fetched anywhere in the
    /// tree, which is what a later hydration pass needs to avoid refetching.
    pub async fn process(&self, root: &Handle, ctx: &DataContext, config: TraversalConfig) -> DataContext {
        let ctx = if config.process_bindings {
            self.preload_sources(root, ctx).await
        } else {
            ctx.clone()
        };

        let state = WalkState::default();
        self.walk(root.clone(), ctx.clone(), config, &state).await;

        let fetched: Map<String, Value> = state
            .fetched
            .into_inner()
            .into_iter()
            .filter(|(name, _)| !ctx.contains(name))
            .collect();
        if !fetched.is_empty() {
            debug!(sources = fetched.len(), "collected element sources");
        }
        ctx.merged(fetched)
    }

    /// Fetch every `<link data-t-source href>` under `root` concurrently and
    /// merge the results into a new root context. Sources already present in
    /// `ctx` are not fetched again.
    pub async fn preload_sources(&self, root: &Handle, ctx: &DataContext) -> DataContext {
        let Some(fetcher) = &self.fetcher else {
            return ctx.clone();
        };

        let requests: Vec<(String, String)> = dom::find_with_attr(root, SOURCE_ATTR)
            .iter()
            .filter(|node| dom::tag_name(node).as_deref() == Some("link"))
            .filter_map(|link| source_request(link, ctx))
            .collect();

        if requests.is_empty() {
            return ctx.clone();
        }

        let fetches = requests.iter().map(|(name, href)| async move {
            (name, href, fetcher.fetch(href, name).await)
        });

        let mut loaded = Map::new();
        for (name, href, result) in join_all(fetches).await {
            match result {
                Ok(Some(data)) if !data.is_null() => {
                    debug!(source = %name, href = %href, "preloaded source");
                    loaded.insert(name.clone(), data);
                }
                Ok(_) => debug!(source = %name, href = %href, "source returned no data"),
                Err(e) => warn!(source = %name, href = %href, error = %e, "source preload failed"),
            }
        }

        ctx.merged(loaded)
    }

    fn walk<'a>(
        &'a self,
        node: Handle,
        ctx: DataContext,
        config: TraversalConfig,
        state: &'a WalkState,
    ) -> LocalBoxFuture<'a, ()> {
        async move {
            if dom::is_element(&node) {
                self.process_element(node, ctx, config, state).await;
            } else if matches!(node.data, NodeData::Document) {
                for child in dom::element_children(&node) {
                    self.walk(child, ctx.clone(), config, state).await;
                }
            }
        }
        .boxed_local()
    }

    async fn process_element(
        &self,
        node: Handle,
        mut ctx: DataContext,
        mut config: TraversalConfig,
        state: &WalkState,
    ) {
        if config.process_bindings && dom::has_attr(&node, SOURCE_ATTR) {
            ctx = self.process_source(&node, ctx, state).await;
        }

        if config.process_bindings && dom::has_attr(&node, LIST_ATTR) {
            self.process_list(node, ctx, config, state).await;
            return;
        }

        if config.process_bindings {
            if let Some(expression) = dom::get_attr(&node, IF_ATTR) {
                if !condition::evaluate(&expression, &ctx) {
                    debug!(condition = %expression, "condition false, removing element");
                    dom::detach(&node);
                    return;
                }
                if config.strip_attributes {
                    dom::remove_attr(&node, IF_ATTR);
                }
            }
        }

        if config.process_includes && dom::has_attr(&node, INCLUDE_ATTR) {
            self.process_include(&node, &ctx).await;
        }

        if config.process_bindings {
            if let Some(key) = dom::get_attr(&node, SCOPE_ATTR) {
                if let Some(scoped) = narrow_scope(&ctx, &key) {
                    ctx = scoped;
                    config = config.entering_scope();
                } else {
                    debug!(scope = %key, "scope value undefined");
                }
            }

            bindings::apply_all(&node, &ctx, &config);
        }

        for child in dom::element_children(&node) {
            self.walk(child, ctx.clone(), config, state).await;
        }
    }

    async fn process_source(&self, node: &Handle, ctx: DataContext, state: &WalkState) -> DataContext {
        let Some(fetcher) = &self.fetcher else {
            return ctx;
        };
        let Some(name) = dom::get_attr(node, SOURCE_ATTR).filter(|n| !n.is_empty()) else {
            return ctx;
        };
        if ctx.contains(&name) {
            debug!(source = %name, "source already in context");
            return ctx;
        }
        let Some((name, href)) = source_request(node, &ctx) else {
            return ctx;
        };

        match fetcher.fetch(&href, &name).await {
            Ok(Some(data)) if !data.is_null() => {
                debug!(source = %name, href = %href, "fetched source");
                state.record(&name, &data);
                ctx.with(&name, data)
            }
            Ok(_) => {
                debug!(source = %name, href = %href, "source returned no data");
                ctx
            }
            Err(e) => {
                warn!(source = %name, href = %href, error = %e, "source fetch failed");
                ctx
            }
        }
    }

    async fn process_list(&self, node: Handle, ctx: DataContext, config: TraversalConfig, state: &WalkState) {
        let path = dom::get_attr(&node, LIST_ATTR).unwrap_or_default();
        dom::remove_attr(&node, LIST_ATTR);

        let items = match ctx.get_sequence(&path).map(|v| v.into_owned()) {
            Some(Value::Array(items)) => items,
            _ => {
                debug!(list = %path, "list value is not a sequence, removing template");
                dom::detach(&node);
                return;
            }
        };

        let Some(parent) = dom::parent(&node) else {
            warn!(list = %path, "list template has no parent");
            return;
        };
        let anchor = dom::next_sibling(&node);
        let template = dom::deep_clone(&node);
        dom::detach(&node);

        let leaf = path.rsplit('.').next().unwrap_or_default().to_string();
        let item_config = config.entering_scope();
        debug!(list = %path, items = items.len(), "expanding list");

        for item in items {
            let clone = dom::deep_clone(&template);
            dom::insert_before(&parent, clone.clone(), anchor.as_ref());

            let mut item_ctx = ctx.with(&path, item.clone());
            if leaf != path {
                item_ctx = item_ctx.with(&leaf, item);
            }
            self.walk(clone, item_ctx, item_config, state).await;
        }
    }

    async fn process_include(&self, node: &Handle, ctx: &DataContext) {
        let raw = dom::get_attr(node, INCLUDE_ATTR).unwrap_or_default();
        let path = if raw.contains('{') {
            resolve::resolve_text(&raw, ctx)
        } else {
            raw
        };

        match self.includes.resolve(&path).await {
            Ok(Some(html)) => {
                let mode = layout::merge_include(node, &html);
                dom::remove_attr(node, INCLUDE_ATTR);
                debug!(include = %path, mode = ?mode, "merged include");
            }
            Ok(None) => warn!(include = %path, "include not found"),
            Err(e) => warn!(include = %path, error = %e, "include failed"),
        }
    }
}

/// Name and resolved href of a source element.
fn source_request(node: &Handle, ctx: &DataContext) -> Option<(String, String)> {
    let name = dom::get_attr(node, SOURCE_ATTR).filter(|n| !n.is_empty())?;
    if ctx.contains(&name) {
        return None;
    }
    let raw = dom::get_attr(node, "href").filter(|h| !h.is_empty())?;
    let expanded = expand_query_shorthand(&raw);
    let href = if expanded.contains('{') {
        resolve::resolve_text(&expanded, ctx)
    } else {
        expanded.into_owned()
    };
    Some((name, href))
}

/// Context for a `data-t-scope` subtree, `None` when the path is undefined.
///
/// The value is bound under the scope path; a plain object also has its keys
/// spread into the context.
fn narrow_scope(ctx: &DataContext, key: &str) -> Option<DataContext> {
    let value = ctx.get(key)?.into_owned();
    let mut scoped = ctx.with(key, value.clone());
    if let Value::Object(fields) = value {
        debug!(scope = %key, keys = fields.len(), "entering scope");
        scoped = scoped.merged(fields);
    } else {
        debug!(scope = %key, "entering scope");
    }
    Some(scoped)
}
