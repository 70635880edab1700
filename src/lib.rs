//! # Bracify Directive Engine
//!
//! One walk over an HTML tree that fetches data, repeats, conditionally keeps,
//! merges and binds elements from `data-t-*` attributes. The same walk runs
//! on the server (pre-render) and again over the rendered page (hydration).
//!
//! ## Walk Invariants
//!
//! 1. **Fixed order per element**: Source, List, Conditional, Include, Scope,
//!    Bindings, then the element children.
//!
//! 2. **Immutable context**: a `DataContext` is never mutated. Narrowing
//!    (source data, list item, scope) builds a new context that only the
//!    narrowed subtree sees.
//!
//! 3. **Per-branch configuration**: `TraversalConfig` is `Copy`. `inScope` is
//!    set at a List or Scope element and inherited by its descendants only,
//!    never by siblings or ancestors.
//!
//! 4. **Hydration guard**: with `requireScope`, form controls are auto-bound
//!    only when `inScope` holds.
//!
//! 5. **Literal misses**: an unresolved placeholder renders as its own text,
//!    so a later pass can resolve it. Substituted values are never scanned
//!    again.
//!
//! 6. **No fatal misses**: lookup misses are policy outcomes and collaborator
//!    failures are logged and treated as absence.
//!
//! ## Directive Attributes
//!
//! - `data-t-source="name" href="..."`: fetch named data.
//! - `data-t-list="path"`: one copy of the element per item.
//! - `data-t-if="condition"`: keep the element only when true.
//! - `data-t-include="path"`: merge a fragment (snippet or layout).
//! - `data-t-content="slot"`: a layout slot, or host content for it.
//! - `data-t-scope="path"`: narrow the context to a sub-object.

pub mod bindings;
pub mod cache;
pub mod collaborators;
pub mod condition;
pub mod config;
pub mod context;
pub mod discovery;
pub mod dom;
pub mod error;
pub mod hydration;
pub mod layout;
pub mod path;
pub mod pipes;
pub mod processor;
pub mod render;
pub mod resolve;
pub mod sources;

#[cfg(test)]
mod directive_tests;

pub use cache::TemplateCache;
pub use collaborators::{DataFetcher, DirectoryIncludes, FetchChain, IncludeResolver, NoIncludes, StaticIncludes};
pub use condition::evaluate;
pub use config::{RenderOptions, TraversalConfig};
pub use context::DataContext;
pub use discovery::{discover_pages, PageFile};
pub use error::EngineError;
pub use hydration::{extract_client_state, hydrate, inject_client_state};
pub use processor::Engine;
pub use render::{render_fragment, render_html, resolve_includes};
pub use resolve::resolve;
pub use sources::{entity_name, filter_local_data, validate_data_href, LocalDataFetcher, SourceRegistry};

#[cfg(feature = "napi")]
pub use render::render_html_native;
