//! The two narrow async interfaces the directive walk consumes, plus the
//! include resolvers and fetch combinators that ship with the crate.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Resolves `data-t-include` paths to fragment markup.
///
/// `Ok(None)` is absence. Errors are logged by the walk and also treated as
/// absence.
#[async_trait(?Send)]
pub trait IncludeResolver {
    async fn resolve(&self, path: &str) -> Result<Option<String>, EngineError>;
}

/// Fetches the data for a `data-t-source` element.
#[async_trait(?Send)]
pub trait DataFetcher {
    async fn fetch(&self, href: &str, name: &str) -> Result<Option<Value>, EngineError>;
}

#[async_trait(?Send)]
impl<T: IncludeResolver + ?Sized> IncludeResolver for Rc<T> {
    async fn resolve(&self, path: &str) -> Result<Option<String>, EngineError> {
        (**self).resolve(path).await
    }
}

#[async_trait(?Send)]
impl<T: DataFetcher + ?Sized> DataFetcher for Rc<T> {
    async fn fetch(&self, href: &str, name: &str) -> Result<Option<Value>, EngineError> {
        (**self).fetch(href, name).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INCLUDE RESOLVERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIncludes;

#[async_trait(?Send)]
impl IncludeResolver for NoIncludes {
    async fn resolve(&self, _path: &str) -> Result<Option<String>, EngineError> {
        Ok(None)
    }
}

/// In-memory fragments keyed by include path.
#[derive(Debug, Default, Clone)]
pub struct StaticIncludes {
    fragments: HashMap<String, String>,
}

impl StaticIncludes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, html: impl Into<String>) -> Self {
        self.insert(path, html);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, html: impl Into<String>) {
        self.fragments.insert(path.into(), html.into());
    }
}

impl From<HashMap<String, String>> for StaticIncludes {
    fn from(fragments: HashMap<String, String>) -> Self {
        Self { fragments }
    }
}

#[async_trait(?Send)]
impl IncludeResolver for StaticIncludes {
    async fn resolve(&self, path: &str) -> Result<Option<String>, EngineError> {
        let key = path.trim_start_matches('/');
        Ok(self
            .fragments
            .get(path)
            .or_else(|| self.fragments.get(key))
            .cloned())
    }
}

/// Fragments read from files under a root directory. A leading `/` is
/// relative to the root; `..` and drive prefixes are rejected.
#[derive(Debug, Clone)]
pub struct DirectoryIncludes {
    root: PathBuf,
}

impl DirectoryIncludes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, include_path: &str) -> Result<PathBuf, EngineError> {
        let relative = Path::new(include_path.trim_start_matches(['/', '\\']));

        let escapes = relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || include_path.contains('\0') {
            return Err(EngineError::PathTraversal(include_path.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait(?Send)]
impl IncludeResolver for DirectoryIncludes {
    async fn resolve(&self, path: &str) -> Result<Option<String>, EngineError> {
        let file = self.locate(path)?;
        if !file.is_file() {
            debug!(path = %file.display(), "include not found");
            return Ok(None);
        }
        std::fs::read_to_string(&file)
            .map(Some)
            .map_err(|e| EngineError::io(file, e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FETCH CHAIN
// ═══════════════════════════════════════════════════════════════════════════════

/// Tries each fetcher in order; the first one returning data wins. A failing
/// fetcher is logged and skipped.
#[derive(Default)]
pub struct FetchChain {
    fetchers: Vec<Box<dyn DataFetcher>>,
}

impl FetchChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<F: DataFetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetchers.push(Box::new(fetcher));
        self
    }
}

#[async_trait(?Send)]
impl DataFetcher for FetchChain {
    async fn fetch(&self, href: &str, name: &str) -> Result<Option<Value>, EngineError> {
        for (index, fetcher) in self.fetchers.iter().enumerate() {
            match fetcher.fetch(href, name).await {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(href = %href, name = %name, fetcher = index, error = %e, "fetcher failed");
                }
            }
        }
        Ok(None)
    }
}
