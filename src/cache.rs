use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::discovery::discover_pages;
use crate::error::EngineError;
use crate::processor::Engine;
use crate::render::resolve_includes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub html: String,
}

/// Include-resolved templates keyed by page route, valid while the page
/// source hashes the same.
///
/// Owned by the caller, one per site. Entries live in memory and, when a
/// directory is given, are mirrored there as JSON files.
#[derive(Debug, Default)]
pub struct TemplateCache {
    dir: Option<PathBuf>,
    entries: RefCell<HashMap<String, CacheEntry>>,
}

impl TemplateCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        Ok(Self {
            dir: Some(dir),
            entries: RefCell::default(),
        })
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        let safe_name = key
            .trim_start_matches('/')
            .replace(['/', '\\', ':'], "_");
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", safe_name)))
    }

    pub fn get(&self, key: &str, source: &str) -> Option<String> {
        let hash = Self::compute_hash(source);

        if let Some(entry) = self.entries.borrow().get(key) {
            if entry.hash == hash {
                return Some(entry.html.clone());
            }
        }

        let entry = self.read_entry(key)?;
        if entry.hash != hash {
            return None;
        }
        let html = entry.html.clone();
        self.entries.borrow_mut().insert(key.to_string(), entry);
        Some(html)
    }

    fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key)?;
        let data = fs::read_to_string(&path).ok()?;

        match serde_json::from_str(&data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding corrupt cache entry");
                fs::remove_file(&path).ok();
                None
            }
        }
    }

    pub fn set(&self, key: &str, source: &str, html: &str) -> Result<(), EngineError> {
        let entry = CacheEntry {
            hash: Self::compute_hash(source),
            html: html.to_string(),
        };

        if let Some(path) = self.entry_path(key) {
            let data = serde_json::to_string(&entry).map_err(|e| EngineError::json(key, e))?;
            fs::write(&path, data).map_err(|e| EngineError::io(&path, e))?;
        }

        self.entries.borrow_mut().insert(key.to_string(), entry);
        Ok(())
    }

    /// Cached template for `key`, resolving and storing it on a miss.
    pub async fn resolve(&self, engine: &Engine, key: &str, source: &str) -> Result<String, EngineError> {
        if let Some(html) = self.get(key, source) {
            debug!(key = %key, "template cache hit");
            return Ok(html);
        }

        debug!(key = %key, "template cache miss");
        let html = resolve_includes(engine, source).await?;
        self.set(key, source, &html)?;
        Ok(html)
    }

    /// Resolve every page under `root`. Returns the number of pages cached.
    pub async fn warm(&self, engine: &Engine, root: &Path) -> Result<usize, EngineError> {
        let pages = discover_pages(root);
        for page in &pages {
            let source = fs::read_to_string(&page.path).map_err(|e| EngineError::io(&page.path, e))?;
            self.resolve(engine, &page.route, &source).await?;
        }
        debug!(pages = pages.len(), "template cache warmed");
        Ok(pages.len())
    }

    pub fn clear(&self) -> Result<(), EngineError> {
        let keys: Vec<String> = self.entries.borrow_mut().drain().map(|(k, _)| k).collect();
        for key in keys {
            if let Some(path) = self.entry_path(&key) {
                if path.exists() {
                    fs::remove_file(&path).map_err(|e| EngineError::io(&path, e))?;
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticIncludes;
    use futures::executor::block_on;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(TemplateCache::compute_hash("a"), TemplateCache::compute_hash("a"));
        assert_ne!(TemplateCache::compute_hash("a"), TemplateCache::compute_hash("b"));
    }

    #[test]
    fn test_source_change_invalidates() {
        let cache = TemplateCache::in_memory();
        cache.set("/index.html", "v1", "<p>one</p>").unwrap();

        assert_eq!(cache.get("/index.html", "v1").as_deref(), Some("<p>one</p>"));
        assert_eq!(cache.get("/index.html", "v2"), None);
    }

    #[test]
    fn test_persistent_entries_survive_and_corrupt_ones_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = TemplateCache::persistent(dir.path()).unwrap();
            cache.set("/blog/post.html", "src", "<p>cached</p>").unwrap();
        }

        let reopened = TemplateCache::persistent(dir.path()).unwrap();
        assert_eq!(reopened.get("/blog/post.html", "src").as_deref(), Some("<p>cached</p>"));

        let corrupt = dir.path().join("bad.html.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert_eq!(reopened.get("/bad.html", "src"), None);
        assert!(!corrupt.exists());
    }

    #[test]
    fn test_warm_resolves_includes_only() {
        let site = tempfile::tempdir().unwrap();
        fs::write(
            site.path().join("index.html"),
            "<html><body><div data-t-include=\"_parts/nav.html\"></div><p>{title}</p></body></html>",
        )
        .unwrap();

        let engine = Engine::new().with_includes(StaticIncludes::new().with("_parts/nav.html", "<nav>Menu</nav>"));
        let cache = TemplateCache::in_memory();

        let count = block_on(cache.warm(&engine, site.path())).unwrap();
        assert_eq!(count, 1);

        let source = fs::read_to_string(site.path().join("index.html")).unwrap();
        let html = cache.get("/index.html", &source).unwrap();
        assert!(html.contains("<div><nav>Menu</nav></div>"));
        assert!(html.contains("<p>{title}</p>"));

        cache.clear().unwrap();
        assert!(cache.is_empty());
    }
}
