//! Page discovery.
//!
//! Scans a site root for `.html` pages. Directories starting with `_` hold
//! fragments and data (`_parts/`, `_sys/`) and are never scanned.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A page on disk and the route it is served under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub path: PathBuf,
    /// Root-relative path with forward slashes, e.g. `/blog/index.html`.
    pub route: String,
}

fn is_private_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with('_')
}

/// Every page under `root`, sorted by route.
pub fn discover_pages(root: &Path) -> Vec<PageFile> {
    let mut pages = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_private_dir(entry));

    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_html = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("html"))
            .unwrap_or(false);
        if !is_html {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        let route = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        pages.push(PageFile {
            path: path.to_path_buf(),
            route: format!("/{}", route),
        });
    }

    pages.sort_by(|a, b| a.route.cmp(&b.route));
    pages
}
