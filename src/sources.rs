//! Data sources: the session-scoped registry, the local JSON fetcher, and the
//! query filtering shared by both.
//!
//! ## Href rules
//!
//! 1. A local data href has the shape `[/]_sys/data/<entity>.json[?query]`.
//!    Entities starting with `_` are system data and never served.
//! 2. Query parameters filter a sequence: plain keys are exact string matches,
//!    `_sort` / `_order` sort, `_offset` / `_limit` page.
//! 3. Empty values, the `{?}` shorthand and unresolved placeholders are
//!    ignored, so a half-resolved href never filters everything away.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::{debug, warn};
use url::Url;

use crate::collaborators::DataFetcher;
use crate::error::EngineError;

lazy_static! {
    static ref DATA_HREF_RE: Regex =
        Regex::new(r"^(/|\\)?_sys(/|\\)data(/|\\)([a-zA-Z0-9_-]+)\.json(\?.*)?$").unwrap();
    static ref QUERY_SHORTHAND_RE: Regex = Regex::new(r"([\w-]+)=\{\?\}").unwrap();
}

const QUERY_BASE: &str = "http://localhost/";
const QUERY_SHORTHAND: &str = "{?}";

/// Entity name of a valid local data href, `None` for anything else.
pub fn validate_data_href(href: &str) -> Option<String> {
    let caps = DATA_HREF_RE.captures(href)?;
    let entity = caps.get(4)?.as_str();
    if entity.starts_with('_') {
        return None;
    }
    Some(entity.to_string())
}

/// Last path segment of `href` without query string or `.json` suffix.
pub fn entity_name(href: &str) -> String {
    let path = href.split('?').next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.len().checked_sub(5) {
        Some(cut) if last.is_char_boundary(cut) && last[cut..].eq_ignore_ascii_case(".json") => {
            last[..cut].to_string()
        }
        _ => last.to_string(),
    }
}

/// Expand `key={?}` to `key={_sys.query.key}`.
pub fn expand_query_shorthand(href: &str) -> Cow<'_, str> {
    QUERY_SHORTHAND_RE.replace_all(href, "${1}={_sys.query.${1}}")
}

/// Query parameters of `href`, later duplicates replacing earlier ones.
fn query_params(href: &str) -> Option<Vec<(String, String)>> {
    let base = Url::parse(QUERY_BASE).ok()?;
    let url = base.join(href).ok()?;

    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        match params.iter_mut().find(|(k, _)| k.as_str() == key.as_ref()) {
            Some(existing) => existing.1 = value.into_owned(),
            None => params.push((key.into_owned(), value.into_owned())),
        }
    }
    Some(params)
}

fn is_ignored_param(value: &str) -> bool {
    value.is_empty() || value == QUERY_SHORTHAND || value.contains('{')
}

#[derive(Debug, Default)]
struct Query {
    filters: Vec<(String, String)>,
    sort: Option<String>,
    descending: bool,
    offset: usize,
    limit: Option<i64>,
}

impl Query {
    fn from_href(href: &str) -> Option<Self> {
        let mut query = Query::default();

        for (key, value) in query_params(href)? {
            if is_ignored_param(&value) {
                continue;
            }
            match key.as_str() {
                "_limit" => query.limit = parse_int_prefix(&value),
                "_offset" => {
                    query.offset = parse_int_prefix(&value)
                        .and_then(|n| usize::try_from(n).ok())
                        .unwrap_or(0)
                }
                "_sort" => query.sort = Some(value),
                "_order" => query.descending = value.eq_ignore_ascii_case("desc"),
                k if k.starts_with('_') => {}
                _ => query.filters.push((key.clone(), value)),
            }
        }

        Some(query)
    }
}

/// Leading integer of `text`, tolerating trailing garbage (`"10px"` is 10).
fn parse_int_prefix(text: &str) -> Option<i64> {
    let text = text.trim();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

/// Field text as compared by filters. A missing field reads as `undefined`.
fn field_text(item: &Value, key: &str) -> String {
    match item.get(key) {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => crate::resolve::display(other),
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Apply the query of `href` to a sequence. Non-sequences, and hrefs without a
/// query, pass through unchanged.
pub fn filter_local_data(data: &Value, href: &str) -> Value {
    let Value::Array(items) = data else {
        return data.clone();
    };
    if !href.contains('?') {
        return data.clone();
    }
    let Some(query) = Query::from_href(href) else {
        return data.clone();
    };

    let mut result: Vec<Value> = items
        .iter()
        .filter(|item| {
            query
                .filters
                .iter()
                .all(|(key, value)| field_text(item, key) == *value)
        })
        .cloned()
        .collect();

    if let Some(sort) = &query.sort {
        result.sort_by(|a, b| {
            let ordering = compare_fields(a.get(sort), b.get(sort));
            if query.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    if query.offset > 0 {
        result = result.into_iter().skip(query.offset).collect();
    }

    if let Some(limit) = query.limit {
        let keep = if limit >= 0 {
            usize::try_from(limit).unwrap_or(usize::MAX)
        } else {
            result.len().saturating_sub(limit.unsigned_abs() as usize)
        };
        result.truncate(keep);
    }

    Value::Array(result)
}

fn is_single_limit(href: &str) -> bool {
    query_params(href)
        .map(|params| params.iter().any(|(k, v)| k == "_limit" && v == "1"))
        .unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Named source data owned by one rendering session.
///
/// Holds embedded or mocked data. One registry per session: concurrent
/// sessions never share an instance.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    data: RefCell<Map<String, Value>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: Map<String, Value>) -> Self {
        Self {
            data: RefCell::new(data),
        }
    }

    /// Provide data for `name`, replacing any earlier entry.
    pub fn mock(&self, name: &str, data: Value) {
        self.data.borrow_mut().insert(name.to_string(), data);
    }

    /// Lookup by source name, then by the entity name of `href`.
    fn lookup(&self, href: &str, name: &str) -> Option<Value> {
        let data = self.data.borrow();
        data.get(name)
            .filter(|v| crate::path::is_truthy(Some(*v)))
            .or_else(|| data.get(&entity_name(href)))
            .map(|found| filter_local_data(found, href))
    }
}

#[async_trait(?Send)]
impl DataFetcher for SourceRegistry {
    async fn fetch(&self, href: &str, name: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.lookup(href, name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCAL DATA FETCHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Serves validated `_sys/data/<entity>.json` hrefs from `<data_dir>/<entity>.json`.
#[derive(Debug, Clone)]
pub struct LocalDataFetcher {
    data_dir: PathBuf,
}

impl LocalDataFetcher {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait(?Send)]
impl DataFetcher for LocalDataFetcher {
    async fn fetch(&self, href: &str, name: &str) -> Result<Option<Value>, EngineError> {
        let Some(entity) = validate_data_href(href) else {
            warn!(href = %href, name = %name, "blocked invalid or system data href");
            return Ok(None);
        };

        let file = self.data_dir.join(format!("{}.json", entity));
        if !file.is_file() {
            debug!(entity = %entity, "no local data file");
            return Ok(None);
        }

        let text = std::fs::read_to_string(&file).map_err(|e| EngineError::io(&file, e))?;
        let data: Value =
            serde_json::from_str(&text).map_err(|e| EngineError::json(file.display().to_string(), e))?;

        let filtered = filter_local_data(&data, href);
        debug!(
            href = %href,
            items = filtered.as_array().map(Vec::len).unwrap_or(1),
            "local fetch"
        );

        if is_single_limit(href) {
            if let Value::Array(items) = &filtered {
                if let [only] = items.as_slice() {
                    return Ok(Some(only.clone()));
                }
            }
        }

        Ok(Some(filtered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn posts() -> Value {
        json!([
            { "id": 1, "title": "banana", "status": "published" },
            { "id": 2, "title": "Apple", "status": "draft" },
            { "id": 3, "title": "cherry", "status": "published" }
        ])
    }

    fn ids(value: &Value) -> Vec<i64> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn test_validate_data_href() {
        assert_eq!(validate_data_href("/_sys/data/posts.json").as_deref(), Some("posts"));
        assert_eq!(validate_data_href("_sys/data/posts.json?id=1").as_deref(), Some("posts"));
        assert_eq!(validate_data_href("/_sys/data/_users.json"), None);
        assert_eq!(validate_data_href("/_sys/data/../x.json"), None);
        assert_eq!(validate_data_href("https://evil.test/_sys/data/a.json"), None);
    }

    #[test]
    fn test_entity_name() {
        assert_eq!(entity_name("/_sys/data/posts.json?id=1"), "posts");
        assert_eq!(entity_name("api/items.JSON"), "items");
        assert_eq!(entity_name("plain"), "plain");
    }

    #[test]
    fn test_query_shorthand() {
        assert_eq!(
            expand_query_shorthand("/_sys/data/posts.json?id={?}&status=draft"),
            "/_sys/data/posts.json?id={_sys.query.id}&status=draft"
        );
    }

    #[test]
    fn test_filter_exact_match() {
        let data = posts();
        assert_eq!(ids(&filter_local_data(&data, "/x.json?status=published")), vec![1, 3]);
        assert_eq!(ids(&filter_local_data(&data, "/x.json?id=2")), vec![2]);
    }

    #[test]
    fn test_filter_sort_and_page() {
        let data = posts();
        assert_eq!(ids(&filter_local_data(&data, "/x.json?_sort=title")), vec![2, 1, 3]);
        assert_eq!(
            ids(&filter_local_data(&data, "/x.json?_sort=id&_order=desc&_limit=2")),
            vec![3, 2]
        );
        assert_eq!(ids(&filter_local_data(&data, "/x.json?_offset=1&_limit=1")), vec![2]);
    }

    #[test]
    fn test_filter_ignores_placeholders() {
        let data = posts();
        assert_eq!(ids(&filter_local_data(&data, "/x.json?id={?}")), vec![1, 2, 3]);
        assert_eq!(ids(&filter_local_data(&data, "/x.json?id={_sys.query.id}")), vec![1, 2, 3]);
        assert_eq!(ids(&filter_local_data(&data, "/x.json?id=")), vec![1, 2, 3]);
        assert_eq!(filter_local_data(&json!({ "a": 1 }), "/x.json?a=2"), json!({ "a": 1 }));
    }

    #[test]
    fn test_registry_lookup_by_name_then_entity() {
        let registry = SourceRegistry::new();
        registry.mock("posts", posts());

        let by_entity = block_on(registry.fetch("/_sys/data/posts.json?id=3", "latest")).unwrap();
        assert_eq!(ids(&by_entity.unwrap()), vec![3]);

        let missing = block_on(registry.fetch("/_sys/data/users.json", "users")).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_local_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("posts.json"), posts().to_string()).unwrap();
        std::fs::write(dir.path().join("_secret.json"), "[]").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();

        let fetcher = LocalDataFetcher::new(dir.path());

        let one = block_on(fetcher.fetch("/_sys/data/posts.json?id=2&_limit=1", "post")).unwrap();
        assert_eq!(one.unwrap()["title"], json!("Apple"));

        let many = block_on(fetcher.fetch("/_sys/data/posts.json?status=published", "posts")).unwrap();
        assert_eq!(ids(&many.unwrap()), vec![1, 3]);

        let blocked = block_on(fetcher.fetch("/_sys/data/_secret.json", "s")).unwrap();
        assert_eq!(blocked, None);

        assert!(matches!(
            block_on(fetcher.fetch("/_sys/data/broken.json", "b")),
            Err(EngineError::Json { .. })
        ));
    }
}
