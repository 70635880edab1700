//! Path Accessor
//!
//! Dotted-path lookup over a nested data context.
//!
//! ## Lookup Rules
//!
//! 1. **Auto-expansion**: descending into a sequence by a plain key collapses a
//!    single-element sequence into its element. A longer (or empty) sequence is
//!    ambiguous and yields `None`.
//! 2. **Exempt segments**: numeric segments, `_`-prefixed segments (such as
//!    `_length`) and the native sequence operation names never trigger expansion.
//! 3. **Compound keys**: on an object, the longest run of remaining segments that
//!    exists verbatim as a key wins over a single segment. List items are bound
//!    under their full dotted path, so `blog.posts.title` resolves against a
//!    `"blog.posts"` key before it ever reaches `blog`.
//! 4. **Final value**: a single-element sequence at the end of the path is also
//!    collapsed, unless expansion is suppressed (list directives need the
//!    sequence itself).
//! 5. **Pollution guard**: `__proto__`, `constructor` and `prototype` segments
//!    make the whole lookup miss.

use serde_json::Value;
use std::borrow::Cow;

/// Reserved segment returning the element count of a sequence or string.
pub const LENGTH_KEY: &str = "_length";

const BLOCKED_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Names a sequence answers natively; expansion is skipped for them.
const SEQUENCE_OPERATIONS: [&str; 6] = ["length", "map", "filter", "forEach", "reduce", "slice"];

enum Step<'v> {
    Child(&'v Value, usize),
    Computed(Value),
}

/// Look up `path` in `context`. `None` means undefined; `Some(Value::Null)` is
/// an explicit null.
pub fn get<'a>(context: &'a Value, path: &str, suppress_expand: bool) -> Option<Cow<'a, Value>> {
    if path.is_empty() {
        return None;
    }

    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| BLOCKED_SEGMENTS.contains(s)) {
        return None;
    }

    let mut current: Cow<'a, Value> = Cow::Borrowed(context);
    let mut index = 0;

    while index < segments.len() {
        let rest = &segments[index..];

        if matches!(current.as_ref(), Value::Array(_)) && is_expandable(rest[0]) {
            current = expand_single(current)?;
        }

        let (next, consumed) = match &current {
            Cow::Borrowed(value) => match step(*value, rest)? {
                Step::Child(child, n) => (Cow::Borrowed(child), n),
                Step::Computed(value) => (Cow::Owned(value), 1),
            },
            Cow::Owned(value) => match step(value, rest)? {
                Step::Child(child, n) => (Cow::Owned(child.clone()), n),
                Step::Computed(value) => (Cow::Owned(value), 1),
            },
        };

        current = next;
        index += consumed;
    }

    if !suppress_expand {
        if let Value::Array(items) = current.as_ref() {
            if items.len() == 1 {
                return expand_single(current);
            }
        }
    }

    Some(current)
}

fn is_expandable(segment: &str) -> bool {
    let numeric = segment
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);

    !numeric && !segment.starts_with('_') && !SEQUENCE_OPERATIONS.contains(&segment)
}

fn expand_single(value: Cow<'_, Value>) -> Option<Cow<'_, Value>> {
    match value {
        Cow::Borrowed(Value::Array(items)) => match items.as_slice() {
            [only] => Some(Cow::Borrowed(only)),
            _ => None,
        },
        Cow::Owned(Value::Array(mut items)) => {
            if items.len() == 1 {
                items.pop().map(Cow::Owned)
            } else {
                None
            }
        }
        other => Some(other),
    }
}

fn step<'v>(value: &'v Value, rest: &[&str]) -> Option<Step<'v>> {
    let segment = rest[0];

    match value {
        Value::Object(map) => {
            for end in (2..=rest.len()).rev() {
                let compound = rest[..end].join(".");
                if let Some(found) = map.get(&compound) {
                    return Some(Step::Child(found, end));
                }
            }
            map.get(segment).map(|found| Step::Child(found, 1))
        }
        Value::Array(items) => {
            if segment == LENGTH_KEY || segment == "length" {
                return Some(Step::Computed(Value::from(items.len())));
            }
            segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .map(|found| Step::Child(found, 1))
        }
        Value::String(text) if segment == LENGTH_KEY || segment == "length" => {
            Some(Step::Computed(Value::from(text.chars().count())))
        }
        _ => None,
    }
}

/// Truthiness used by conditions and negated placeholders.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}
