//! Expression Resolver
//!
//! Resolves `{key | pipe:arg}` placeholders in strings against a [`DataContext`].
//!
//! ## Invariants
//!
//! 1. **Unresolved stays literal**: a placeholder whose key is undefined renders
//!    as its original text, so a later pass (client hydration) can retry it.
//! 2. **Single pass**: substituted text is never scanned again. `{a}` resolving
//!    to `"{b}"` renders `{b}`.
//! 3. **No nesting**: a string with an unescaped `{` opened inside another is
//!    returned unchanged as a whole.
//! 4. **Escapes survive**: `\{` and `\}` are left in place here and only
//!    removed by [`unescape_braces`] once every binding has run.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Number, Value};
use std::borrow::Cow;

use crate::context::DataContext;
use crate::path::is_truthy;
use crate::pipes;

lazy_static! {
    static ref PLACEHOLDER_RE: Regex =
        Regex::new(r"\{\s*([^}|]+?)\s*(?:\|\s*([^}]+?)\s*)?\}").unwrap();
}

/// Prefix a `?key` placeholder is rewritten to.
pub const QUERY_NAMESPACE: &str = "_sys.query.";

/// Resolve `expression`.
///
/// A bare path (no braces, spaces or `?`) is looked up directly and keeps its
/// type, which conditions rely on for booleans and numbers. Anything else goes
/// through placeholder substitution and yields a string.
pub fn resolve(expression: &str, ctx: &DataContext) -> Option<Value> {
    if is_bare_path(expression) {
        return lookup(expression, ctx);
    }
    Some(Value::String(resolve_text(expression, ctx)))
}

/// Placeholder substitution over `text`.
pub fn resolve_text(text: &str, ctx: &DataContext) -> String {
    if !text.contains('{') || has_nested_braces(text) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        if is_escaped(text, whole.start()) {
            out.push_str(whole.as_str());
            continue;
        }

        let key = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let pipe = caps.get(2).map(|m| m.as_str());

        match evaluate_placeholder(key, pipe, ctx) {
            Some(rendered) => out.push_str(&rendered),
            None => out.push_str(whole.as_str()),
        }
    }

    out.push_str(&text[last..]);
    out
}

fn is_bare_path(expression: &str) -> bool {
    !expression.contains('{') && !expression.contains(' ') && !expression.contains('?')
}

/// Direct lookup with `!` negation support.
pub fn lookup(path: &str, ctx: &DataContext) -> Option<Value> {
    match path.strip_prefix('!') {
        Some(rest) => {
            let value = ctx.get(rest);
            Some(Value::Bool(!is_truthy(value.as_deref())))
        }
        None => ctx.get(path).map(Cow::into_owned),
    }
}

fn evaluate_placeholder(key: &str, pipe: Option<&str>, ctx: &DataContext) -> Option<String> {
    let key = match key.strip_prefix('?') {
        Some(param) => format!("{}{}", QUERY_NAMESPACE, param),
        None => key.to_string(),
    };

    let mut value = lookup(&key, ctx);

    match pipe {
        Some(pipe) => {
            let (name, args) = parse_pipe(pipe);
            value = pipes::apply(&name, value, &args);
        }
        None => {
            if matches!(value, Some(Value::Array(_))) {
                value = None;
            }
        }
    }

    value.map(|v| display(&v))
}

/// Split `name:arg1:"arg:2"` on colons outside quotes.
fn parse_pipe(expr: &str) -> (String, Vec<String>) {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in expr.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                ':' => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);

    let mut iter = parts.into_iter();
    let name = iter.next().unwrap_or_default().trim().to_string();
    let args = iter.map(|arg| strip_quotes(arg.trim()).to_string()).collect();
    (name, args)
}

fn strip_quotes(arg: &str) -> &str {
    let arg = arg.strip_prefix(['"', '\'']).unwrap_or(arg);
    arg.strip_suffix(['"', '\'']).unwrap_or(arg)
}

fn is_escaped(text: &str, index: usize) -> bool {
    index > 0 && text.as_bytes()[index - 1] == b'\\'
}

/// True when an unescaped `{` opens before the previous one closed.
fn has_nested_braces(text: &str) -> bool {
    let mut depth = 0usize;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => {
                if depth > 0 {
                    return true;
                }
                depth += 1;
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    false
}

/// Render a resolved value as text. `null` is the empty string.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => display_number(n),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn display_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map(|f| f.to_string()).unwrap_or_default()
}

/// Remove the backslash from escaped braces. Runs once, after binding.
pub fn unescape_braces(text: &str) -> Cow<'_, str> {
    if text.contains("\\{") || text.contains("\\}") {
        Cow::Owned(text.replace("\\{", "{").replace("\\}", "}"))
    } else {
        Cow::Borrowed(text)
    }
}
