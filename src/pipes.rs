//! Formatting pipes applied to resolved placeholder values (`{value | name:arg}`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;

/// A pipe receives the resolved value (`None` when undefined) and its
/// quote-stripped arguments.
pub type PipeFn = fn(Option<&Value>, &[String]) -> Option<Value>;

lazy_static! {
    static ref PIPES: HashMap<&'static str, PipeFn> = {
        let mut m: HashMap<&'static str, PipeFn> = HashMap::new();
        m.insert("date", date_pipe);
        m.insert("number", number_pipe);
        m.insert("json", json_pipe);
        m
    };
}

const DEFAULT_DATE_FORMAT: &str = "yyyy/mm/dd";

/// Apply the named pipe. Unknown pipes pass the value through unchanged.
pub fn apply(name: &str, value: Option<Value>, args: &[String]) -> Option<Value> {
    match PIPES.get(name) {
        Some(pipe) => pipe(value.as_ref(), args),
        None => value,
    }
}

fn date_pipe(value: Option<&Value>, args: &[String]) -> Option<Value> {
    let value = match value {
        Some(v) if crate::path::is_truthy(Some(v)) => v,
        _ => return Some(Value::String(String::new())),
    };

    let Some(date) = parse_date(value) else {
        return Some(value.clone());
    };

    let format = args
        .first()
        .filter(|f| !f.is_empty())
        .map(String::as_str)
        .unwrap_or(DEFAULT_DATE_FORMAT);

    Some(Value::String(format_date(&date, format)))
}

fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|d| d.naive_utc()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.naive_local());
            }
            for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(dt);
                }
            }
            for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
                if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                    return d.and_hms_opt(0, 0, 0);
                }
            }
            None
        }
        _ => None,
    }
}

/// Each token is replaced once, in this order.
fn format_date(date: &NaiveDateTime, format: &str) -> String {
    let tokens = [
        ("yyyy", date.format("%Y").to_string()),
        ("mm", date.format("%m").to_string()),
        ("dd", date.format("%d").to_string()),
        ("HH", date.format("%H").to_string()),
        ("MM", date.format("%M").to_string()),
        ("SS", date.format("%S").to_string()),
    ];

    let mut out = format.to_string();
    for (token, replacement) in tokens {
        out = out.replacen(token, &replacement, 1);
    }
    out
}

fn number_pipe(value: Option<&Value>, _args: &[String]) -> Option<Value> {
    let rendered = match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => match to_number(v) {
            Some(n) if n.is_finite() => format_grouped(n),
            Some(n) if n.is_infinite() => {
                if n > 0.0 { "∞".to_string() } else { "-∞".to_string() }
            }
            _ => "NaN".to_string(),
        },
    };
    Some(Value::String(rendered))
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// en-US grouping with at most three fraction digits.
fn format_grouped(n: f64) -> String {
    let fixed = format!("{:.3}", n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let negative = n < 0.0 && (grouped != "0" || !frac_part.is_empty());
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

fn json_pipe(value: Option<&Value>, _args: &[String]) -> Option<Value> {
    let value = value?;
    serde_json::to_string_pretty(value)
        .ok()
        .map(Value::String)
}
