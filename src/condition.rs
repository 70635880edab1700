//! Condition Evaluator for `data-t-if`.
//!
//! Grammar: whitespace-separated clauses, all of which must pass. A clause is
//! either a bare key (truthiness, `!` negates) or `key<op>v1,v2,...` where
//! `<op>` is one of `=`, `:ne=`, `:gt=`, `:gte=`, `:lt=`, `:lte=`.

use serde_json::Value;
use std::cmp::Ordering;

use crate::context::DataContext;
use crate::path::is_truthy;
use crate::resolve::{self, QUERY_NAMESPACE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Suffixes of the left-hand side that turn `=` into another operator.
const OPERATOR_SUFFIXES: [(&str, Operator); 5] = [
    (":gte", Operator::Gte),
    (":lte", Operator::Lte),
    (":ne", Operator::Ne),
    (":gt", Operator::Gt),
    (":lt", Operator::Lt),
];

/// Evaluate a condition. Empty input is false.
pub fn evaluate(expression: &str, ctx: &DataContext) -> bool {
    let resolved = if expression.contains('{') {
        resolve::resolve_text(expression, ctx)
    } else {
        expression.to_string()
    };

    let mut clauses = resolved.split_whitespace().peekable();
    if clauses.peek().is_none() {
        return false;
    }

    clauses.all(|clause| evaluate_clause(clause, ctx))
}

fn evaluate_clause(clause: &str, ctx: &DataContext) -> bool {
    let Some((left, right)) = clause.split_once('=') else {
        return evaluate_truthiness(clause, ctx);
    };

    let (key, operator) = OPERATOR_SUFFIXES
        .iter()
        .find_map(|(suffix, op)| left.strip_suffix(suffix).map(|key| (key, *op)))
        .unwrap_or((left, Operator::Eq));

    let value = ctx.get(&lookup_key(key)).map(|v| v.into_owned());
    let mut candidates = right.split(',');

    match operator {
        Operator::Ne => candidates.all(|candidate| !equals(value.as_ref(), candidate)),
        Operator::Eq => candidates.any(|candidate| equals(value.as_ref(), candidate)),
        ordering_op => candidates.any(|candidate| compare(value.as_ref(), candidate, ordering_op)),
    }
}

fn evaluate_truthiness(clause: &str, ctx: &DataContext) -> bool {
    let (negate, key) = match clause.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, clause),
    };

    let value = ctx.get_sequence(&lookup_key(key));
    is_truthy(value.as_deref()) != negate
}

fn lookup_key(key: &str) -> String {
    match key.strip_prefix('?') {
        Some(param) => format!("{}{}", QUERY_NAMESPACE, param),
        None => key.to_string(),
    }
}

/// Strict string equality. Undefined never matches.
fn equals(value: Option<&Value>, candidate: &str) -> bool {
    match value {
        None => false,
        Some(v) => resolve::display(v) == candidate,
    }
}

fn compare(value: Option<&Value>, candidate: &str, operator: Operator) -> bool {
    let Some(value) = value else {
        return false;
    };

    let left_text = resolve::display(value);
    let ordering = match (as_number(value, &left_text), candidate.trim().parse::<f64>()) {
        (Some(left), Ok(right)) => left.partial_cmp(&right),
        _ => Some(left_text.as_str().cmp(candidate)),
    };

    let Some(ordering) = ordering else {
        return false;
    };

    match operator {
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        Operator::Eq | Operator::Ne => false,
    }
}

fn as_number(value: &Value, text: &str) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(_) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
