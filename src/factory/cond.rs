use crate::error::*;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Key/value accessor the inclusion conditions are evaluated against.
pub trait Settings {
    fn get(&self, key: &str) -> Option<String>;
}

impl Settings for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
}

impl CondOp {
    fn holds(&self, ord: Ordering) -> bool {
        match self {
            CondOp::Eq => ord == Ordering::Equal,
            CondOp::Ne => ord != Ordering::Equal,
            CondOp::Lt => ord == Ordering::Less,
            CondOp::Le => ord != Ordering::Greater,
            CondOp::Gt => ord == Ordering::Greater,
            CondOp::Ge => ord != Ordering::Less,
            CondOp::Match | CondOp::NotMatch => false,
        }
    }
}

const SYMBOL_OPS: [(&str, CondOp); 8] = [
    ("==", CondOp::Eq),
    ("!=", CondOp::Ne),
    ("<>", CondOp::Ne),
    ("<=", CondOp::Le),
    (">=", CondOp::Ge),
    ("=", CondOp::Eq),
    ("<", CondOp::Lt),
    (">", CondOp::Gt),
];

/// Decimal or `0x` hex integer with an optional sign.
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, digits) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    // one sign only, and it must come before any radix prefix
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let v = i64::from_str_radix(digits, radix).ok()?;
    Some(if neg { -v } else { v })
}

fn split_word_op(cond: &str) -> Option<(&str, CondOp, &str)> {
    let mut words = cond.split_whitespace();
    let key = words.next()?;
    let op = match words.next()?.to_ascii_lowercase().as_str() {
        "match" => CondOp::Match,
        "notmatch" => CondOp::NotMatch,
        _ => return None,
    };
    // the pattern is everything after the operator, spaces included
    let rest = cond.trim_start()[key.len()..].trim_start();
    let pattern = rest[rest.find(char::is_whitespace).unwrap_or(rest.len())..].trim();
    Some((key, op, pattern))
}

fn split_symbol_op(cond: &str) -> Option<(&str, CondOp, &str)> {
    let pos = cond.find(|c| matches!(c, '=' | '!' | '<' | '>'))?;
    let (op, len) = SYMBOL_OPS
        .iter()
        .find(|(s, _)| cond[pos..].starts_with(*s))
        .map(|(s, op)| (*op, s.len()))?;
    Some((cond[..pos].trim(), op, cond[pos + len..].trim()))
}

/// Evaluates `Key op Value`. An empty condition is true; a key missing from
/// `settings` reads as the empty string.
pub fn evaluate(cond: &str, settings: &dyn Settings) -> Result<bool> {
    let cond = cond.trim();
    if cond.is_empty() {
        return Ok(true);
    }
    let (key, op, expected) = split_word_op(cond)
        .or_else(|| split_symbol_op(cond))
        .ok_or_else(|| Error::Condition(format!("no operator in '{}'", cond)))?;
    if key.is_empty() {
        return Err(Error::Condition(format!("no key in '{}'", cond)));
    }
    let actual = settings.get(key).unwrap_or_default();
    let result = match op {
        CondOp::Match | CondOp::NotMatch => {
            let re = RegexBuilder::new(expected).case_insensitive(true).build()?;
            re.is_match(&actual) == (op == CondOp::Match)
        }
        _ => match (parse_int(&actual), parse_int(expected)) {
            (Some(a), Some(b)) => op.holds(a.cmp(&b)),
            _ => match op {
                CondOp::Eq => actual.eq_ignore_ascii_case(expected),
                CondOp::Ne => !actual.eq_ignore_ascii_case(expected),
                _ => {
                    return Err(Error::Condition(format!(
                        "'{}' orders non-numeric values",
                        cond
                    )))
                }
            },
        },
    };
    tracing::trace!(target: crate::logger::FACTORY_TAR, "condition '{}' with {}='{}': {}", cond, key, actual, result);
    Ok(result)
}
