//! Context-key expressions used by keybinding `when` clauses
//!
//! The grammar is intentionally flat: a conjunction (`&&`) of atoms, where an
//! atom is one of `key`, `!key`, `key == value`, `key != value` or
//! `key =~ /pattern/i`. Expressions are immutable and canonicalized by
//! [`ContextKeyExpr::normalize`]: boolean comparisons fold into
//! `Defined`/`Not`, conjunctions are flattened, sorted and de-duplicated.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::value::ContextValue;

/// Read access to context values, as consulted during evaluation
pub trait ContextLookup {
    fn get_value(&self, key: &str) -> Option<ContextValue>;
}

impl ContextLookup for HashMap<String, ContextValue> {
    fn get_value(&self, key: &str) -> Option<ContextValue> {
        self.get(key).cloned()
    }
}

impl<T: ContextLookup + ?Sized> ContextLookup for &T {
    fn get_value(&self, key: &str) -> Option<ContextValue> {
        (**self).get_value(key)
    }
}

/// A compiled `=~` pattern together with the source it was written as
#[derive(Debug, Clone)]
pub struct ContextRegex {
    source: String,
    ignore_case: bool,
    regex: Regex,
}

impl ContextRegex {
    pub fn new(source: &str, ignore_case: bool) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .build()?;
        Ok(ContextRegex {
            source: source.to_string(),
            ignore_case,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

impl PartialEq for ContextRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.ignore_case == other.ignore_case
    }
}

impl Eq for ContextRegex {}

/// A boolean expression over context keys
#[derive(Debug, Clone)]
pub enum ContextKeyExpr {
    Defined(String),
    Not(String),
    Equals(String, ContextValue),
    NotEquals(String, ContextValue),
    /// `None` is an inert pattern: it never matches
    Regex(String, Option<ContextRegex>),
    And(Vec<ContextKeyExpr>),
}

impl ContextKeyExpr {
    pub fn has(key: impl Into<String>) -> Self {
        ContextKeyExpr::Defined(key.into())
    }

    pub fn not(key: impl Into<String>) -> Self {
        ContextKeyExpr::Not(key.into())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        ContextKeyExpr::Equals(key.into(), value.into())
    }

    pub fn not_equals(key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        ContextKeyExpr::NotEquals(key.into(), value.into())
    }

    pub fn regex(key: impl Into<String>, pattern: Option<ContextRegex>) -> Self {
        ContextKeyExpr::Regex(key.into(), pattern)
    }

    /// Build a conjunction. The children are normalized, nested conjunctions
    /// are flattened and the result is sorted and de-duplicated, so two
    /// conjunctions of the same clauses compare equal regardless of order.
    pub fn and(exprs: impl IntoIterator<Item = ContextKeyExpr>) -> Self {
        ContextKeyExpr::And(canonical_children(exprs))
    }

    /// Parse the `when` clause text syntax. Blank input yields `None`.
    pub fn deserialize(serialized: &str) -> Option<Self> {
        if serialized.trim().is_empty() {
            return None;
        }
        let atoms = serialized
            .split("&&")
            .filter_map(deserialize_one)
            .collect::<Vec<_>>();
        ContextKeyExpr::and(atoms).normalize()
    }

    fn type_rank(&self) -> u8 {
        match self {
            ContextKeyExpr::Defined(_) => 1,
            ContextKeyExpr::Not(_) => 2,
            ContextKeyExpr::Equals(..) => 3,
            ContextKeyExpr::NotEquals(..) => 4,
            ContextKeyExpr::Regex(..) => 5,
            ContextKeyExpr::And(_) => 6,
        }
    }

    /// Canonical form: `None` for an empty conjunction, the single child for
    /// a one-element conjunction. Idempotent.
    pub fn normalize(&self) -> Option<ContextKeyExpr> {
        match self {
            ContextKeyExpr::Equals(key, ContextValue::Bool(true))
            | ContextKeyExpr::NotEquals(key, ContextValue::Bool(false)) => {
                Some(ContextKeyExpr::Defined(key.clone()))
            }
            ContextKeyExpr::Equals(key, ContextValue::Bool(false))
            | ContextKeyExpr::NotEquals(key, ContextValue::Bool(true)) => {
                Some(ContextKeyExpr::Not(key.clone()))
            }
            ContextKeyExpr::And(children) => {
                let mut children = canonical_children(children.iter().cloned());
                match children.len() {
                    0 => None,
                    1 => children.pop(),
                    _ => Some(ContextKeyExpr::And(children)),
                }
            }
            other => Some(other.clone()),
        }
    }

    pub fn evaluate(&self, context: &dyn ContextLookup) -> bool {
        match self {
            ContextKeyExpr::Defined(key) => context
                .get_value(key)
                .map(|value| value.is_truthy())
                .unwrap_or(false),
            ContextKeyExpr::Not(key) => !context
                .get_value(key)
                .map(|value| value.is_truthy())
                .unwrap_or(false),
            ContextKeyExpr::Equals(key, expected) => context
                .get_value(key)
                .map(|value| value.loose_eq(expected))
                .unwrap_or(false),
            ContextKeyExpr::NotEquals(key, expected) => !context
                .get_value(key)
                .map(|value| value.loose_eq(expected))
                .unwrap_or(false),
            ContextKeyExpr::Regex(key, pattern) => match (pattern, context.get_value(key)) {
                (Some(pattern), Some(value)) => pattern.is_match(&value.to_string()),
                _ => false,
            },
            ContextKeyExpr::And(children) => children.iter().all(|e| e.evaluate(context)),
        }
    }

    /// Referenced key names, one entry per occurrence
    pub fn keys(&self) -> Vec<String> {
        match self {
            ContextKeyExpr::Defined(key)
            | ContextKeyExpr::Not(key)
            | ContextKeyExpr::Equals(key, _)
            | ContextKeyExpr::NotEquals(key, _)
            | ContextKeyExpr::Regex(key, _) => vec![key.clone()],
            ContextKeyExpr::And(children) => children.iter().flat_map(|e| e.keys()).collect(),
        }
    }

    /// The atomic clauses of this expression: the children of a top-level
    /// conjunction, or the expression itself
    pub fn clauses(&self) -> &[ContextKeyExpr] {
        match self {
            ContextKeyExpr::And(children) => children,
            other => std::slice::from_ref(other),
        }
    }

    /// Render in the text syntax accepted by [`ContextKeyExpr::deserialize`]
    pub fn serialize(&self) -> String {
        match self {
            ContextKeyExpr::Defined(key) => key.clone(),
            ContextKeyExpr::Not(key) => format!("!{}", key),
            ContextKeyExpr::Equals(key, value) | ContextKeyExpr::NotEquals(key, value) => {
                if let ContextValue::Bool(_) = value {
                    return self
                        .normalize()
                        .map(|e| e.serialize())
                        .unwrap_or_default();
                }
                let op = if matches!(self, ContextKeyExpr::Equals(..)) {
                    "=="
                } else {
                    "!="
                };
                match value {
                    // a quote cannot be escaped inside a literal, so write it bare
                    ContextValue::String(text) if text.contains('\'') => {
                        format!("{} {} {}", key, op, text)
                    }
                    _ => format!("{} {} '{}'", key, op, value),
                }
            }
            ContextKeyExpr::Regex(key, Some(pattern)) => format!(
                "{} =~ /{}/{}",
                key,
                pattern.source(),
                if pattern.ignore_case() { "i" } else { "" }
            ),
            // an unbalanced group, so the clause reparses as inert
            ContextKeyExpr::Regex(key, None) => format!("{} =~ /(/", key),
            ContextKeyExpr::And(children) => children
                .iter()
                .map(|e| e.serialize())
                .collect::<Vec<_>>()
                .join(" && "),
        }
    }
}

fn canonical_children(exprs: impl IntoIterator<Item = ContextKeyExpr>) -> Vec<ContextKeyExpr> {
    let mut children = Vec::new();
    for expr in exprs {
        match expr.normalize() {
            Some(ContextKeyExpr::And(nested)) => children.extend(nested),
            Some(expr) => children.push(expr),
            None => {}
        }
    }
    children.sort();
    children.dedup();
    children
}

fn deserialize_one(serialized: &str) -> Option<ContextKeyExpr> {
    let serialized = serialized.trim();
    if serialized.is_empty() {
        warn!("Ignoring empty clause in context key expression");
        return None;
    }

    if serialized.contains("!=") {
        let mut pieces = serialized.split("!=");
        let key = pieces.next().unwrap_or_default().trim();
        let value = deserialize_value(pieces.next().unwrap_or_default());
        return Some(ContextKeyExpr::NotEquals(key.to_string(), value));
    }

    if serialized.contains("==") {
        let mut pieces = serialized.split("==");
        let key = pieces.next().unwrap_or_default().trim();
        let value = deserialize_value(pieces.next().unwrap_or_default());
        return Some(ContextKeyExpr::Equals(key.to_string(), value));
    }

    if serialized.contains("=~") {
        let mut pieces = serialized.split("=~");
        let key = pieces.next().unwrap_or_default().trim();
        let pattern = deserialize_regex_value(pieces.next().unwrap_or_default());
        return Some(ContextKeyExpr::Regex(key.to_string(), pattern));
    }

    if let Some(rest) = serialized.strip_prefix('!') {
        return Some(ContextKeyExpr::Not(rest.trim().to_string()));
    }

    Some(ContextKeyExpr::Defined(serialized.to_string()))
}

fn deserialize_value(serialized: &str) -> ContextValue {
    let serialized = serialized.trim();
    match serialized {
        "true" => return ContextValue::Bool(true),
        "false" => return ContextValue::Bool(false),
        _ => {}
    }

    let quoted = serialized
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .filter(|inner| !inner.contains('\''));
    match quoted {
        Some(inner) => ContextValue::String(inner.trim().to_string()),
        None => ContextValue::String(serialized.to_string()),
    }
}

fn deserialize_regex_value(serialized: &str) -> Option<ContextRegex> {
    if serialized.trim().is_empty() {
        warn!("Missing regexp-value for =~-expression");
        return None;
    }

    let (start, end) = match (serialized.find('/'), serialized.rfind('/')) {
        (Some(start), Some(end)) if start != end => (start, end),
        _ => {
            warn!(
                "Bad regexp-value '{}', missing /-enclosure",
                serialized.trim()
            );
            return None;
        }
    };

    let source = &serialized[start + 1..end];
    let ignore_case = serialized[end + 1..].starts_with('i');
    match ContextRegex::new(source, ignore_case) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!("Bad regexp-value '{}', parse error: {}", serialized.trim(), e);
            None
        }
    }
}

// Total order: expression type, then key, then value or pattern source.
impl Ord for ContextKeyExpr {
    fn cmp(&self, other: &Self) -> Ordering {
        use ContextKeyExpr::*;

        match (self, other) {
            (Defined(a), Defined(b)) | (Not(a), Not(b)) => a.cmp(b),
            (Equals(ka, va), Equals(kb, vb)) | (NotEquals(ka, va), NotEquals(kb, vb)) => {
                ka.cmp(kb).then_with(|| va.cmp(vb))
            }
            (Regex(ka, pa), Regex(kb, pb)) => {
                let source = |p: &Option<ContextRegex>| {
                    p.as_ref().map(|p| (p.source().to_string(), p.ignore_case()))
                };
                ka.cmp(kb).then_with(|| source(pa).cmp(&source(pb)))
            }
            (And(a), And(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for ContextKeyExpr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ContextKeyExpr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ContextKeyExpr {}

impl fmt::Display for ContextKeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(entries: &[(&str, ContextValue)]) -> HashMap<String, ContextValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn parse(s: &str) -> ContextKeyExpr {
        ContextKeyExpr::deserialize(s).expect("expression should parse")
    }

    #[test]
    fn test_and_is_order_independent() {
        let a = ContextKeyExpr::and(vec![
            ContextKeyExpr::has("a1"),
            ContextKeyExpr::and(vec![
                ContextKeyExpr::has("and.a"),
                ContextKeyExpr::has("and.b"),
            ]),
            ContextKeyExpr::has("a2"),
            ContextKeyExpr::equals("b1", "bb1"),
            ContextKeyExpr::equals("b2", "bb2"),
            ContextKeyExpr::not_equals("c1", "cc1"),
            ContextKeyExpr::not_equals("c2", "cc2"),
            ContextKeyExpr::not("d1"),
            ContextKeyExpr::not("d2"),
        ]);
        let b = ContextKeyExpr::and(vec![
            ContextKeyExpr::equals("b2", "bb2"),
            ContextKeyExpr::not_equals("c1", "cc1"),
            ContextKeyExpr::not("d1"),
            ContextKeyExpr::not_equals("c2", "cc2"),
            ContextKeyExpr::has("a2"),
            ContextKeyExpr::equals("b1", "bb1"),
            ContextKeyExpr::has("a1"),
            ContextKeyExpr::and(vec![ContextKeyExpr::has("and.b")]),
            ContextKeyExpr::not("d2"),
            ContextKeyExpr::has("and.a"),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_and_flattens_and_dedups() {
        let e = ContextKeyExpr::and(vec![
            ContextKeyExpr::has("a"),
            ContextKeyExpr::and(vec![ContextKeyExpr::has("b"), ContextKeyExpr::has("a")]),
        ]);
        match &e {
            ContextKeyExpr::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(children.iter().all(|c| !matches!(c, ContextKeyExpr::And(_))));
            }
            other => panic!("expected conjunction, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_folds_booleans() {
        assert_eq!(
            ContextKeyExpr::equals("a", true).normalize(),
            Some(ContextKeyExpr::has("a"))
        );
        assert_eq!(
            ContextKeyExpr::equals("a", false).normalize(),
            Some(ContextKeyExpr::not("a"))
        );
        assert_eq!(
            ContextKeyExpr::not_equals("a", true).normalize(),
            Some(ContextKeyExpr::not("a"))
        );
        assert_eq!(
            ContextKeyExpr::not_equals("a", false).normalize(),
            Some(ContextKeyExpr::has("a"))
        );
    }

    #[test]
    fn test_normalize_collapses_conjunctions() {
        assert_eq!(ContextKeyExpr::and(Vec::new()).normalize(), None);
        assert_eq!(
            ContextKeyExpr::and(vec![ContextKeyExpr::has("a")]).normalize(),
            Some(ContextKeyExpr::has("a"))
        );
        assert_eq!(
            ContextKeyExpr::and(vec![ContextKeyExpr::has("a"), ContextKeyExpr::has("a")])
                .normalize(),
            Some(ContextKeyExpr::has("a"))
        );
    }

    #[test]
    fn test_deserialize_atoms() {
        assert_eq!(parse("a"), ContextKeyExpr::has("a"));
        assert_eq!(parse("!a"), ContextKeyExpr::not("a"));
        assert_eq!(parse("! a"), ContextKeyExpr::not("a"));
        assert_eq!(parse("a == 'b'"), ContextKeyExpr::equals("a", "b"));
        assert_eq!(parse("a == b"), ContextKeyExpr::equals("a", "b"));
        assert_eq!(parse("a != 'b'"), ContextKeyExpr::not_equals("a", "b"));
        assert_eq!(parse("a == true"), ContextKeyExpr::has("a"));
        assert_eq!(parse("a == false"), ContextKeyExpr::not("a"));
        assert_eq!(parse("a != true"), ContextKeyExpr::not("a"));
        assert_eq!(ContextKeyExpr::deserialize("   "), None);
    }

    #[test]
    fn test_deserialize_conjunction() {
        let e = parse("editorFocus && !editorReadonly && resourceLangId == 'rust'");
        assert_eq!(
            e,
            ContextKeyExpr::and(vec![
                ContextKeyExpr::has("editorFocus"),
                ContextKeyExpr::not("editorReadonly"),
                ContextKeyExpr::equals("resourceLangId", "rust"),
            ])
        );
        assert_eq!(
            e.serialize(),
            "editorFocus && !editorReadonly && resourceLangId == 'rust'"
        );
    }

    #[test]
    fn test_deserialize_regex() {
        let e = parse("resource =~ /\\.rs$/");
        assert!(e.evaluate(&context(&[("resource", "main.rs".into())])));
        assert!(!e.evaluate(&context(&[("resource", "main.ts".into())])));
        assert_eq!(e.serialize(), "resource =~ /\\.rs$/");

        let insensitive = parse("resource =~ /README/i");
        assert!(insensitive.evaluate(&context(&[("resource", "readme.md".into())])));
        assert_eq!(insensitive.serialize(), "resource =~ /README/i");
    }

    #[test]
    fn test_malformed_regex_is_inert() {
        for text in ["a =~ ", "a =~ /unterminated", "a =~ /(/"] {
            let e = parse(text);
            assert!(matches!(e, ContextKeyExpr::Regex(_, None)), "{}", text);
            assert!(!e.evaluate(&context(&[("a", "anything".into())])));
        }
    }

    #[test]
    fn test_inert_regex_stays_inert_after_round_trip() {
        let inert = parse("a =~ /(/");
        let reparsed = parse(&inert.serialize());
        assert_eq!(reparsed, inert);
        assert!(!reparsed.evaluate(&context(&[("a", "invalid".into())])));
    }

    #[test]
    fn test_literal_with_quote_round_trips() {
        let e = ContextKeyExpr::equals("a", "it's");
        assert_eq!(e.serialize(), "a == it's");
        assert_eq!(parse(&e.serialize()), e);
        assert!(e.evaluate(&context(&[("a", "it's".into())])));
    }

    #[test]
    fn test_evaluate() {
        let ctx = context(&[
            ("a", true.into()),
            ("b", false.into()),
            ("c", "5".into()),
            ("d", "d".into()),
            ("n", 3.into()),
        ]);
        let check = |text: &str, expected: bool| {
            assert_eq!(parse(text).evaluate(&ctx), expected, "{}", text);
        };
        check("a", true);
        check("b", false);
        check("!a", false);
        check("!b", true);
        check("missing", false);
        check("!missing", true);
        check("c == 5", true);
        check("c != 5", false);
        check("d == 'd'", true);
        check("d != 'd'", false);
        check("n == 3", true);
        check("n == '3'", true);
        check("missing != 'x'", true);
        check("missing == 'x'", false);
        check("a && !b", true);
        check("a && b", false);
        check("a && c == 5 && d == 'd'", true);
    }

    #[test]
    fn test_evaluate_simple_conjunction() {
        let e = parse("foo && !bar");
        assert!(e.evaluate(&context(&[("foo", 1.into())])));
        assert!(!e.evaluate(&context(&[("foo", 1.into()), ("bar", 1.into())])));
    }

    #[test]
    fn test_keys() {
        let e = parse("a && b == 'x' && !c && d =~ /y/");
        let mut keys = e.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_ordering_by_type_then_key() {
        let mut exprs = vec![
            ContextKeyExpr::equals("a", "x"),
            ContextKeyExpr::not("b"),
            ContextKeyExpr::has("z"),
            ContextKeyExpr::has("a"),
        ];
        exprs.sort();
        assert_eq!(
            exprs,
            vec![
                ContextKeyExpr::has("a"),
                ContextKeyExpr::has("z"),
                ContextKeyExpr::not("b"),
                ContextKeyExpr::equals("a", "x"),
            ]
        );
    }
}
