//! Term classification and search-string helpers
//!
//! Each raw term from the splitter becomes exactly one [`Token`]. Operators
//! that sit in a position where they cannot join two operands are dropped
//! here, so the compiler only sees operators it must honour.

use super::unquote::unquote;

/// Escape character bound alongside every `LIKE` pattern
pub const LIKE_ESCAPE: &str = "\\";

/// What a match term compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// `f~x`
    FileContains,
    /// `-f~x`
    FileNotContains,
    /// `t~x`
    TagContains,
    /// `-t~x`
    TagNotContains,
    /// `t=x`
    TagExact,
    /// `-t=x`
    TagNotExact,
    /// `t<N`: fewer than N distinct live tags
    TagCountBelow,
    /// `t>N`: more than N distinct live tags
    TagCountAbove,
    /// `dupes>N`: content present at more than N+1 live paths
    DupesAbove,
    /// Anything else: filename or tag contains
    FileOrTag,
}

/// Prefixes in match order, operator letters compared case-insensitively
const PREFIXES: &[(&str, MatchKind)] = &[
    ("f~", MatchKind::FileContains),
    ("-f~", MatchKind::FileNotContains),
    ("t~", MatchKind::TagContains),
    ("t=", MatchKind::TagExact),
    ("-t~", MatchKind::TagNotContains),
    ("-t=", MatchKind::TagNotExact),
    ("t<", MatchKind::TagCountBelow),
    ("t>", MatchKind::TagCountAbove),
    ("dupes>", MatchKind::DupesAbove),
];

/// A match term with its prefix removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub kind: MatchKind,
    /// Operand as typed, quotes and escapes still present
    pub operand: String,
}

impl Term {
    pub fn parse(raw: &str) -> Self {
        for (prefix, kind) in PREFIXES {
            if let Some(operand) = strip_prefix_ignore_case(raw, prefix) {
                return Self {
                    kind: *kind,
                    operand: operand.to_string(),
                };
            }
        }
        Self {
            kind: MatchKind::FileOrTag,
            operand: raw.to_string(),
        }
    }

    /// Unquoted, `LIKE`-escaped operand
    pub fn literal(&self) -> String {
        escape_like(&unquote(&self.operand))
    }

    /// Numeric operand of a count term; 1 when unparsable
    pub fn count(&self) -> i64 {
        let digits = self.operand.strip_prefix('=').unwrap_or(&self.operand);
        digits.parse().unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    And,
    Or,
    Open,
    Close,
    Match(Term),
}

/// Classify split terms, dropping operators that cannot apply
///
/// `AND`/`OR` (upper case only) are kept when a term precedes and follows
/// them, the preceding one is not `AND`, `OR` or `(`, and the following one
/// is not `)`.
pub fn classify(terms: &[String]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(terms.len());
    for (i, term) in terms.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| terms[p].as_str());
        let next = terms.get(i + 1).map(String::as_str);

        match term.as_str() {
            op @ ("AND" | "OR") => {
                let honoured = matches!(prev, Some(p) if !matches!(p, "AND" | "OR" | "("))
                    && matches!(next, Some(n) if n != ")");
                if honoured {
                    tokens.push(if op == "AND" { Token::And } else { Token::Or });
                }
            }
            "(" => tokens.push(Token::Open),
            ")" => tokens.push(Token::Close),
            raw => tokens.push(Token::Match(Term::parse(raw))),
        }
    }
    tokens
}

/// Escape `LIKE` metacharacters; `*` becomes the `%` wildcard
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '*' => out.push('%'),
            c => out.push(c),
        }
    }
    out
}

/// Wrap a contains pattern in wildcards unless anchored with `^` / `$`
pub fn anchored_or_wildcard_ends(pattern: &str) -> String {
    let mut out = match pattern.strip_prefix('^') {
        Some(rest) => rest.to_string(),
        None => format!("%{}", pattern),
    };
    match out.strip_suffix('$') {
        Some(rest) => rest.to_string(),
        None => {
            out.push('%');
            out
        }
    }
}

/// Search string matching exactly one tag
pub fn single_tag_search(tag: &str) -> String {
    format!("t={}", quote_search_term(tag))
}

/// Search string matching files under (or at) an absolute path
pub fn path_search(path: &str) -> String {
    format!("f~^{}", quote_search_term(path))
}

fn quote_search_term(term: &str) -> String {
    let needs_quotes = term
        .chars()
        .any(|c| matches!(c, '(' | ')') || c.is_whitespace());
    if !needs_quotes {
        return term.to_string();
    }
    if term.contains('"') {
        format!("'{}'", term.replace('\'', "\\'"))
    } else {
        format!("\"{}\"", term)
    }
}

fn strip_prefix_ignore_case<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    let head = raw.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&raw[prefix.len()..])
    } else {
        None
    }
}
