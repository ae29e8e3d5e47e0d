//! Compiles classified tokens into a parameterized SQL predicate
//!
//! Tokens become a tree of groups joined by `AND`/`OR`; terms without an
//! operator between them are AND-ed. Inside one group the joiners keep SQL
//! precedence, so `a OR b c` means `a OR (b AND c)`. Unmatched `)` are
//! dropped, unclosed `(` are closed at the end and empty groups vanish, so
//! every input yields valid SQL.

use rusqlite::types::Value;

use super::splitter::{split, MAX_SEARCH_TERMS};
use super::syntax::{anchored_or_wildcard_ends, classify, MatchKind, Term, Token, LIKE_ESCAPE};
use crate::error::Result;
use crate::models::{MediaId, SortColumn, SortOrder, TagFrequency};
use crate::store::RecordStore;

const SELECT_IDS: &str = "SELECT DISTINCT h.id FROM files f \
     INNER JOIN hashes h ON f.hash = h.hash \
     WHERE f.missing = 0";

const WHERE_FILE: &str = "(f.path LIKE ? ESCAPE ?)";

const WHERE_TAG: &str =
    "(h.id IN (SELECT file_id FROM tags WHERE tag LIKE ? ESCAPE ? AND deleted = 0))";

const WHERE_FILE_OR_TAG: &str = "(f.path LIKE ? ESCAPE ? \
     OR h.id IN (SELECT file_id FROM tags WHERE tag LIKE ? ESCAPE ? AND deleted = 0))";

const WHERE_TAG_COUNT_BELOW: &str = "(h.id NOT IN (SELECT file_id FROM tags WHERE deleted = 0 \
     GROUP BY file_id HAVING COUNT(DISTINCT tag) >= ?))";

const WHERE_TAG_COUNT_ABOVE: &str = "(h.id IN (SELECT file_id FROM tags WHERE deleted = 0 \
     GROUP BY file_id HAVING COUNT(DISTINCT tag) > ?))";

// dupes>0 means at least two copies, so compare against N + 1
const WHERE_DUPES_ABOVE: &str = "(f.hash IN (SELECT hash FROM files WHERE missing = 0 \
     GROUP BY hash HAVING COUNT(hash) > ? + 1))";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    And,
    Or,
}

#[derive(Debug, Clone)]
enum Node {
    Match(Term),
    Group(Vec<(Joiner, Node)>),
}

/// SQL boolean expression plus its bound values, in placeholder order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    /// Empty when the query has no usable terms
    pub sql: String,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// A search ready to run against a [`RecordStore`]
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    terms: Vec<String>,
    predicate: Predicate,
}

/// Compile a user search string, keeping at most [`MAX_SEARCH_TERMS`] terms
///
/// Never fails: misplaced operators and brackets are dropped or closed and
/// unknown prefixes match filename or tag.
pub fn compile(raw: &str) -> CompiledQuery {
    compile_with_max_terms(raw, MAX_SEARCH_TERMS)
}

pub fn compile_with_max_terms(raw: &str, max_terms: usize) -> CompiledQuery {
    let terms = split(raw, max_terms);
    let predicate = compile_tokens(&classify(&terms));
    log::debug!("Compiled {:?} -> {}", terms, predicate.sql);
    CompiledQuery { terms, predicate }
}

/// Build the predicate for already classified tokens
pub fn compile_tokens(tokens: &[Token]) -> Predicate {
    let tree = build_tree(tokens);
    let mut predicate = Predicate::default();
    render_items(&tree, &mut predicate.sql, &mut predicate.params);
    predicate
}

fn build_tree(tokens: &[Token]) -> Vec<(Joiner, Node)> {
    let mut root: Vec<(Joiner, Node)> = Vec::new();
    let mut open: Vec<(Joiner, Vec<(Joiner, Node)>)> = Vec::new();
    let mut pending: Option<Joiner> = None;

    fn current<'a>(
        root: &'a mut Vec<(Joiner, Node)>,
        open: &'a mut [(Joiner, Vec<(Joiner, Node)>)],
    ) -> &'a mut Vec<(Joiner, Node)> {
        match open.last_mut() {
            Some((_, items)) => items,
            None => root,
        }
    }

    for token in tokens {
        match token {
            Token::And => pending = Some(Joiner::And),
            Token::Or => pending = Some(Joiner::Or),
            Token::Open => {
                let joiner = pending.take().unwrap_or(Joiner::And);
                open.push((joiner, Vec::new()));
            }
            Token::Close => {
                if let Some((joiner, items)) = open.pop() {
                    current(&mut root, &mut open).push((joiner, Node::Group(items)));
                }
            }
            Token::Match(term) => {
                let joiner = pending.take().unwrap_or(Joiner::And);
                current(&mut root, &mut open).push((joiner, Node::Match(term.clone())));
            }
        }
    }

    while let Some((joiner, items)) = open.pop() {
        current(&mut root, &mut open).push((joiner, Node::Group(items)));
    }

    root
}

/// Render items, skipping empty groups; returns whether anything was written
fn render_items(items: &[(Joiner, Node)], sql: &mut String, params: &mut Vec<Value>) -> bool {
    let mut wrote = false;
    for (joiner, node) in items {
        let mut fragment = String::new();
        let mut fragment_params = Vec::new();
        if !render_node(node, &mut fragment, &mut fragment_params) {
            continue;
        }
        if wrote {
            sql.push_str(match joiner {
                Joiner::And => " AND ",
                Joiner::Or => " OR ",
            });
        }
        sql.push_str(&fragment);
        params.append(&mut fragment_params);
        wrote = true;
    }
    wrote
}

fn render_node(node: &Node, sql: &mut String, params: &mut Vec<Value>) -> bool {
    match node {
        Node::Match(term) => {
            render_term(term, sql, params);
            true
        }
        Node::Group(items) => {
            let mut inner = String::new();
            if !render_items(items, &mut inner, params) {
                return false;
            }
            sql.push('(');
            sql.push_str(&inner);
            sql.push(')');
            true
        }
    }
}

fn render_term(term: &Term, sql: &mut String, params: &mut Vec<Value>) {
    let like = |params: &mut Vec<Value>, pattern: String| {
        params.push(Value::Text(pattern));
        params.push(Value::Text(LIKE_ESCAPE.to_string()));
    };

    match term.kind {
        MatchKind::FileContains | MatchKind::FileNotContains => {
            if term.kind == MatchKind::FileNotContains {
                sql.push_str("NOT ");
            }
            sql.push_str(WHERE_FILE);
            like(params, anchored_or_wildcard_ends(&term.literal()));
        }
        MatchKind::TagContains | MatchKind::TagNotContains => {
            if term.kind == MatchKind::TagNotContains {
                sql.push_str("NOT ");
            }
            sql.push_str(WHERE_TAG);
            like(params, anchored_or_wildcard_ends(&term.literal()));
        }
        MatchKind::TagExact | MatchKind::TagNotExact => {
            if term.kind == MatchKind::TagNotExact {
                sql.push_str("NOT ");
            }
            sql.push_str(WHERE_TAG);
            like(params, term.literal());
        }
        MatchKind::TagCountBelow => {
            sql.push_str(WHERE_TAG_COUNT_BELOW);
            params.push(Value::Integer(term.count()));
        }
        MatchKind::TagCountAbove => {
            sql.push_str(WHERE_TAG_COUNT_ABOVE);
            params.push(Value::Integer(term.count()));
        }
        MatchKind::DupesAbove => {
            sql.push_str(WHERE_DUPES_ABOVE);
            params.push(Value::Integer(term.count()));
        }
        MatchKind::FileOrTag => {
            sql.push_str(WHERE_FILE_OR_TAG);
            let pattern = format!("%{}%", term.literal());
            like(params, pattern.clone());
            like(params, pattern);
        }
    }
}

impl CompiledQuery {
    /// Terms kept after splitting and truncation
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Full id query with the default order (path, case-insensitive)
    pub fn sql(&self, sorts: &[SortOrder]) -> String {
        let mut sql = String::from(SELECT_IDS);
        if !self.predicate.is_empty() {
            sql.push_str(" AND (");
            sql.push_str(&self.predicate.sql);
            sql.push(')');
        }

        let default_sort = [SortColumn::File.asc()];
        let sorts = if sorts.is_empty() { &default_sort[..] } else { sorts };
        let order: Vec<String> = sorts.iter().map(|s| s.to_sql()).collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
        sql
    }

    /// Matching canonical ids, ordered by path
    pub fn execute(&self, store: &RecordStore, limit: Option<usize>, offset: usize) -> Result<Vec<MediaId>> {
        self.execute_sorted(store, &[], limit, offset)
    }

    /// Matching canonical ids in the given order (path order when empty)
    ///
    /// Build `sorts` with [`SortOrder::zip`] or [`SortColumn::asc`]/[`SortColumn::desc`].
    pub fn execute_sorted(
        &self,
        store: &RecordStore,
        sorts: &[SortOrder],
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<MediaId>> {
        let mut sql = self.sql(sorts);
        let mut params = self.predicate.params.clone();
        append_limit(&mut sql, &mut params, limit, offset);

        let conn = store.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .map(|id| id.map(MediaId::from))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        log::debug!("Search {:?} matched {} ids", self.terms, ids.len());
        Ok(ids)
    }

    /// Live tags across all matches, most frequent first
    pub fn tag_frequencies(
        &self,
        store: &RecordStore,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<TagFrequency>> {
        let mut files = String::from(SELECT_IDS);
        if !self.predicate.is_empty() {
            files.push_str(" AND (");
            files.push_str(&self.predicate.sql);
            files.push(')');
        }

        let mut sql = format!(
            "SELECT t.tag, COUNT(DISTINCT t.file_id) AS freq FROM tags t \
             WHERE t.deleted = 0 AND t.file_id IN ({}) \
             GROUP BY t.tag ORDER BY freq DESC, t.tag ASC",
            files
        );
        let mut params = self.predicate.params.clone();
        append_limit(&mut sql, &mut params, limit, offset);

        let conn = store.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let tags = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(TagFrequency {
                    tag: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }
}

fn append_limit(sql: &mut String, params: &mut Vec<Value>, limit: Option<usize>, offset: usize) {
    if limit.is_none() && offset == 0 {
        return;
    }
    // SQLite treats a negative limit as unbounded
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    sql.push_str(" LIMIT ? OFFSET ?");
    params.push(Value::Integer(limit));
    params.push(Value::Integer(offset as i64));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn esc() -> Value {
        text("\\")
    }

    #[test]
    fn test_single_bare_term() {
        let q = compile("hello");
        assert_eq!(q.predicate().sql, WHERE_FILE_OR_TAG);
        assert_eq!(
            q.predicate().params,
            vec![text("%hello%"), esc(), text("%hello%"), esc()]
        );
    }

    #[test]
    fn test_empty_query_has_no_predicate() {
        let q = compile("   ");
        assert!(q.predicate().is_empty());
        assert!(q.terms().is_empty());
        assert_eq!(
            q.sql(&[]),
            format!("{} ORDER BY f.path COLLATE NOCASE ASC", SELECT_IDS)
        );
    }

    #[test]
    fn test_implicit_and() {
        let q = compile("t=foo f~bar");
        assert_eq!(q.predicate().sql, format!("{} AND {}", WHERE_TAG, WHERE_FILE));
        assert_eq!(
            q.predicate().params,
            vec![text("foo"), esc(), text("%bar%"), esc()]
        );
    }

    #[test]
    fn test_literal_example_structure() {
        let q = compile("t=foo AND ( f~bar OR -t~baz )");
        assert_eq!(
            q.predicate().sql,
            format!("{} AND ({} OR NOT {})", WHERE_TAG, WHERE_FILE, WHERE_TAG)
        );
        assert_eq!(
            q.predicate().params,
            vec![text("foo"), esc(), text("%bar%"), esc(), text("%baz%"), esc()]
        );
    }

    #[test]
    fn test_group_after_term_is_anded() {
        let q = compile("f~some_folder (t=bar OR t=foo)");
        assert_eq!(
            q.predicate().sql,
            format!("{} AND ({} OR {})", WHERE_FILE, WHERE_TAG, WHERE_TAG)
        );
    }

    #[test]
    fn test_permissive_input_compiles() {
        let q = compile("AND OR t~x )");
        assert_eq!(q.predicate().sql, WHERE_TAG);
        assert_eq!(q.predicate().params, vec![text("%x%"), esc()]);
    }

    #[test]
    fn test_unclosed_group_is_closed() {
        let q = compile("( OR abc");
        assert_eq!(q.predicate().sql, format!("({})", WHERE_FILE_OR_TAG));

        let q = compile("(a (b");
        assert_eq!(
            q.predicate().sql,
            format!("({} AND ({}))", WHERE_FILE_OR_TAG, WHERE_FILE_OR_TAG)
        );
    }

    #[test]
    fn test_empty_groups_vanish() {
        let q = compile("( ) a");
        assert_eq!(q.predicate().sql, WHERE_FILE_OR_TAG);

        let q = compile("a OR ( )");
        assert_eq!(q.predicate().sql, WHERE_FILE_OR_TAG);

        let q = compile("( ( ) )");
        assert!(q.predicate().is_empty());
    }

    #[test]
    fn test_anchors_apply_to_contains_modes() {
        let q = compile("f~.myext$ t~^band");
        assert_eq!(
            q.predicate().params,
            vec![text("%.myext"), esc(), text("band%"), esc()]
        );
    }

    #[test]
    fn test_anchors_not_applied_to_exact_or_bare() {
        let q = compile("t=^x$ ^y$");
        assert_eq!(
            q.predicate().params,
            vec![text("^x$"), esc(), text("%^y$%"), esc(), text("%^y$%"), esc()]
        );
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let q = compile("t=awesome'\"*%_\\)(band");
        assert_eq!(
            q.predicate().params,
            vec![text("awesome'\"%\\%\\_\\\\)(band"), esc()]
        );
    }

    #[test]
    fn test_count_terms_bind_integers() {
        let q = compile("t<2 t>3 dupes>0 t>x");
        assert_eq!(
            q.predicate().sql,
            format!(
                "{} AND {} AND {} AND {}",
                WHERE_TAG_COUNT_BELOW, WHERE_TAG_COUNT_ABOVE, WHERE_DUPES_ABOVE, WHERE_TAG_COUNT_ABOVE
            )
        );
        assert_eq!(
            q.predicate().params,
            vec![Value::Integer(2), Value::Integer(3), Value::Integer(0), Value::Integer(1)]
        );
    }

    #[test]
    fn test_truncates_to_max_terms() {
        let raw: Vec<String> = (0..15).map(|i| format!("t=tag{}", i)).collect();
        let q = compile(&raw.join(" "));
        assert_eq!(q.terms().len(), MAX_SEARCH_TERMS);
        assert_eq!(q.predicate().params.len(), MAX_SEARCH_TERMS * 2);
        assert_eq!(q.terms()[9], "t=tag9");
    }

    #[test]
    fn test_sql_with_sorts() {
        let q = compile("x");
        let sql = q.sql(&[SortColumn::Modified.desc(), SortColumn::File.asc()]);
        assert!(sql.ends_with("ORDER BY f.modified DESC, f.path COLLATE NOCASE ASC"));
    }

    #[test]
    fn test_append_limit() {
        let mut sql = String::new();
        let mut params = Vec::new();
        append_limit(&mut sql, &mut params, None, 0);
        assert!(sql.is_empty());

        append_limit(&mut sql, &mut params, None, 5);
        assert_eq!(sql, " LIMIT ? OFFSET ?");
        assert_eq!(params, vec![Value::Integer(-1), Value::Integer(5)]);
    }
}
