use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::domain::entities::column::ColumnDefinition;
use crate::domain::entities::table::QuerySource;

/// Words that can follow the first FROM token without being its alias.
const FROM_KEYWORDS: &[&str] = &[
    "join", "left", "right", "inner", "outer", "full", "cross", "natural", "where", "on", "group",
    "order", "limit", "union",
];

// The patterns below are literals; a failure to compile is a programming error.

/// `alias.col AS name` in the SELECT list.
static ALIASED_SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[\s,()])(?P<column>[^.\s,()]+\.[^.\s,()]+)\s+as\s+?(?P<name>[^,\s()]+)")
        .expect("aliased select pattern is valid")
});

/// `alias.name` in the SELECT list.
static QUALIFIED_SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[\s,])(?P<column>[^.\s,()]+\.(?P<name>[^.\s,()]+))")
        .expect("qualified select pattern is valid")
});

/// `table alias` or `table AS alias` anywhere in FROM.
static TABLE_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<table>[^\s,()]+)\s+(?:as\s+)?(?P<name>[^\s,()]+)")
        .expect("table alias pattern is valid")
});

static LEADING_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[^\s,()]+\s+(as\s+)?(?P<alias>[^\s,()]+)")
        .expect("leading alias pattern is valid")
});

static LEADING_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<table>[^\s,()]+)(\s|$)").expect("leading table pattern is valid")
});

/// Maps logical column keys to the SQL expression filters, search and sort operate on.
///
/// The base query is free-form text, so everything past the explicit override is a textual
/// heuristic over the SELECT list and the FROM clause:
///
/// 1. the column's explicit `sql_expression`;
/// 2. `alias.col AS key` in the SELECT list yields `alias.col`;
/// 3. `alias.key` in the SELECT list;
/// 4. `table alias` / `table AS alias` in FROM yields `alias.key`, a single-token FROM yields `table.key`;
/// 5. the bare key.
#[derive(Debug, Clone, Copy)]
pub struct ColumnResolver<'a> {
    source: &'a QuerySource,
}

impl<'a> ColumnResolver<'a> {
    pub fn new(source: &'a QuerySource) -> Self {
        Self { source }
    }

    pub fn resolve(&self, column: &ColumnDefinition) -> String {
        if let Some(expression) = column
            .sql_expression
            .as_deref()
            .filter(|expression| !expression.trim().is_empty())
        {
            return expression.to_string();
        }
        self.resolve_key(&column.key)
    }

    pub fn resolve_key(&self, key: &str) -> String {
        let fields = self.source.fields.as_str();
        let ends_item = |next: char| next == ',' || next.is_whitespace();

        if let Some(captures) = find_named(&ALIASED_SELECT, fields, key, ends_item) {
            return captures["column"].to_string();
        }
        if let Some(captures) = find_named(&QUALIFIED_SELECT, fields, key, ends_item) {
            return captures["column"].to_string();
        }
        if let Some(qualifier) = self.from_qualifier() {
            return format!("{qualifier}.{key}");
        }
        key.to_string()
    }

    /// Name the primary table is addressed by in the FROM clause. `None` for derived tables.
    fn from_qualifier(&self) -> Option<String> {
        let from = self.source.from.trim();

        if let Some(captures) = LEADING_ALIAS.captures(from) {
            let alias = &captures["alias"];
            if !FROM_KEYWORDS.contains(&alias.to_ascii_lowercase().as_str()) {
                return Some(alias.to_string());
            }
        }

        LEADING_TABLE
            .captures(from)
            .map(|captures| captures["table"].to_string())
    }

    /// Physical table behind a qualifier such as `u` in `FROM users u`.
    pub fn table_for_qualifier(&self, qualifier: &str) -> String {
        let table = find_named(&TABLE_ALIAS, &self.source.from, qualifier, char::is_whitespace)
            .map(|captures| captures["table"].to_string())
            .unwrap_or_else(|| qualifier.to_string());
        table.trim_matches(|ch| ch == '{' || ch == '}').to_string()
    }

    /// First token of FROM, unless the FROM clause is a derived table.
    pub fn primary_table(&self) -> Option<String> {
        let from = self.source.from.trim();
        if from.starts_with('(') {
            return None;
        }
        from.split(|ch: char| ch.is_whitespace() || ch == ',')
            .next()
            .filter(|token| !token.is_empty())
            .map(|token| token.trim_matches(|ch| ch == '{' || ch == '}').to_string())
    }
}

/// Leftmost match whose `name` group equals `wanted` (ignoring ASCII case) and is followed by
/// the end of the text or a character accepted by `ends_name`. Matches may overlap.
fn find_named<'h>(
    pattern: &Regex,
    haystack: &'h str,
    wanted: &str,
    ends_name: impl Fn(char) -> bool,
) -> Option<Captures<'h>> {
    let mut start = 0;
    while let Some(captures) = pattern.captures_at(haystack, start) {
        let whole = captures.get(0)?;
        let name = captures.name("name")?;
        let boundary = haystack[name.end()..].chars().next().map_or(true, &ends_name);
        if boundary && name.as_str().eq_ignore_ascii_case(wanted) {
            return Some(captures);
        }
        start = whole.start() + haystack[whole.start()..].chars().next()?.len_utf8();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::sql::Params;

    fn source(fields: &str, from: &str) -> QuerySource {
        QuerySource::new(fields, from, "1=1", Params::default())
    }

    fn resolve(fields: &str, from: &str, key: &str) -> String {
        let source = source(fields, from);
        ColumnResolver::new(&source)
            .resolve_key(key)
    }

    #[test]
    fn explicit_override_wins() {
        let source = source("u.name AS username", "users u");
        let column = ColumnDefinition::new("username", "User").sql("u.firstname || u.lastname");

        let resolved = ColumnResolver::new(&source).resolve(&column);

        assert_eq!(resolved, "u.firstname || u.lastname");
    }

    #[test]
    fn blank_override_is_ignored() {
        let source = source("*", "people");
        let column = ColumnDefinition::new("name", "Name").sql("  ");

        let resolved = ColumnResolver::new(&source).resolve(&column);

        assert_eq!(resolved, "people.name");
    }

    #[test]
    fn aliased_select_expression_is_used() {
        assert_eq!(
            resolve(
                "log.id, u.firstname AS username, log.timecreated",
                "log JOIN users u ON u.id = log.userid",
                "username"
            ),
            "u.firstname"
        );
        assert_eq!(resolve("u.firstname as username", "users u", "username"), "u.firstname");
        assert_eq!(resolve("(u.firstname AS username, u.id)", "users u", "username"), "u.firstname");
    }

    #[test]
    fn aliased_select_requires_whole_key() {
        assert_eq!(
            resolve("u.firstname AS username_long", "users u", "username"),
            "u.username"
        );
    }

    #[test]
    fn qualified_select_column_is_used() {
        assert_eq!(resolve("p.id, p.name", "people AS p", "name"), "p.name");
        assert_eq!(resolve("p.id,p.name,p.age", "people p", "name"), "p.name");
    }

    #[test]
    fn from_alias_qualifies_key() {
        assert_eq!(resolve("*", "people p", "age"), "p.age");
        assert_eq!(resolve("*", "people AS p WHERE 1", "age"), "p.age");
    }

    #[test]
    fn single_table_from_qualifies_key() {
        assert_eq!(resolve("*", "people", "age"), "people.age");
        assert_eq!(
            resolve("*", "people JOIN groups ON groups.id = people.groupid", "age"),
            "people.age"
        );
    }

    #[test]
    fn derived_table_falls_back_to_bare_key() {
        assert_eq!(resolve("*", "(SELECT * FROM people) AS results", "age"), "age");
        assert_eq!(resolve("*", "", "age"), "age");
    }

    #[test]
    fn table_for_qualifier_reads_from_clause() {
        let source = source("u.name", "log l JOIN {users} u ON u.id = l.userid");
        let resolver = ColumnResolver::new(&source);

        assert_eq!(resolver.table_for_qualifier("u"), "users");
        assert_eq!(resolver.table_for_qualifier("l"), "log");
        assert_eq!(resolver.table_for_qualifier("people"), "people");
        assert_eq!(resolver.primary_table().as_deref(), Some("log"));
    }

    #[test]
    fn later_select_items_are_found_after_adjacent_matches() {
        assert_eq!(
            resolve("a.x AS first,b.y AS second", "a JOIN b ON b.id = a.id", "second"),
            "b.y"
        );
        assert_eq!(resolve("a.id,b.name", "a JOIN b ON b.id = a.id", "NAME"), "b.name");
    }

    #[test]
    fn qualifier_lookup_skips_unrelated_pairs() {
        let source = source("*", "log l JOIN {users} AS u ON u.id = l.userid");
        let resolver = ColumnResolver::new(&source);

        assert_eq!(resolver.table_for_qualifier("u"), "users");
        assert_eq!(resolver.table_for_qualifier("U"), "users");
    }
}
