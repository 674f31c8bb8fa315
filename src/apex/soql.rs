//! Inline SOQL extraction and clause scanning.
//!
//! Recognizes bracketed queries (`[SELECT ... FROM ...]`) in the masked text
//! and splits them into top-level clauses. Subqueries in the select list are
//! kept as opaque items; clause keywords are only recognized at parenthesis
//! depth zero.

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;
use std::ops::Range;

use super::ApexSource;

lazy_static! {
    static ref BIND_VARIABLE: Regex = Regex::new(r":\s*[A-Za-z_][\w.]*(\(\))?").unwrap();
    static ref STRING_LITERAL: Regex = Regex::new(r"'(?:[^'\\]|\\.)*'").unwrap();
    static ref NUMBER_LITERAL: Regex = Regex::new(r"\b\d+(\.\d+)?\b").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

static AGGREGATE_FUNCTIONS: phf::Set<&'static str> = phf_set! {
    "count", "count_distinct", "sum", "avg", "min", "max",
};

/// What a select-list entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectItemKind {
    /// A plain field or relationship path, e.g. `Name` or `Owner.Email`.
    Field,
    /// A parenthesized child-relationship subquery.
    Subquery,
    /// A function call or `TYPEOF` expression.
    Expression,
}

/// One comma-separated entry of the select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    pub text: String,
    pub kind: SelectItemKind,
    /// Absolute byte range in the unit.
    pub range: Range<usize>,
}

impl SelectItem {
    /// Final segment of a relationship path (`Owner.Email` -> `Email`).
    pub fn leaf_name(&self) -> &str {
        self.text.rsplit('.').next().unwrap_or(&self.text)
    }
}

/// An inline SOQL query found in a unit.
#[derive(Debug, Clone)]
pub struct SoqlQuery {
    /// Byte range including the surrounding brackets.
    pub span: Range<usize>,
    /// Byte range of the select list (first item start to last item end).
    pub select_list: Range<usize>,
    pub items: Vec<SelectItem>,
    /// The object named in the top-level `FROM` clause.
    pub object: Option<String>,
    pub has_where: bool,
    pub has_limit: bool,
    pub is_aggregate: bool,
}

impl SoqlQuery {
    /// Plain field items (trimmable candidates).
    pub fn fields(&self) -> impl Iterator<Item = &SelectItem> {
        self.items
            .iter()
            .filter(|i| i.kind == SelectItemKind::Field)
    }
}

/// Find every inline query in the unit, in source order.
pub fn find_queries(src: &ApexSource<'_>) -> Vec<SoqlQuery> {
    let bytes = src.masked().as_bytes();
    let mut queries = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'[' {
            if let Some(close) = src.matching_close(pos) {
                if let Some(query) = parse_at(src, pos, close) {
                    queries.push(query);
                    pos = close + 1;
                    continue;
                }
            }
        }
        pos += 1;
    }

    queries
}

/// Parse a standalone query snippet such as `[SELECT Id FROM Account]`.
///
/// Offsets in the returned query are relative to `text`.
pub fn parse_snippet(text: &str) -> Option<SoqlQuery> {
    let src = ApexSource::new(text);
    let open = src.skip_whitespace(0)?;
    let close = src.matching_close(open)?;
    parse_at(&src, open, close)
}

/// Normalized signature used to match a query against telemetry.
///
/// Case, whitespace, brackets, bind variables and literal values are
/// normalized away so that `[select Id from Account where Name = :n]` and
/// `SELECT Id FROM Account WHERE Name = 'Acme'` share a signature.
pub fn signature(query_text: &str) -> String {
    let trimmed = query_text
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    let without_strings = STRING_LITERAL.replace_all(trimmed, "?");
    let without_binds = BIND_VARIABLE.replace_all(&without_strings, "?");
    let without_numbers = NUMBER_LITERAL.replace_all(&without_binds, "?");
    WHITESPACE
        .replace_all(without_numbers.trim(), " ")
        .to_lowercase()
}

fn parse_at(src: &ApexSource<'_>, open: usize, close: usize) -> Option<SoqlQuery> {
    let masked = src.masked();
    let body_start = open + 1;
    let body = &masked[body_start..close];

    let select_start = body.len() - body.trim_start().len();
    if !starts_with_keyword(&body[select_start..], "select") {
        return None;
    }
    let list_start = select_start + "select".len();
    let from = find_top_level_keyword(body, "from", list_start)?;

    let clause_after_from = |kw: &str| find_top_level_keyword(body, kw, from).is_some();
    let has_where = clause_after_from("where");
    let has_limit = clause_after_from("limit");
    let has_group_by = find_top_level_phrase(body, &["group", "by"], from).is_some();

    let items = split_select_list(src, body_start + list_start, body_start + from);
    let select_list = match (items.first(), items.last()) {
        (Some(first), Some(last)) => first.range.start..last.range.end,
        _ => (body_start + list_start)..(body_start + list_start),
    };

    let is_aggregate = has_group_by
        || items.iter().any(|item| {
            item.kind == SelectItemKind::Expression
                && item
                    .text
                    .split('(')
                    .next()
                    .map(|f| AGGREGATE_FUNCTIONS.contains(f.trim().to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
        });

    let object = body[from + "from".len()..]
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        .find(|w| !w.is_empty())
        .map(str::to_string);

    Some(SoqlQuery {
        span: open..close + 1,
        select_list,
        items,
        object,
        has_where,
        has_limit,
        is_aggregate,
    })
}

fn split_select_list(src: &ApexSource<'_>, start: usize, end: usize) -> Vec<SelectItem> {
    let bytes = src.masked().as_bytes();
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut item_start = start;

    for pos in start..=end {
        let at_end = pos == end;
        if !at_end {
            match bytes[pos] {
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
        }
        if at_end || (bytes[pos] == b',' && depth == 0) {
            let range = src.trim_range(item_start..pos);
            if !range.is_empty() {
                items.push(select_item(src, range));
            }
            item_start = pos + 1;
        }
    }

    items
}

fn select_item(src: &ApexSource<'_>, range: Range<usize>) -> SelectItem {
    let text = src.slice(range.clone()).to_string();
    let kind = if text.starts_with('(') {
        SelectItemKind::Subquery
    } else if text.contains('(') || starts_with_keyword(&text, "typeof") {
        SelectItemKind::Expression
    } else {
        SelectItemKind::Field
    };
    SelectItem { text, kind, range }
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    match (text.get(..keyword.len()), text.get(keyword.len()..)) {
        (Some(head), Some(tail)) => {
            head.eq_ignore_ascii_case(keyword)
                && !tail.chars().next().map(is_word_char).unwrap_or(false)
        }
        _ => false,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Offset of `keyword` as a whole word at parenthesis depth zero, searching
/// from `from`.
fn find_top_level_keyword(body: &str, keyword: &str, from: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0i32;

    for pos in from..bytes.len() {
        match bytes[pos] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ if depth == 0 => {
                let boundary_before = pos == 0 || !is_word_char(bytes[pos - 1] as char);
                let at_keyword = body
                    .get(pos..)
                    .map(|rest| starts_with_keyword(rest, keyword))
                    .unwrap_or(false);
                if boundary_before && at_keyword {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

/// Like [`find_top_level_keyword`] for multi-word phrases such as `GROUP BY`.
fn find_top_level_phrase(body: &str, words: &[&str], from: usize) -> Option<usize> {
    let (first, rest) = words.split_first()?;
    let mut search_from = from;

    while let Some(pos) = find_top_level_keyword(body, first, search_from) {
        let mut cursor = pos + first.len();
        let matched = rest.iter().all(|word| {
            let tail = &body[cursor..];
            let skipped = tail.len() - tail.trim_start().len();
            if skipped > 0 && starts_with_keyword(&tail[skipped..], word) {
                cursor += skipped + word.len();
                true
            } else {
                false
            }
        });
        if matched {
            return Some(pos);
        }
        search_from = pos + first.len();
    }
    None
}
