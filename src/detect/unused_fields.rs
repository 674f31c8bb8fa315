//! Detection of SOQL select-list fields the unit never reads.
//!
//! Only queries whose rows stay inside the unit are considered: results
//! assigned to a local variable or iterated by a `for` loop. Queries that are
//! returned or passed straight into a call may feed code elsewhere, so their
//! field usage cannot be judged from this unit alone.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::apex::{
    find_queries, parse_snippet, signature, ApexSource, CodeStructure, SelectItemKind, SoqlQuery,
};

use super::traits::context_metadata;
use super::{AntipatternKind, DetectedInstance, Detector, Recommender, Severity};

lazy_static! {
    static ref ASSIGNED_TO: Regex = Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*$").unwrap();
    static ref LOOP_VARIABLE: Regex =
        Regex::new(r"(?i)\bfor\s*\(\s*[A-Za-z_][\w.<>,\s]*?\s+([A-Za-z_][A-Za-z0-9_]*)\s*:\s*$")
            .unwrap();
}

/// Flags selected fields that are never referenced in the unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnusedFieldsDetector;

impl Detector for UnusedFieldsDetector {
    fn kind(&self) -> AntipatternKind {
        AntipatternKind::UnusedQueryFields
    }

    fn detect(&self, class_name: &str, source: &str) -> Vec<DetectedInstance> {
        let src = ApexSource::new(source);
        let structure = CodeStructure::analyze(&src);
        let queries = find_queries(&src);
        let references = reference_text(&src, &queries);
        let mut instances = Vec::new();

        for query in &queries {
            if query.is_aggregate {
                continue;
            }
            let Some(var) = local_binding(&src, query) else {
                continue;
            };
            if is_returned(&references, &var) {
                continue;
            }

            let unused = unused_fields(&src, &references, query);
            if unused.is_empty() {
                continue;
            }

            let text = src.slice(query.span.clone());
            let mut metadata = context_metadata(&structure, query.span.start);
            metadata.query_signature = Some(signature(text));
            metadata.sobject = query.object.clone();
            metadata.unused_fields = unused;

            instances.push(
                DetectedInstance::new(
                    self.kind(),
                    class_name,
                    src.span(query.span.clone()),
                    text,
                    Severity::Minor,
                )
                .with_metadata(metadata),
            );
        }

        instances
    }
}

/// Masked text with every select list blanked, so that selecting a field
/// does not count as reading it. `WHERE` binds stay visible.
fn reference_text(src: &ApexSource<'_>, queries: &[SoqlQuery]) -> String {
    let mut text = src.masked().to_string();
    for query in queries {
        let range = query.select_list.clone();
        let blank = " ".repeat(range.len());
        text.replace_range(range, &blank);
    }
    text
}

/// Name of the local variable that receives the query's rows.
fn local_binding(src: &ApexSource<'_>, query: &SoqlQuery) -> Option<String> {
    let prefix = src.statement_prefix(query.span.start);
    if let Some(caps) = LOOP_VARIABLE.captures(prefix) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    // `return [SELECT ...]` or `foo([SELECT ...])` hand the rows elsewhere
    let caps = ASSIGNED_TO.captures(prefix)?;
    let head = prefix[..caps.get(0)?.start()].trim_end();
    if head.ends_with('(') || head.ends_with(',') {
        return None;
    }
    caps.get(1).map(|m| m.as_str().to_string())
}

fn is_returned(references: &str, var: &str) -> bool {
    let pattern = format!(r"(?i)\breturn\s+{}\s*;", regex::escape(var));
    Regex::new(&pattern)
        .map(|re| re.is_match(references))
        .unwrap_or(true)
}

/// Select-list fields with no reference in the unit, as written.
fn unused_fields(src: &ApexSource<'_>, references: &str, query: &SoqlQuery) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .fields()
        .filter(|field| seen.insert(field.text.to_ascii_lowercase()))
        .filter(|field| !field.leaf_name().eq_ignore_ascii_case("id"))
        .filter(|field| !is_referenced(src, references, field.leaf_name()))
        .map(|field| field.text.clone())
        .collect()
}

/// A field is read through member access (`acc.Name`) or by name
/// (`acc.get('Name')`).
fn is_referenced(src: &ApexSource<'_>, references: &str, leaf: &str) -> bool {
    let name = regex::escape(leaf);
    let member = format!(r"(?i)\.\s*{}\b", name);
    let quoted = format!(r"(?i)'{}'", name);

    let read_as_member = Regex::new(&member)
        .map(|re| re.is_match(references))
        .unwrap_or(true);
    let read_by_name = Regex::new(&quoted)
        .map(|re| re.is_match(src.original()))
        .unwrap_or(true);
    read_as_member || read_by_name
}

/// Fix guidance plus mechanical select-list trimming.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnusedFieldsRecommender;

impl Recommender for UnusedFieldsRecommender {
    fn fix_instruction(&self, instances: &[DetectedInstance]) -> String {
        let total: usize = instances
            .iter()
            .map(|i| i.metadata.unused_fields.len())
            .sum();
        format!(
            "Remove fields from the SELECT list that the code never reads. Every extra field \
             adds query time, heap usage and serialization cost. {} unused field{} found; \
             each occurrence includes a trimmed query. Check callers outside this class before \
             removing a field they might rely on.",
            total,
            if total == 1 { " was" } else { "s were" }
        )
    }

    fn rewrite(&self, instance: &DetectedInstance) -> Option<String> {
        if instance.metadata.unused_fields.is_empty() {
            return None;
        }
        let query = parse_snippet(&instance.code_before)?;
        let unused: HashSet<String> = instance
            .metadata
            .unused_fields
            .iter()
            .map(|f| f.to_ascii_lowercase())
            .collect();

        let mut kept: Vec<&str> = query
            .items
            .iter()
            .filter(|item| {
                !(item.kind == SelectItemKind::Field
                    && unused.contains(&item.text.to_ascii_lowercase()))
            })
            .map(|item| item.text.as_str())
            .collect();
        if kept.is_empty() {
            kept.push("Id");
        }

        let before = &instance.code_before;
        Some(format!(
            "{}{}{}",
            &before[..query.select_list.start],
            kept.join(", "),
            &before[query.select_list.end..]
        ))
    }
}
