//! Detection of inline SOQL with neither a `WHERE` nor a `LIMIT` clause.

use crate::apex::{find_queries, signature, ApexSource, CodeStructure};

use super::traits::{context_metadata, loop_note};
use super::{AntipatternKind, DetectedInstance, Detector, Recommender, Severity};

/// Flags queries that can return every row of an object.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundedQueryDetector;

impl Detector for UnboundedQueryDetector {
    fn kind(&self) -> AntipatternKind {
        AntipatternKind::UnboundedQuery
    }

    fn detect(&self, class_name: &str, source: &str) -> Vec<DetectedInstance> {
        let src = ApexSource::new(source);
        let structure = CodeStructure::analyze(&src);

        find_queries(&src)
            .into_iter()
            .filter(|q| !q.has_where && !q.has_limit)
            .map(|query| {
                let text = src.slice(query.span.clone());
                let mut metadata = context_metadata(&structure, query.span.start);
                metadata.query_signature = Some(signature(text));
                metadata.sobject = query.object.clone();

                let severity = if metadata.in_loop {
                    Severity::Major.escalate()
                } else {
                    Severity::Major
                };

                DetectedInstance::new(
                    self.kind(),
                    class_name,
                    src.span(query.span.clone()),
                    text,
                    severity,
                )
                .with_metadata(metadata)
            })
            .collect()
    }
}

/// Fix guidance for unbounded queries.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundedQueryRecommender;

impl Recommender for UnboundedQueryRecommender {
    fn fix_instruction(&self, instances: &[DetectedInstance]) -> String {
        let mut objects: Vec<&str> = instances
            .iter()
            .filter_map(|i| i.metadata.sobject.as_deref())
            .collect();
        objects.sort_unstable();
        objects.dedup();

        let mut instruction = String::from(
            "Add a selective WHERE clause, ideally on an indexed field such as Id, Name, \
             OwnerId or an external id, and a LIMIT to every query. An unfiltered query returns \
             more rows as the org grows and eventually fails with the 50,000 row governor limit.",
        );
        if !objects.is_empty() {
            instruction.push_str(&format!(" Objects affected: {}.", objects.join(", ")));
        }
        if let Some(note) = loop_note(instances) {
            instruction.push(' ');
            instruction.push_str(&note);
            instruction.push_str(" Collect the keys first and issue a single query before the loop.");
        }
        instruction
    }
}
