//! Detection of uncached `Schema.getGlobalDescribe()` calls.
//!
//! The global describe builds a map of every object in the org. Calling it
//! repeatedly (or at all inside a loop) burns CPU time and heap. A call is
//! considered cached when it initializes a class-level field or sits behind
//! a null-guarded lazy assignment:
//!
//! ```apex
//! if (describeCache == null) {
//!     describeCache = Schema.getGlobalDescribe();
//! }
//! ```

use lazy_static::lazy_static;
use regex::Regex;

use crate::apex::{ApexSource, CodeStructure};

use super::traits::{context_metadata, loop_note};
use super::{AntipatternKind, DetectedInstance, Detector, Recommender, Severity};

lazy_static! {
    static ref GLOBAL_DESCRIBE_CALL: Regex =
        Regex::new(r"(?i)\bSchema\s*\.\s*getGlobalDescribe\s*\(\s*\)").unwrap();
    static ref ASSIGNMENT_TARGET: Regex = Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*$").unwrap();
}

/// Flags `Schema.getGlobalDescribe()` calls whose result is not cached.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalDescribeDetector;

impl Detector for GlobalDescribeDetector {
    fn kind(&self) -> AntipatternKind {
        AntipatternKind::GlobalDescribe
    }

    fn detect(&self, class_name: &str, source: &str) -> Vec<DetectedInstance> {
        let src = ApexSource::new(source);
        let structure = CodeStructure::analyze(&src);
        let mut instances = Vec::new();

        for call in GLOBAL_DESCRIBE_CALL.find_iter(src.masked()) {
            if is_cached(&src, &structure, call.start()) {
                continue;
            }

            let statement = src.statement_range(call.start());
            let metadata = context_metadata(&structure, call.start());
            let severity = if metadata.in_loop {
                Severity::Major.escalate()
            } else {
                Severity::Major
            };

            instances.push(
                DetectedInstance::new(
                    self.kind(),
                    class_name,
                    src.span(statement.clone()),
                    src.slice(statement),
                    severity,
                )
                .with_metadata(metadata),
            );
        }

        instances
    }
}

/// Whether the call at `offset` stores its result for reuse.
fn is_cached(src: &ApexSource<'_>, structure: &CodeStructure, offset: usize) -> bool {
    // Field initializers and static blocks run once per transaction.
    if structure.enclosing_method(offset).is_none() && !structure.is_trigger() {
        return true;
    }

    let prefix = src.statement_prefix(offset);
    let Some(target) = ASSIGNMENT_TARGET.captures(prefix).and_then(|c| c.get(1)) else {
        return false;
    };

    let target_start = offset - prefix.len() + target.start();
    let before = src.masked()[..target_start].trim_end();
    let var = regex::escape(target.as_str());
    let guard = format!(
        r"(?i)\bif\s*\(\s*(?:(?:this\s*\.\s*)?{v}\s*==\s*null|null\s*==\s*(?:this\s*\.\s*)?{v})\s*\)\s*\{{?$",
        v = var
    );

    Regex::new(&guard)
        .map(|re| re.is_match(before))
        .unwrap_or(false)
}

/// Fix guidance for uncached global describe calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalDescribeRecommender;

impl Recommender for GlobalDescribeRecommender {
    fn fix_instruction(&self, instances: &[DetectedInstance]) -> String {
        let mut instruction = String::from(
            "Avoid Schema.getGlobalDescribe(): it describes every object in the org and is \
             expensive in CPU time and heap. Replace lookups such as \
             Schema.getGlobalDescribe().get('Account') with a direct token \
             (Account.SObjectType or Schema.SObjectType.Account). For object names known only \
             at runtime use Type.forName(name) or Schema.describeSObjects(new List<String>{ name }). \
             If the full map is genuinely needed, load it once into a static variable and reuse it.",
        );
        if let Some(note) = loop_note(instances) {
            instruction.push(' ');
            instruction.push_str(&note);
        }
        instruction
    }
}
