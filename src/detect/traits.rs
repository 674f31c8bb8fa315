//! Capability traits implemented once per antipattern kind.

use crate::apex::CodeStructure;

use super::{AntipatternKind, DetectedInstance, InstanceMetadata};

/// Recognizes one structural antipattern in raw source text.
///
/// Detectors are pure and never fail: input they cannot make sense of
/// simply yields no instances.
pub trait Detector: Send + Sync {
    /// The kind of antipattern this detector reports.
    fn kind(&self) -> AntipatternKind;

    /// Scan `source` (the full text of unit `class_name`) for instances.
    fn detect(&self, class_name: &str, source: &str) -> Vec<DetectedInstance>;
}

/// Produces fix guidance for one antipattern kind.
pub trait Recommender: Send + Sync {
    /// Instruction that applies to every instance of the kind.
    ///
    /// Must be deterministic for a given instance list.
    fn fix_instruction(&self, instances: &[DetectedInstance]) -> String;

    /// A rewritten snippet for one instance, when it can be derived
    /// mechanically and safely.
    fn rewrite(&self, _instance: &DetectedInstance) -> Option<String> {
        None
    }
}

/// Loop and method context for a construct at `offset`.
pub(crate) fn context_metadata(structure: &CodeStructure, offset: usize) -> InstanceMetadata {
    let method = structure.enclosing_method(offset);
    InstanceMetadata {
        in_loop: structure.in_loop(offset),
        method_name: method.map(|m| m.name.clone()),
        method_signature: method.map(|m| m.signature.clone()),
        ..Default::default()
    }
}

/// Sentence noting how many instances run inside loops, if any.
pub(crate) fn loop_note(instances: &[DetectedInstance]) -> Option<String> {
    let in_loop = instances.iter().filter(|i| i.metadata.in_loop).count();
    match in_loop {
        0 => None,
        1 => Some("1 occurrence runs inside a loop; fix it first.".to_string()),
        n => Some(format!("{} occurrences run inside loops; fix those first.", n)),
    }
}
