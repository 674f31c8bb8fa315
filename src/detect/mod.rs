//! Antipattern detection, recommendation and scan orchestration.

mod global_describe;
mod module;
mod registry;
mod runner;
mod traits;
mod types;
mod unbounded_query;
mod unused_fields;

pub use global_describe::{GlobalDescribeDetector, GlobalDescribeRecommender};
pub use module::AntipatternModule;
pub use registry::{AntipatternRegistry, Thresholds};
pub use runner::{Scanner, SourceUnit, UnitScan};
pub use traits::{Detector, Recommender};
pub use types::{
    AntipatternKind, AntipatternResult, DetectedInstance, InstanceMetadata, LineSpan,
    RuntimeEvidence, ScanResult, Severity, SeverityOrigin,
};
pub use unbounded_query::{UnboundedQueryDetector, UnboundedQueryRecommender};
pub use unused_fields::{UnusedFieldsDetector, UnusedFieldsRecommender};
