//! Core types for scan results.

use serde::{Deserialize, Serialize};

/// Severity levels for detected antipatterns, ordered from least to most
/// severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// One tier more severe, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Severity::Minor => Severity::Major,
            Severity::Major | Severity::Critical => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minor" => Ok(Severity::Minor),
            "major" => Ok(Severity::Major),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Where a finding's severity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityOrigin {
    /// Static heuristics only (code shape, loop context).
    Static,
    /// Measured execution telemetry.
    Runtime,
}

/// The closed set of antipattern kinds this engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AntipatternKind {
    /// `Schema.getGlobalDescribe()` whose result is not cached.
    #[serde(rename = "global_describe")]
    GlobalDescribe,
    /// Inline SOQL without `WHERE` and without `LIMIT`.
    #[serde(rename = "soql_no_where_limit")]
    UnboundedQuery,
    /// Inline SOQL selecting fields the unit never reads.
    #[serde(rename = "soql_unused_fields")]
    UnusedQueryFields,
}

impl AntipatternKind {
    /// Every built-in kind, in default registration order.
    pub const ALL: [AntipatternKind; 3] = [
        AntipatternKind::GlobalDescribe,
        AntipatternKind::UnboundedQuery,
        AntipatternKind::UnusedQueryFields,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AntipatternKind::GlobalDescribe => "global_describe",
            AntipatternKind::UnboundedQuery => "soql_no_where_limit",
            AntipatternKind::UnusedQueryFields => "soql_unused_fields",
        }
    }

    /// Short human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            AntipatternKind::GlobalDescribe => "Uncached Schema.getGlobalDescribe()",
            AntipatternKind::UnboundedQuery => "SOQL without WHERE or LIMIT",
            AntipatternKind::UnusedQueryFields => "SOQL selecting unused fields",
        }
    }
}

impl std::fmt::Display for AntipatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
}

impl LineSpan {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line: end_line.max(start_line),
        }
    }
}

impl std::fmt::Display for LineSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}", self.start_line)
        } else {
            write!(f, "{}-{}", self.start_line, self.end_line)
        }
    }
}

/// Context a detector recorded about an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetadata {
    /// Whether the construct sits inside a loop body.
    pub in_loop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_signature: Option<String>,
    /// Normalized query text, for query kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_signature: Option<String>,
    /// Queried object, for query kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sobject: Option<String>,
    /// Selected fields never referenced in the unit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unused_fields: Vec<String>,
}

/// The telemetry facts behind a runtime severity verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEvidence {
    /// Telemetry key the instance matched (method name or query signature).
    pub key: String,
    pub executions: u64,
    pub avg_cost_ms: f64,
}

/// A single occurrence of an antipattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedInstance {
    pub kind: AntipatternKind,
    pub class_name: String,
    pub location: LineSpan,
    /// Offending snippet, verbatim.
    pub code_before: String,
    /// Mechanically derived replacement, when one is safe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_after: Option<String>,
    pub severity: Severity,
    pub severity_origin: SeverityOrigin,
    #[serde(default)]
    pub metadata: InstanceMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeEvidence>,
}

impl DetectedInstance {
    /// Create a statically-scored instance.
    pub fn new(
        kind: AntipatternKind,
        class_name: &str,
        location: LineSpan,
        code_before: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            kind,
            class_name: class_name.to_string(),
            location,
            code_before: code_before.into(),
            code_after: None,
            severity,
            severity_origin: SeverityOrigin::Static,
            metadata: InstanceMetadata::default(),
            runtime: None,
        }
    }

    pub fn with_metadata(mut self, metadata: InstanceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// All instances of one antipattern kind found in a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntipatternResult {
    pub kind: AntipatternKind,
    /// How to fix any instance of this kind.
    pub fix_instruction: String,
    pub detected_instances: Vec<DetectedInstance>,
}

impl AntipatternResult {
    pub fn is_empty(&self) -> bool {
        self.detected_instances.is_empty()
    }

    /// Number of instances with each severity: (critical, major, minor).
    pub fn severity_counts(&self) -> (usize, usize, usize) {
        self.detected_instances
            .iter()
            .fold((0, 0, 0), |(c, j, n), i| match i.severity {
                Severity::Critical => (c + 1, j, n),
                Severity::Major => (c, j + 1, n),
                Severity::Minor => (c, j, n + 1),
            })
    }
}

/// Results of scanning one unit: one entry per kind with findings, in
/// registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub antipattern_results: Vec<AntipatternResult>,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total instances across all kinds.
    pub fn total_instances(&self) -> usize {
        self.antipattern_results
            .iter()
            .map(|r| r.detected_instances.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.antipattern_results.is_empty()
    }

    /// Results for one kind, if it produced findings.
    pub fn for_kind(&self, kind: AntipatternKind) -> Option<&AntipatternResult> {
        self.antipattern_results.iter().find(|r| r.kind == kind)
    }

    /// Whether any instance's severity came from telemetry.
    pub fn uses_runtime_severity(&self) -> bool {
        self.antipattern_results
            .iter()
            .flat_map(|r| &r.detected_instances)
            .any(|i| i.severity_origin == SeverityOrigin::Runtime)
    }
}
