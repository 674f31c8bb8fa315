//! Scan coordinator that runs every registered module over a unit.

use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::telemetry::{ClassRuntimeData, TelemetryFetch};

use super::{AntipatternRegistry, ScanResult, Thresholds};

/// One Apex unit to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Unit name, as telemetry knows it (file stem).
    pub name: String,
    pub path: PathBuf,
    pub source: String,
}

impl SourceUnit {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source: source.into(),
        }
    }

    /// Unit name implied by a file path: `classes/AccountService.cls` is
    /// `AccountService`.
    pub fn name_from_path(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Scan result for one unit of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitScan {
    pub name: String,
    pub path: PathBuf,
    pub result: ScanResult,
}

/// Runs a registry over source units.
#[derive(Debug)]
pub struct Scanner {
    registry: AntipatternRegistry,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(AntipatternRegistry::with_builtins(&Thresholds::default()))
    }
}

impl Scanner {
    pub fn new(registry: AntipatternRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AntipatternRegistry {
        &self.registry
    }

    /// Scan one unit. Kinds without findings are omitted; the rest appear
    /// in registration order.
    pub fn run(
        &self,
        unit_name: &str,
        source: &str,
        runtime: Option<&ClassRuntimeData>,
    ) -> ScanResult {
        let antipattern_results = self
            .registry
            .modules()
            .iter()
            .map(|module| module.scan(unit_name, source, runtime))
            .filter(|result| !result.is_empty())
            .collect();

        ScanResult {
            antipattern_results,
        }
    }

    /// Scan many units in parallel against one telemetry snapshot.
    ///
    /// Output order matches `units`.
    pub fn run_batch(
        &self,
        units: &[SourceUnit],
        telemetry: Option<&TelemetryFetch>,
    ) -> Vec<UnitScan> {
        units
            .par_iter()
            .map(|unit| {
                let runtime = telemetry.and_then(|fetch| fetch.runtime_for(&unit.name));
                UnitScan {
                    name: unit.name.clone(),
                    path: unit.path.clone(),
                    result: self.run(&unit.name, &unit.source, runtime),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AntipatternKind, SeverityOrigin};
    use crate::telemetry::{MethodRuntimeData, QueryRuntimeData, TelemetryReport, TelemetryStatus};

    const SOURCE: &str = r#"
public class AccountService {
    public static void load() {
        for (Account a : [SELECT Id, Name FROM Account]) {
            Schema.getGlobalDescribe();
        }
    }
}
"#;

    #[test]
    fn test_run_orders_by_registration() {
        let scanner = Scanner::default();
        let result = scanner.run("AccountService", SOURCE, None);
        let kinds: Vec<_> = result.antipattern_results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AntipatternKind::GlobalDescribe,
                AntipatternKind::UnboundedQuery,
                AntipatternKind::UnusedQueryFields
            ]
        );
    }

    #[test]
    fn test_clean_source_has_no_results() {
        let scanner = Scanner::default();
        let result = scanner.run(
            "Clean",
            "public class Clean { public Integer add(Integer a, Integer b) { return a + b; } }",
            None,
        );
        assert!(result.is_empty());
        assert_eq!(result.total_instances(), 0);
    }

    #[test]
    fn test_run_is_idempotent() {
        let scanner = Scanner::default();
        let first = serde_json::to_string(&scanner.run("AccountService", SOURCE, None)).unwrap();
        let second = serde_json::to_string(&scanner.run("AccountService", SOURCE, None)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_overloads_keep_their_own_telemetry() {
        let source = "public class A {\n void load(Boolean b) {\n for (Integer i = 0; i < 3; i++) { Schema.getGlobalDescribe(); }\n }\n}";
        let runtime = ClassRuntimeData {
            class_name: "A".into(),
            methods: vec![MethodRuntimeData {
                method_name: "A.load(String)".into(),
                invocations: 90_000,
                avg_cpu_time_ms: 40.0,
            }],
            soql_queries: vec![],
        };

        let result = Scanner::default().run("A", source, Some(&runtime));
        let describe = result.for_kind(AntipatternKind::GlobalDescribe).unwrap();
        let instance = &describe.detected_instances[0];
        assert_eq!(instance.metadata.method_signature.as_deref(), Some("load(Boolean)"));
        assert_eq!(instance.severity_origin, SeverityOrigin::Static);
        assert!(!result.uses_runtime_severity());
    }

    #[test]
    fn test_batch_preserves_order_and_uses_snapshot() {
        let units: Vec<_> = (0..8)
            .map(|i| {
                SourceUnit::new(
                    format!("Unit{}", i),
                    format!("Unit{}.cls", i),
                    SOURCE.replace("AccountService", &format!("Unit{}", i)),
                )
            })
            .collect();

        let mut report = TelemetryReport::default();
        report.classes.insert(
            "Unit3".into(),
            ClassRuntimeData {
                class_name: "Unit3".into(),
                methods: vec![],
                soql_queries: vec![QueryRuntimeData {
                    query: "SELECT Id, Name FROM Account".into(),
                    executions: 9_000,
                    avg_execution_time_ms: 3.0,
                }],
            },
        );
        let fetch = TelemetryFetch {
            status: TelemetryStatus::Success,
            report: Some(report),
            message: None,
            attempts: 1,
            correlation_id: "apexscan-test".into(),
        };

        let scans = Scanner::default().run_batch(&units, Some(&fetch));
        let names: Vec<_> = scans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Unit0", "Unit1", "Unit2", "Unit3", "Unit4", "Unit5", "Unit6", "Unit7"]
        );
        assert!(scans[3].result.uses_runtime_severity());
        assert!(!scans[2].result.uses_runtime_severity());

        let unbounded = scans[3]
            .result
            .for_kind(AntipatternKind::UnboundedQuery)
            .unwrap();
        assert_eq!(
            unbounded.detected_instances[0].severity_origin,
            SeverityOrigin::Runtime
        );
    }

    #[test]
    fn test_name_from_path() {
        assert_eq!(
            SourceUnit::name_from_path(Path::new("force-app/classes/AccountService.cls")),
            "AccountService"
        );
    }
}
