//! Integration tests for the full detection pipeline.
//!
//! These tests run the built-in registry against the testdata fixtures,
//! with and without runtime telemetry.

use std::path::PathBuf;

use apexscan::cli::{collect_files, load_units};
use apexscan::config::Config;
use apexscan::detect::{
    AntipatternKind, AntipatternRegistry, Scanner, Severity, SeverityOrigin, SourceUnit,
    Thresholds, UnitScan,
};
use apexscan::telemetry::{TelemetryFetch, TelemetryReport, TelemetryStatus};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn load_fixture_units() -> Vec<SourceUnit> {
    let root = testdata_path().join("force-app");
    let files = collect_files(&root, &Config::default()).expect("should walk testdata");
    load_units(&files, None).expect("should read fixtures")
}

fn telemetry_fixture() -> TelemetryFetch {
    let body = std::fs::read_to_string(testdata_path().join("telemetry.json"))
        .expect("should read telemetry fixture");
    let report: TelemetryReport = serde_json::from_str(&body).expect("should parse telemetry");
    TelemetryFetch {
        status: TelemetryStatus::Success,
        report: Some(report),
        message: None,
        attempts: 1,
        correlation_id: "apexscan-test".into(),
    }
}

fn scan<'a>(scans: &'a [UnitScan], name: &str) -> &'a UnitScan {
    scans
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no scan for {}", name))
}

#[test]
fn test_fixture_units_discovered_in_order() {
    let units = load_fixture_units();
    let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["AccountService", "ContactSelector", "AccountTrigger"]);
}

#[test]
fn test_static_scan_of_account_service() {
    let units = load_fixture_units();
    let scans = Scanner::default().run_batch(&units, None);
    let result = &scan(&scans, "AccountService").result;

    let kinds: Vec<_> = result.antipattern_results.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, AntipatternKind::ALL.to_vec());
    assert_eq!(result.total_instances(), 5);
    assert!(!result.uses_runtime_severity());

    // The null-guarded lazy load in describe() is cached.
    let describes = &result
        .for_kind(AntipatternKind::GlobalDescribe)
        .unwrap()
        .detected_instances;
    let lines: Vec<_> = describes.iter().map(|i| i.location.start_line).collect();
    assert_eq!(lines, vec![12, 17]);
    assert_eq!(describes[0].severity, Severity::Major);
    assert_eq!(describes[0].metadata.method_name.as_deref(), Some("tokenFor"));
    assert_eq!(describes[1].severity, Severity::Critical);
    assert!(describes[1].metadata.in_loop);

    let unbounded = result.for_kind(AntipatternKind::UnboundedQuery).unwrap();
    assert_eq!(unbounded.detected_instances.len(), 1);
    let instance = &unbounded.detected_instances[0];
    assert_eq!(instance.location.start_line, 24);
    assert_eq!(instance.metadata.sobject.as_deref(), Some("Account"));
    assert!(unbounded.fix_instruction.contains("Objects affected: Account."));

    let unused = result.for_kind(AntipatternKind::UnusedQueryFields).unwrap();
    let fields: Vec<_> = unused
        .detected_instances
        .iter()
        .map(|i| i.metadata.unused_fields.clone())
        .collect();
    assert_eq!(
        fields,
        vec![
            vec!["Industry".to_string(), "AnnualRevenue".to_string()],
            vec!["Phone".to_string()],
        ]
    );
    let trimmed = unused.detected_instances[0].code_after.as_deref().unwrap();
    assert!(trimmed.contains("Name"));
    assert!(!trimmed.contains("Industry"));
    assert!(unused.fix_instruction.contains("3 unused fields were found"));
}

#[test]
fn test_cached_describe_and_bounded_queries_are_clean() {
    let units = load_fixture_units();
    let scans = Scanner::default().run_batch(&units, None);
    assert!(scan(&scans, "ContactSelector").result.is_empty());
}

#[test]
fn test_trigger_body_is_scanned() {
    let units = load_fixture_units();
    let scans = Scanner::default().run_batch(&units, None);
    let result = &scan(&scans, "AccountTrigger").result;

    let describe = result.for_kind(AntipatternKind::GlobalDescribe).unwrap();
    assert_eq!(describe.detected_instances.len(), 1);
    assert_eq!(describe.detected_instances[0].location.start_line, 2);

    let unbounded = result.for_kind(AntipatternKind::UnboundedQuery).unwrap();
    assert_eq!(unbounded.detected_instances[0].severity, Severity::Critical);
    assert!(unbounded.fix_instruction.contains("inside a loop"));
}

#[test]
fn test_runtime_telemetry_recalibrates_severity() {
    let units = load_fixture_units();
    let telemetry = telemetry_fixture();
    let scans = Scanner::default().run_batch(&units, Some(&telemetry));
    let result = &scan(&scans, "AccountService").result;
    assert!(result.uses_runtime_severity());

    let describes = &result
        .for_kind(AntipatternKind::GlobalDescribe)
        .unwrap()
        .detected_instances;
    // tokenFor runs 25k times: escalated.
    assert_eq!(describes[0].severity, Severity::Critical);
    assert_eq!(describes[0].severity_origin, SeverityOrigin::Runtime);
    assert_eq!(describes[0].runtime.as_ref().unwrap().executions, 25_000);
    // touchAll barely runs: the loop no longer makes it critical.
    assert_eq!(describes[1].severity, Severity::Minor);
    assert_eq!(describes[1].severity_origin, SeverityOrigin::Runtime);

    let unbounded = &result
        .for_kind(AntipatternKind::UnboundedQuery)
        .unwrap()
        .detected_instances[0];
    assert_eq!(unbounded.severity, Severity::Major);
    assert_eq!(unbounded.severity_origin, SeverityOrigin::Runtime);

    // The Contact query has no telemetry and keeps its static score.
    let unused = &result
        .for_kind(AntipatternKind::UnusedQueryFields)
        .unwrap()
        .detected_instances;
    assert_eq!(unused[0].severity_origin, SeverityOrigin::Runtime);
    assert_eq!(unused[1].severity_origin, SeverityOrigin::Static);
    assert_eq!(unused[1].severity, Severity::Minor);
}

#[test]
fn test_units_without_telemetry_stay_static() {
    let units = load_fixture_units();
    let telemetry = telemetry_fixture();
    let scans = Scanner::default().run_batch(&units, Some(&telemetry));
    assert!(!scan(&scans, "AccountTrigger").result.uses_runtime_severity());
}

#[test]
fn test_failed_fetch_matches_static_scan() {
    let units = load_fixture_units();
    let failed =
        TelemetryFetch::not_attempted(TelemetryStatus::AccessDenied, "apexscan-test", None);
    let scanner = Scanner::default();
    assert_eq!(
        scanner.run_batch(&units, Some(&failed)),
        scanner.run_batch(&units, None)
    );
}

#[test]
fn test_config_thresholds_flow_into_registry() {
    let config =
        Config::parse_file(testdata_path().join("apexscan.yaml")).expect("should parse config");
    assert_eq!(config.thresholds.query.high_executions, 100);
    assert_eq!(config.thresholds.method, Thresholds::default().method);

    let units = load_fixture_units();
    let telemetry = telemetry_fixture();
    let scanner = Scanner::new(AntipatternRegistry::with_builtins(&config.thresholds));
    let scans = scanner.run_batch(&units, Some(&telemetry));
    let unbounded = &scan(&scans, "AccountService")
        .result
        .for_kind(AntipatternKind::UnboundedQuery)
        .unwrap()
        .detected_instances[0];
    // 120 executions is high under the tighter query bands.
    assert_eq!(unbounded.severity, Severity::Critical);
}

#[test]
fn test_config_excludes_paths_when_walking() {
    let config =
        Config::parse_file(testdata_path().join("apexscan.yaml")).expect("should parse config");
    let files = collect_files(&testdata_path().join("force-app"), &config).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.extension().unwrap() == "cls"));
}
