//! Output formatting for scan results.
//!
//! Supports three output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption
//! - SARIF: Static Analysis Results Interchange Format for IDE/CI integration

use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detect::{
    AntipatternKind, AntipatternResult, DetectedInstance, ScanResult, Severity, SeverityOrigin,
    UnitScan,
};
use crate::telemetry::{TelemetryFetch, TelemetryStatus, UnitCoverage};

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pretty,
    Json,
    Sarif,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Format::Pretty),
            "json" => Ok(Format::Json),
            "sarif" => Ok(Format::Sarif),
            other => Err(format!(
                "invalid format {:?}, must be 'pretty', 'json', or 'sarif'",
                other
            )),
        }
    }
}

/// Note explaining where severities came from.
pub fn status_note(status: TelemetryStatus) -> &'static str {
    match status {
        TelemetryStatus::Success => {
            "Severity levels are based on runtime metrics measured in the org."
        }
        TelemetryStatus::AccessDenied => {
            "Static analysis only. Runtime telemetry is not enabled for this org; \
             contact Salesforce Support to enable it and see how this code behaves in production."
        }
        TelemetryStatus::NoConnection => {
            "Static analysis only. Connect to an org to correlate these findings with \
             production runtime metrics."
        }
        TelemetryStatus::ApiError => {
            "Static analysis only. Runtime metrics could not be fetched; try again or verify \
             that runtime telemetry is enabled for the org."
        }
    }
}

/// Whether one unit's severities could use runtime metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    /// The org returned metrics for the unit.
    Covered,
    /// The fetch succeeded but the org has no metrics for the unit.
    NotCovered,
    /// The fetch failed or was never made.
    Unavailable,
}

impl Coverage {
    /// Coverage of `unit_name` in a fetch. Entries with no methods and no
    /// queries count as not covered, since they cannot change a severity.
    pub fn of(telemetry: &TelemetryFetch, unit_name: &str) -> Self {
        match telemetry.class_data(unit_name) {
            UnitCoverage::Covered(data) if !data.is_empty() => Coverage::Covered,
            UnitCoverage::Covered(_) | UnitCoverage::NotCovered => Coverage::NotCovered,
            UnitCoverage::Unavailable(_) => Coverage::Unavailable,
        }
    }
}

/// Note explaining where one unit's severities came from.
pub fn coverage_note(coverage: Coverage, status: TelemetryStatus) -> &'static str {
    match coverage {
        Coverage::Covered => status_note(TelemetryStatus::Success),
        Coverage::NotCovered => {
            "Static analysis only. The org returned no runtime metrics for this class; \
             it may not have run recently."
        }
        Coverage::Unavailable => status_note(status),
    }
}

/// Message shown for a unit without findings.
pub fn clean_message(class_name: &str) -> String {
    format!("No antipatterns detected in class '{}'.", class_name)
}

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    pub telemetry: JsonTelemetry,
    pub units_scanned: usize,
    pub total_instances: usize,
    pub units: Vec<JsonUnit>,
}

/// Telemetry fetch summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonTelemetry {
    pub status: TelemetryStatus,
    pub note: String,
    pub correlation_id: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Findings for one unit.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonUnit {
    pub class_name: String,
    pub file: String,
    pub coverage: Coverage,
    pub note: String,
    pub result: ScanResult,
}

/// Build the JSON report for a batch of scans.
pub fn json_report(
    path: &str,
    config_path: Option<&str>,
    scans: &[UnitScan],
    telemetry: &TelemetryFetch,
) -> JsonReport {
    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: path.to_string(),
        config: config_path.map(str::to_string),
        telemetry: JsonTelemetry {
            status: telemetry.status,
            note: status_note(telemetry.status).to_string(),
            correlation_id: telemetry.correlation_id.clone(),
            attempts: telemetry.attempts,
            message: telemetry.message.clone(),
        },
        units_scanned: scans.len(),
        total_instances: scans.iter().map(|s| s.result.total_instances()).sum(),
        units: scans
            .iter()
            .map(|s| {
                let coverage = Coverage::of(telemetry, &s.name);
                JsonUnit {
                    class_name: s.name.clone(),
                    file: s.path.to_string_lossy().to_string(),
                    coverage,
                    note: coverage_note(coverage, telemetry.status).to_string(),
                    result: s.result.clone(),
                }
            })
            .collect(),
    }
}

/// Write results in JSON format.
pub fn write_json(
    path: &str,
    config_path: Option<&str>,
    scans: &[UnitScan],
    telemetry: &TelemetryFetch,
) -> anyhow::Result<()> {
    let report = json_report(path, config_path, scans, telemetry);
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// SARIF Format
// =============================================================================

const SARIF_VERSION: &str = "2.1.0";
const SARIF_SCHEMA: &str = "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const TOOL_NAME: &str = "apexscan";
const INFO_URI: &str = "https://developer.salesforce.com/docs/atlas.en-us.apexcode.meta/apexcode/apex_gov_limits.htm";

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifReport {
    pub version: String,
    #[serde(rename = "$schema")]
    pub schema: String,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRun {
    pub tool: SarifTool,
    pub results: Vec<SarifResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifDriver {
    pub name: String,
    pub version: String,
    #[serde(rename = "informationUri")]
    pub information_uri: String,
    pub rules: Vec<SarifRule>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRule {
    pub id: String,
    pub name: String,
    #[serde(rename = "shortDescription")]
    pub short_description: SarifMessage,
    #[serde(rename = "fullDescription", skip_serializing_if = "Option::is_none")]
    pub full_description: Option<SarifMessage>,
    #[serde(rename = "defaultConfiguration")]
    pub default_config: SarifRuleConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRuleConfig {
    pub level: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifResult {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub level: String,
    pub message: SarifMessage,
    pub locations: Vec<SarifLocation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifMessage {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    pub physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    pub artifact_location: SarifArtifact,
    pub region: SarifRegion,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifArtifact {
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRegion {
    #[serde(rename = "startLine")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
}

fn rule_name(kind: AntipatternKind) -> &'static str {
    match kind {
        AntipatternKind::GlobalDescribe => "UncachedGlobalDescribe",
        AntipatternKind::UnboundedQuery => "UnboundedSoql",
        AntipatternKind::UnusedQueryFields => "UnusedSoqlFields",
    }
}

fn default_level(kind: AntipatternKind) -> &'static str {
    match kind {
        AntipatternKind::GlobalDescribe | AntipatternKind::UnboundedQuery => "warning",
        AntipatternKind::UnusedQueryFields => "note",
    }
}

fn map_severity_to_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "error",
        Severity::Major => "warning",
        Severity::Minor => "note",
    }
}

fn make_relative_path(file: &Path, base_path: &Path) -> String {
    if base_path.as_os_str().is_empty() {
        return file.to_string_lossy().to_string();
    }

    // Single file scan: just the file name
    if file == base_path {
        return file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string_lossy().to_string());
    }

    file.strip_prefix(base_path)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| file.to_string_lossy().to_string())
}

fn sarif_message(instance: &DetectedInstance) -> String {
    let mut text = format!(
        "{} in {} ({} severity",
        instance.kind.title(),
        instance.class_name,
        instance.severity
    );
    if let Some(evidence) = &instance.runtime {
        text.push_str(&format!(
            " from runtime metrics: {} executions, {:.1} ms average",
            evidence.executions, evidence.avg_cost_ms
        ));
    }
    text.push(')');
    if let Some(after) = &instance.code_after {
        text.push_str(&format!(". Suggested: {}", after));
    }
    text
}

/// Build the SARIF report for a batch of scans.
pub fn sarif_report(base_path: &Path, scans: &[UnitScan]) -> SarifReport {
    let results_by_kind = || {
        scans
            .iter()
            .flat_map(|s| s.result.antipattern_results.iter().map(move |r| (s, r)))
    };

    let mut kinds: Vec<AntipatternKind> = results_by_kind().map(|(_, r)| r.kind).collect();
    kinds.sort();
    kinds.dedup();

    let fix_for = |kind: AntipatternKind| {
        results_by_kind()
            .find(|(_, r)| r.kind == kind)
            .map(|(_, r)| r.fix_instruction.clone())
    };

    let rules = kinds
        .iter()
        .map(|&kind| SarifRule {
            id: kind.as_str().to_string(),
            name: rule_name(kind).to_string(),
            short_description: SarifMessage {
                text: kind.title().to_string(),
            },
            full_description: fix_for(kind).map(|text| SarifMessage { text }),
            default_config: SarifRuleConfig {
                level: default_level(kind).to_string(),
            },
        })
        .collect();

    let results = results_by_kind()
        .flat_map(|(scan, result)| {
            result.detected_instances.iter().map(move |instance| SarifResult {
                rule_id: result.kind.as_str().to_string(),
                level: map_severity_to_level(instance.severity).to_string(),
                message: SarifMessage {
                    text: sarif_message(instance),
                },
                locations: vec![SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: SarifArtifact {
                            uri: make_relative_path(&scan.path, base_path),
                        },
                        region: SarifRegion {
                            start_line: instance.location.start_line.max(1),
                            end_line: instance.location.end_line.max(1),
                        },
                    },
                }],
            })
        })
        .collect();

    SarifReport {
        version: SARIF_VERSION.to_string(),
        schema: SARIF_SCHEMA.to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: TOOL_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    information_uri: INFO_URI.to_string(),
                    rules,
                },
            },
            results,
        }],
    }
}

/// Write results in SARIF format.
pub fn write_sarif(base_path: &Path, scans: &[UnitScan]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&sarif_report(base_path, scans))?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty(
    path: &str,
    config_path: Option<&str>,
    scans: &[UnitScan],
    telemetry: &TelemetryFetch,
) {
    // Header
    println!();
    print!("  ");
    print!("{}", "apexscan".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", path);
    if let Some(config) = config_path {
        print!("  {}", "Config:   ".dimmed());
        println!("{}", config);
    }
    print!("  {}", "Runtime:  ".dimmed());
    println!("{}", telemetry_label(telemetry.status));
    println!();

    for scan in scans {
        write_unit(scan, Coverage::of(telemetry, &scan.name));
    }

    print!("  {} ", "Note:".bold());
    println!("{}", status_note(telemetry.status));
    println!();

    write_final_status(scans);
    println!();
}

fn telemetry_label(status: TelemetryStatus) -> ColoredString {
    match status {
        TelemetryStatus::Success => "production metrics".green(),
        TelemetryStatus::AccessDenied => "access denied".yellow(),
        TelemetryStatus::NoConnection => "not connected".dimmed(),
        TelemetryStatus::ApiError => "unavailable".yellow(),
    }
}

fn write_unit(scan: &UnitScan, coverage: Coverage) {
    print!("  {}", scan.name.bold());
    println!("  {}", scan.path.to_string_lossy().blue());
    // Failed fetches are explained once, in the closing note.
    if coverage == Coverage::NotCovered {
        println!("    {}", coverage_note(coverage, TelemetryStatus::Success).dimmed());
    }

    if scan.result.is_empty() {
        println!("    {}", clean_message(&scan.name).green());
        println!();
        return;
    }
    println!();

    for result in &scan.result.antipattern_results {
        write_result(result);
    }
}

fn write_result(result: &AntipatternResult) {
    println!(
        "    {} ({})",
        result.kind.title().bold(),
        result.detected_instances.len()
    );
    println!();

    for instance in &result.detected_instances {
        write_severity_tag(instance.severity);
        if instance.severity_origin == SeverityOrigin::Runtime {
            print!("💡 ");
        }
        print!("{}", format!("line {}", instance.location).dimmed());
        if let Some(method) = &instance.metadata.method_name {
            print!("{}", format!("  in {}", method).dimmed());
        }
        if instance.metadata.in_loop {
            print!("  {}", "inside loop".yellow());
        }
        println!();

        for line in instance.code_before.lines() {
            println!("            {}", line.trim_end());
        }
        if let Some(after) = &instance.code_after {
            print!("          {} ", "→".green());
            let mut lines = after.lines();
            if let Some(first) = lines.next() {
                println!("{}", first.trim_end().green());
            }
            for line in lines {
                println!("            {}", line.trim_end().green());
            }
        }
        if let Some(evidence) = &instance.runtime {
            println!(
                "            {}",
                format!(
                    "{} executions, {:.1} ms average",
                    evidence.executions, evidence.avg_cost_ms
                )
                .dimmed()
            );
        }
        println!();
    }

    println!("      {} {}", "Fix:".bold(), result.fix_instruction);
    println!();
}

fn write_severity_tag(severity: Severity) {
    match severity {
        Severity::Critical => print!("      {} ", "CRITICAL".red()),
        Severity::Major => print!("      {} ", "MAJOR   ".yellow()),
        Severity::Minor => print!("      {} ", "MINOR   ".blue()),
    }
}

fn write_final_status(scans: &[UnitScan]) {
    let total: usize = scans.iter().map(|s| s.result.total_instances()).sum();
    let (critical, major, minor) = scans
        .iter()
        .flat_map(|s| &s.result.antipattern_results)
        .map(|r| r.severity_counts())
        .fold((0, 0, 0), |(c, j, n), (rc, rj, rn)| (c + rc, j + rj, n + rn));

    print!("  {}", format!("Units: {}", scans.len()).dimmed());
    print!("  Findings: ");
    if total == 0 {
        println!("{}", "0".green().bold());
        return;
    }
    print!("{}", total.to_string().bold());
    println!(
        "  ({} critical, {} major, {} minor)",
        critical.to_string().red(),
        major.to_string().yellow(),
        minor.to_string().blue()
    );
}
