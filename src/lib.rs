//! apexscan - Apex antipattern detection with runtime-correlated severity.
//!
//! apexscan finds three performance antipatterns in Salesforce Apex
//! source: uncached `Schema.getGlobalDescribe()` calls, SOQL queries with
//! neither a `WHERE` nor a `LIMIT` clause, and queries that select fields
//! the code never reads. Each finding gets a static severity. When org
//! telemetry is available, severities are recalibrated from measured
//! execution counts and costs.
//!
//! # Architecture
//!
//! - `apex`: lexical model of Apex source (masking, structure, SOQL)
//! - `detect`: detectors, recommenders and the antipattern registry
//! - `enrich`: runtime severity bands and recalibration
//! - `telemetry`: runtime data client with timeout and retry
//! - `config`: YAML configuration
//! - `report`: output formatting (pretty, JSON, SARIF)
//!
//! # Adding an Antipattern
//!
//! Implement `Detector` and `Recommender`, add a variant to
//! `AntipatternKind` and wire both into `AntipatternRegistry::with_builtins`.

pub mod apex;
pub mod cli;
pub mod config;
pub mod detect;
pub mod enrich;
pub mod report;
pub mod telemetry;

pub use apex::ApexSource;
pub use config::Config;
pub use detect::{
    AntipatternKind, AntipatternModule, AntipatternRegistry, DetectedInstance, Scanner,
    ScanResult, Severity, SeverityOrigin, SourceUnit, UnitScan,
};
pub use enrich::{RuntimeEnricher, SeverityBands};
pub use telemetry::{
    ClassRuntimeData, OrgConnection, TelemetryClient, TelemetryConfig, TelemetryFetch,
    TelemetryReport, TelemetryRequest, TelemetryStatus,
};
