//! Wire types for the class runtime telemetry endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::apex::signature;

/// Path of the class runtime endpoint; `{version}` is `v` + API version.
pub const RUNTIME_API_PATH: &str = "/services/data/{version}/scalemcp/apexguru/class-runtime-data";

/// How to reach an org's REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgConnection {
    pub instance_url: String,
    pub access_token: String,
    /// API version without the leading `v`, e.g. `62.0`.
    pub api_version: String,
}

impl OrgConnection {
    pub fn new(
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            instance_url: instance_url.into(),
            access_token: access_token.into(),
            api_version: api_version.into(),
        }
    }

    /// Whether the connection carries enough to attempt a call.
    pub fn is_usable(&self) -> bool {
        !self.instance_url.trim().is_empty() && !self.access_token.trim().is_empty()
    }

    /// Full URL of the runtime telemetry endpoint.
    pub fn endpoint(&self) -> String {
        let version = format!("v{}", self.api_version.trim().trim_start_matches('v'));
        format!(
            "{}{}",
            self.instance_url.trim_end_matches('/'),
            RUNTIME_API_PATH.replace("{version}", &version)
        )
    }
}

/// Request body posted to the telemetry endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRequest {
    #[serde(rename = "requestId")]
    pub correlation_id: String,
    pub org_id: String,
    pub classes: Vec<String>,
}

/// Measured execution facts for one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRuntimeData {
    /// As reported; may be qualified (`Class.method`) or carry parameters.
    pub method_name: String,
    #[serde(default)]
    pub invocations: u64,
    #[serde(default)]
    pub avg_cpu_time_ms: f64,
}

/// Measured execution facts for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRuntimeData {
    pub query: String,
    #[serde(default)]
    pub executions: u64,
    #[serde(default)]
    pub avg_execution_time_ms: f64,
}

/// Runtime telemetry for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRuntimeData {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub methods: Vec<MethodRuntimeData>,
    #[serde(default)]
    pub soql_queries: Vec<QueryRuntimeData>,
}

impl ClassRuntimeData {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.soql_queries.is_empty()
    }

    /// Telemetry for a method, by signature (`load(String)`) or bare name.
    ///
    /// An entry whose parameter list matches wins over a name-only match.
    /// A name-only match needs one side without a parameter list: overloads
    /// with different parameter types are different methods.
    pub fn method(&self, key: &str) -> Option<&MethodRuntimeData> {
        let wanted = MethodKey::parse(key);
        let keyed: Vec<_> = self
            .methods
            .iter()
            .map(|m| (MethodKey::parse(&m.method_name), m))
            .collect();

        keyed
            .iter()
            .find(|(k, _)| wanted.params.is_some() && *k == wanted)
            .or_else(|| {
                keyed.iter().find(|(k, _)| {
                    k.name == wanted.name && (k.params.is_none() || wanted.params.is_none())
                })
            })
            .map(|(_, m)| *m)
    }

    /// Telemetry for a query, by normalized signature.
    pub fn query(&self, query_signature: &str) -> Option<&QueryRuntimeData> {
        self.soql_queries
            .iter()
            .find(|q| signature(&q.query) == query_signature)
    }
}

/// Normalized method identity: lowercase bare name plus optional
/// whitespace-free parameter list.
#[derive(Debug, PartialEq, Eq)]
struct MethodKey {
    name: String,
    params: Option<String>,
}

impl MethodKey {
    fn parse(raw: &str) -> Self {
        let (head, params) = match raw.split_once('(') {
            Some((head, rest)) => (
                head,
                Some(
                    rest.trim_end_matches(')')
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect::<String>()
                        .to_lowercase(),
                ),
            ),
            None => (raw, None),
        };
        let name = head.rsplit('.').next().unwrap_or(head).trim().to_lowercase();
        Self { name, params }
    }
}

/// Response body: unit name to telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    #[serde(default)]
    pub classes: BTreeMap<String, ClassRuntimeData>,
}

/// Outcome classification of a telemetry fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryStatus {
    Success,
    AccessDenied,
    NoConnection,
    ApiError,
}

impl TelemetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryStatus::Success => "success",
            TelemetryStatus::AccessDenied => "access_denied",
            TelemetryStatus::NoConnection => "no_connection",
            TelemetryStatus::ApiError => "api_error",
        }
    }
}

impl std::fmt::Display for TelemetryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a fetch produced, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFetch {
    pub status: TelemetryStatus,
    pub report: Option<TelemetryReport>,
    /// Last error message, for failed fetches.
    pub message: Option<String>,
    /// Network attempts performed (0 when no call was made).
    pub attempts: u32,
    pub correlation_id: String,
}

/// Whether telemetry is available for one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitCoverage<'a> {
    /// The report has data for the unit.
    Covered(&'a ClassRuntimeData),
    /// The call succeeded but the org has no data for the unit.
    NotCovered,
    /// The call itself failed or was never made.
    Unavailable(TelemetryStatus),
}

impl TelemetryFetch {
    /// A fetch that never reached the network.
    pub fn not_attempted(
        status: TelemetryStatus,
        correlation_id: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            status,
            report: None,
            message,
            attempts: 0,
            correlation_id: correlation_id.into(),
        }
    }

    /// Coverage of `unit_name` in this fetch.
    pub fn class_data(&self, unit_name: &str) -> UnitCoverage<'_> {
        match (&self.status, &self.report) {
            (TelemetryStatus::Success, Some(report)) => match get_class_data(report, unit_name) {
                Some(data) => UnitCoverage::Covered(data),
                None => UnitCoverage::NotCovered,
            },
            (TelemetryStatus::Success, None) => UnitCoverage::NotCovered,
            (status, _) => UnitCoverage::Unavailable(*status),
        }
    }

    /// Telemetry for `unit_name`, when covered.
    pub fn runtime_for(&self, unit_name: &str) -> Option<&ClassRuntimeData> {
        match self.class_data(unit_name) {
            UnitCoverage::Covered(data) => Some(data),
            _ => None,
        }
    }
}

/// Extract one unit's telemetry from a report.
///
/// Tries an exact key match, then a case-insensitive one. Absence is a
/// normal outcome for units without execution history.
pub fn get_class_data<'a>(
    report: &'a TelemetryReport,
    unit_name: &str,
) -> Option<&'a ClassRuntimeData> {
    report.classes.get(unit_name).or_else(|| {
        report
            .classes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(unit_name))
            .map(|(_, data)| data)
    })
}
