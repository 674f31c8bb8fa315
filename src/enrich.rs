//! Runtime severity recalibration.
//!
//! An enricher maps an instance to the telemetry entry for its key and
//! re-scores it from two measured signals: how often the code ran and how
//! long it took on average. Each signal falls into a band; the stronger band
//! decides the severity.

use serde::{Deserialize, Serialize};

use crate::detect::{DetectedInstance, RuntimeEvidence, Severity, SeverityOrigin};
use crate::telemetry::ClassRuntimeData;

/// Which telemetry entry an instance is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentKey {
    /// Enclosing method signature, falling back to the bare name.
    Method,
    /// Normalized query signature.
    Query,
}

/// Measured cost band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Band {
    Low,
    Moderate,
    High,
}

/// Threshold table for one key kind. A signal at or above a threshold
/// reaches that band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub high_executions: u64,
    pub moderate_executions: u64,
    pub high_avg_cost_ms: f64,
    pub moderate_avg_cost_ms: f64,
}

impl SeverityBands {
    /// Defaults for method-level telemetry.
    pub fn method_defaults() -> Self {
        Self {
            high_executions: 10_000,
            moderate_executions: 100,
            high_avg_cost_ms: 1_000.0,
            moderate_avg_cost_ms: 100.0,
        }
    }

    /// Defaults for query-level telemetry.
    pub fn query_defaults() -> Self {
        Self {
            high_executions: 5_000,
            moderate_executions: 50,
            high_avg_cost_ms: 500.0,
            moderate_avg_cost_ms: 50.0,
        }
    }

    /// Band of a measurement: the stronger of the two signals.
    pub fn band(&self, executions: u64, avg_cost_ms: f64) -> Band {
        let by_count = if executions >= self.high_executions {
            Band::High
        } else if executions >= self.moderate_executions {
            Band::Moderate
        } else {
            Band::Low
        };
        let by_cost = if avg_cost_ms >= self.high_avg_cost_ms {
            Band::High
        } else if avg_cost_ms >= self.moderate_avg_cost_ms {
            Band::Moderate
        } else {
            Band::Low
        };
        by_count.max(by_cost)
    }

    /// Bands whose moderate threshold exceeds the high one are rejected.
    pub fn is_ordered(&self) -> bool {
        self.moderate_executions <= self.high_executions
            && self.moderate_avg_cost_ms <= self.high_avg_cost_ms
    }
}

/// Severity for a band, given the statically computed baseline.
pub fn severity_for(band: Band, baseline: Severity) -> Severity {
    match band {
        Band::High => Severity::Critical,
        Band::Moderate => baseline,
        Band::Low => Severity::Minor,
    }
}

/// Re-scores instances from class telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeEnricher {
    key: EnrichmentKey,
    bands: SeverityBands,
}

impl RuntimeEnricher {
    pub fn method_keyed(bands: SeverityBands) -> Self {
        Self {
            key: EnrichmentKey::Method,
            bands,
        }
    }

    pub fn query_keyed(bands: SeverityBands) -> Self {
        Self {
            key: EnrichmentKey::Query,
            bands,
        }
    }

    pub fn key(&self) -> EnrichmentKey {
        self.key
    }

    pub fn bands(&self) -> &SeverityBands {
        &self.bands
    }

    /// Return `instance` re-scored from `runtime`, or unchanged when there
    /// is no telemetry for its key.
    pub fn enrich(
        &self,
        instance: DetectedInstance,
        runtime: Option<&ClassRuntimeData>,
    ) -> DetectedInstance {
        let Some(runtime) = runtime else {
            return instance;
        };
        let Some(evidence) = self.evidence(&instance, runtime) else {
            return instance;
        };

        let band = self.bands.band(evidence.executions, evidence.avg_cost_ms);
        DetectedInstance {
            severity: severity_for(band, instance.severity),
            severity_origin: SeverityOrigin::Runtime,
            runtime: Some(evidence),
            ..instance
        }
    }

    fn evidence(
        &self,
        instance: &DetectedInstance,
        runtime: &ClassRuntimeData,
    ) -> Option<RuntimeEvidence> {
        match self.key {
            EnrichmentKey::Method => {
                let key = instance
                    .metadata
                    .method_signature
                    .as_deref()
                    .or(instance.metadata.method_name.as_deref())?;
                let method = runtime.method(key)?;
                Some(RuntimeEvidence {
                    key: method.method_name.clone(),
                    executions: method.invocations,
                    avg_cost_ms: method.avg_cpu_time_ms,
                })
            }
            EnrichmentKey::Query => {
                let key = instance.metadata.query_signature.as_deref()?;
                let query = runtime.query(key)?;
                Some(RuntimeEvidence {
                    key: key.to_string(),
                    executions: query.executions,
                    avg_cost_ms: query.avg_execution_time_ms,
                })
            }
        }
    }
}
