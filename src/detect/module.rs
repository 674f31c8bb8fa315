//! One antipattern kind's full pipeline.

use crate::enrich::RuntimeEnricher;
use crate::telemetry::ClassRuntimeData;

use super::{AntipatternKind, AntipatternResult, Detector, Recommender};

/// A detector, its recommender and its enricher.
pub struct AntipatternModule {
    detector: Box<dyn Detector>,
    recommender: Box<dyn Recommender>,
    enricher: RuntimeEnricher,
}

impl AntipatternModule {
    pub fn new(
        detector: Box<dyn Detector>,
        recommender: Box<dyn Recommender>,
        enricher: RuntimeEnricher,
    ) -> Self {
        Self {
            detector,
            recommender,
            enricher,
        }
    }

    pub fn kind(&self) -> AntipatternKind {
        self.detector.kind()
    }

    pub fn enricher(&self) -> &RuntimeEnricher {
        &self.enricher
    }

    /// Detect, re-score from telemetry when present, attach rewrites, then
    /// build the fix instruction over the final instance list.
    pub fn scan(
        &self,
        unit_name: &str,
        source: &str,
        runtime: Option<&ClassRuntimeData>,
    ) -> AntipatternResult {
        let runtime = runtime.filter(|data| !data.is_empty());

        let detected_instances: Vec<_> = self
            .detector
            .detect(unit_name, source)
            .into_iter()
            .map(|instance| match runtime {
                Some(data) => self.enricher.enrich(instance, Some(data)),
                None => instance,
            })
            .map(|mut instance| {
                instance.code_after = self.recommender.rewrite(&instance);
                instance
            })
            .collect();

        AntipatternResult {
            kind: self.kind(),
            fix_instruction: self.recommender.fix_instruction(&detected_instances),
            detected_instances,
        }
    }
}

impl std::fmt::Debug for AntipatternModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AntipatternModule")
            .field("kind", &self.kind())
            .field("enricher", &self.enricher.key())
            .finish()
    }
}
