//! Ordered collection of antipattern modules.

use serde::{Deserialize, Serialize};

use crate::enrich::{RuntimeEnricher, SeverityBands};

use super::{
    AntipatternKind, AntipatternModule, GlobalDescribeDetector, GlobalDescribeRecommender,
    UnboundedQueryDetector, UnboundedQueryRecommender, UnusedFieldsDetector,
    UnusedFieldsRecommender,
};

/// Severity bands per enrichment key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "SeverityBands::method_defaults")]
    pub method: SeverityBands,
    #[serde(default = "SeverityBands::query_defaults")]
    pub query: SeverityBands,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            method: SeverityBands::method_defaults(),
            query: SeverityBands::query_defaults(),
        }
    }
}

/// Registered modules, iterated in registration order.
#[derive(Debug, Default)]
pub struct AntipatternRegistry {
    modules: Vec<AntipatternModule>,
}

impl AntipatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in kind.
    pub fn with_builtins(thresholds: &Thresholds) -> Self {
        let mut registry = Self::new();
        for kind in AntipatternKind::ALL {
            registry.register(builtin_module(kind, thresholds));
        }
        registry
    }

    /// Append a module. Registering a kind twice is not checked.
    pub fn register(&mut self, module: AntipatternModule) {
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[AntipatternModule] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn builtin_module(kind: AntipatternKind, thresholds: &Thresholds) -> AntipatternModule {
    let method_keyed = || RuntimeEnricher::method_keyed(thresholds.method.clone());
    let query_keyed = || RuntimeEnricher::query_keyed(thresholds.query.clone());

    match kind {
        AntipatternKind::GlobalDescribe => AntipatternModule::new(
            Box::new(GlobalDescribeDetector),
            Box::new(GlobalDescribeRecommender),
            method_keyed(),
        ),
        AntipatternKind::UnboundedQuery => AntipatternModule::new(
            Box::new(UnboundedQueryDetector),
            Box::new(UnboundedQueryRecommender),
            query_keyed(),
        ),
        AntipatternKind::UnusedQueryFields => AntipatternModule::new(
            Box::new(UnusedFieldsDetector),
            Box::new(UnusedFieldsRecommender),
            query_keyed(),
        ),
    }
}
