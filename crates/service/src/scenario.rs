//! Where outbound signals get their scenario id from.

use uuid::Uuid;

/// Provides the id of the scenario currently being recorded.
pub trait ScenarioSource: Send + Sync {
    fn current_scenario_id(&self) -> String;
}

/// A scenario id fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticScenario(String);

impl StaticScenario {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random scenario id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ScenarioSource for StaticScenario {
    fn current_scenario_id(&self) -> String {
        self.0.clone()
    }
}
