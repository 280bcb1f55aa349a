//! Scenario results and the run summary printed to the operator.

use std::fmt;

use crate::orchestrator::{ScenarioError, ScenarioState, ScenarioStep};
use crate::types::{CapabilityOutcome, Identity, PermissionLevel};

/// One probe observed during a scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeRecord {
    pub step: ScenarioStep,
    /// Level the identity was expected to hold at the time
    pub level: PermissionLevel,
    pub outcome: CapabilityOutcome,
}

/// First failure of a scenario and the step it happened in.
#[derive(Debug)]
pub struct ScenarioFailure {
    pub step: ScenarioStep,
    pub error: ScenarioError,
}

impl ScenarioFailure {
    pub fn new(step: ScenarioStep, error: ScenarioError) -> Self {
        Self { step, error }
    }
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub identity: Identity,
    pub state: ScenarioState,
    pub outcomes: Vec<ProbeRecord>,
    pub failure: Option<ScenarioFailure>,
}

impl ScenarioReport {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            state: ScenarioState::Ungranted,
            outcomes: Vec::new(),
            failure: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
            && self.state == ScenarioState::BoundaryVerified(PermissionLevel::None)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = format!("{} ({})", self.identity.name(), self.identity.level());
        match &self.failure {
            None if self.passed() => write!(f, "PASS  {}", who),
            None => write!(f, "FAIL  {}: incomplete, stopped at {:?}", who, self.state),
            Some(failure) => write!(
                f,
                "FAIL  {}: step '{}': {}",
                who, failure.step, failure.error
            ),
        }
    }
}

/// Results of every scenario in a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    pub fn new(scenarios: Vec<ScenarioReport>) -> Self {
        Self { scenarios }
    }

    pub fn is_success(&self) -> bool {
        !self.scenarios.is_empty() && self.scenarios.iter().all(ScenarioReport::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.scenarios.iter().filter(|s| !s.passed())
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.identity.name() == name)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        writeln!(
            f,
            "permcheck: {} scenario(s), {} passed, {} failed",
            self.scenarios.len(),
            self.scenarios.len() - failed,
            failed
        )?;
        for scenario in &self.scenarios {
            writeln!(f, "  {}", scenario)?;
        }
        Ok(())
    }
}
