use railyard_types::{ManagerKind, Pipeline, Precedence, RequirementSpec, ReporterRef, TriggerSpec, Window};
use serde::{Deserialize, Serialize};

use crate::job::JobConfig;

/// The AIMD window's starting point and bounds, as configured. Defaults mirror the upstream project's own
/// gate-pipeline defaults (start at the ceiling, floor of 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub initial: u32,
    pub floor: u32,
    pub ceiling: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { initial: 20, floor: 3, ceiling: 20 }
    }
}

impl WindowConfig {
    #[must_use]
    pub fn to_window(&self) -> Window {
        Window::new(self.initial, self.floor, self.ceiling)
    }
}

/// A pipeline as it appears in a tenant's already-parsed layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub manager_kind: ManagerKind,
    pub triggers: Vec<TriggerSpec>,
    pub requirements: RequirementSpec,
    pub reporters: Vec<ReporterRef>,
    pub window: WindowConfig,
    pub precedence: Precedence,
    pub max_dependencies: u32,
    pub jobs: Vec<JobConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            manager_kind: ManagerKind::Independent,
            triggers: Vec::new(),
            requirements: RequirementSpec::default(),
            reporters: Vec::new(),
            window: WindowConfig::default(),
            precedence: Precedence::default(),
            max_dependencies: Pipeline::DEFAULT_MAX_DEPENDENCIES,
            jobs: Vec::new(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline {
            name: self.name.clone(),
            manager_kind: self.manager_kind,
            triggers: self.triggers.clone(),
            requirements: self.requirements.clone(),
            reporters: self.reporters.clone(),
            window: self.window.to_window(),
            precedence: self.precedence,
            max_dependencies: self.max_dependencies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_open_question_decisions() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_dependencies, 200);
        assert_eq!(config.window.floor, 3);
    }

    #[test]
    fn to_pipeline_carries_jobs_configuration_separately() {
        let mut config = PipelineConfig { name: "gate".into(), manager_kind: ManagerKind::Dependent, ..Default::default() };
        config.jobs.push(JobConfig { name: "build".into(), ..Default::default() });
        let pipeline = config.to_pipeline();
        assert_eq!(pipeline.name, "gate");
        assert_eq!(pipeline.manager_kind, ManagerKind::Dependent);
    }
}
