use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::EngineError;

/// State shared by plans, phases and steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    #[default]
    Pending,
    InProgress,
    Complete,
    Error,
}

impl ExecutionState {
    pub fn is_finished(self) -> bool {
        self == ExecutionState::Complete
    }

    /// Pending, InProgress and Error all mean "still work to do"; Error is retried.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            ExecutionState::Pending | ExecutionState::InProgress | ExecutionState::Error
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "PENDING"),
            ExecutionState::InProgress => write!(f, "IN_PROGRESS"),
            ExecutionState::Complete => write!(f, "COMPLETE"),
            ExecutionState::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Serial,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatus {
    pub name: String,
    pub state: ExecutionState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub name: String,
    pub state: ExecutionState,
    #[serde(default)]
    pub steps: Vec<StepStatus>,
}

/// Persisted progress of one plan; mirrors the plan's phase/step layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanExecutionStatus {
    pub plan_name: String,
    pub state: ExecutionState,
    #[serde(default)]
    pub phases: Vec<PhaseStatus>,
}

impl PlanExecutionStatus {
    /// A fresh, all-Pending status for `plan`.
    pub fn for_plan(plan_name: &str, plan: &Plan) -> Self {
        Self {
            plan_name: plan_name.to_string(),
            state: ExecutionState::Pending,
            phases: plan
                .phases
                .iter()
                .map(|phase| PhaseStatus {
                    name: phase.name.clone(),
                    state: ExecutionState::Pending,
                    steps: phase
                        .steps
                        .iter()
                        .map(|step| StepStatus {
                            name: step.name.clone(),
                            state: ExecutionState::Pending,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn phase_index(&self, phase: &str) -> Result<usize, EngineError> {
        self.phases
            .iter()
            .position(|p| p.name == phase)
            .ok_or_else(|| EngineError::UnknownPhase {
                phase: phase.to_string(),
            })
    }

    pub fn step_index(&self, phase_idx: usize, step: &str) -> Result<usize, EngineError> {
        let phase = &self.phases[phase_idx];
        phase
            .steps
            .iter()
            .position(|s| s.name == step)
            .ok_or_else(|| EngineError::UnknownStep {
                phase: phase.name.clone(),
                step: step.to_string(),
            })
    }

    /// True when this status has exactly the plan's phase and step names, in order.
    pub fn mirrors(&self, plan: &Plan) -> bool {
        self.phases.len() == plan.phases.len()
            && self.phases.iter().zip(&plan.phases).all(|(status, phase)| {
                status.name == phase.name
                    && status.steps.len() == phase.steps.len()
                    && status
                        .steps
                        .iter()
                        .zip(&phase.steps)
                        .all(|(s, st)| s.name == st.name)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
}

/// One version of an operator: its plans, tasks and templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub tasks: HashMap<String, TaskSpec>,
    #[serde(default)]
    pub plans: HashMap<String, Plan>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

impl OperatorVersion {
    /// `<operator>-<version>`, the identifier instances refer to.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Parameter defaults overlaid with `overrides`.
    pub fn resolve_params(&self, overrides: &HashMap<String, String>) -> BTreeMap<String, String> {
        let mut params: BTreeMap<String, String> = self
            .parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();
        for (key, value) in overrides {
            params.insert(key.clone(), value.clone());
        }
        params
    }
}

/// A managed application instance running one plan of an operator version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    pub namespace: String,
    pub operator_version: String,
    #[serde(default = "default_plan")]
    pub plan: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub uid: Option<String>,
}

fn default_plan() -> String {
    "deploy".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

/// Who is executing: stamped onto every rendered object.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionMetadata {
    pub instance_name: String,
    pub instance_namespace: String,
    pub operator_name: String,
    pub operator_version_name: String,
    pub operator_version: String,
    /// Only used for labels and tracing.
    pub plan_execution_id: String,
    pub resources_owner: OwnerReference,
}
