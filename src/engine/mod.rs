//! The plan execution engine.
//!
//! One call to [`execute_plan`] is one tick: render everything still needed,
//! walk phases and steps in order, apply what is active and return the next
//! status snapshot. Ticks are strictly sequential inside; the caller persists
//! the snapshot and schedules the next tick.

use std::collections::{BTreeMap, HashMap};

use crate::apply::apply_step;
use crate::cluster::ClusterClient;
use crate::error::EngineError;
use crate::health::HealthRegistry;
use crate::log::{Event, EventBus};
use crate::model::{ExecutionMetadata, ExecutionState, Plan, PlanExecutionStatus, Strategy, TaskSpec};
use crate::render::{prepare_resources, Renderer};

/// The plan being executed for one instance, with everything needed to render it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivePlan {
    pub name: String,
    pub status: PlanExecutionStatus,
    pub spec: Plan,
    pub tasks: HashMap<String, TaskSpec>,
    pub templates: HashMap<String, String>,
    pub params: BTreeMap<String, String>,
}

/// Collaborators for one tick.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub client: &'a dyn ClusterClient,
    pub renderer: &'a Renderer,
    pub health: &'a HealthRegistry,
    pub events: &'a dyn EventBus,
}

/// The next status snapshot, and the error that stopped the tick if any.
///
/// The status is meaningful even on error: it records which phase and step failed.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub status: PlanExecutionStatus,
    pub error: Option<EngineError>,
}

impl ExecutionOutcome {
    fn progressed(status: PlanExecutionStatus) -> Self {
        Self { status, error: None }
    }

    fn failed(status: PlanExecutionStatus, error: EngineError) -> Self {
        Self {
            status,
            error: Some(error),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_result(self) -> Result<PlanExecutionStatus, (PlanExecutionStatus, EngineError)> {
        match self.error {
            None => Ok(self.status),
            Some(err) => Err((self.status, err)),
        }
    }
}

/// Advances `plan` by one tick.
///
/// Error is never terminal: a step or phase left in Error is retried like a
/// Pending one on the next tick. Only Complete is skipped.
pub async fn execute_plan(
    plan: &ActivePlan,
    metadata: &ExecutionMetadata,
    ctx: &ExecutionContext<'_>,
) -> ExecutionOutcome {
    if plan.status.state.is_finished() {
        ctx.events.publish(Event::PlanAlreadyComplete {
            instance: metadata.instance_name.clone(),
            plan: plan.name.clone(),
        });
        return ExecutionOutcome::progressed(plan.status.clone());
    }

    // the caller's snapshot stays untouched
    let mut status = plan.status.clone();

    let resources = match prepare_resources(plan, metadata, ctx.renderer) {
        Ok(resources) => resources,
        Err(err) => {
            ctx.events.publish(Event::RenderFailed {
                plan: plan.name.clone(),
                error: err.to_string(),
            });
            mark_error(&mut status, &err);
            status.state = ExecutionState::Error;
            return ExecutionOutcome::failed(status, err);
        }
    };
    ctx.events.publish(Event::ResourcesRendered {
        plan: plan.name.clone(),
        resources: resources.len(),
    });

    let mut all_phases_completed = true;
    for phase in &plan.spec.phases {
        let phase_idx = match status.phase_index(&phase.name) {
            Ok(idx) => idx,
            Err(err) => {
                status.state = ExecutionState::Error;
                return ExecutionOutcome::failed(status, err);
            }
        };

        if status.phases[phase_idx].state.is_in_progress() {
            if status.phases[phase_idx].state != ExecutionState::InProgress {
                ctx.events.publish(Event::PhaseStarted {
                    plan: plan.name.clone(),
                    phase: phase.name.clone(),
                });
            }
            status.phases[phase_idx].state = ExecutionState::InProgress;

            let mut all_steps_finished = true;
            for step in &phase.steps {
                let step_idx = match status.step_index(phase_idx, &step.name) {
                    Ok(idx) => idx,
                    Err(err) => {
                        status.state = ExecutionState::Error;
                        return ExecutionOutcome::failed(status, err);
                    }
                };

                let step_resources = resources.step(&phase.name, &step.name);
                let step_status = &mut status.phases[phase_idx].steps[step_idx];
                if let Err(source) = apply_step(&phase.name, step, step_status, step_resources, ctx).await {
                    step_status.state = ExecutionState::Error;
                    status.phases[phase_idx].state = ExecutionState::Error;
                    let err = EngineError::Apply {
                        phase: phase.name.clone(),
                        step: step.name.clone(),
                        source,
                    };
                    ctx.events.publish(Event::StepFailed {
                        phase: phase.name.clone(),
                        step: step.name.clone(),
                        error: err.to_string(),
                    });
                    return ExecutionOutcome::failed(status, err);
                }

                if !step_status.state.is_finished() {
                    all_steps_finished = false;
                    if phase.strategy == Strategy::Serial {
                        // later steps wait for this one
                        break;
                    }
                }
            }

            if all_steps_finished {
                status.phases[phase_idx].state = ExecutionState::Complete;
                ctx.events.publish(Event::PhaseCompleted {
                    plan: plan.name.clone(),
                    phase: phase.name.clone(),
                });
            }
        }

        if !status.phases[phase_idx].state.is_finished() {
            // only one phase is live at a time
            all_phases_completed = false;
            break;
        }
    }

    if all_phases_completed {
        status.state = ExecutionState::Complete;
        ctx.events.publish(Event::PlanCompleted {
            instance: metadata.instance_name.clone(),
            plan: plan.name.clone(),
        });
    }

    ExecutionOutcome::progressed(status)
}

/// Marks the phase and step a rendering error belongs to.
fn mark_error(status: &mut PlanExecutionStatus, err: &EngineError) {
    let Some((phase, step)) = err.location() else {
        return;
    };
    if let Ok(phase_idx) = status.phase_index(phase) {
        status.phases[phase_idx].state = ExecutionState::Error;
        if let Ok(step_idx) = status.step_index(phase_idx, step) {
            status.phases[phase_idx].steps[step_idx].state = ExecutionState::Error;
        }
    }
}
