//! Turning task templates into concrete, owned cluster objects.
//!
//! Rendering never talks to the cluster: it only needs the operator's tasks
//! and templates, the instance parameters and the execution metadata.

pub mod conventions;
pub mod template;

use std::collections::HashMap;

pub use conventions::{ConventionMetadata, Conventions, ObjectEnhancer};
pub use template::{PlaceholderEngine, TemplateContext, TemplateEngine};

use crate::engine::ActivePlan;
use crate::error::EngineError;
use crate::model::ExecutionMetadata;
use crate::object::ClusterObject;

/// A template engine plus the convention stamping applied to its output.
pub struct Renderer {
    engine: Box<dyn TemplateEngine>,
    enhancer: Box<dyn ObjectEnhancer>,
}

impl Renderer {
    pub fn new(engine: Box<dyn TemplateEngine>, enhancer: Box<dyn ObjectEnhancer>) -> Self {
        Self { engine, enhancer }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Box::new(PlaceholderEngine), Box::new(Conventions))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseResources {
    pub steps: HashMap<String, Vec<ClusterObject>>,
}

/// Rendered objects of one tick, by phase then step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanResources {
    pub phases: HashMap<String, PhaseResources>,
}

impl PlanResources {
    pub fn step(&self, phase: &str, step: &str) -> &[ClusterObject] {
        self.phases
            .get(phase)
            .and_then(|p| p.steps.get(step))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.phases
            .values()
            .flat_map(|p| p.steps.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Renders every template of every step of `plan`.
///
/// A missing task or template, or a template that fails to expand, is fatal.
pub fn prepare_resources(
    plan: &ActivePlan,
    meta: &ExecutionMetadata,
    renderer: &Renderer,
) -> Result<PlanResources, EngineError> {
    let mut result = PlanResources::default();

    for phase in &plan.spec.phases {
        let phase_resources = result.phases.entry(phase.name.clone()).or_default();

        for (number, step) in phase.steps.iter().enumerate() {
            let context = TemplateContext {
                operator_name: meta.operator_name.clone(),
                name: meta.instance_name.clone(),
                namespace: meta.instance_namespace.clone(),
                params: plan.params.clone(),
                plan_name: plan.name.clone(),
                phase_name: phase.name.clone(),
                step_name: step.name.clone(),
                step_number: number,
            };
            let conventions = ConventionMetadata {
                instance_name: meta.instance_name.clone(),
                namespace: meta.instance_namespace.clone(),
                operator_name: meta.operator_name.clone(),
                operator_version: meta.operator_version.clone(),
                plan_execution_id: meta.plan_execution_id.clone(),
                plan_name: plan.name.clone(),
                phase_name: phase.name.clone(),
                step_name: step.name.clone(),
            };

            let mut resources = Vec::new();
            for task_name in &step.tasks {
                let task = plan.tasks.get(task_name).ok_or_else(|| EngineError::MissingTask {
                    phase: phase.name.clone(),
                    step: step.name.clone(),
                    task: task_name.clone(),
                    operator_version: meta.operator_version_name.clone(),
                })?;

                let mut rendered = Vec::with_capacity(task.resources.len());
                for template_name in &task.resources {
                    let template = plan.templates.get(template_name).ok_or_else(|| {
                        EngineError::MissingTemplate {
                            phase: phase.name.clone(),
                            step: step.name.clone(),
                            template: template_name.clone(),
                            operator_version: meta.operator_version_name.clone(),
                        }
                    })?;
                    let text = renderer.engine.render(template, &context).map_err(|source| {
                        EngineError::Template {
                            phase: phase.name.clone(),
                            step: step.name.clone(),
                            template: template_name.clone(),
                            source,
                        }
                    })?;
                    rendered.push((template_name.clone(), text));
                }

                let objects = renderer
                    .enhancer
                    .apply_conventions(&rendered, &conventions, &meta.resources_owner)
                    .map_err(|source| EngineError::Convention {
                        phase: phase.name.clone(),
                        step: step.name.clone(),
                        source,
                    })?;
                resources.extend(objects);
            }

            phase_resources.steps.insert(step.name.clone(), resources);
        }
    }

    Ok(result)
}
