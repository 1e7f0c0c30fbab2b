//! Applying (or deleting) the objects of a single step.

pub mod patch;

pub use patch::patch_existing;

use crate::cluster::DeletePropagation;
use crate::engine::ExecutionContext;
use crate::error::{ApplyError, Operation};
use crate::log::Event;
use crate::model::{ExecutionState, Step, StepStatus};
use crate::object::ClusterObject;

/// Executes `step` once, updating `status` in place.
///
/// The step becomes `Complete` only when every object was applied (or deleted)
/// and, for apply steps, every object reports healthy. An unhealthy object does
/// not stop the remaining objects from being applied. The first cluster error
/// aborts the step and is returned.
pub async fn apply_step(
    phase: &str,
    step: &Step,
    status: &mut StepStatus,
    resources: &[ClusterObject],
    ctx: &ExecutionContext<'_>,
) -> Result<(), ApplyError> {
    if !status.state.is_in_progress() {
        return Ok(());
    }
    ctx.events.publish(Event::StepExecuting {
        phase: phase.to_string(),
        step: step.name.clone(),
        state: status.state,
        resources: resources.len(),
    });
    status.state = ExecutionState::InProgress;

    let mut all_healthy = true;
    for resource in resources {
        if step.delete {
            delete_object(&step.name, resource, ctx).await?;
            continue;
        }

        let applied = create_or_patch(&step.name, resource, ctx).await?;
        let key = applied.key();
        match ctx.health.is_healthy(ctx.client, &applied).await {
            Ok(()) => ctx.events.publish(Event::ObjectHealthy {
                object: key.to_string(),
            }),
            Err(reason) => {
                all_healthy = false;
                ctx.events.publish(Event::ObjectUnhealthy {
                    object: key.to_string(),
                    reason: reason.to_string(),
                });
            }
        }
    }

    if all_healthy {
        status.state = ExecutionState::Complete;
        ctx.events.publish(Event::StepCompleted {
            phase: phase.to_string(),
            step: step.name.clone(),
        });
    }
    Ok(())
}

/// Foreground-cascading delete; an object that is already gone counts as deleted.
async fn delete_object(
    step: &str,
    resource: &ClusterObject,
    ctx: &ExecutionContext<'_>,
) -> Result<(), ApplyError> {
    let existed = match ctx.client.delete(resource, DeletePropagation::Foreground).await {
        Ok(()) => true,
        Err(err) if err.is_not_found() => false,
        Err(source) => {
            return Err(ApplyError {
                operation: Operation::Delete,
                object: resource.key(),
                source,
            })
        }
    };
    ctx.events.publish(Event::ObjectDeleted {
        step: step.to_string(),
        object: resource.key().to_string(),
        existed,
    });
    Ok(())
}

/// Creates `resource` when absent, otherwise patches the stored object.
/// Returns the object as the server now holds it.
async fn create_or_patch(
    step: &str,
    resource: &ClusterObject,
    ctx: &ExecutionContext<'_>,
) -> Result<ClusterObject, ApplyError> {
    let key = resource.key();
    match ctx.client.get(&key).await {
        Err(err) if err.is_not_found() => {
            let created = ctx.client.create(resource).await.map_err(|source| ApplyError {
                operation: Operation::Create,
                object: key.clone(),
                source,
            })?;
            ctx.events.publish(Event::ObjectCreated {
                step: step.to_string(),
                object: key.to_string(),
            });
            Ok(created)
        }
        Err(source) => Err(ApplyError {
            operation: Operation::Get,
            object: key,
            source,
        }),
        Ok(existing) => {
            let (patched, strategy) = patch_existing(resource, &existing, ctx.client, ctx.events)
                .await
                .map_err(|source| ApplyError {
                    operation: Operation::Patch,
                    object: key.clone(),
                    source,
                })?;
            ctx.events.publish(Event::ObjectPatched {
                step: step.to_string(),
                object: key.to_string(),
                strategy: strategy.to_string(),
            });
            Ok(patched)
        }
    }
}
