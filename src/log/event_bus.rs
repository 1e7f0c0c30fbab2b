use std::sync::{Arc, Mutex};
use serde::{Deserialize, Serialize};

use crate::model::ExecutionState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PlanAlreadyComplete { instance: String, plan: String },
    ResourcesRendered { plan: String, resources: usize },
    RenderFailed { plan: String, error: String },
    PhaseStarted { plan: String, phase: String },
    PhaseCompleted { plan: String, phase: String },
    StepExecuting { phase: String, step: String, state: ExecutionState, resources: usize },
    StepCompleted { phase: String, step: String },
    StepFailed { phase: String, step: String, error: String },
    ObjectCreated { step: String, object: String },
    ObjectPatched { step: String, object: String, strategy: String },
    PatchFallback { object: String, from: String, to: String },
    ObjectDeleted { step: String, object: String, existed: bool },
    ObjectHealthy { object: String },
    ObjectUnhealthy { object: String, reason: String },
    PlanCompleted { instance: String, plan: String },
    InstanceRegistered { instance: String, plan: String },
}

impl Event {
    pub fn level(&self) -> log::Level {
        match self {
            Event::RenderFailed { .. } | Event::StepFailed { .. } => log::Level::Error,
            Event::ObjectUnhealthy { .. } | Event::PatchFallback { .. } => log::Level::Info,
            Event::ObjectHealthy { .. }
            | Event::StepExecuting { .. }
            | Event::ResourcesRendered { .. }
            | Event::PlanAlreadyComplete { .. } => log::Level::Debug,
            _ => log::Level::Info,
        }
    }

    /// Phase the event concerns, for filtering stored logs.
    pub fn phase(&self) -> Option<&str> {
        match self {
            Event::PhaseStarted { phase, .. }
            | Event::PhaseCompleted { phase, .. }
            | Event::StepExecuting { phase, .. }
            | Event::StepCompleted { phase, .. }
            | Event::StepFailed { phase, .. } => Some(phase),
            _ => None,
        }
    }
}

/// Observability sink handed to every component of a tick.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: Event);
}

/// Forwards events to the `log` facade.
#[derive(Clone, Default)]
pub struct DefaultBus;

impl EventBus for DefaultBus {
    fn publish(&self, event: Event) {
        log::log!(target: "planexec", event.level(), "{:?}", event);
    }
}

/// Keeps every event in memory.
#[derive(Clone, Default)]
pub struct RecordingBus {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventBus for RecordingBus {
    fn publish(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Publishes to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutBus {
    sinks: Vec<Arc<dyn EventBus>>,
}

impl FanoutBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventBus>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventBus for FanoutBus {
    fn publish(&self, event: Event) {
        for sink in &self.sinks {
            sink.publish(event.clone());
        }
    }
}
