use serde::{Deserialize, Serialize};

use crate::log::Event;
use crate::model::ExecutionState;

/// A plan, phase or step changed state.
///
/// `phase` and `step` are absent for plan-level transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMessage {
    pub namespace: String,
    pub instance: String,
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub state: ExecutionState,
    /// RFC 3339
    pub updated: String,
}

impl StateMessage {
    pub fn subject(&self) -> String {
        state_subject(&self.namespace, &self.instance)
    }

    /// The state transition `event` describes, if any.
    pub fn from_event(namespace: &str, instance: &str, plan: &str, event: &Event) -> Option<Self> {
        let (phase, step, state) = match event {
            Event::PhaseStarted { phase, .. } => (Some(phase), None, ExecutionState::InProgress),
            Event::PhaseCompleted { phase, .. } => (Some(phase), None, ExecutionState::Complete),
            Event::StepExecuting { phase, step, .. } => (Some(phase), Some(step), ExecutionState::InProgress),
            Event::StepCompleted { phase, step } => (Some(phase), Some(step), ExecutionState::Complete),
            Event::StepFailed { phase, step, .. } => (Some(phase), Some(step), ExecutionState::Error),
            Event::RenderFailed { .. } => (None, None, ExecutionState::Error),
            Event::PlanCompleted { .. } => (None, None, ExecutionState::Complete),
            _ => return None,
        };
        Some(Self {
            namespace: namespace.to_string(),
            instance: instance.to_string(),
            plan: plan.to_string(),
            phase: phase.cloned(),
            step: step.cloned(),
            state,
            updated: chrono::Utc::now().to_rfc3339(),
        })
    }
}

pub fn state_subject(namespace: &str, instance: &str) -> String {
    format!("plan.{}.{}.state", namespace, instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failure_message() {
        let event = Event::StepFailed {
            phase: "main".into(),
            step: "app".into(),
            error: "boom".into(),
        };
        let msg = StateMessage::from_event("prod", "web", "deploy", &event).unwrap();

        assert_eq!(msg.subject(), "plan.prod.web.state");
        assert_eq!(msg.state, ExecutionState::Error);
        assert_eq!(msg.step.as_deref(), Some("app"));

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["state"], "ERROR");
        assert_eq!(json["phase"], "main");
    }

    #[test]
    fn test_plan_level_message_has_no_phase() {
        let event = Event::PlanCompleted {
            instance: "web".into(),
            plan: "deploy".into(),
        };
        let json = serde_json::to_value(StateMessage::from_event("prod", "web", "deploy", &event).unwrap()).unwrap();
        assert!(json.get("phase").is_none());
        assert_eq!(json["state"], "COMPLETE");
    }

    #[test]
    fn test_non_transitions_are_ignored() {
        let event = Event::ObjectHealthy { object: "x".into() };
        assert!(StateMessage::from_event("prod", "web", "deploy", &event).is_none());
    }
}
