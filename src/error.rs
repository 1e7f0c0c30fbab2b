//! Error types for the reconciliation core.

use thiserror::Error;

use crate::object::ObjectKey;

/// Errors surfaced by a [`crate::cluster::ClusterClient`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("{0} not found")]
    NotFound(String),
    /// The server does not accept the patch content type for this kind.
    #[error("unsupported media type for {0}")]
    UnsupportedMediaType(String),
    #[error("conflict on {0}")]
    Conflict(String),
    #[error("cluster API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    pub fn is_unsupported_media_type(&self) -> bool {
        matches!(self, ClusterError::UnsupportedMediaType(_))
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        ClusterError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}

/// Template expansion failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("missing parameter '{0}'")]
    MissingParam(String),
    #[error("unterminated action starting at byte {0}")]
    Unterminated(usize),
    #[error("malformed action '{0}'")]
    Malformed(String),
}

/// Failures turning rendered text into stamped cluster objects.
#[derive(Error, Debug)]
pub enum ConventionError {
    #[error("template {template} is not valid YAML: {source}")]
    Yaml {
        template: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("template {template} is not a valid object: {reason}")]
    InvalidObject { template: String, reason: String },
}

/// Why an object is not (yet) healthy. Never an engine failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthError {
    #[error("{0}")]
    NotReady(String),
    #[error("{context}: {source}")]
    Lookup {
        context: String,
        #[source]
        source: ClusterError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Create,
    Patch,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Get => write!(f, "get"),
            Operation::Create => write!(f, "create"),
            Operation::Patch => write!(f, "patch"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// A cluster call that failed while applying a step.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} {object} failed: {source}")]
pub struct ApplyError {
    pub operation: Operation,
    pub object: ObjectKey,
    #[source]
    pub source: ClusterError,
}

/// Errors returned by one engine tick.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("task {task} referenced by step {phase}/{step} not found in operator version {operator_version}")]
    MissingTask {
        phase: String,
        step: String,
        task: String,
        operator_version: String,
    },
    #[error("template {template} referenced by step {phase}/{step} not found in operator version {operator_version}")]
    MissingTemplate {
        phase: String,
        step: String,
        template: String,
        operator_version: String,
    },
    #[error("error expanding template {template} for step {phase}/{step}: {source}")]
    Template {
        phase: String,
        step: String,
        template: String,
        #[source]
        source: RenderError,
    },
    #[error("error creating objects for step {phase}/{step}: {source}")]
    Convention {
        phase: String,
        step: String,
        #[source]
        source: ConventionError,
    },
    #[error("phase {phase} not found in plan status")]
    UnknownPhase { phase: String },
    #[error("step {step} not found in status of phase {phase}")]
    UnknownStep { phase: String, step: String },
    #[error("step {phase}/{step}: {source}")]
    Apply {
        phase: String,
        step: String,
        #[source]
        source: ApplyError,
    },
}

impl EngineError {
    /// Fatal errors are logical: retrying the same input cannot fix them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::MissingTask { .. }
                | EngineError::MissingTemplate { .. }
                | EngineError::Template { .. }
                | EngineError::UnknownPhase { .. }
                | EngineError::UnknownStep { .. }
        )
    }

    /// The phase and step a rendering error belongs to, if any.
    pub fn location(&self) -> Option<(&str, &str)> {
        match self {
            EngineError::MissingTask { phase, step, .. }
            | EngineError::MissingTemplate { phase, step, .. }
            | EngineError::Template { phase, step, .. }
            | EngineError::Convention { phase, step, .. }
            | EngineError::Apply { phase, step, .. } => Some((phase, step)),
            EngineError::UnknownPhase { .. } | EngineError::UnknownStep { .. } => None,
        }
    }
}

/// Failures loading an operator directory.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("{0} has no operator.yaml")]
    MissingManifest(String),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Requests the controller refuses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error("operator version {0} is not loaded")]
    UnknownOperatorVersion(String),
    #[error("plan {plan} not found in operator version {operator_version}")]
    UnknownPlan { plan: String, operator_version: String },
    #[error("instance {0} is not registered")]
    UnknownInstance(String),
    #[error("invalid instance: {0}")]
    InvalidInstance(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_error_classification() {
        assert!(ClusterError::NotFound("x".into()).is_not_found());
        assert!(!ClusterError::Conflict("x".into()).is_not_found());
        assert!(ClusterError::UnsupportedMediaType("x".into()).is_unsupported_media_type());
        assert!(!ClusterError::Api { status: 422, message: "bad".into() }.is_unsupported_media_type());
    }

    #[test]
    fn test_fatal_classification() {
        let missing = EngineError::MissingTemplate {
            phase: "deploy".into(),
            step: "app".into(),
            template: "svc.yaml".into(),
            operator_version: "demo-0.1.0".into(),
        };
        assert!(missing.is_fatal());
        assert_eq!(missing.location(), Some(("deploy", "app")));
        assert!(missing.to_string().contains("svc.yaml"));

        let apply = EngineError::Apply {
            phase: "deploy".into(),
            step: "app".into(),
            source: ApplyError {
                operation: Operation::Create,
                object: ObjectKey::new("v1", "Service", Some("ns"), "svc"),
                source: ClusterError::Conflict("svc".into()),
            },
        };
        assert!(!apply.is_fatal());

        let unknown = EngineError::UnknownPhase { phase: "ghost".into() };
        assert!(unknown.is_fatal());
        assert_eq!(unknown.location(), None);
    }
}
