//! The cluster API as seen by the reconciliation core.
//!
//! [`ClusterClient`] is the only way the engine touches the cluster. Two
//! implementations ship with the crate: [`http::HttpClusterClient`] talks to a
//! Kubernetes-style REST API, [`memory::MemoryCluster`] keeps objects in
//! process for simulation mode and tests.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::ClusterError;
use crate::object::{ClusterObject, ObjectKey};

/// How an existing object is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStrategy {
    /// Three-way merge using per-field merge keys; built-in kinds only.
    StrategicMerge,
    /// RFC 7386 JSON merge patch; works for every kind.
    Merge,
}

impl PatchStrategy {
    pub fn content_type(self) -> &'static str {
        match self {
            PatchStrategy::StrategicMerge => "application/strategic-merge-patch+json",
            PatchStrategy::Merge => "application/merge-patch+json",
        }
    }

    /// The strategy to retry with after `err`, if any.
    ///
    /// Only an unsupported-media-type rejection of a strategic merge patch
    /// downgrades; everything else is final.
    pub fn fallback(self, err: &ClusterError) -> Option<PatchStrategy> {
        match self {
            PatchStrategy::StrategicMerge if err.is_unsupported_media_type() => Some(PatchStrategy::Merge),
            _ => None,
        }
    }
}

impl std::fmt::Display for PatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchStrategy::StrategicMerge => write!(f, "strategic-merge"),
            PatchStrategy::Merge => write!(f, "merge"),
        }
    }
}

/// Cascade mode sent with a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletePropagation {
    /// Dependents are removed before the owner disappears.
    #[default]
    Foreground,
}

impl DeletePropagation {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletePropagation::Foreground => "Foreground",
        }
    }
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch the stored object; `ClusterError::NotFound` when absent.
    async fn get(&self, key: &ObjectKey) -> Result<ClusterObject, ClusterError>;

    /// Create `object`, returning it as stored by the server.
    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, ClusterError>;

    /// Patch `existing` with a serialized payload, returning the result as stored.
    async fn patch(
        &self,
        existing: &ClusterObject,
        payload: &[u8],
        strategy: PatchStrategy,
    ) -> Result<ClusterObject, ClusterError>;

    async fn delete(
        &self,
        object: &ClusterObject,
        propagation: DeletePropagation,
    ) -> Result<(), ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unsupported_media_type_downgrades() {
        let unsupported = ClusterError::UnsupportedMediaType("crd".into());
        let invalid = ClusterError::Api { status: 422, message: "invalid".into() };

        assert_eq!(
            PatchStrategy::StrategicMerge.fallback(&unsupported),
            Some(PatchStrategy::Merge)
        );
        assert_eq!(PatchStrategy::StrategicMerge.fallback(&invalid), None);
        assert_eq!(PatchStrategy::Merge.fallback(&unsupported), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            PatchStrategy::StrategicMerge.content_type(),
            "application/strategic-merge-patch+json"
        );
        assert_eq!(PatchStrategy::Merge.content_type(), "application/merge-patch+json");
        assert_eq!(DeletePropagation::default().as_str(), "Foreground");
    }
}
