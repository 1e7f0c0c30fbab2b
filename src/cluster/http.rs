use async_trait::async_trait;
use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::{ClusterClient, DeletePropagation, PatchStrategy};
use crate::error::ClusterError;
use crate::object::{ClusterObject, ObjectKey};

/// Cluster client speaking the Kubernetes REST conventions over HTTP.
pub struct HttpClusterClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClusterClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ClusterError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, key: &ObjectKey) -> Result<Value, ClusterError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            if body.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&body)?);
        }
        let message = response.text().await.unwrap_or_default();
        Err(classify(status, key, message))
    }
}

fn classify(status: StatusCode, key: &ObjectKey, message: String) -> ClusterError {
    match status {
        StatusCode::NOT_FOUND => ClusterError::NotFound(key.to_string()),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ClusterError::UnsupportedMediaType(key.to_string()),
        StatusCode::CONFLICT => ClusterError::Conflict(key.to_string()),
        other => ClusterError::Api {
            status: other.as_u16(),
            message,
        },
    }
}

/// Kinds whose resource name does not follow the suffix rules.
const IRREGULAR_RESOURCES: &[(&str, &str)] = &[
    ("Endpoints", "endpoints"),
    ("PodMetrics", "pods"),
    ("NodeMetrics", "nodes"),
];

/// Lower-cased plural resource name for a kind.
pub fn resource_name(kind: &str) -> String {
    if let Some((_, resource)) = IRREGULAR_RESOURCES.iter().find(|(k, _)| *k == kind) {
        return resource.to_string();
    }
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if let Some(stem) = lower.strip_suffix('y') {
        if stem.ends_with(|c: char| "aeiou".contains(c)) {
            format!("{}s", lower)
        } else {
            format!("{}ies", stem)
        }
    } else {
        format!("{}s", lower)
    }
}

/// URL of the collection holding `key`.
pub fn collection_url(base: &str, key: &ObjectKey) -> String {
    let root = if key.group().is_empty() {
        format!("{}/api/{}", base, key.version())
    } else {
        format!("{}/apis/{}/{}", base, key.group(), key.version())
    };
    match &key.namespace {
        Some(ns) => format!("{}/namespaces/{}/{}", root, ns, resource_name(&key.kind)),
        None => format!("{}/{}", root, resource_name(&key.kind)),
    }
}

pub fn object_url(base: &str, key: &ObjectKey) -> String {
    format!("{}/{}", collection_url(base, key), key.name)
}

fn to_object(value: Value, fallback: &ClusterObject) -> Result<ClusterObject, ClusterError> {
    match value {
        Value::Null => Ok(fallback.clone()),
        value => ClusterObject::from_value(value).map_err(ClusterError::Serialization),
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn get(&self, key: &ObjectKey) -> Result<ClusterObject, ClusterError> {
        let value = self
            .send(self.request(Method::GET, object_url(&self.base_url, key)), key)
            .await?;
        ClusterObject::from_value(value).map_err(ClusterError::Serialization)
    }

    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, ClusterError> {
        let key = object.key();
        let builder = self
            .request(Method::POST, collection_url(&self.base_url, &key))
            .json(&object.to_value());
        let value = self.send(builder, &key).await?;
        to_object(value, object)
    }

    async fn patch(
        &self,
        existing: &ClusterObject,
        payload: &[u8],
        strategy: PatchStrategy,
    ) -> Result<ClusterObject, ClusterError> {
        let key = existing.key();
        let builder = self
            .request(Method::PATCH, object_url(&self.base_url, &key))
            .header(header::CONTENT_TYPE, strategy.content_type())
            .body(payload.to_vec());
        let value = self.send(builder, &key).await?;
        to_object(value, existing)
    }

    async fn delete(
        &self,
        object: &ClusterObject,
        propagation: DeletePropagation,
    ) -> Result<(), ClusterError> {
        let key = object.key();
        let options = json!({
            "apiVersion": "v1",
            "kind": "DeleteOptions",
            "propagationPolicy": propagation.as_str(),
        });
        let builder = self
            .request(Method::DELETE, object_url(&self.base_url, &key))
            .json(&options);
        self.send(builder, &key).await.map(|_| ())
    }
}
