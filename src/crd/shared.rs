use k8s_openapi::api::core::v1::ResourceRequirements;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// AlamedaContainer is a container name plus its resource requirements.
///
/// Shared by scaler status (the observed pod snapshot) and
/// AlamedaRecommendation spec (the recommended values).
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AlamedaContainer {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl AlamedaContainer {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: ResourceRequirements::default(),
        }
    }
}

/// Key used by every status map: `namespace/name`.
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
