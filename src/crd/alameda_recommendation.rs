use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::shared::AlamedaContainer;

/// Label carried by every recommendation, valued `<scaler>.<namespace>`.
pub const SCALER_LABEL: &str = "alamedascaler";

/// AlamedaRecommendation holds the recommended resources for one pod.
///
/// Named after the pod it describes and owned by the scaler monitoring that
/// pod; the containers are refreshed from Datahub.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "autoscaling.containers.ai",
    version = "v1alpha1",
    kind = "AlamedaRecommendation",
    shortname = "alamedarecommendation",
    namespaced,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
pub struct AlamedaRecommendationSpec {
    #[serde(default)]
    pub containers: Vec<AlamedaContainer>,
}

/// Value of [`SCALER_LABEL`] for the given scaler.
pub fn scaler_label_value(scaler_name: &str, scaler_namespace: &str) -> String {
    format!("{scaler_name}.{scaler_namespace}")
}
