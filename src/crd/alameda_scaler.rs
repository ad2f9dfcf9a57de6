use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::shared::{namespaced_key, AlamedaContainer};

// ── Spec sub-types ────────────────────────────────────────────────────────────

/// AlamedaPolicy selects how aggressive recommendations are.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlamedaPolicy {
    #[default]
    Stable,
    Compact,
}

/// ScalingToolType names the autoscaler that executes recommendations.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScalingToolType {
    Vpa,
    #[default]
    Hpa,
    None,
}

/// ExecutionStrategy bounds how many pods a VPA execution may disrupt.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<String>,
}

/// ScalingToolSpec configures the scaling tool and its execution strategy.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingToolSpec {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<ScalingToolType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_strategy: Option<ExecutionStrategy>,
}

pub const DEFAULT_MAX_UNAVAILABLE: &str = "25%";

// ── CRD ───────────────────────────────────────────────────────────────────────

/// AlamedaScaler declares "autoscale the workloads matched by this selector".
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "autoscaling.containers.ai",
    version = "v1alpha1",
    kind = "AlamedaScaler",
    shortname = "alamedascaler",
    namespaced,
    status = "AlamedaScalerStatus",
    printcolumn = r#"{"name": "Policy", "type": "string", "jsonPath": ".spec.policy"}"#,
    printcolumn = r#"{"name": "ScalingTool", "type": "string", "jsonPath": ".spec.scalingTool.type"}"#,
    printcolumn = r#"{"name": "Execution", "type": "boolean", "jsonPath": ".spec.enableExecution"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AlamedaScalerSpec {
    #[serde(default)]
    pub selector: LabelSelector,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<AlamedaPolicy>,

    #[serde(default)]
    pub enable_execution: bool,

    /// Bumped by the workload reconcilers to force a fresh scaler reconcile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_resource_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_tool: Option<ScalingToolSpec>,
}

// ── Status ────────────────────────────────────────────────────────────────────

/// AlamedaPod is one monitored pod as recorded in scaler status.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AlamedaPod {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub containers: Vec<AlamedaContainer>,
}

/// AlamedaResource is one matched workload controller and its monitored pods.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlamedaResource {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub spec_replicas: i32,
    #[serde(default)]
    pub pods: BTreeMap<String, AlamedaPod>,
}

/// AlamedaController groups matched controllers by kind, keyed `namespace/name`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlamedaController {
    #[serde(default)]
    pub deployments: BTreeMap<String, AlamedaResource>,
    #[serde(default)]
    pub deployment_configs: BTreeMap<String, AlamedaResource>,
    #[serde(default)]
    pub stateful_sets: BTreeMap<String, AlamedaResource>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlamedaScalerStatus {
    #[serde(default)]
    pub alameda_controller: AlamedaController,
}

/// The workload kinds a scaler can select.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControllerKind {
    Deployment,
    DeploymentConfig,
    StatefulSet,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 3] = [
        ControllerKind::Deployment,
        ControllerKind::DeploymentConfig,
        ControllerKind::StatefulSet,
    ];

    /// Plural resource name, as used in resource links.
    pub fn plural(self) -> &'static str {
        match self {
            ControllerKind::Deployment => "deployments",
            ControllerKind::DeploymentConfig => "deploymentconfigs",
            ControllerKind::StatefulSet => "statefulsets",
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerKind::Deployment => "Deployment",
            ControllerKind::DeploymentConfig => "DeploymentConfig",
            ControllerKind::StatefulSet => "StatefulSet",
        };
        f.write_str(s)
    }
}

impl AlamedaController {
    pub fn of(&self, kind: ControllerKind) -> &BTreeMap<String, AlamedaResource> {
        match kind {
            ControllerKind::Deployment => &self.deployments,
            ControllerKind::DeploymentConfig => &self.deployment_configs,
            ControllerKind::StatefulSet => &self.stateful_sets,
        }
    }

    pub fn of_mut(&mut self, kind: ControllerKind) -> &mut BTreeMap<String, AlamedaResource> {
        match kind {
            ControllerKind::Deployment => &mut self.deployments,
            ControllerKind::DeploymentConfig => &mut self.deployment_configs,
            ControllerKind::StatefulSet => &mut self.stateful_sets,
        }
    }

    /// Every (kind, controller) pair.
    pub fn resources(&self) -> impl Iterator<Item = (ControllerKind, &AlamedaResource)> {
        ControllerKind::ALL
            .into_iter()
            .flat_map(move |kind| self.of(kind).values().map(move |r| (kind, r)))
    }

    /// Every monitored pod with the kind and controller that owns it.
    pub fn pods(&self) -> impl Iterator<Item = (ControllerKind, &AlamedaResource, &AlamedaPod)> {
        self.resources()
            .flat_map(|(kind, r)| r.pods.values().map(move |p| (kind, r, p)))
    }

    pub fn has_pod(&self, namespace: &str, name: &str) -> bool {
        let key = namespaced_key(namespace, name);
        self.resources().any(|(_, r)| r.pods.contains_key(&key))
    }
}

impl AlamedaScaler {
    pub fn policy(&self) -> AlamedaPolicy {
        self.spec.policy.unwrap_or_default()
    }

    /// The configured scaling tool, `hpa` when unset.
    pub fn scaling_tool(&self) -> ScalingToolType {
        self.spec
            .scaling_tool
            .as_ref()
            .and_then(|t| t.tool_type)
            .unwrap_or_default()
    }

    pub fn alameda_controller(&self) -> Option<&AlamedaController> {
        self.status.as_ref().map(|s| &s.alameda_controller)
    }

    /// True when the last written status lists the pod as monitored.
    pub fn has_alameda_pod(&self, namespace: &str, name: &str) -> bool {
        self.alameda_controller()
            .is_some_and(|c| c.has_pod(namespace, name))
    }

    /// True when the last written status lists the controller.
    pub fn claims(&self, kind: ControllerKind, namespace: &str, name: &str) -> bool {
        self.alameda_controller()
            .is_some_and(|c| c.of(kind).contains_key(&namespaced_key(namespace, name)))
    }
}
