use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    Container as KubeContainer, ContainerStatus as KubeContainerStatus, Pod as KubePod,
    ResourceRequirements as KubeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;

use super::controller::{kind, policy, scaler_meta, scaling_tool};
use super::proto::{
    AlamedaPodSpec, Container, ContainerStatus, CreatePodsRequest, DeletePodsRequest,
    ListPodsRequest, ObjectMeta, Pod, PodStatus, ResourceName, ResourceRequirements,
    TopController,
};
use super::{object_meta, status, DatahubService};
use crate::crd::alameda_scaler::AlamedaScaler;
use crate::error::Result;
use crate::helpers::{app_name, app_part_of};
use crate::quantity;
use crate::resource_link::ResourceLink;

/// Replicas recorded when the pod's direct owner could not be read.
pub const UNKNOWN_REPLICAS: i32 = -1;

fn resource_map(list: Option<&BTreeMap<String, Quantity>>) -> Result<BTreeMap<i32, String>> {
    let mut out = BTreeMap::new();
    let Some(list) = list else {
        return Ok(out);
    };
    if let Some(cpu) = list.get("cpu") {
        out.insert(
            ResourceName::Cpu as i32,
            quantity::milli_value(cpu)?.to_string(),
        );
    }
    if let Some(mem) = list.get("memory") {
        out.insert(
            ResourceName::Memory as i32,
            quantity::value(mem)?.to_string(),
        );
    }
    Ok(out)
}

fn resources(r: Option<&KubeResourceRequirements>) -> Result<ResourceRequirements> {
    Ok(ResourceRequirements {
        limits: resource_map(r.and_then(|r| r.limits.as_ref()))?,
        requests: resource_map(r.and_then(|r| r.requests.as_ref()))?,
    })
}

fn container_status(status: &KubeContainerStatus) -> ContainerStatus {
    let mut out = ContainerStatus {
        restart_count: status.restart_count,
        ..Default::default()
    };
    if let Some(state) = &status.state {
        if state.running.is_some() {
            out.state = "Running".to_string();
        } else if let Some(waiting) = &state.waiting {
            out.state = "Waiting".to_string();
            out.reason = waiting.reason.clone().unwrap_or_default();
            out.message = waiting.message.clone().unwrap_or_default();
        } else if let Some(terminated) = &state.terminated {
            out.state = "Terminated".to_string();
            out.reason = terminated.reason.clone().unwrap_or_default();
            out.message = terminated.message.clone().unwrap_or_default();
        }
    }
    out
}

fn container(c: &KubeContainer, statuses: &[KubeContainerStatus]) -> Result<Container> {
    Ok(Container {
        name: c.name.clone(),
        resources: Some(resources(c.resources.as_ref())?),
        status: statuses
            .iter()
            .find(|s| s.name == c.name)
            .map(container_status),
    })
}

impl Pod {
    /// Record for a live pod monitored by `scaler`.
    ///
    /// `owner_replicas` is the replica count of the pod's direct owner, or
    /// [`UNKNOWN_REPLICAS`].
    pub fn from_live_pod(
        cluster_name: &str,
        scaler: &AlamedaScaler,
        pod: &KubePod,
        link: &ResourceLink,
        owner_replicas: i32,
    ) -> Result<Self> {
        let namespace = pod.namespace().unwrap_or_default();
        let spec = pod.spec.as_ref();
        let status = pod.status.as_ref();
        let statuses = status
            .and_then(|s| s.container_statuses.clone())
            .unwrap_or_default();

        let containers = spec
            .map(|s| s.containers.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|c| container(c, &statuses))
            .collect::<Result<Vec<_>>>()?;

        let top_controller = link.top_controller().map(|(k, name)| TopController {
            object_meta: Some(object_meta(cluster_name, &namespace, name)),
            kind: kind(k) as i32,
            replicas: owner_replicas,
        });

        let app_name = app_name(scaler);
        Ok(Pod {
            object_meta: Some(ObjectMeta {
                node_name: spec.and_then(|s| s.node_name.clone()).unwrap_or_default(),
                uid: pod.uid().unwrap_or_default(),
                ..object_meta(cluster_name, &namespace, &pod.name_any())
            }),
            start_time: pod.creation_timestamp().map(|t| prost_types::Timestamp {
                seconds: t.0.timestamp(),
                nanos: 0,
            }),
            resource_link: link.to_string(),
            containers,
            alameda_pod_spec: Some(AlamedaPodSpec {
                alameda_scaler: Some(scaler_meta(cluster_name, scaler)),
                policy: policy(scaler.policy()) as i32,
                scaling_tool: scaling_tool(scaler.scaling_tool()) as i32,
            }),
            status: status.map(|s| PodStatus {
                phase: s.phase.clone().unwrap_or_default(),
                message: s.message.clone().unwrap_or_default(),
                reason: s.reason.clone().unwrap_or_default(),
            }),
            top_controller,
            app_part_of: app_part_of(scaler),
            app_name,
        })
    }
}

#[derive(Clone)]
pub struct PodRepository {
    service: Arc<dyn DatahubService>,
    cluster_name: String,
}

impl PodRepository {
    pub fn new(service: Arc<dyn DatahubService>, cluster_name: String) -> Self {
        Self {
            service,
            cluster_name,
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub async fn create_pods(&self, pods: Vec<Pod>) -> Result<()> {
        if pods.is_empty() {
            return Ok(());
        }
        let resp = self.service.create_pods(CreatePodsRequest { pods }).await?;
        status::check(&resp)
    }

    /// Pods whose records name this scaler as their monitor.
    pub async fn list_pods_by_scaler(
        &self,
        scaler_namespace: &str,
        scaler_name: &str,
    ) -> Result<Vec<Pod>> {
        let scaler = object_meta(&self.cluster_name, scaler_namespace, scaler_name);
        let resp = self
            .service
            .list_pods(ListPodsRequest {
                object_meta: vec![object_meta(&self.cluster_name, "", "")],
                alameda_scaler: Some(scaler),
            })
            .await?;
        status::check_envelope(resp.status.as_ref())?;
        Ok(resp
            .pods
            .into_iter()
            .filter(|p| {
                p.alameda_pod_spec
                    .as_ref()
                    .and_then(|s| s.alameda_scaler.as_ref())
                    .is_some_and(|m| m.namespace == scaler_namespace && m.name == scaler_name)
            })
            .collect())
    }

    pub async fn delete_pods(&self, object_meta: Vec<ObjectMeta>) -> Result<()> {
        if object_meta.is_empty() {
            return Ok(());
        }
        let resp = self
            .service
            .delete_pods(DeletePodsRequest { object_meta })
            .await?;
        status::check(&resp)
    }
}
