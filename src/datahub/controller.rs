use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;

use super::proto::{
    AlamedaControllerSpec, Controller, CreateControllersRequest, DeleteControllersRequest, Kind,
    ListControllersRequest, ObjectMeta, RecommendationPolicy, ScalingTool,
};
use super::{object_meta, status, DatahubService};
use crate::crd::alameda_scaler::{
    AlamedaPolicy, AlamedaResource, AlamedaScaler, ControllerKind, ScalingToolType,
};
use crate::error::Result;

// ── Enum mapping ──────────────────────────────────────────────────────────────

pub fn kind(kind: ControllerKind) -> Kind {
    match kind {
        ControllerKind::Deployment => Kind::Deployment,
        ControllerKind::DeploymentConfig => Kind::Deploymentconfig,
        ControllerKind::StatefulSet => Kind::Statefulset,
    }
}

pub fn controller_kind(kind: Kind) -> Option<ControllerKind> {
    match kind {
        Kind::Deployment => Some(ControllerKind::Deployment),
        Kind::Deploymentconfig => Some(ControllerKind::DeploymentConfig),
        Kind::Statefulset => Some(ControllerKind::StatefulSet),
        Kind::Undefined | Kind::Pod => None,
    }
}

pub fn policy(policy: AlamedaPolicy) -> RecommendationPolicy {
    match policy {
        AlamedaPolicy::Stable => RecommendationPolicy::Stable,
        AlamedaPolicy::Compact => RecommendationPolicy::Compact,
    }
}

pub fn scaling_tool(tool: ScalingToolType) -> ScalingTool {
    match tool {
        ScalingToolType::Vpa => ScalingTool::Vpa,
        ScalingToolType::Hpa => ScalingTool::Hpa,
        ScalingToolType::None => ScalingTool::None,
    }
}

/// Scaler identity as recorded on controller and pod records.
pub fn scaler_meta(cluster_name: &str, scaler: &AlamedaScaler) -> ObjectMeta {
    object_meta(
        cluster_name,
        &scaler.namespace().unwrap_or_default(),
        &scaler.name_any(),
    )
}

impl Controller {
    /// Record for a controller the scaler has just written into its status.
    pub fn from_status(
        cluster_name: &str,
        scaler: &AlamedaScaler,
        controller_kind: ControllerKind,
        resource: &AlamedaResource,
    ) -> Self {
        Controller {
            object_meta: Some(ObjectMeta {
                uid: resource.uid.clone(),
                ..object_meta(cluster_name, &resource.namespace, &resource.name)
            }),
            kind: kind(controller_kind) as i32,
            replicas: resource.pods.len() as i32,
            spec_replicas: resource.spec_replicas,
            alameda_controller_spec: Some(AlamedaControllerSpec {
                alameda_scaler: Some(scaler_meta(cluster_name, scaler)),
                policy: policy(scaler.policy()) as i32,
                enable_recommendation_execution: scaler.spec.enable_execution,
                scaling_tool: scaling_tool(scaler.scaling_tool()) as i32,
            }),
        }
    }

    /// True when the record is linked to the scaler `namespace/name`.
    pub fn is_linked_to(&self, namespace: &str, name: &str) -> bool {
        self.alameda_controller_spec
            .as_ref()
            .and_then(|s| s.alameda_scaler.as_ref())
            .is_some_and(|m| m.namespace == namespace && m.name == name)
    }
}

#[derive(Clone)]
pub struct ControllerRepository {
    service: Arc<dyn DatahubService>,
    cluster_name: String,
}

impl ControllerRepository {
    pub fn new(service: Arc<dyn DatahubService>, cluster_name: String) -> Self {
        Self {
            service,
            cluster_name,
        }
    }

    pub async fn create_controllers(&self, controllers: Vec<Controller>) -> Result<()> {
        if controllers.is_empty() {
            return Ok(());
        }
        let resp = self
            .service
            .create_controllers(CreateControllersRequest { controllers })
            .await?;
        status::check(&resp)
    }

    /// Every controller record linked to the scaler, across all kinds.
    pub async fn list_controllers_by_scaler(
        &self,
        scaler_namespace: &str,
        scaler_name: &str,
    ) -> Result<Vec<Controller>> {
        let resp = self
            .service
            .list_controllers(ListControllersRequest {
                object_meta: vec![object_meta(&self.cluster_name, scaler_namespace, "")],
                kind: Kind::Undefined as i32,
            })
            .await?;
        status::check_envelope(resp.status.as_ref())?;
        Ok(resp
            .controllers
            .into_iter()
            .filter(|c| c.is_linked_to(scaler_namespace, scaler_name))
            .collect())
    }

    /// One delete call per kind.
    pub async fn delete_controllers(
        &self,
        by_kind: BTreeMap<ControllerKind, Vec<ObjectMeta>>,
    ) -> Result<()> {
        for (controller_kind, object_meta) in by_kind {
            if object_meta.is_empty() {
                continue;
            }
            let resp = self
                .service
                .delete_controllers(DeleteControllersRequest {
                    object_meta,
                    kind: kind(controller_kind) as i32,
                })
                .await?;
            status::check(&resp)?;
        }
        Ok(())
    }

    pub async fn delete_controller(
        &self,
        controller_kind: ControllerKind,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let by_kind = BTreeMap::from([(
            controller_kind,
            vec![object_meta(&self.cluster_name, namespace, name)],
        )]);
        self.delete_controllers(by_kind).await
    }

    /// Group records by kind, for [`Self::delete_controllers`].
    pub fn group_by_kind(controllers: &[Controller]) -> BTreeMap<ControllerKind, Vec<ObjectMeta>> {
        let mut by_kind: BTreeMap<ControllerKind, Vec<ObjectMeta>> = BTreeMap::new();
        for c in controllers {
            let Some(k) = controller_kind(c.kind()) else {
                continue;
            };
            if let Some(meta) = &c.object_meta {
                by_kind.entry(k).or_default().push(meta.clone());
            }
        }
        by_kind
    }
}
