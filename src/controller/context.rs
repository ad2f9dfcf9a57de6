use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::crd::deployment_config;
use crate::datahub::Datahub;
use crate::error::Result;
use crate::helpers::OperatorSettings;
use crate::nodeinfo::ProviderDefaults;

use super::readiness::ReadinessGate;

// ── Shared context passed to every reconcile call ─────────────────────────────

pub struct Context {
    pub client: Client,
    pub datahub: Datahub,
    pub settings: OperatorSettings,
    pub provider_defaults: ProviderDefaults,
    pub reporter: Reporter,
    pub scaler_gate: ReadinessGate,
    pub recommendation_gate: ReadinessGate,
    pub namespace_gate: ReadinessGate,
    deployment_configs: OnceCell<bool>,
}

impl Context {
    pub fn new(
        client: Client,
        datahub: Datahub,
        settings: OperatorSettings,
        provider_defaults: ProviderDefaults,
        reporter: Reporter,
    ) -> Self {
        let delay = settings.cold_start_delay;
        Self {
            client,
            datahub,
            settings,
            provider_defaults,
            reporter,
            scaler_gate: ReadinessGate::new(delay),
            recommendation_gate: ReadinessGate::new(delay),
            namespace_gate: ReadinessGate::new(delay),
            deployment_configs: OnceCell::new(),
        }
    }

    pub fn cluster_name(&self) -> &str {
        self.datahub.pods.cluster_name()
    }

    /// Whether the API server serves `apps.openshift.io/v1`. Probed once.
    pub async fn deployment_configs_supported(&self) -> Result<bool> {
        self.deployment_configs
            .get_or_try_init(|| async {
                match self
                    .client
                    .list_api_group_resources(deployment_config::API_VERSION)
                    .await
                {
                    Ok(_) => {
                        info!("DeploymentConfig API available");
                        Ok(true)
                    }
                    Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .copied()
    }

    /// A namespace is excluded when it is statically excluded and no
    /// application record lives in it.
    pub async fn is_namespace_excluded(&self, namespace: &str) -> Result<bool> {
        if !self.settings.is_namespace_excluded(namespace) {
            return Ok(false);
        }
        let apps = self
            .datahub
            .applications
            .list_applications_in_namespace(namespace)
            .await?;
        Ok(apps.is_empty())
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Build an ObjectReference from any kube Resource.
pub fn kube_object_ref<K: Resource<DynamicType = ()>>(obj: &K) -> ObjectReference {
    ObjectReference {
        api_version: Some(K::api_version(&()).to_string()),
        kind: Some(K::kind(&()).to_string()),
        name: Some(obj.name_any()),
        namespace: obj.namespace(),
        uid: obj.meta().uid.clone(),
        resource_version: obj.meta().resource_version.clone(),
        ..Default::default()
    }
}

/// Publish a Kubernetes event attached to the given resource.
/// Errors are logged but never block reconciliation.
pub async fn publish_event<K: Resource<DynamicType = ()>>(
    ctx: &Context,
    obj: &K,
    type_: EventType,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let rec = Recorder::new(ctx.client.clone(), ctx.reporter.clone());
    let oref = kube_object_ref(obj);
    if let Err(e) = rec
        .publish(
            &KubeEvent {
                type_,
                reason: reason.to_string(),
                note,
                action: action.to_string(),
                secondary: None,
            },
            &oref,
        )
        .await
    {
        warn!(%e, "failed to publish event");
    }
}
