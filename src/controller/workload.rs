//! Workload controllers: Deployment, DeploymentConfig and StatefulSet.
//!
//! One reconciler serves all three kinds through the [`Workload`] trait. On
//! every change it wakes the scaler that monitors the workload now and the
//! scaler that monitored it before (tracked by the last-monitor annotation),
//! so both rebuild their status. Deletions arrive through a separate watch.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Client, Resource,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::crd::alameda_scaler::{AlamedaPod, AlamedaResource, AlamedaScaler, ControllerKind};
use crate::crd::deployment_config::DeploymentConfig;
use crate::crd::shared::{namespaced_key, AlamedaContainer};
use crate::error::{not_found_as_none, Error, Result};
use crate::helpers::trim_generated_suffix;

use super::context::Context;
use super::deletions::run_deletion_watch;
use super::helpers::{
    controlling_owner, is_monitored, label_selector_matches, labels_to_query, selector_to_query,
    FIELD_MANAGER, LAST_MONITOR_ANNOTATION,
};

const ERROR_REQUEUE: Duration = Duration::from_secs(1);

/// What the shared reconciler needs to know about a workload kind.
pub trait Workload:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    const KIND: ControllerKind;

    fn spec_replicas(&self) -> i32;

    /// Label query narrowing the pod list, `None` to list the namespace.
    fn pod_selector(&self) -> Option<String>;

    /// Whether this workload directly or through its replica owner
    /// controls the pod.
    fn owns_pod(&self, pod: &Pod) -> bool;

    fn last_monitor(&self) -> Option<&str> {
        self.annotations()
            .get(LAST_MONITOR_ANNOTATION)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// True when the pod's controlling owner has `owner_kind` and a name that,
/// stripped of its generated suffix, is the workload's name.
fn owned_through(pod: &Pod, owner_kind: &str, workload_name: &str) -> bool {
    controlling_owner(pod)
        .is_some_and(|o| o.kind == owner_kind && trim_generated_suffix(&o.name) == workload_name)
}

impl Workload for Deployment {
    const KIND: ControllerKind = ControllerKind::Deployment;

    fn spec_replicas(&self) -> i32 {
        self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
    }

    fn pod_selector(&self) -> Option<String> {
        self.spec.as_ref().and_then(|s| selector_to_query(&s.selector))
    }

    fn owns_pod(&self, pod: &Pod) -> bool {
        owned_through(pod, "ReplicaSet", &self.name_any())
    }
}

impl Workload for DeploymentConfig {
    const KIND: ControllerKind = ControllerKind::DeploymentConfig;

    fn spec_replicas(&self) -> i32 {
        self.spec.replicas
    }

    fn pod_selector(&self) -> Option<String> {
        self.spec.selector.as_ref().and_then(labels_to_query)
    }

    fn owns_pod(&self, pod: &Pod) -> bool {
        owned_through(pod, "ReplicationController", &self.name_any())
    }
}

impl Workload for StatefulSet {
    const KIND: ControllerKind = ControllerKind::StatefulSet;

    fn spec_replicas(&self) -> i32 {
        self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
    }

    fn pod_selector(&self) -> Option<String> {
        self.spec.as_ref().and_then(|s| selector_to_query(&s.selector))
    }

    fn owns_pod(&self, pod: &Pod) -> bool {
        controlling_owner(pod).is_some_and(|o| o.kind == "StatefulSet" && o.name == self.name_any())
    }
}

// ── Discovery (used by the scaler reconciler) ─────────────────────────────────

/// Pods the workload controls, in any phase.
pub async fn list_pods<W: Workload>(client: &Client, workload: &W) -> Result<Vec<Pod>> {
    let ns = workload.namespace().unwrap_or_default();
    let pods: Api<Pod> = Api::namespaced(client.clone(), &ns);
    let lp = match workload.pod_selector() {
        Some(q) => ListParams::default().labels(&q),
        None => ListParams::default(),
    };
    Ok(pods
        .list(&lp)
        .await?
        .items
        .into_iter()
        .filter(|p| workload.owns_pod(p))
        .collect())
}

fn alameda_pod(pod: &Pod) -> AlamedaPod {
    AlamedaPod {
        namespace: pod.namespace().unwrap_or_default(),
        name: pod.name_any(),
        uid: pod.uid().unwrap_or_default(),
        containers: pod
            .spec
            .iter()
            .flat_map(|s| s.containers.iter())
            .map(|c| AlamedaContainer {
                name: c.name.clone(),
                resources: c.resources.clone().unwrap_or_default(),
            })
            .collect(),
    }
}

/// A matched workload: its status entry plus the live monitored pods.
#[derive(Clone, Debug)]
pub struct Discovered {
    pub resource: AlamedaResource,
    pub pods: Vec<Pod>,
}

/// Workloads of kind `W` in `namespace` matching `selector`, each with its
/// monitored pods.
pub async fn discover<W: Workload>(
    client: &Client,
    namespace: &str,
    selector: &str,
) -> Result<Vec<Discovered>> {
    let api: Api<W> = Api::namespaced(client.clone(), namespace);
    let workloads = api.list(&ListParams::default().labels(selector)).await?;

    let mut out = Vec::with_capacity(workloads.items.len());
    for w in workloads.items {
        let pods: Vec<Pod> = list_pods(client, &w)
            .await?
            .into_iter()
            .filter(is_monitored)
            .collect();
        let resource = AlamedaResource {
            namespace: namespace.to_string(),
            name: w.name_any(),
            uid: w.uid().unwrap_or_default(),
            spec_replicas: w.spec_replicas(),
            pods: pods
                .iter()
                .map(|p| {
                    let ap = alameda_pod(p);
                    (namespaced_key(&ap.namespace, &ap.name), ap)
                })
                .collect::<BTreeMap<_, _>>(),
        };
        debug!(kind = %W::KIND, name = %resource.name, pods = resource.pods.len(), "discovered workload");
        out.push(Discovered { resource, pods });
    }
    Ok(out)
}

// ── Scaler wake-up ────────────────────────────────────────────────────────────

fn next_version(current: Option<&str>) -> String {
    current
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(1, |v| v.wrapping_add(1))
        .to_string()
}

/// Bump the scaler's `customResourceVersion` so it reconciles again.
/// Returns false when the scaler no longer exists.
pub async fn wake_scaler(api: &Api<AlamedaScaler>, name: &str) -> Result<bool> {
    let Some(scaler) = not_found_as_none(api.get(name).await)? else {
        return Ok(false);
    };
    let version = next_version(scaler.spec.custom_resource_version.as_deref());
    let patch = json!({ "spec": { "customResourceVersion": version } });
    let res = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await;
    Ok(not_found_as_none(res)?.is_some())
}

/// The scaler whose selector matches the workload's labels. A scaler whose
/// status still lists the workload but no longer selects it is not current;
/// it is reached through the last-monitor annotation instead.
fn current_scaler<'a, W: Workload>(
    workload: &W,
    scalers: &'a [AlamedaScaler],
) -> Option<&'a AlamedaScaler> {
    scalers
        .iter()
        .find(|s| label_selector_matches(&s.spec.selector, workload.labels()))
}

// ── Controller entry point ────────────────────────────────────────────────────

/// Start the controller and deletion watch for one workload kind. Returns a
/// future that runs forever.
pub async fn run<W: Workload>(ctx: Arc<Context>) {
    let workloads: Api<W> = Api::all(ctx.client.clone());

    let deletions = {
        let ctx = ctx.clone();
        run_deletion_watch(workloads.clone(), ERROR_REQUEUE, move |w: W| {
            let ctx = ctx.clone();
            async move { handle_deleted(&w, &ctx).await }
        })
    };

    let controller = Controller::new(workloads, WatcherConfig::default())
        .run(reconcile::<W>, error_policy::<W>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((_obj, _action)) => {}
                Err(e) => {
                    let msg = format!("{e:?}");
                    if msg.contains("ObjectNotFound") {
                        debug!("reconcile: object already deleted");
                    } else {
                        warn!("reconcile failed: {msg}");
                    }
                }
            }
        });

    tokio::join!(controller, deletions);
}

// ── Reconcile ─────────────────────────────────────────────────────────────────

async fn reconcile<W: Workload>(workload: Arc<W>, ctx: Arc<Context>) -> Result<Action> {
    let ns = workload.namespace().unwrap_or_default();
    let name = workload.name_any();
    if workload.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let scaler_api: Api<AlamedaScaler> = Api::namespaced(ctx.client.clone(), &ns);
    let scalers = scaler_api.list(&ListParams::default()).await?.items;

    let current = current_scaler(workload.as_ref(), &scalers).map(|s| s.name_any());
    if let Some(current) = &current {
        debug!(kind = %W::KIND, %name, %ns, scaler = %current, "waking monitoring scaler");
        wake_scaler(&scaler_api, current).await?;
    }

    let previous = workload.last_monitor();
    if let Some(previous) = previous.filter(|p| current.as_deref() != Some(*p)) {
        if wake_scaler(&scaler_api, previous).await? {
            info!(kind = %W::KIND, %name, %ns, scaler = %previous, "woke previous scaler");
        } else {
            debug!(kind = %W::KIND, %name, scaler = %previous, "previous scaler is gone");
        }
    }

    if previous != current.as_deref() {
        let patch = json!({
            "metadata": { "annotations": { LAST_MONITOR_ANNOTATION: current } }
        });
        Api::<W>::namespaced(ctx.client.clone(), &ns)
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
    }

    Ok(Action::await_change())
}

fn error_policy<W: Workload>(workload: Arc<W>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = workload.name_any();
    warn!(kind = %W::KIND, %name, %error, "reconcile error, requeuing in 1s");
    Action::requeue(ERROR_REQUEUE)
}

/// Wake the scaler that still lists the deleted workload, then drop its
/// Datahub record.
async fn handle_deleted<W: Workload>(workload: &W, ctx: &Context) -> Result<()> {
    let ns = workload.namespace().unwrap_or_default();
    let name = workload.name_any();
    info!(kind = %W::KIND, %name, %ns, "workload deleted");

    let scaler_api: Api<AlamedaScaler> = Api::namespaced(ctx.client.clone(), &ns);
    let scalers = scaler_api.list(&ListParams::default()).await?.items;
    if let Some(scaler) = scalers.iter().find(|s| s.claims(W::KIND, &ns, &name)) {
        wake_scaler(&scaler_api, &scaler.name_any()).await?;
    }

    ctx.datahub
        .controllers
        .delete_controller(W::KIND, &ns, &name)
        .await
}
