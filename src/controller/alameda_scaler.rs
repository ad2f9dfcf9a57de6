//! AlamedaScaler controller: the central reconciler.
//!
//! Each pass applies spec defaults, rebuilds `status.alamedaController` from
//! the workloads the selector matches, writes it, then runs the Datahub
//! mirror sync and the recommendation sync concurrently. The
//! `datahub-cleanup` finalizer removes the scaler's Datahub records on
//! deletion.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod as KubePod;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        events::EventType,
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::crd::alameda_recommendation::{
    scaler_label_value, AlamedaRecommendation, AlamedaRecommendationSpec, SCALER_LABEL,
};
use crate::crd::alameda_scaler::{
    AlamedaController, AlamedaPod, AlamedaScaler, AlamedaScalerSpec, AlamedaScalerStatus,
    ControllerKind, ExecutionStrategy, ScalingToolSpec, ScalingToolType, DEFAULT_MAX_UNAVAILABLE,
};
use crate::crd::deployment_config::DeploymentConfig;
use crate::crd::shared::{namespaced_key, AlamedaContainer};
use crate::datahub::controller::ControllerRepository;
use crate::datahub::proto::{Application, Controller as ControllerRecord, Pod as PodRecord};
use crate::error::{not_found_as_none, Error, Result};

use super::context::{publish_event, Context};
use super::helpers::{controller_owner_ref, selector_to_query};
use super::owner_chain;
use super::workload::{discover, Discovered, Workload};

const FINALIZER: &str = "autoscaling.containers.ai/datahub-cleanup";
const ERROR_REQUEUE: Duration = Duration::from_secs(3);

// ── Controller entry point ────────────────────────────────────────────────────

/// Start the AlamedaScaler controller. Returns a future that runs forever.
pub async fn run(ctx: Arc<Context>) {
    let scalers: Api<AlamedaScaler> = Api::all(ctx.client.clone());

    Controller::new(scalers, WatcherConfig::default())
        .run(reconcile, error_policy, ctx)
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
        })
        .await;
}

// ── Reconcile ─────────────────────────────────────────────────────────────────

async fn reconcile(scaler: Arc<AlamedaScaler>, ctx: Arc<Context>) -> Result<Action> {
    ctx.scaler_gate.wait().await;

    let ns = scaler.namespace().unwrap_or_default();
    let api: Api<AlamedaScaler> = Api::namespaced(ctx.client.clone(), &ns);

    finalizer(&api, FINALIZER, scaler, |event| async {
        match event {
            FinalizerEvent::Apply(scaler) => reconcile_scaler(&scaler, &ctx).await,
            FinalizerEvent::Cleanup(scaler) => cleanup_scaler(&scaler, &ctx).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

fn error_policy(scaler: Arc<AlamedaScaler>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = scaler.name_any();
    // The finalizer helper reports ObjectNotFound when the scaler vanished
    // between the watch event and the reconcile.
    if matches!(error, Error::Finalizer(e) if e.to_string().contains("ObjectNotFound")) {
        debug!(%name, "object already deleted, skipping requeue");
        return Action::await_change();
    }
    warn!(%name, %error, "reconcile error, requeuing in 3s");
    Action::requeue(ERROR_REQUEUE)
}

// ── Defaults ──────────────────────────────────────────────────────────────────

fn needs_default_max_unavailable(strategy: Option<&ExecutionStrategy>) -> bool {
    strategy
        .and_then(|s| s.max_unavailable.as_deref())
        .map(str::trim)
        .map_or(true, |v| v.is_empty() || v == "0" || v == "0%")
}

/// Merge patch filling in scaler defaults, or `None` when nothing is missing.
///
/// The scaling tool defaults to `hpa`; a `vpa` tool without a usable
/// `maxUnavailable` gets 25%.
pub fn defaults_patch(spec: &AlamedaScalerSpec) -> Option<Value> {
    let current = spec.scaling_tool.clone().unwrap_or_default();
    let mut desired = ScalingToolSpec {
        tool_type: Some(current.tool_type.unwrap_or_default()),
        ..current.clone()
    };
    if desired.tool_type == Some(ScalingToolType::Vpa)
        && needs_default_max_unavailable(desired.execution_strategy.as_ref())
    {
        desired.execution_strategy = Some(ExecutionStrategy {
            max_unavailable: Some(DEFAULT_MAX_UNAVAILABLE.to_string()),
        });
    }
    if desired == current {
        return None;
    }
    Some(json!({ "spec": { "scalingTool": desired } }))
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Status rebuilt from scratch plus the live pods behind it, keyed
/// `namespace/name`.
struct Observed {
    controller: AlamedaController,
    pods: BTreeMap<String, KubePod>,
}

impl Observed {
    fn record(&mut self, kind: ControllerKind, found: Vec<Discovered>) {
        for d in found {
            for p in d.pods {
                self.pods.insert(
                    namespaced_key(&p.namespace().unwrap_or_default(), &p.name_any()),
                    p,
                );
            }
            let key = namespaced_key(&d.resource.namespace, &d.resource.name);
            self.controller.of_mut(kind).insert(key, d.resource);
        }
    }
}

async fn observe(scaler: &AlamedaScaler, ctx: &Context) -> Result<Observed> {
    let mut observed = Observed {
        controller: AlamedaController::default(),
        pods: BTreeMap::new(),
    };
    let Some(selector) = selector_to_query(&scaler.spec.selector) else {
        debug!(name = %scaler.name_any(), "empty selector matches nothing");
        return Ok(observed);
    };
    let ns = scaler.namespace().unwrap_or_default();
    let client = &ctx.client;

    observed.record(
        Deployment::KIND,
        discover::<Deployment>(client, &ns, &selector).await?,
    );
    if ctx.deployment_configs_supported().await? {
        observed.record(
            DeploymentConfig::KIND,
            discover::<DeploymentConfig>(client, &ns, &selector).await?,
        );
    }
    observed.record(
        StatefulSet::KIND,
        discover::<StatefulSet>(client, &ns, &selector).await?,
    );
    Ok(observed)
}

// ── Core reconcile logic ──────────────────────────────────────────────────────

async fn reconcile_scaler(scaler: &AlamedaScaler, ctx: &Context) -> Result<Action> {
    let ns = scaler.namespace().unwrap_or_default();
    let name = scaler.name_any();
    let api: Api<AlamedaScaler> = Api::namespaced(ctx.client.clone(), &ns);

    debug!(%name, %ns, "reconciling AlamedaScaler");

    if let Some(patch) = defaults_patch(&scaler.spec) {
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!(%name, "spec defaults applied");
        publish_event(
            ctx,
            scaler,
            EventType::Normal,
            "DefaultsApplied",
            "Reconcile",
            Some("Scaling tool defaults applied to spec".to_string()),
        )
        .await;
        return Ok(Action::requeue(Duration::from_secs(0)));
    }

    let observed = observe(scaler, ctx).await?;
    let status = AlamedaScalerStatus {
        alameda_controller: observed.controller,
    };

    // Replace rather than merge so controllers and pods that disappeared are
    // dropped from the maps. A stale resourceVersion fails with a conflict
    // and the pass is retried.
    let scaler = if scaler.status.as_ref() != Some(&status) {
        let mut updated = scaler.clone();
        updated.status = Some(status);
        api.replace_status(&name, &PostParams::default(), serde_json::to_vec(&updated)?)
            .await?
    } else {
        scaler.clone()
    };

    let synced = futures::try_join!(
        sync_datahub(&scaler, &observed.pods, ctx),
        sync_recommendations(&scaler, ctx),
    );
    if let Err(e) = &synced {
        publish_event(
            ctx,
            &scaler,
            EventType::Warning,
            "SyncFailed",
            "Reconcile",
            Some(format!("Synchronisation failed: {e}")),
        )
        .await;
    }
    synced?;

    Ok(Action::requeue(ctx.settings.resync_interval))
}

// ── Datahub mirror sync ───────────────────────────────────────────────────────

fn controller_identity(c: &ControllerRecord) -> Option<(i32, String, String)> {
    let m = c.object_meta.as_ref()?;
    Some((c.kind, m.namespace.clone(), m.name.clone()))
}

async fn sync_datahub(
    scaler: &AlamedaScaler,
    live_pods: &BTreeMap<String, KubePod>,
    ctx: &Context,
) -> Result<()> {
    let ns = scaler.namespace().unwrap_or_default();
    let name = scaler.name_any();
    let cluster = ctx.cluster_name();
    let datahub = &ctx.datahub;
    let empty = AlamedaController::default();
    let status = scaler.alameda_controller().unwrap_or(&empty);

    // Application.
    let app = Application::from_scaler(cluster, scaler);
    if datahub.applications.get_application(&ns, &name).await?.as_ref() != Some(&app) {
        datahub.applications.create_applications(vec![app]).await?;
    }

    // Controllers: create what is missing or changed, then delete extras.
    let desired: Vec<ControllerRecord> = status
        .resources()
        .map(|(kind, r)| ControllerRecord::from_status(cluster, scaler, kind, r))
        .collect();
    let existing = datahub.controllers.list_controllers_by_scaler(&ns, &name).await?;
    let create: Vec<ControllerRecord> = desired
        .iter()
        .filter(|d| !existing.contains(d))
        .cloned()
        .collect();
    datahub.controllers.create_controllers(create).await?;

    let keep: BTreeSet<_> = desired.iter().filter_map(controller_identity).collect();
    let stale: Vec<ControllerRecord> = existing
        .into_iter()
        .filter(|c| controller_identity(c).map_or(true, |id| !keep.contains(&id)))
        .collect();
    if !stale.is_empty() {
        info!(%name, count = stale.len(), "deleting stale controller records");
    }
    datahub
        .controllers
        .delete_controllers(ControllerRepository::group_by_kind(&stale))
        .await?;

    // Pods.
    let mut desired_pods = Vec::new();
    for (_, _, pod) in status.pods() {
        let key = namespaced_key(&pod.namespace, &pod.name);
        let Some(live) = live_pods.get(&key) else {
            warn!(pod = %key, "monitored pod no longer readable, skipping");
            continue;
        };
        let walk = owner_chain::walk(&ctx.client, live).await;
        match PodRecord::from_live_pod(cluster, scaler, live, &walk.link, walk.owner_replicas) {
            Ok(record) => desired_pods.push(record),
            Err(e) => warn!(pod = %key, %e, "cannot build pod record, skipping"),
        }
    }
    let existing_pods = datahub.pods.list_pods_by_scaler(&ns, &name).await?;
    let create: Vec<PodRecord> = desired_pods
        .into_iter()
        .filter(|d| !existing_pods.contains(d))
        .collect();
    datahub.pods.create_pods(create).await?;

    let stale: Vec<_> = existing_pods
        .into_iter()
        .filter_map(|p| p.object_meta)
        .filter(|m| !status.has_pod(&m.namespace, &m.name))
        .collect();
    datahub.pods.delete_pods(stale).await?;

    Ok(())
}

// ── Recommendation lifecycle sync ─────────────────────────────────────────────

fn recommendation_for(scaler: &AlamedaScaler, pod: &AlamedaPod) -> AlamedaRecommendation {
    let mut rec = AlamedaRecommendation::new(
        &pod.name,
        AlamedaRecommendationSpec {
            containers: pod
                .containers
                .iter()
                .map(|c| AlamedaContainer::named(&c.name))
                .collect(),
        },
    );
    rec.metadata.namespace = Some(pod.namespace.clone());
    rec.metadata.labels = Some(BTreeMap::from([(
        SCALER_LABEL.to_string(),
        scaler_label_value(&scaler.name_any(), &scaler.namespace().unwrap_or_default()),
    )]));
    rec.metadata.owner_references = Some(vec![controller_owner_ref(scaler)]);
    rec
}

async fn sync_recommendations(scaler: &AlamedaScaler, ctx: &Context) -> Result<()> {
    let ns = scaler.namespace().unwrap_or_default();
    let name = scaler.name_any();
    let uid = scaler.uid().unwrap_or_default();
    let empty = AlamedaController::default();
    let status = scaler.alameda_controller().unwrap_or(&empty);
    let api: Api<AlamedaRecommendation> = Api::namespaced(ctx.client.clone(), &ns);

    let label = format!("{SCALER_LABEL}={}", scaler_label_value(&name, &ns));
    let owned: Vec<AlamedaRecommendation> = api
        .list(&ListParams::default().labels(&label))
        .await?
        .items
        .into_iter()
        .filter(|r| r.owner_references().iter().any(|o| o.uid == uid))
        .collect();
    let existing: BTreeSet<String> = owned.iter().map(|r| r.name_any()).collect();

    for (_, _, pod) in status.pods() {
        if existing.contains(&pod.name) {
            continue;
        }
        let rec = recommendation_for(scaler, pod);
        match api.create(&PostParams::default(), &rec).await {
            Ok(_) => debug!(scaler = %name, pod = %pod.name, "created AlamedaRecommendation"),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(pod = %pod.name, "AlamedaRecommendation already exists")
            }
            Err(e) => return Err(e.into()),
        }
    }

    for rec in owned {
        let rec_name = rec.name_any();
        if status.has_pod(&ns, &rec_name) {
            continue;
        }
        info!(scaler = %name, recommendation = %rec_name, "deleting orphaned AlamedaRecommendation");
        not_found_as_none(api.delete(&rec_name, &DeleteParams::default()).await)?;
    }
    Ok(())
}

// ── Cleanup (finalizer) ──────────────────────────────────────────────────────

async fn cleanup_controllers(ctx: &Context, ns: &str, name: &str) -> Result<()> {
    let records = ctx.datahub.controllers.list_controllers_by_scaler(ns, name).await?;
    ctx.datahub
        .controllers
        .delete_controllers(ControllerRepository::group_by_kind(&records))
        .await
}

async fn cleanup_pods(ctx: &Context, ns: &str, name: &str) -> Result<()> {
    let records = ctx.datahub.pods.list_pods_by_scaler(ns, name).await?;
    ctx.datahub
        .pods
        .delete_pods(records.into_iter().filter_map(|p| p.object_meta).collect())
        .await
}

async fn cleanup_application(ctx: &Context, ns: &str, name: &str) -> Result<()> {
    ctx.datahub.applications.delete_application(ns, name).await?;
    if ctx.is_namespace_excluded(ns).await? {
        ctx.datahub
            .namespaces
            .delete_namespaces(&[ns.to_string()])
            .await?;
    }
    Ok(())
}

async fn cleanup_scaler(scaler: &AlamedaScaler, ctx: &Context) -> Result<Action> {
    let ns = scaler.namespace().unwrap_or_default();
    let name = scaler.name_any();
    info!(%name, %ns, "cleaning up AlamedaScaler (deleting Datahub records)");

    futures::try_join!(
        cleanup_controllers(ctx, &ns, &name),
        cleanup_pods(ctx, &ns, &name),
        cleanup_application(ctx, &ns, &name),
    )?;

    publish_event(
        ctx,
        scaler,
        EventType::Normal,
        "DatahubCleanup",
        "Finalize",
        Some("Controller, pod and application records deleted".to_string()),
    )
    .await;

    Ok(Action::await_change())
}
