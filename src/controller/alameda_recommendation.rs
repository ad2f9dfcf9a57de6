//! AlamedaRecommendation controller.
//!
//! Deletes recommendations whose pod left the owning scaler's monitored set
//! and overlays the newest Datahub pod recommendation onto the rest.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Resource,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::crd::alameda_recommendation::AlamedaRecommendation;
use crate::crd::alameda_scaler::AlamedaScaler;
use crate::crd::shared::AlamedaContainer;
use crate::datahub::proto::{MetricData, MetricType, PodRecommendation};
use crate::error::{not_found_as_none, Error, Result};
use crate::quantity;

use super::context::Context;
use super::helpers::FIELD_MANAGER;

const ERROR_REQUEUE: Duration = Duration::from_secs(5);
const RECONCILE_DEADLINE: Duration = Duration::from_secs(30);

// ── Controller entry point ────────────────────────────────────────────────────

/// Start the AlamedaRecommendation controller. Returns a future that runs
/// forever.
pub async fn run(ctx: Arc<Context>) {
    let recommendations: Api<AlamedaRecommendation> = Api::all(ctx.client.clone());

    Controller::new(recommendations, WatcherConfig::default())
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

async fn reconcile(rec: Arc<AlamedaRecommendation>, ctx: Arc<Context>) -> Result<Action> {
    ctx.recommendation_gate.wait().await;
    tokio::time::timeout(RECONCILE_DEADLINE, reconcile_recommendation(&rec, &ctx))
        .await
        .map_err(|_| Error::Timeout(RECONCILE_DEADLINE))?
}

fn error_policy(rec: Arc<AlamedaRecommendation>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = rec.name_any();
    warn!(%name, %error, "reconcile error, requeuing in 5s");
    Action::requeue(ERROR_REQUEUE)
}

// ── Core reconcile logic ──────────────────────────────────────────────────────

/// Name of the owning scaler: the controller owner whose kind is
/// AlamedaScaler, compared case-insensitively.
fn owning_scaler(rec: &AlamedaRecommendation) -> Option<&str> {
    rec.owner_references()
        .iter()
        .find(|o| o.controller == Some(true) && o.kind.eq_ignore_ascii_case("alamedascaler"))
        .map(|o| o.name.as_str())
}

async fn reconcile_recommendation(rec: &AlamedaRecommendation, ctx: &Context) -> Result<Action> {
    let ns = rec.namespace().unwrap_or_default();
    let name = rec.name_any();
    let api: Api<AlamedaRecommendation> = Api::namespaced(ctx.client.clone(), &ns);

    if rec.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let owner = match owning_scaler(rec) {
        Some(scaler_name) => {
            let scalers: Api<AlamedaScaler> = Api::namespaced(ctx.client.clone(), &ns);
            not_found_as_none(scalers.get(scaler_name).await)?
        }
        None => None,
    };
    let monitored = owner.as_ref().is_some_and(|s| s.has_alameda_pod(&ns, &name));
    if !monitored {
        info!(%name, %ns, "pod no longer monitored, deleting AlamedaRecommendation");
        not_found_as_none(api.delete(&name, &DeleteParams::default()).await)?;
        return Ok(Action::await_change());
    }

    let Some(latest) = ctx
        .datahub
        .recommendations
        .latest_pod_recommendation(&ns, &name)
        .await?
    else {
        debug!(%name, %ns, "no recommendation in Datahub yet");
        return Ok(Action::requeue(ctx.settings.resync_interval));
    };

    let merged = merge_pod_recommendation(&rec.spec.containers, &latest)?;
    if merged != rec.spec.containers {
        let patch = json!({ "spec": { "containers": merged } });
        api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        info!(%name, %ns, "recommendation updated");
    }

    Ok(Action::requeue(ctx.settings.resync_interval))
}

// ── Merging ───────────────────────────────────────────────────────────────────

/// Resource name and quantity constructor for a metric.
fn metric_resource(metric: MetricType) -> Option<(&'static str, fn(i64) -> Quantity)> {
    match metric {
        MetricType::CpuUsageSecondsPercentage => Some(("cpu", quantity::cpu_from_millicores)),
        MetricType::MemoryUsageBytes => Some(("memory", quantity::memory_from_bytes)),
        MetricType::Undefined => None,
    }
}

/// Write the newest sample of every metric into `target`.
fn apply_metrics(data: &[MetricData], target: &mut BTreeMap<String, Quantity>) -> Result<()> {
    for metric in data {
        let Some((resource, to_quantity)) = metric_resource(metric.metric_type()) else {
            continue;
        };
        let newest = metric
            .data
            .iter()
            .max_by_key(|s| s.time.as_ref().map(|t| (t.seconds, t.nanos)));
        if let Some(sample) = newest {
            let value = quantity::parse_sample_value(&sample.num_value)?;
            target.insert(resource.to_string(), to_quantity(value));
        }
    }
    Ok(())
}

/// Overlay a Datahub pod recommendation onto the stored containers.
///
/// For each container, metric and kind (limit or request) the sample with
/// the greatest timestamp wins. Containers the recommendation does not
/// mention are left untouched.
pub fn merge_pod_recommendation(
    containers: &[AlamedaContainer],
    rec: &PodRecommendation,
) -> Result<Vec<AlamedaContainer>> {
    let mut out = containers.to_vec();
    for container in &mut out {
        let Some(cr) = rec
            .container_recommendations
            .iter()
            .find(|cr| cr.name == container.name)
        else {
            continue;
        };
        let resources = &mut container.resources;

        let mut limits = resources.limits.take().unwrap_or_default();
        apply_metrics(&cr.limit_recommendations, &mut limits)?;
        resources.limits = (!limits.is_empty()).then_some(limits);

        let mut requests = resources.requests.take().unwrap_or_default();
        apply_metrics(&cr.request_recommendations, &mut requests)?;
        resources.requests = (!requests.is_empty()).then_some(requests);
    }
    Ok(out)
}
