//! Namespace mirror: observed namespaces get a Datahub record, excluded or
//! deleted ones lose it.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
};
use tracing::{debug, info, warn};

use crate::datahub::proto::Namespace as NamespaceRecord;
use crate::error::{Error, Result};

use super::context::Context;
use super::deletions::run_pruning_watch;
use super::startup_sync::prune_namespaces;

const ERROR_REQUEUE: Duration = Duration::from_secs(3);

/// Start the Namespace controller and deletion watch. Returns a future that
/// runs forever.
pub async fn run(ctx: Arc<Context>) {
    let namespaces: Api<Namespace> = Api::all(ctx.client.clone());

    let deletions = {
        let on_delete = ctx.clone();
        let on_relist = ctx.clone();
        run_pruning_watch(
            namespaces.clone(),
            ERROR_REQUEUE,
            move |ns: Namespace| {
                let ctx = on_delete.clone();
                async move {
                    let name = ns.name_any();
                    info!(%name, "namespace deleted");
                    ctx.datahub.namespaces.delete_namespaces(&[name]).await
                }
            },
            move |live| {
                let ctx = on_relist.clone();
                async move { prune_namespaces(&ctx, &live).await }
            },
        )
    };

    let controller = Controller::new(namespaces, WatcherConfig::default())
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
        });

    tokio::join!(controller, deletions);
}

async fn reconcile(ns: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    ctx.namespace_gate.wait().await;

    let name = ns.name_any();
    let repo = &ctx.datahub.namespaces;
    if ns.metadata.deletion_timestamp.is_some() || ctx.is_namespace_excluded(&name).await? {
        debug!(%name, "namespace excluded or terminating, removing record");
        repo.delete_namespaces(&[name]).await?;
    } else {
        repo.create_namespaces(vec![NamespaceRecord::from_live_namespace(
            repo.cluster_name(),
            &ns,
        )])
        .await?;
    }
    Ok(Action::await_change())
}

fn error_policy(ns: Arc<Namespace>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = ns.name_any();
    warn!(%name, %error, "reconcile error, requeuing in 3s");
    Action::requeue(ERROR_REQUEUE)
}
