//! Node mirror: every node gets a Datahub record carrying its capacity and
//! cloud-provider metadata.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Api, ResourceExt},
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
};
use tracing::{debug, info, warn};

use crate::datahub::proto::Node as NodeRecord;
use crate::error::{Error, Result};
use crate::nodeinfo::NodeInfo;

use super::context::Context;
use super::deletions::run_pruning_watch;
use super::startup_sync::prune_nodes;

const ERROR_REQUEUE: Duration = Duration::from_secs(3);

/// Start the Node controller and deletion watch. Returns a future that runs
/// forever.
pub async fn run(ctx: Arc<Context>) {
    let nodes: Api<Node> = Api::all(ctx.client.clone());

    let deletions = {
        let on_delete = ctx.clone();
        let on_relist = ctx.clone();
        run_pruning_watch(
            nodes.clone(),
            ERROR_REQUEUE,
            move |node: Node| {
                let ctx = on_delete.clone();
                async move {
                    let name = node.name_any();
                    info!(%name, "node deleted");
                    ctx.datahub.nodes.delete_nodes(&[name]).await
                }
            },
            move |live| {
                let ctx = on_relist.clone();
                async move { prune_nodes(&ctx, &live).await }
            },
        )
    };

    let controller = Controller::new(nodes, WatcherConfig::default())
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

/// The Datahub record for a live node.
pub fn node_record(node: &Node, ctx: &Context) -> Result<NodeRecord> {
    let info = NodeInfo::from_node(node, &ctx.provider_defaults)?;
    Ok(NodeRecord::from_node_info(ctx.datahub.nodes.cluster_name(), &info))
}

async fn reconcile(node: Arc<Node>, ctx: Arc<Context>) -> Result<Action> {
    let name = node.name_any();
    if node.metadata.deletion_timestamp.is_some() {
        ctx.datahub.nodes.delete_nodes(&[name]).await?;
        return Ok(Action::await_change());
    }
    let record = node_record(&node, &ctx)?;
    debug!(%name, "mirroring node");
    ctx.datahub.nodes.create_nodes(vec![record]).await?;
    Ok(Action::await_change())
}

fn error_policy(node: Arc<Node>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = node.name_any();
    warn!(%name, %error, "reconcile error, requeuing in 3s");
    Action::requeue(ERROR_REQUEUE)
}
