//! Reconciliation of Datahub's node and namespace records with the cluster,
//! catching deletions that happened while the operator was down or while a
//! watch was desynced.

use std::collections::BTreeSet;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::api::{Api, ListParams, ResourceExt};
use tracing::{info, warn};

use crate::datahub::proto::Namespace as NamespaceRecord;
use crate::error::Result;

use super::context::Context;
use super::node::node_record;

const RETRY: Duration = Duration::from_secs(3);

async fn sync_nodes(ctx: &Context) -> Result<()> {
    let nodes = Api::<Node>::all(ctx.client.clone())
        .list(&ListParams::default())
        .await?
        .items;
    let mut records = Vec::with_capacity(nodes.len());
    for node in &nodes {
        match node_record(node, ctx) {
            Ok(r) => records.push(r),
            Err(e) => warn!(node = %node.name_any(), %e, "skipping node"),
        }
    }
    ctx.datahub.nodes.create_nodes(records).await?;

    let live: BTreeSet<String> = nodes.iter().map(|n| n.name_any()).collect();
    prune_nodes(ctx, &live).await
}

/// Delete node records whose names are not in `live`.
pub async fn prune_nodes(ctx: &Context, live: &BTreeSet<String>) -> Result<()> {
    let gone: Vec<String> = ctx
        .datahub
        .nodes
        .list_nodes()
        .await?
        .iter()
        .map(|n| n.name().to_string())
        .filter(|n| !live.contains(n))
        .collect();
    if !gone.is_empty() {
        info!(count = gone.len(), "removing records of deleted nodes");
    }
    ctx.datahub.nodes.delete_nodes(&gone).await
}

async fn sync_namespaces(ctx: &Context) -> Result<()> {
    let namespaces = Api::<Namespace>::all(ctx.client.clone())
        .list(&ListParams::default())
        .await?
        .items;
    let repo = &ctx.datahub.namespaces;

    let mut records = Vec::new();
    for ns in &namespaces {
        if ctx.is_namespace_excluded(&ns.name_any()).await? {
            continue;
        }
        records.push(NamespaceRecord::from_live_namespace(repo.cluster_name(), ns));
    }
    repo.create_namespaces(records).await?;

    let live: BTreeSet<String> = namespaces.iter().map(|n| n.name_any()).collect();
    prune_namespaces(ctx, &live).await
}

/// Delete namespace records whose names are not in `live` or whose
/// namespace is excluded.
pub async fn prune_namespaces(ctx: &Context, live: &BTreeSet<String>) -> Result<()> {
    let repo = &ctx.datahub.namespaces;
    let mut gone = Vec::new();
    for record in repo.list_namespaces().await? {
        let name = record.name();
        if !live.contains(name) || ctx.is_namespace_excluded(name).await? {
            gone.push(name.to_string());
        }
    }
    if !gone.is_empty() {
        info!(count = gone.len(), "removing records of deleted or excluded namespaces");
    }
    repo.delete_namespaces(&gone).await
}

/// Run the node and namespace sync until one attempt succeeds.
pub async fn run(ctx: &Context) {
    loop {
        match futures::try_join!(sync_nodes(ctx), sync_namespaces(ctx)) {
            Ok(_) => {
                info!("startup sync of nodes and namespaces complete");
                return;
            }
            Err(e) => {
                warn!(%e, "startup sync failed, retrying in 3s");
                tokio::time::sleep(RETRY).await;
            }
        }
    }
}
