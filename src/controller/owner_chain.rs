//! Bounded owner-reference walk from a pod up to its top controller.
//!
//! Deployment → ReplicaSet → Pod and DeploymentConfig →
//! ReplicationController → Pod are the chains of interest. The walk stops at
//! [`MAX_OWNER_DEPTH`] levels or at the first owner it cannot read; either way
//! it keeps the link built so far.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, warn};

use crate::crd::deployment_config::DeploymentConfig;
use crate::datahub::pod::UNKNOWN_REPLICAS;
use crate::error::{not_found_as_none, Result};
use crate::resource_link::{OwnerKind, ResourceLink};

use super::helpers::controlling_owner;

pub const MAX_OWNER_DEPTH: usize = 4;

/// What the walk needs from an owner object.
#[derive(Clone, Debug, Default)]
pub struct OwnerObject {
    pub replicas: i32,
    pub owner_references: Vec<OwnerReference>,
}

/// Reads owner objects by kind and name.
#[async_trait]
pub trait OwnerLookup: Send + Sync {
    async fn owner(&self, namespace: &str, kind: OwnerKind, name: &str)
        -> Result<Option<OwnerObject>>;
}

fn owner_object<K: Resource>(obj: &K, replicas: Option<i32>) -> OwnerObject {
    OwnerObject {
        replicas: replicas.unwrap_or(1),
        owner_references: obj.owner_references().to_vec(),
    }
}

#[async_trait]
impl OwnerLookup for Client {
    async fn owner(
        &self,
        namespace: &str,
        kind: OwnerKind,
        name: &str,
    ) -> Result<Option<OwnerObject>> {
        let client = self.clone();
        let found = match kind {
            OwnerKind::Deployment => {
                not_found_as_none(Api::<Deployment>::namespaced(client, namespace).get(name).await)?
                    .map(|d| owner_object(&d, d.spec.as_ref().and_then(|s| s.replicas)))
            }
            OwnerKind::ReplicaSet => {
                not_found_as_none(Api::<ReplicaSet>::namespaced(client, namespace).get(name).await)?
                    .map(|r| owner_object(&r, r.spec.as_ref().and_then(|s| s.replicas)))
            }
            OwnerKind::StatefulSet => {
                not_found_as_none(Api::<StatefulSet>::namespaced(client, namespace).get(name).await)?
                    .map(|s| owner_object(&s, s.spec.as_ref().and_then(|s| s.replicas)))
            }
            OwnerKind::ReplicationController => not_found_as_none(
                Api::<ReplicationController>::namespaced(client, namespace)
                    .get(name)
                    .await,
            )?
            .map(|r| owner_object(&r, r.spec.as_ref().and_then(|s| s.replicas))),
            OwnerKind::DeploymentConfig => not_found_as_none(
                Api::<DeploymentConfig>::namespaced(client, namespace)
                    .get(name)
                    .await,
            )?
            .map(|d| owner_object(&d, Some(d.spec.replicas))),
        };
        Ok(found)
    }
}

/// Result of walking a pod's owners.
#[derive(Clone, Debug)]
pub struct OwnerWalk {
    pub link: ResourceLink,
    /// Replicas of the pod's direct owner, or [`UNKNOWN_REPLICAS`].
    pub owner_replicas: i32,
    /// False when the walk stopped early and `link` is partial.
    pub complete: bool,
}

fn next_owner(owners: &[OwnerReference]) -> Option<OwnerReference> {
    owners
        .iter()
        .find(|o| o.controller == Some(true))
        .or_else(|| owners.first())
        .cloned()
}

/// Walk the pod's controller owners. Never fails: an unreadable owner or
/// an over-long chain ends the walk with the partial link.
pub async fn walk(lookup: &dyn OwnerLookup, pod: &Pod) -> OwnerWalk {
    let namespace = pod.namespace().unwrap_or_default();
    let pod_name = pod.name_any();
    let mut out = OwnerWalk {
        link: ResourceLink::new(&namespace, &pod_name),
        owner_replicas: UNKNOWN_REPLICAS,
        complete: true,
    };

    let mut next = controlling_owner(pod).cloned();
    let mut depth = 0;
    while let Some(owner) = next.take() {
        if depth >= MAX_OWNER_DEPTH {
            warn!(pod = %pod_name, %namespace, "owner chain exceeds {MAX_OWNER_DEPTH} levels");
            out.complete = false;
            break;
        }
        let Some(kind) = OwnerKind::from_kind(&owner.kind) else {
            debug!(pod = %pod_name, kind = %owner.kind, "owner kind outside resource links");
            break;
        };
        out.link.push_owner(kind, &owner.name);

        match lookup.owner(&namespace, kind, &owner.name).await {
            Ok(Some(obj)) => {
                if depth == 0 {
                    out.owner_replicas = obj.replicas;
                }
                next = next_owner(&obj.owner_references);
            }
            Ok(None) => {
                warn!(pod = %pod_name, owner = %owner.name, "owner not found, keeping partial link");
                out.complete = false;
            }
            Err(e) => {
                warn!(pod = %pod_name, owner = %owner.name, %e, "owner lookup failed, keeping partial link");
                out.complete = false;
            }
        }
        depth += 1;
    }
    out
}
