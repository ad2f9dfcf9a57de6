//! Resource links: the owner chain of a pod rendered as a path.
//!
//! `/namespaces/ns/deployments/web/replicasets/web-5d9/pods/web-5d9-x2`
//! lists owners top-first. Datahub stores the link on every pod record and
//! derives the pod's top controller from it.

use std::fmt;
use std::str::FromStr;

use crate::crd::alameda_scaler::ControllerKind;
use crate::error::{Error, Result};

/// Owner kinds that can appear in a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerKind {
    Deployment,
    ReplicaSet,
    DeploymentConfig,
    ReplicationController,
    StatefulSet,
}

impl OwnerKind {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(OwnerKind::Deployment),
            "ReplicaSet" => Some(OwnerKind::ReplicaSet),
            "DeploymentConfig" => Some(OwnerKind::DeploymentConfig),
            "ReplicationController" => Some(OwnerKind::ReplicationController),
            "StatefulSet" => Some(OwnerKind::StatefulSet),
            _ => None,
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            OwnerKind::Deployment => "deployments",
            OwnerKind::ReplicaSet => "replicasets",
            OwnerKind::DeploymentConfig => "deploymentconfigs",
            OwnerKind::ReplicationController => "replicationcontrollers",
            OwnerKind::StatefulSet => "statefulsets",
        }
    }

    fn from_plural(plural: &str) -> Option<Self> {
        [
            OwnerKind::Deployment,
            OwnerKind::ReplicaSet,
            OwnerKind::DeploymentConfig,
            OwnerKind::ReplicationController,
            OwnerKind::StatefulSet,
        ]
        .into_iter()
        .find(|k| k.plural() == plural)
    }

    /// The workload kind a scaler can select, if this is one.
    pub fn controller_kind(self) -> Option<ControllerKind> {
        match self {
            OwnerKind::Deployment => Some(ControllerKind::Deployment),
            OwnerKind::DeploymentConfig => Some(ControllerKind::DeploymentConfig),
            OwnerKind::StatefulSet => Some(ControllerKind::StatefulSet),
            OwnerKind::ReplicaSet | OwnerKind::ReplicationController => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSegment {
    pub kind: OwnerKind,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLink {
    pub namespace: String,
    /// Owners, top-most first.
    pub owners: Vec<LinkSegment>,
    pub pod: String,
}

impl ResourceLink {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            owners: Vec::new(),
            pod: pod.into(),
        }
    }

    /// Prepend an owner found one level further up the chain.
    pub fn push_owner(&mut self, kind: OwnerKind, name: impl Into<String>) {
        self.owners.insert(
            0,
            LinkSegment {
                kind,
                name: name.into(),
            },
        );
    }

    /// The top-most owner when it is a scaler-selectable workload.
    pub fn top_controller(&self) -> Option<(ControllerKind, &str)> {
        let top = self.owners.first()?;
        Some((top.kind.controller_kind()?, top.name.as_str()))
    }

    /// The pod's direct owner.
    pub fn direct_owner(&self) -> Option<&LinkSegment> {
        self.owners.last()
    }
}

impl fmt::Display for ResourceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/namespaces/{}", self.namespace)?;
        for seg in &self.owners {
            write!(f, "/{}/{}", seg.kind.plural(), seg.name)?;
        }
        write!(f, "/pods/{}", self.pod)
    }
}

impl FromStr for ResourceLink {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::reconcile(format!("invalid resource link {s:?}"));
        let parts: Vec<&str> = s.trim_start_matches('/').split('/').collect();
        if parts.len() < 4 || parts.len() % 2 != 0 || parts[0] != "namespaces" {
            return Err(invalid());
        }
        let (last_kind, last_name) = (parts[parts.len() - 2], parts[parts.len() - 1]);
        if last_kind != "pods" {
            return Err(invalid());
        }
        let mut link = ResourceLink::new(parts[1], last_name);
        for pair in parts[2..parts.len() - 2].chunks(2) {
            let kind = OwnerKind::from_plural(pair[0]).ok_or_else(invalid)?;
            link.owners.push(LinkSegment {
                kind,
                name: pair[1].to_string(),
            });
        }
        Ok(link)
    }
}
