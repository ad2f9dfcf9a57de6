use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace as KubeNamespace;
use kube::ResourceExt;

use super::proto::{
    CreateNamespacesRequest, DeleteNamespacesRequest, ListNamespacesRequest, Namespace,
    ObjectMeta,
};
use super::{object_meta, status, DatahubService};
use crate::error::Result;

impl Namespace {
    pub fn from_live_namespace(cluster_name: &str, ns: &KubeNamespace) -> Self {
        Namespace {
            object_meta: Some(ObjectMeta {
                uid: ns.uid().unwrap_or_default(),
                ..object_meta(cluster_name, "", &ns.name_any())
            }),
        }
    }

    pub fn from_name(cluster_name: &str, name: &str) -> Self {
        Namespace {
            object_meta: Some(object_meta(cluster_name, "", name)),
        }
    }

    pub fn name(&self) -> &str {
        self.object_meta.as_ref().map_or("", |m| m.name.as_str())
    }
}

#[derive(Clone)]
pub struct NamespaceRepository {
    service: Arc<dyn DatahubService>,
    cluster_name: String,
}

impl NamespaceRepository {
    pub fn new(service: Arc<dyn DatahubService>, cluster_name: String) -> Self {
        Self {
            service,
            cluster_name,
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub async fn create_namespaces(&self, namespaces: Vec<Namespace>) -> Result<()> {
        if namespaces.is_empty() {
            return Ok(());
        }
        let resp = self
            .service
            .create_namespaces(CreateNamespacesRequest { namespaces })
            .await?;
        status::check(&resp)
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let resp = self
            .service
            .list_namespaces(ListNamespacesRequest {
                object_meta: vec![object_meta(&self.cluster_name, "", "")],
            })
            .await?;
        status::check_envelope(resp.status.as_ref())?;
        Ok(resp.namespaces)
    }

    pub async fn delete_namespaces(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let resp = self
            .service
            .delete_namespaces(DeleteNamespacesRequest {
                object_meta: names
                    .iter()
                    .map(|n| object_meta(&self.cluster_name, "", n))
                    .collect(),
            })
            .await?;
        status::check(&resp)
    }
}
