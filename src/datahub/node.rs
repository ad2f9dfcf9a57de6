use std::sync::Arc;

use super::proto::{
    AlamedaNodeSpec, Capacity, CreateNodesRequest, DeleteNodesRequest, ListNodesRequest, Node,
    ObjectMeta, Provider,
};
use super::{object_meta, status, DatahubService};
use crate::error::Result;
use crate::nodeinfo::NodeInfo;

impl Node {
    pub fn from_node_info(cluster_name: &str, info: &NodeInfo) -> Self {
        Node {
            object_meta: Some(ObjectMeta {
                uid: info.uid.clone(),
                ..object_meta(cluster_name, "", &info.name)
            }),
            start_time: Some(prost_types::Timestamp {
                seconds: info.created_time,
                nanos: 0,
            }),
            capacity: Some(Capacity {
                cpu_cores: info.cpu_cores,
                memory_bytes: info.memory_bytes,
            }),
            alameda_node_spec: Some(AlamedaNodeSpec {
                provider: Some(Provider {
                    provider: info.provider.clone(),
                    instance_type: info.instance_type.clone(),
                    region: info.region.clone(),
                    zone: info.zone.clone(),
                    os: info.os.clone(),
                    role: info.role.clone(),
                    instance_id: info.instance_id.clone(),
                    storage_size: info.storage_size,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.object_meta.as_ref().map_or("", |m| m.name.as_str())
    }
}

#[derive(Clone)]
pub struct NodeRepository {
    service: Arc<dyn DatahubService>,
    cluster_name: String,
}

impl NodeRepository {
    pub fn new(service: Arc<dyn DatahubService>, cluster_name: String) -> Self {
        Self {
            service,
            cluster_name,
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub async fn create_nodes(&self, nodes: Vec<Node>) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let resp = self.service.create_nodes(CreateNodesRequest { nodes }).await?;
        status::check(&resp)
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let resp = self
            .service
            .list_nodes(ListNodesRequest {
                object_meta: vec![object_meta(&self.cluster_name, "", "")],
            })
            .await?;
        status::check_envelope(resp.status.as_ref())?;
        Ok(resp.nodes)
    }

    pub async fn delete_nodes(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let resp = self
            .service
            .delete_nodes(DeleteNodesRequest {
                object_meta: names
                    .iter()
                    .map(|n| object_meta(&self.cluster_name, "", n))
                    .collect(),
            })
            .await?;
        status::check(&resp)
    }
}
