//! Datahub: the external store that mirrors cluster objects and serves
//! computed recommendations.
//!
//! [`DatahubService`] is the raw RPC surface (one method per Datahub call).
//! The repositories layered on top build records from typed inputs and turn
//! every non-OK status envelope into an error. Production uses
//! [`grpc::GrpcDatahub`]; tests substitute [`memory::InMemoryDatahub`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub mod application;
pub mod controller;
pub mod grpc;
pub mod memory;
pub mod namespace;
pub mod node;
pub mod pod;
pub mod proto;
pub mod recommendation;
pub mod status;

use proto::*;

/// Trait abstracting the Datahub RPC service so tests can substitute an
/// in-memory store.
#[async_trait]
pub trait DatahubService: Send + Sync {
    async fn create_applications(&self, req: CreateApplicationsRequest) -> Result<Status>;
    async fn list_applications(
        &self,
        req: ListApplicationsRequest,
    ) -> Result<ListApplicationsResponse>;
    async fn delete_applications(&self, req: DeleteApplicationsRequest) -> Result<Status>;

    async fn create_controllers(&self, req: CreateControllersRequest) -> Result<Status>;
    async fn list_controllers(&self, req: ListControllersRequest)
        -> Result<ListControllersResponse>;
    async fn delete_controllers(&self, req: DeleteControllersRequest) -> Result<Status>;

    async fn create_pods(&self, req: CreatePodsRequest) -> Result<Status>;
    async fn list_pods(&self, req: ListPodsRequest) -> Result<ListPodsResponse>;
    async fn delete_pods(&self, req: DeletePodsRequest) -> Result<Status>;

    async fn create_namespaces(&self, req: CreateNamespacesRequest) -> Result<Status>;
    async fn list_namespaces(&self, req: ListNamespacesRequest)
        -> Result<ListNamespacesResponse>;
    async fn delete_namespaces(&self, req: DeleteNamespacesRequest) -> Result<Status>;

    async fn create_nodes(&self, req: CreateNodesRequest) -> Result<Status>;
    async fn list_nodes(&self, req: ListNodesRequest) -> Result<ListNodesResponse>;
    async fn delete_nodes(&self, req: DeleteNodesRequest) -> Result<Status>;

    async fn list_pod_recommendations(
        &self,
        req: ListPodRecommendationsRequest,
    ) -> Result<ListPodRecommendationsResponse>;
}

/// All repositories over one service, stamped with one cluster name.
#[derive(Clone)]
pub struct Datahub {
    pub applications: application::ApplicationRepository,
    pub controllers: controller::ControllerRepository,
    pub pods: pod::PodRepository,
    pub namespaces: namespace::NamespaceRepository,
    pub nodes: node::NodeRepository,
    pub recommendations: recommendation::RecommendationRepository,
}

impl Datahub {
    pub fn new(service: Arc<dyn DatahubService>, cluster_name: impl Into<String>) -> Self {
        let cluster_name: String = cluster_name.into();
        Self {
            applications: application::ApplicationRepository::new(
                service.clone(),
                cluster_name.clone(),
            ),
            controllers: controller::ControllerRepository::new(
                service.clone(),
                cluster_name.clone(),
            ),
            pods: pod::PodRepository::new(service.clone(), cluster_name.clone()),
            namespaces: namespace::NamespaceRepository::new(service.clone(), cluster_name.clone()),
            nodes: node::NodeRepository::new(service.clone(), cluster_name.clone()),
            recommendations: recommendation::RecommendationRepository::new(service, cluster_name),
        }
    }
}

/// Object metadata for a namespaced record in this cluster.
pub fn object_meta(cluster_name: &str, namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: name.to_string(),
        namespace: namespace.to_string(),
        cluster_name: cluster_name.to_string(),
        ..Default::default()
    }
}
