use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use super::proto::datahub_service_client::DatahubServiceClient;
use super::proto::*;
use super::DatahubService;
use crate::error::Result;

/// Production implementation backed by a lazily connected gRPC channel.
///
/// Every call carries the configured deadline; the channel reconnects on its
/// own after transport failures.
#[derive(Clone)]
pub struct GrpcDatahub {
    client: DatahubServiceClient,
}

impl GrpcDatahub {
    pub fn connect_lazy(address: &str, timeout: Duration) -> Result<Self> {
        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let channel: Channel = Endpoint::from_shared(uri)?
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect_lazy();
        info!(%address, "datahub channel configured");
        Ok(Self {
            client: DatahubServiceClient::new(channel),
        })
    }

    fn client(&self) -> DatahubServiceClient {
        self.client.clone()
    }
}

#[async_trait]
impl DatahubService for GrpcDatahub {
    async fn create_applications(&self, req: CreateApplicationsRequest) -> Result<Status> {
        Ok(self.client().create_applications(req).await?.into_inner())
    }

    async fn list_applications(
        &self,
        req: ListApplicationsRequest,
    ) -> Result<ListApplicationsResponse> {
        Ok(self.client().list_applications(req).await?.into_inner())
    }

    async fn delete_applications(&self, req: DeleteApplicationsRequest) -> Result<Status> {
        Ok(self.client().delete_applications(req).await?.into_inner())
    }

    async fn create_controllers(&self, req: CreateControllersRequest) -> Result<Status> {
        Ok(self.client().create_controllers(req).await?.into_inner())
    }

    async fn list_controllers(
        &self,
        req: ListControllersRequest,
    ) -> Result<ListControllersResponse> {
        Ok(self.client().list_controllers(req).await?.into_inner())
    }

    async fn delete_controllers(&self, req: DeleteControllersRequest) -> Result<Status> {
        Ok(self.client().delete_controllers(req).await?.into_inner())
    }

    async fn create_pods(&self, req: CreatePodsRequest) -> Result<Status> {
        Ok(self.client().create_pods(req).await?.into_inner())
    }

    async fn list_pods(&self, req: ListPodsRequest) -> Result<ListPodsResponse> {
        Ok(self.client().list_pods(req).await?.into_inner())
    }

    async fn delete_pods(&self, req: DeletePodsRequest) -> Result<Status> {
        Ok(self.client().delete_pods(req).await?.into_inner())
    }

    async fn create_namespaces(&self, req: CreateNamespacesRequest) -> Result<Status> {
        Ok(self.client().create_namespaces(req).await?.into_inner())
    }

    async fn list_namespaces(
        &self,
        req: ListNamespacesRequest,
    ) -> Result<ListNamespacesResponse> {
        Ok(self.client().list_namespaces(req).await?.into_inner())
    }

    async fn delete_namespaces(&self, req: DeleteNamespacesRequest) -> Result<Status> {
        Ok(self.client().delete_namespaces(req).await?.into_inner())
    }

    async fn create_nodes(&self, req: CreateNodesRequest) -> Result<Status> {
        Ok(self.client().create_nodes(req).await?.into_inner())
    }

    async fn list_nodes(&self, req: ListNodesRequest) -> Result<ListNodesResponse> {
        Ok(self.client().list_nodes(req).await?.into_inner())
    }

    async fn delete_nodes(&self, req: DeleteNodesRequest) -> Result<Status> {
        Ok(self.client().delete_nodes(req).await?.into_inner())
    }

    async fn list_pod_recommendations(
        &self,
        req: ListPodRecommendationsRequest,
    ) -> Result<ListPodRecommendationsResponse> {
        Ok(self.client().list_pod_recommendations(req).await?.into_inner())
    }
}
