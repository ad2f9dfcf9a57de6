//! Datahub wire types and gRPC client.
//!
//! Hand-declared prost messages covering the subset of the Datahub service
//! the operator calls. No build-time code generation is involved.

use std::collections::BTreeMap;

use prost::Message;

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Kind {
    Undefined = 0,
    Deployment = 1,
    Deploymentconfig = 2,
    Statefulset = 3,
    Pod = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RecommendationPolicy {
    Undefined = 0,
    Stable = 1,
    Compact = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ScalingTool {
    Undefined = 0,
    None = 1,
    Vpa = 2,
    Hpa = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ResourceName {
    Undefined = 0,
    Cpu = 1,
    Memory = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MetricType {
    Undefined = 0,
    CpuUsageSecondsPercentage = 1,
    MemoryUsageBytes = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Order {
    None = 0,
    Asc = 1,
    Desc = 2,
}

/// `google.rpc.Code` OK.
pub const CODE_OK: i32 = 0;

// ── Common messages ───────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Message)]
pub struct ObjectMeta {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub namespace: String,
    #[prost(string, tag = "3")]
    pub node_name: String,
    #[prost(string, tag = "4")]
    pub cluster_name: String,
    #[prost(string, tag = "5")]
    pub uid: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResourceRequirements {
    /// Keyed by [`ResourceName`].
    #[prost(btree_map = "int32, string", tag = "1")]
    pub limits: BTreeMap<i32, String>,
    #[prost(btree_map = "int32, string", tag = "2")]
    pub requests: BTreeMap<i32, String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContainerStatus {
    #[prost(string, tag = "1")]
    pub state: String,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(int32, tag = "4")]
    pub restart_count: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Container {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub resources: Option<ResourceRequirements>,
    #[prost(message, optional, tag = "3")]
    pub status: Option<ContainerStatus>,
}

// ── Applications ──────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct AlamedaApplicationSpec {
    #[prost(enumeration = "ScalingTool", tag = "1")]
    pub scaling_tool: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Application {
    #[prost(message, optional, tag = "1")]
    pub object_meta: Option<ObjectMeta>,
    #[prost(message, optional, tag = "2")]
    pub alameda_application_spec: Option<AlamedaApplicationSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateApplicationsRequest {
    #[prost(message, repeated, tag = "1")]
    pub applications: Vec<Application>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListApplicationsRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListApplicationsResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, repeated, tag = "2")]
    pub applications: Vec<Application>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteApplicationsRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
}

// ── Controllers ───────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct AlamedaControllerSpec {
    #[prost(message, optional, tag = "1")]
    pub alameda_scaler: Option<ObjectMeta>,
    #[prost(enumeration = "RecommendationPolicy", tag = "2")]
    pub policy: i32,
    #[prost(bool, tag = "3")]
    pub enable_recommendation_execution: bool,
    #[prost(enumeration = "ScalingTool", tag = "4")]
    pub scaling_tool: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Controller {
    #[prost(message, optional, tag = "1")]
    pub object_meta: Option<ObjectMeta>,
    #[prost(enumeration = "Kind", tag = "2")]
    pub kind: i32,
    #[prost(int32, tag = "3")]
    pub replicas: i32,
    #[prost(int32, tag = "4")]
    pub spec_replicas: i32,
    #[prost(message, optional, tag = "5")]
    pub alameda_controller_spec: Option<AlamedaControllerSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateControllersRequest {
    #[prost(message, repeated, tag = "1")]
    pub controllers: Vec<Controller>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListControllersRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
    #[prost(enumeration = "Kind", tag = "2")]
    pub kind: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListControllersResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, repeated, tag = "2")]
    pub controllers: Vec<Controller>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteControllersRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
    #[prost(enumeration = "Kind", tag = "2")]
    pub kind: i32,
}

// ── Pods ──────────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct AlamedaPodSpec {
    #[prost(message, optional, tag = "1")]
    pub alameda_scaler: Option<ObjectMeta>,
    #[prost(enumeration = "RecommendationPolicy", tag = "2")]
    pub policy: i32,
    #[prost(enumeration = "ScalingTool", tag = "3")]
    pub scaling_tool: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct PodStatus {
    #[prost(string, tag = "1")]
    pub phase: String,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(string, tag = "3")]
    pub reason: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct TopController {
    #[prost(message, optional, tag = "1")]
    pub object_meta: Option<ObjectMeta>,
    #[prost(enumeration = "Kind", tag = "2")]
    pub kind: i32,
    #[prost(int32, tag = "3")]
    pub replicas: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Pod {
    #[prost(message, optional, tag = "1")]
    pub object_meta: Option<ObjectMeta>,
    #[prost(message, optional, tag = "2")]
    pub start_time: Option<prost_types::Timestamp>,
    #[prost(string, tag = "3")]
    pub resource_link: String,
    #[prost(message, repeated, tag = "4")]
    pub containers: Vec<Container>,
    #[prost(message, optional, tag = "5")]
    pub alameda_pod_spec: Option<AlamedaPodSpec>,
    #[prost(message, optional, tag = "6")]
    pub status: Option<PodStatus>,
    #[prost(message, optional, tag = "7")]
    pub top_controller: Option<TopController>,
    #[prost(string, tag = "8")]
    pub app_name: String,
    #[prost(string, tag = "9")]
    pub app_part_of: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreatePodsRequest {
    #[prost(message, repeated, tag = "1")]
    pub pods: Vec<Pod>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListPodsRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
    /// When set, only pods monitored by this scaler are returned.
    #[prost(message, optional, tag = "2")]
    pub alameda_scaler: Option<ObjectMeta>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListPodsResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, repeated, tag = "2")]
    pub pods: Vec<Pod>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeletePodsRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
}

// ── Namespaces ────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Namespace {
    #[prost(message, optional, tag = "1")]
    pub object_meta: Option<ObjectMeta>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateNamespacesRequest {
    #[prost(message, repeated, tag = "1")]
    pub namespaces: Vec<Namespace>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListNamespacesRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListNamespacesResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, repeated, tag = "2")]
    pub namespaces: Vec<Namespace>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteNamespacesRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Capacity {
    #[prost(int64, tag = "1")]
    pub cpu_cores: i64,
    #[prost(int64, tag = "2")]
    pub memory_bytes: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Provider {
    #[prost(string, tag = "1")]
    pub provider: String,
    #[prost(string, tag = "2")]
    pub instance_type: String,
    #[prost(string, tag = "3")]
    pub region: String,
    #[prost(string, tag = "4")]
    pub zone: String,
    #[prost(string, tag = "5")]
    pub os: String,
    #[prost(string, tag = "6")]
    pub role: String,
    #[prost(string, tag = "7")]
    pub instance_id: String,
    #[prost(int64, tag = "8")]
    pub storage_size: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct AlamedaNodeSpec {
    #[prost(message, optional, tag = "1")]
    pub provider: Option<Provider>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Node {
    #[prost(message, optional, tag = "1")]
    pub object_meta: Option<ObjectMeta>,
    #[prost(message, optional, tag = "2")]
    pub start_time: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub capacity: Option<Capacity>,
    #[prost(message, optional, tag = "4")]
    pub alameda_node_spec: Option<AlamedaNodeSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateNodesRequest {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<Node>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListNodesRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListNodesResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, repeated, tag = "2")]
    pub nodes: Vec<Node>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteNodesRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
}

// ── Recommendations ───────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct TimeRange {
    #[prost(message, optional, tag = "1")]
    pub start_time: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub end_time: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub step: Option<prost_types::Duration>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryCondition {
    #[prost(message, optional, tag = "1")]
    pub time_range: Option<TimeRange>,
    #[prost(enumeration = "Order", tag = "2")]
    pub order: i32,
    #[prost(uint64, tag = "3")]
    pub limit: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListPodRecommendationsRequest {
    #[prost(message, repeated, tag = "1")]
    pub object_meta: Vec<ObjectMeta>,
    #[prost(enumeration = "Kind", tag = "2")]
    pub kind: i32,
    #[prost(message, optional, tag = "3")]
    pub query_condition: Option<QueryCondition>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Sample {
    #[prost(message, optional, tag = "1")]
    pub time: Option<prost_types::Timestamp>,
    #[prost(string, tag = "2")]
    pub num_value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MetricData {
    #[prost(enumeration = "MetricType", tag = "1")]
    pub metric_type: i32,
    #[prost(message, repeated, tag = "2")]
    pub data: Vec<Sample>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContainerRecommendation {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub limit_recommendations: Vec<MetricData>,
    #[prost(message, repeated, tag = "3")]
    pub request_recommendations: Vec<MetricData>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PodRecommendation {
    #[prost(message, optional, tag = "1")]
    pub object_meta: Option<ObjectMeta>,
    #[prost(message, repeated, tag = "2")]
    pub container_recommendations: Vec<ContainerRecommendation>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListPodRecommendationsResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, repeated, tag = "2")]
    pub pod_recommendations: Vec<PodRecommendation>,
}

// ── Client ────────────────────────────────────────────────────────────────────

pub mod datahub_service_client {
    use super::*;
    use tonic::codegen::http;
    use tonic::transport::Channel;

    macro_rules! unary {
        ($($method:ident($req:ty) -> $resp:ty = $rpc:literal;)*) => {
            $(
                pub async fn $method(
                    &mut self,
                    request: impl tonic::IntoRequest<$req>,
                ) -> Result<tonic::Response<$resp>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {e}"),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(concat!(
                        "/containersai.alameda.v1alpha1.datahub.DatahubService/",
                        $rpc
                    ));
                    self.inner.unary(request.into_request(), path, codec).await
                }
            )*
        };
    }

    #[derive(Debug, Clone)]
    pub struct DatahubServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl DatahubServiceClient {
        pub fn new(channel: Channel) -> Self {
            let inner = tonic::client::Grpc::new(channel);
            Self { inner }
        }

        unary! {
            create_applications(CreateApplicationsRequest) -> Status = "CreateApplications";
            list_applications(ListApplicationsRequest) -> ListApplicationsResponse = "ListApplications";
            delete_applications(DeleteApplicationsRequest) -> Status = "DeleteApplications";
            create_controllers(CreateControllersRequest) -> Status = "CreateControllers";
            list_controllers(ListControllersRequest) -> ListControllersResponse = "ListControllers";
            delete_controllers(DeleteControllersRequest) -> Status = "DeleteControllers";
            create_pods(CreatePodsRequest) -> Status = "CreatePods";
            list_pods(ListPodsRequest) -> ListPodsResponse = "ListPods";
            delete_pods(DeletePodsRequest) -> Status = "DeletePods";
            create_namespaces(CreateNamespacesRequest) -> Status = "CreateNamespaces";
            list_namespaces(ListNamespacesRequest) -> ListNamespacesResponse = "ListNamespaces";
            delete_namespaces(DeleteNamespacesRequest) -> Status = "DeleteNamespaces";
            create_nodes(CreateNodesRequest) -> Status = "CreateNodes";
            list_nodes(ListNodesRequest) -> ListNodesResponse = "ListNodes";
            delete_nodes(DeleteNodesRequest) -> Status = "DeleteNodes";
            list_pod_recommendations(ListPodRecommendationsRequest) -> ListPodRecommendationsResponse = "ListPodRecommendations";
        }
    }
}
