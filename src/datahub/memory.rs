//! In-memory Datahub used by tests and local runs without a Datahub.
//!
//! Records are upserted by identity, list filters follow Datahub's
//! "every non-empty field must match" rule, and every mutating call is logged
//! so tests can assert how many writes a reconcile issued.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::proto::*;
use super::DatahubService;
use crate::error::Result;

type Key = (String, String, String);

#[derive(Default)]
struct State {
    applications: BTreeMap<Key, Application>,
    controllers: BTreeMap<(i32, Key), Controller>,
    pods: BTreeMap<Key, Pod>,
    namespaces: BTreeMap<Key, Namespace>,
    nodes: BTreeMap<Key, Node>,
    pod_recommendations: Vec<PodRecommendation>,
    mutations: Vec<(&'static str, Vec<String>)>,
    failure: Option<Status>,
    namespace_failures: BTreeMap<String, Status>,
}

#[derive(Default)]
pub struct InMemoryDatahub {
    state: Mutex<State>,
}

fn key(meta: Option<&ObjectMeta>) -> Key {
    let m = meta.cloned().unwrap_or_default();
    (m.cluster_name, m.namespace, m.name)
}

/// Every non-empty field of `filter` must equal the record's field.
fn selects(filter: &ObjectMeta, meta: Option<&ObjectMeta>) -> bool {
    let Some(meta) = meta else {
        return false;
    };
    let eq = |f: &str, v: &str| f.is_empty() || f == v;
    eq(&filter.cluster_name, &meta.cluster_name)
        && eq(&filter.namespace, &meta.namespace)
        && eq(&filter.name, &meta.name)
        && eq(&filter.node_name, &meta.node_name)
        && eq(&filter.uid, &meta.uid)
}

/// An empty filter list selects everything.
fn selects_any(filters: &[ObjectMeta], meta: Option<&ObjectMeta>) -> bool {
    filters.is_empty() || filters.iter().any(|f| selects(f, meta))
}

fn ok() -> Status {
    Status::default()
}

impl InMemoryDatahub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer every subsequent call with this status until [`Self::recover`].
    pub fn fail_with(&self, code: i32, message: &str) {
        self.lock().failure = Some(Status {
            code,
            message: message.to_string(),
        });
    }

    /// Fail only the mutations that touch a record in `namespace`.
    pub fn fail_namespace_with(&self, namespace: &str, code: i32, message: &str) {
        self.lock().namespace_failures.insert(
            namespace.to_string(),
            Status {
                code,
                message: message.to_string(),
            },
        );
    }

    pub fn recover(&self) {
        let mut state = self.lock();
        state.failure = None;
        state.namespace_failures.clear();
    }

    pub fn recover_namespace(&self, namespace: &str) {
        self.lock().namespace_failures.remove(namespace);
    }

    /// Queue a pod recommendation; later pushes are treated as newer.
    pub fn push_pod_recommendation(&self, rec: PodRecommendation) {
        self.lock().pod_recommendations.push(rec);
    }

    /// Names of the mutating RPCs received so far, in order.
    pub fn mutations(&self) -> Vec<&'static str> {
        self.lock().mutations.iter().map(|(rpc, _)| *rpc).collect()
    }

    /// Mutating RPCs that touched a record in `namespace`.
    pub fn mutations_in(&self, namespace: &str) -> Vec<&'static str> {
        self.lock()
            .mutations
            .iter()
            .filter(|(_, namespaces)| namespaces.iter().any(|n| n == namespace))
            .map(|(rpc, _)| *rpc)
            .collect()
    }

    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    pub fn applications(&self) -> Vec<Application> {
        self.lock().applications.values().cloned().collect()
    }

    pub fn controllers(&self) -> Vec<Controller> {
        self.lock().controllers.values().cloned().collect()
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.lock().pods.values().cloned().collect()
    }

    pub fn namespaces(&self) -> Vec<Namespace> {
        self.lock().namespaces.values().cloned().collect()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.lock().nodes.values().cloned().collect()
    }

    /// Returns the injected failure, or records the mutation.
    fn mutate<'a>(
        &self,
        rpc: &'static str,
        metas: impl Iterator<Item = Option<&'a ObjectMeta>>,
    ) -> std::result::Result<MutexGuard<'_, State>, Status> {
        let mut state = self.lock();
        if let Some(status) = state.failure.clone() {
            return Err(status);
        }
        let namespaces: Vec<String> = metas.flatten().map(|m| m.namespace.clone()).collect();
        if let Some(status) = namespaces
            .iter()
            .find_map(|n| state.namespace_failures.get(n).cloned())
        {
            return Err(status);
        }
        state.mutations.push((rpc, namespaces));
        Ok(state)
    }

    fn read(&self) -> std::result::Result<MutexGuard<'_, State>, Status> {
        let state = self.lock();
        match state.failure.clone() {
            Some(status) => Err(status),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl DatahubService for InMemoryDatahub {
    async fn create_applications(&self, req: CreateApplicationsRequest) -> Result<Status> {
        let metas = req.applications.iter().map(|a| a.object_meta.as_ref());
        let mut state = match self.mutate("CreateApplications", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for app in req.applications {
            state.applications.insert(key(app.object_meta.as_ref()), app);
        }
        Ok(ok())
    }

    async fn list_applications(
        &self,
        req: ListApplicationsRequest,
    ) -> Result<ListApplicationsResponse> {
        let state = match self.read() {
            Ok(s) => s,
            Err(status) => {
                return Ok(ListApplicationsResponse {
                    status: Some(status),
                    ..Default::default()
                })
            }
        };
        let applications = state
            .applications
            .values()
            .filter(|a| selects_any(&req.object_meta, a.object_meta.as_ref()))
            .cloned()
            .collect();
        Ok(ListApplicationsResponse {
            status: Some(ok()),
            applications,
        })
    }

    async fn delete_applications(&self, req: DeleteApplicationsRequest) -> Result<Status> {
        let metas = req.object_meta.iter().map(Some);
        let mut state = match self.mutate("DeleteApplications", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for meta in &req.object_meta {
            state
                .applications
                .retain(|_, a| !selects(meta, a.object_meta.as_ref()));
        }
        Ok(ok())
    }

    async fn create_controllers(&self, req: CreateControllersRequest) -> Result<Status> {
        let metas = req.controllers.iter().map(|c| c.object_meta.as_ref());
        let mut state = match self.mutate("CreateControllers", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for c in req.controllers {
            state
                .controllers
                .insert((c.kind, key(c.object_meta.as_ref())), c);
        }
        Ok(ok())
    }

    async fn list_controllers(
        &self,
        req: ListControllersRequest,
    ) -> Result<ListControllersResponse> {
        let state = match self.read() {
            Ok(s) => s,
            Err(status) => {
                return Ok(ListControllersResponse {
                    status: Some(status),
                    ..Default::default()
                })
            }
        };
        let controllers = state
            .controllers
            .values()
            .filter(|c| req.kind == Kind::Undefined as i32 || c.kind == req.kind)
            .filter(|c| selects_any(&req.object_meta, c.object_meta.as_ref()))
            .cloned()
            .collect();
        Ok(ListControllersResponse {
            status: Some(ok()),
            controllers,
        })
    }

    async fn delete_controllers(&self, req: DeleteControllersRequest) -> Result<Status> {
        let metas = req.object_meta.iter().map(Some);
        let mut state = match self.mutate("DeleteControllers", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for meta in &req.object_meta {
            state
                .controllers
                .retain(|(kind, _), c| *kind != req.kind || !selects(meta, c.object_meta.as_ref()));
        }
        Ok(ok())
    }

    async fn create_pods(&self, req: CreatePodsRequest) -> Result<Status> {
        let metas = req.pods.iter().map(|p| p.object_meta.as_ref());
        let mut state = match self.mutate("CreatePods", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for pod in req.pods {
            state.pods.insert(key(pod.object_meta.as_ref()), pod);
        }
        Ok(ok())
    }

    async fn list_pods(&self, req: ListPodsRequest) -> Result<ListPodsResponse> {
        let state = match self.read() {
            Ok(s) => s,
            Err(status) => {
                return Ok(ListPodsResponse {
                    status: Some(status),
                    ..Default::default()
                })
            }
        };
        let pods = state
            .pods
            .values()
            .filter(|p| selects_any(&req.object_meta, p.object_meta.as_ref()))
            .filter(|p| match &req.alameda_scaler {
                Some(scaler) => selects(
                    scaler,
                    p.alameda_pod_spec
                        .as_ref()
                        .and_then(|s| s.alameda_scaler.as_ref()),
                ),
                None => true,
            })
            .cloned()
            .collect();
        Ok(ListPodsResponse {
            status: Some(ok()),
            pods,
        })
    }

    async fn delete_pods(&self, req: DeletePodsRequest) -> Result<Status> {
        let metas = req.object_meta.iter().map(Some);
        let mut state = match self.mutate("DeletePods", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for meta in &req.object_meta {
            state.pods.retain(|_, p| !selects(meta, p.object_meta.as_ref()));
        }
        Ok(ok())
    }

    async fn create_namespaces(&self, req: CreateNamespacesRequest) -> Result<Status> {
        let metas = req.namespaces.iter().map(|n| n.object_meta.as_ref());
        let mut state = match self.mutate("CreateNamespaces", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for ns in req.namespaces {
            state.namespaces.insert(key(ns.object_meta.as_ref()), ns);
        }
        Ok(ok())
    }

    async fn list_namespaces(
        &self,
        req: ListNamespacesRequest,
    ) -> Result<ListNamespacesResponse> {
        let state = match self.read() {
            Ok(s) => s,
            Err(status) => {
                return Ok(ListNamespacesResponse {
                    status: Some(status),
                    ..Default::default()
                })
            }
        };
        let namespaces = state
            .namespaces
            .values()
            .filter(|n| selects_any(&req.object_meta, n.object_meta.as_ref()))
            .cloned()
            .collect();
        Ok(ListNamespacesResponse {
            status: Some(ok()),
            namespaces,
        })
    }

    async fn delete_namespaces(&self, req: DeleteNamespacesRequest) -> Result<Status> {
        let metas = req.object_meta.iter().map(Some);
        let mut state = match self.mutate("DeleteNamespaces", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for meta in &req.object_meta {
            state
                .namespaces
                .retain(|_, n| !selects(meta, n.object_meta.as_ref()));
        }
        Ok(ok())
    }

    async fn create_nodes(&self, req: CreateNodesRequest) -> Result<Status> {
        let metas = req.nodes.iter().map(|n| n.object_meta.as_ref());
        let mut state = match self.mutate("CreateNodes", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for node in req.nodes {
            state.nodes.insert(key(node.object_meta.as_ref()), node);
        }
        Ok(ok())
    }

    async fn list_nodes(&self, req: ListNodesRequest) -> Result<ListNodesResponse> {
        let state = match self.read() {
            Ok(s) => s,
            Err(status) => {
                return Ok(ListNodesResponse {
                    status: Some(status),
                    ..Default::default()
                })
            }
        };
        let nodes = state
            .nodes
            .values()
            .filter(|n| selects_any(&req.object_meta, n.object_meta.as_ref()))
            .cloned()
            .collect();
        Ok(ListNodesResponse {
            status: Some(ok()),
            nodes,
        })
    }

    async fn delete_nodes(&self, req: DeleteNodesRequest) -> Result<Status> {
        let metas = req.object_meta.iter().map(Some);
        let mut state = match self.mutate("DeleteNodes", metas) {
            Ok(s) => s,
            Err(status) => return Ok(status),
        };
        for meta in &req.object_meta {
            state.nodes.retain(|_, n| !selects(meta, n.object_meta.as_ref()));
        }
        Ok(ok())
    }

    async fn list_pod_recommendations(
        &self,
        req: ListPodRecommendationsRequest,
    ) -> Result<ListPodRecommendationsResponse> {
        let state = match self.read() {
            Ok(s) => s,
            Err(status) => {
                return Ok(ListPodRecommendationsResponse {
                    status: Some(status),
                    ..Default::default()
                })
            }
        };
        let condition = req.query_condition.unwrap_or_default();
        let mut matched: Vec<PodRecommendation> = state
            .pod_recommendations
            .iter()
            .filter(|r| selects_any(&req.object_meta, r.object_meta.as_ref()))
            .cloned()
            .collect();
        if condition.order == Order::Desc as i32 {
            matched.reverse();
        }
        if condition.limit > 0 {
            matched.truncate(condition.limit as usize);
        }
        Ok(ListPodRecommendationsResponse {
            status: Some(ok()),
            pod_recommendations: matched,
        })
    }
}
