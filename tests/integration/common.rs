//! Shared test harness and helpers for envtest-based integration tests.
//!
//! A single envtest server + the operator's controllers are shared across all
//! tests in this binary, wired to one in-memory Datahub. Each test gets its
//! own Kubernetes namespace for isolation, so tests can run in parallel.
//!
//! There is no kubelet, scheduler or controller-manager in envtest: ReplicaSets
//! and pods are created by hand with owner references, and pod phases are set
//! by patching the status subresource.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use envtest::Environment;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::runtime::events::Reporter;
use kube::{Client, Config, CustomResourceExt, ResourceExt};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use alameda_operator::controller::helpers::FIELD_MANAGER;
use alameda_operator::controller::{self, workload, Context};
use alameda_operator::crd::alameda_recommendation::AlamedaRecommendation;
use alameda_operator::crd::alameda_scaler::AlamedaScaler;
use alameda_operator::crd::deployment_config::DeploymentConfig;
use alameda_operator::datahub::memory::InMemoryDatahub;
use alameda_operator::datahub::Datahub;
use alameda_operator::helpers::OperatorSettings;
use alameda_operator::nodeinfo::ProviderDefaults;

pub const TIMEOUT: Duration = Duration::from_secs(30);
pub const POLL: Duration = Duration::from_millis(500);
pub const CLUSTER: &str = "envtest";
/// Namespaces named `<prefix>-N` are statically excluded.
pub const EXCLUDED_PREFIX: &str = "excluded";

/// Suffix of the next `test-N` namespace.
static NS_COUNTER: AtomicU32 = AtomicU32::new(0);

// ═══════════════════════════════════════════════════════════════════════════════
// Shared environment (one envtest server + controllers per test binary)
// ═══════════════════════════════════════════════════════════════════════════════

/// Holds the envtest server, a kube Client, the in-memory Datahub and the
/// tokio runtime that drives the controllers.  All live for the entire process.
struct SharedEnv {
    client: Client,
    datahub: Arc<InMemoryDatahub>,
    // The runtime keeps the controller tasks and kube HTTP connections alive
    // across individual `#[tokio::test]` runtimes.
    _runtime: tokio::runtime::Runtime,
    _server: envtest::Server,
}

// SAFETY: envtest::Server is just a String wrapper (kubeconfig), Send+Sync.
unsafe impl Send for SharedEnv {}
unsafe impl Sync for SharedEnv {}

/// Singleton, initialised on first use, never torn down (process exit cleans up).
static SHARED: OnceLock<SharedEnv> = OnceLock::new();

fn init_shared() -> SharedEnv {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn,alameda_operator=debug"))
        .try_init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build shared runtime");

    let (client, server) = rt.block_on(async {
        let mut env = Environment::default();
        let env = env
            .with_crds(vec![
                AlamedaScaler::crd(),
                AlamedaRecommendation::crd(),
                DeploymentConfig::crd(),
            ])
            .expect("failed to configure CRDs");

        let server = env.create().expect("failed to start envtest server");
        let kubeconfig = server.kubeconfig().expect("failed to get kubeconfig");
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .expect("failed to build config");
        let client = Client::try_from(config).expect("failed to create client");
        (client, server)
    });

    let datahub = Arc::new(InMemoryDatahub::new());
    let ctx = test_context(client.clone(), datahub.clone());

    // Spawn the controllers on the shared runtime so they outlive test runtimes.
    rt.spawn(controller::alameda_scaler::run(ctx.clone()));
    rt.spawn(controller::alameda_recommendation::run(ctx.clone()));
    rt.spawn(workload::run::<Deployment>(ctx.clone()));
    rt.spawn(workload::run::<StatefulSet>(ctx.clone()));
    rt.spawn(workload::run::<DeploymentConfig>(ctx.clone()));
    rt.spawn(controller::namespace::run(ctx));

    SharedEnv {
        client,
        datahub,
        _runtime: rt,
        _server: server,
    }
}

/// The shared environment, started on first use.
///
/// Startup happens on its own OS thread: `block_on` inside a `#[tokio::test]`
/// runtime would panic.
fn shared() -> &'static SharedEnv {
    SHARED.get_or_init(|| {
        std::thread::spawn(init_shared)
            .join()
            .expect("shared env init thread panicked")
    })
}

fn test_settings() -> OperatorSettings {
    OperatorSettings {
        operator_namespace: "alameda".into(),
        excluded_namespaces: vec!["kube-system".into(), "kube-public".into()],
        excluded_namespace_patterns: OperatorSettings::compile_patterns(&[format!(
            "{EXCLUDED_PREFIX}-.*"
        )])
        .expect("valid pattern"),
        cold_start_delay: Duration::ZERO,
        resync_interval: Duration::from_secs(2),
        ..Default::default()
    }
}

fn test_context(client: Client, datahub: Arc<InMemoryDatahub>) -> Arc<Context> {
    Arc::new(Context::new(
        client,
        Datahub::new(datahub, CLUSTER),
        test_settings(),
        ProviderDefaults::default(),
        Reporter {
            controller: "alameda-operator-test".into(),
            instance: None,
        },
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Per-test context
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-test context: owns a unique namespace and provides a kube Client and
/// the shared Datahub.
pub struct TestContext {
    pub client: Client,
    pub datahub: Arc<InMemoryDatahub>,
    pub ns: String,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_prefix("test").await
    }

    /// Like [`Self::new`], with the namespace named `<prefix>-N`.
    pub async fn with_prefix(prefix: &str) -> Self {
        let env = shared();
        let client = env.client.clone();

        let id = NS_COUNTER.fetch_add(1, Ordering::SeqCst);
        let ns = format!("{prefix}-{id}");

        let ns_api: Api<Namespace> = Api::all(client.clone());
        let ns_obj: Namespace = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": &ns }
        }))
        .unwrap();
        ns_api
            .create(&PostParams::default(), &ns_obj)
            .await
            .expect("failed to create test namespace");

        Self {
            client,
            datahub: env.datahub.clone(),
            ns,
        }
    }

    pub fn scalers(&self) -> Api<AlamedaScaler> {
        Api::namespaced(self.client.clone(), &self.ns)
    }

    pub fn recommendations(&self) -> Api<AlamedaRecommendation> {
        Api::namespaced(self.client.clone(), &self.ns)
    }

    pub fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.ns)
    }

    pub fn deployment_configs(&self) -> Api<DeploymentConfig> {
        Api::namespaced(self.client.clone(), &self.ns)
    }

    /// A Datahub client bound to the shared in-memory store.
    pub fn datahub_client(&self) -> Datahub {
        Datahub::new(self.datahub.clone(), CLUSTER)
    }

    /// Names of the Datahub pod records in this test's namespace.
    pub fn recorded_pods(&self) -> Vec<String> {
        self.datahub
            .pods()
            .into_iter()
            .filter_map(|p| p.object_meta)
            .filter(|m| m.namespace == self.ns)
            .map(|m| m.name)
            .collect()
    }

    /// Names of the Datahub controller records in this test's namespace.
    pub fn recorded_controllers(&self) -> Vec<String> {
        self.datahub
            .controllers()
            .into_iter()
            .filter_map(|c| c.object_meta)
            .filter(|m| m.namespace == self.ns)
            .map(|m| m.name)
            .collect()
    }

    /// Names of the Datahub application records in this test's namespace.
    pub fn recorded_applications(&self) -> Vec<String> {
        self.datahub
            .applications()
            .into_iter()
            .filter_map(|a| a.object_meta)
            .filter(|m| m.namespace == self.ns)
            .map(|m| m.name)
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Poll `check` every `interval` until it holds; false after `timeout`.
pub async fn wait_for<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    loop {
        if check().await {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Create an AlamedaScaler selecting `app=<app>`.
pub async fn create_scaler(ctx: &TestContext, name: &str, app: &str) -> AlamedaScaler {
    let scaler: AlamedaScaler = serde_json::from_value(json!({
        "apiVersion": "autoscaling.containers.ai/v1alpha1",
        "kind": "AlamedaScaler",
        "metadata": { "name": name, "namespace": &ctx.ns },
        "spec": { "selector": { "matchLabels": { "app": app } } }
    }))
    .unwrap();
    ctx.scalers()
        .create(&PostParams::default(), &scaler)
        .await
        .expect("failed to create AlamedaScaler")
}

/// Create a Deployment labelled and selecting `app=<app>`.
pub async fn create_deployment(ctx: &TestContext, name: &str, app: &str, replicas: i32) -> Deployment {
    let deployment: Deployment = serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": &ctx.ns, "labels": { "app": app } },
        "spec": {
            "replicas": replicas,
            "selector": { "matchLabels": { "app": app } },
            "template": {
                "metadata": { "labels": { "app": app } },
                "spec": { "containers": [{ "name": "app", "image": "nginx" }] }
            }
        }
    }))
    .unwrap();
    ctx.deployments()
        .create(&PostParams::default(), &deployment)
        .await
        .expect("failed to create Deployment")
}

/// Create the ReplicaSet a Deployment would own, named `<deployment>-<hash>`.
pub async fn create_replica_set(ctx: &TestContext, deployment: &Deployment, hash: &str) -> ReplicaSet {
    let name = format!("{}-{hash}", deployment.name_any());
    let labels = deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_default();
    let rs: ReplicaSet = serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "ReplicaSet",
        "metadata": {
            "name": &name,
            "namespace": &ctx.ns,
            "labels": &labels,
            "ownerReferences": [{
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "name": deployment.name_any(),
                "uid": deployment.uid().unwrap_or_default(),
                "controller": true
            }]
        },
        "spec": {
            "replicas": deployment.spec.as_ref().and_then(|s| s.replicas),
            "selector": { "matchLabels": &labels },
            "template": {
                "metadata": { "labels": &labels },
                "spec": { "containers": [{ "name": "app", "image": "nginx" }] }
            }
        }
    }))
    .unwrap();
    Api::<ReplicaSet>::namespaced(ctx.client.clone(), &ctx.ns)
        .create(&PostParams::default(), &rs)
        .await
        .expect("failed to create ReplicaSet")
}

/// Create a pod owned by `rs` and mark it Running.
pub async fn create_running_pod(ctx: &TestContext, rs: &ReplicaSet, suffix: &str) -> Pod {
    let name = format!("{}-{suffix}", rs.name_any());
    let labels = rs.labels().clone();
    let pod: Pod = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": &name,
            "namespace": &ctx.ns,
            "labels": labels,
            "ownerReferences": [{
                "apiVersion": "apps/v1",
                "kind": "ReplicaSet",
                "name": rs.name_any(),
                "uid": rs.uid().unwrap_or_default(),
                "controller": true
            }]
        },
        "spec": { "containers": [{ "name": "app", "image": "nginx" }] }
    }))
    .unwrap();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ctx.ns);
    pods.create(&PostParams::default(), &pod)
        .await
        .expect("failed to create Pod");
    set_pod_phase(ctx, &name, "Running").await;
    pods.get(&name).await.expect("pod vanished")
}

/// Patch a pod's status phase (envtest has no kubelet).
pub async fn set_pod_phase(ctx: &TestContext, name: &str, phase: &str) {
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &ctx.ns);
    let patch = json!({ "status": { "phase": phase } });
    pods.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
        .expect("failed to patch pod status");
}

/// Wait until the scaler's status lists exactly these pods (sorted names).
pub async fn wait_for_status_pods(ctx: &TestContext, scaler: &str, expected: &[&str]) -> bool {
    let api = ctx.scalers();
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    wait_for(TIMEOUT, POLL, || {
        let api = api.clone();
        let expected = expected.clone();
        let scaler = scaler.to_string();
        async move {
            let Ok(s) = api.get_status(&scaler).await else {
                return false;
            };
            let mut pods: Vec<String> = s
                .alameda_controller()
                .map(|c| c.pods().map(|(_, _, p)| p.name.clone()).collect())
                .unwrap_or_default();
            pods.sort();
            pods == expected
        }
    })
    .await
}

/// Wait until the Datahub holds exactly these pod records in the namespace.
pub async fn wait_for_recorded_pods(ctx: &TestContext, expected: &[&str]) -> bool {
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    wait_for(TIMEOUT, POLL, || {
        let mut pods = ctx.recorded_pods();
        pods.sort();
        let matched = pods == expected;
        async move { matched }
    })
    .await
}
