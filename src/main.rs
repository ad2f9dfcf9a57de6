//! alameda-operator: mirrors AlamedaScaler-selected workloads into Datahub.
//!
//! Every controller runs as a concurrent tokio task within a single binary,
//! sharing a common Context.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::Either;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::events::Reporter;
use kube::{Api, Client, ResourceExt};
use tracing::info;
use warp::Filter;

use alameda_operator::cloud;
use alameda_operator::controller::{self, workload, Context};
use alameda_operator::crd::deployment_config::DeploymentConfig;
use alameda_operator::datahub::grpc::GrpcDatahub;
use alameda_operator::datahub::Datahub;
use alameda_operator::helpers::{split_list, OperatorSettings};
use alameda_operator::nodeinfo::ProviderDefaults;

#[derive(Parser, Debug)]
#[command(
    name = "alameda-operator",
    about = "Kubernetes operator mirroring AlamedaScaler workloads into Datahub"
)]
struct Args {
    /// Datahub gRPC address (host:port or URI).
    #[arg(
        long,
        default_value = "datahub.alameda.svc.cluster.local:50050",
        env = "ALAMEDA_OPERATOR_DATAHUB_ADDRESS"
    )]
    datahub_address: String,

    /// Deadline applied to every Datahub call, in seconds.
    #[arg(long, default_value = "30", env = "ALAMEDA_OPERATOR_DATAHUB_TIMEOUT_SECS")]
    datahub_timeout_secs: u64,

    /// Cluster name stamped on Datahub records. Defaults to the UID of the
    /// kube-system namespace.
    #[arg(long, default_value = "", env = "ALAMEDA_OPERATOR_CLUSTER_NAME")]
    cluster_name: String,

    /// Comma-separated namespaces never mirrored into Datahub.
    #[arg(
        long,
        default_value = "kube-system,kube-public,kube-node-lease",
        env = "ALAMEDA_OPERATOR_EXCLUDED_NAMESPACES"
    )]
    excluded_namespaces: String,

    /// Comma-separated regular expressions matching excluded namespaces.
    #[arg(
        long,
        default_value = "openshift-.*",
        env = "ALAMEDA_OPERATOR_EXCLUDED_NAMESPACE_PATTERNS"
    )]
    excluded_namespace_patterns: String,

    /// Namespace where the operator is deployed.
    #[arg(long, default_value = "alameda", env = "POD_NAMESPACE")]
    operator_namespace: String,

    /// Cloud provider recorded on nodes that do not report one.
    #[arg(long, default_value = "", env = "ALAMEDA_OPERATOR_CLOUD_PROVIDER")]
    cloud_provider: String,

    /// Region recorded on nodes that do not report one.
    #[arg(long, default_value = "", env = "ALAMEDA_OPERATOR_REGION")]
    region: String,

    /// Probe the instance-metadata endpoint for provider and region.
    #[arg(
        long,
        default_value = "true",
        action = clap::ArgAction::Set,
        env = "ALAMEDA_OPERATOR_PROBE_CLOUD_METADATA"
    )]
    probe_cloud_metadata: bool,

    /// Delay before the first scaler, namespace and recommendation reconcile.
    #[arg(long, default_value = "5", env = "ALAMEDA_OPERATOR_COLD_START_DELAY_SECS")]
    cold_start_delay_secs: u64,

    /// Requeue interval after a successful scaler or recommendation pass.
    #[arg(long, default_value = "600", env = "ALAMEDA_OPERATOR_RESYNC_INTERVAL_SECS")]
    resync_interval_secs: u64,

    /// Bind address for health probe endpoints (/healthz, /readyz).
    #[arg(long, default_value = ":8081", env = "HEALTH_PROBE_BIND_ADDRESS")]
    health_probe_bind_address: String,

    /// Log format: "text" for human-readable, "json" for structured.
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    log_format: String,
}

/// Cluster name: the configured value, else the kube-system namespace UID.
async fn resolve_cluster_name(client: &Client, configured: &str) -> anyhow::Result<String> {
    if !configured.is_empty() {
        return Ok(configured.to_string());
    }
    let ns = Api::<Namespace>::all(client.clone()).get("kube-system").await?;
    ns.uid()
        .ok_or_else(|| anyhow::anyhow!("kube-system namespace has no uid"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,kube=warn,hyper=warn,tower=warn,warp=warn,h2=warn".into());

    if args.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let settings = OperatorSettings {
        operator_namespace: args.operator_namespace,
        excluded_namespaces: split_list(&args.excluded_namespaces),
        excluded_namespace_patterns: OperatorSettings::compile_patterns(&split_list(
            &args.excluded_namespace_patterns,
        ))?,
        cloud_provider: args.cloud_provider,
        region: args.region,
        cold_start_delay: Duration::from_secs(args.cold_start_delay_secs),
        resync_interval: Duration::from_secs(args.resync_interval_secs),
    };

    let client = Client::try_default().await?;
    let cluster_name = resolve_cluster_name(&client, &args.cluster_name).await?;

    info!(
        datahub = %args.datahub_address,
        cluster = %cluster_name,
        ns = %settings.operator_namespace,
        "starting alameda-operator"
    );

    let datahub = GrpcDatahub::connect_lazy(
        &args.datahub_address,
        Duration::from_secs(args.datahub_timeout_secs),
    )?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let provider_defaults = cloud::resolve_provider_defaults(
        &http,
        ProviderDefaults {
            provider: settings.cloud_provider.clone(),
            region: settings.region.clone(),
        },
        args.probe_cloud_metadata,
    )
    .await;

    let ctx = Arc::new(Context::new(
        client.clone(),
        Datahub::new(Arc::new(datahub), cluster_name),
        settings,
        provider_defaults,
        Reporter {
            controller: "alameda-operator".into(),
            instance: std::env::var("POD_NAME").ok(),
        },
    ));

    // Parse health probe bind address (e.g. ":8081" or "0.0.0.0:8081").
    let health_addr: std::net::SocketAddr = args
        .health_probe_bind_address
        .strip_prefix(':')
        .map(|port| format!("0.0.0.0:{port}"))
        .unwrap_or(args.health_probe_bind_address)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid --health-probe-bind-address: {e}"))?;

    let healthz = warp::get()
        .and(warp::path("healthz"))
        .and(warp::path::end())
        .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));
    let readyz = warp::get()
        .and(warp::path("readyz"))
        .and(warp::path::end())
        .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));
    let health_routes = healthz.or(readyz);

    let deployment_configs = if ctx.deployment_configs_supported().await? {
        Either::Left(workload::run::<DeploymentConfig>(ctx.clone()))
    } else {
        info!("DeploymentConfig API not served, skipping its controller");
        Either::Right(futures::future::pending::<()>())
    };

    {
        let ctx = ctx.clone();
        tokio::spawn(async move { controller::startup_sync::run(&ctx).await });
    }

    tokio::select! {
        _ = controller::alameda_scaler::run(ctx.clone()) => {},
        _ = controller::alameda_recommendation::run(ctx.clone()) => {},
        _ = workload::run::<Deployment>(ctx.clone()) => {},
        _ = workload::run::<StatefulSet>(ctx.clone()) => {},
        _ = deployment_configs => {},
        _ = controller::namespace::run(ctx.clone()) => {},
        _ = controller::node::run(ctx.clone()) => {},
        _ = warp::serve(health_routes).run(health_addr) => {},
    }

    Ok(())
}
