use std::time::Duration;

use kube::api::DeleteParams;
use kube::ResourceExt;

use super::common::*;
use alameda_operator::crd::alameda_scaler::ScalingToolType;
use alameda_operator::datahub::proto::Namespace as NamespaceRecord;

/// A new scaler gets its spec defaults, then lists the matched deployment's
/// running pod and mirrors application, controller and pod into Datahub.
#[tokio::test]
async fn scaler_mirrors_matched_deployment() {
    let ctx = TestContext::new().await;

    let deployment = create_deployment(&ctx, "web", "web", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "5d9f8").await;
    let pod = create_running_pod(&ctx, &rs, "abcde").await;
    create_scaler(&ctx, "front", "web").await;

    assert!(
        wait_for_status_pods(&ctx, "front", &[&pod.name_any()]).await,
        "expected the running pod in scaler status"
    );

    let scaler = ctx.scalers().get("front").await.unwrap();
    assert_eq!(scaler.scaling_tool(), ScalingToolType::Hpa);
    let status = scaler.alameda_controller().unwrap();
    let web = &status.deployments[&format!("{}/web", ctx.ns)];
    assert_eq!(web.spec_replicas, 1);
    assert_eq!(web.uid, deployment.uid().unwrap());

    assert!(
        wait_for_recorded_pods(&ctx, &[&pod.name_any()]).await,
        "expected the pod record in Datahub"
    );
    assert_eq!(ctx.recorded_controllers(), vec!["web".to_string()]);
    assert_eq!(ctx.recorded_applications(), vec!["front".to_string()]);

    let record = ctx
        .datahub
        .pods()
        .into_iter()
        .find(|p| p.object_meta.as_ref().is_some_and(|m| m.namespace == ctx.ns))
        .unwrap();
    assert_eq!(
        record.resource_link,
        format!("/namespaces/{}/deployments/web/replicasets/web-5d9f8/pods/web-5d9f8-abcde", ctx.ns)
    );
}

/// A pod that reaches a terminal phase leaves status and Datahub.
#[tokio::test]
async fn finished_pod_is_dropped() {
    let ctx = TestContext::new().await;

    let deployment = create_deployment(&ctx, "api", "api", 2).await;
    let rs = create_replica_set(&ctx, &deployment, "7c4b2").await;
    let keep = create_running_pod(&ctx, &rs, "aaaaa").await;
    let done = create_running_pod(&ctx, &rs, "bbbbb").await;
    create_scaler(&ctx, "back", "api").await;

    assert!(wait_for_status_pods(&ctx, "back", &[&keep.name_any(), &done.name_any()]).await);
    assert!(wait_for_recorded_pods(&ctx, &[&keep.name_any(), &done.name_any()]).await);

    set_pod_phase(&ctx, &done.name_any(), "Succeeded").await;

    assert!(
        wait_for_status_pods(&ctx, "back", &[&keep.name_any()]).await,
        "expected the finished pod to leave status"
    );
    assert!(
        wait_for_recorded_pods(&ctx, &[&keep.name_any()]).await,
        "expected the finished pod record to be deleted"
    );
}

/// A scaler whose selector matches nothing writes an empty status and
/// mirrors only the application.
#[tokio::test]
async fn unmatched_selector_monitors_nothing() {
    let ctx = TestContext::new().await;
    let deployment = create_deployment(&ctx, "web", "web", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "5d9f8").await;
    create_running_pod(&ctx, &rs, "abcde").await;
    create_scaler(&ctx, "other", "does-not-exist").await;

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let api = ctx.scalers();
            async move { api.get_status("other").await.is_ok_and(|s| s.status.is_some()) }
        })
        .await,
        "expected a status write"
    );
    assert!(wait_for_status_pods(&ctx, "other", &[]).await);
    assert!(ctx.recorded_controllers().is_empty());
    assert!(ctx.recorded_pods().is_empty());
}

/// Deleting the scaler runs the Datahub cleanup before the object goes away.
#[tokio::test]
async fn deleted_scaler_cleans_datahub() {
    let ctx = TestContext::new().await;

    let deployment = create_deployment(&ctx, "web", "web", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "5d9f8").await;
    let pod = create_running_pod(&ctx, &rs, "abcde").await;
    create_scaler(&ctx, "front", "web").await;
    assert!(wait_for_recorded_pods(&ctx, &[&pod.name_any()]).await);

    ctx.scalers()
        .delete("front", &DeleteParams::default())
        .await
        .unwrap();

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let api = ctx.scalers();
            async move { api.get_opt("front").await.is_ok_and(|s| s.is_none()) }
        })
        .await,
        "expected the finalizer to be released"
    );
    assert!(ctx.recorded_pods().is_empty());
    assert!(ctx.recorded_controllers().is_empty());
    assert!(ctx.recorded_applications().is_empty());
}

/// Once records match the cluster, periodic resyncs issue no Datahub writes.
#[tokio::test]
async fn converged_scaler_stops_writing() {
    let ctx = TestContext::new().await;

    let deployment = create_deployment(&ctx, "cart", "cart", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "9f6c1").await;
    let pod = create_running_pod(&ctx, &rs, "zzzzz").await;
    create_scaler(&ctx, "steady", "cart").await;

    assert!(wait_for_status_pods(&ctx, "steady", &[&pod.name_any()]).await);
    assert!(wait_for_recorded_pods(&ctx, &[&pod.name_any()]).await);

    // Let in-flight reconciles settle before taking the baseline.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let baseline = ctx.datahub.mutations_in(&ctx.ns).len();
    let records = ctx.recorded_pods();

    tokio::time::sleep(Duration::from_secs(6)).await;
    let writes = ctx.datahub.mutations_in(&ctx.ns);
    assert!(
        writes[baseline..].is_empty(),
        "expected no writes across resyncs, got {:?}",
        &writes[baseline..]
    );
    assert_eq!(ctx.recorded_pods(), records);
}

/// In a statically excluded namespace, deleting the scaler whose
/// application kept it mirrored also drops the namespace record.
#[tokio::test]
async fn deleted_scaler_in_excluded_namespace_drops_namespace_record() {
    let ctx = TestContext::with_prefix(EXCLUDED_PREFIX).await;
    create_scaler(&ctx, "front", "web").await;
    assert!(
        wait_for(TIMEOUT, POLL, || {
            let recorded = ctx.recorded_applications() == vec!["front".to_string()];
            async move { recorded }
        })
        .await,
        "expected the application record"
    );

    // Hosting an application makes the namespace mirrored.
    ctx.datahub_client()
        .namespaces
        .create_namespaces(vec![NamespaceRecord::from_name(CLUSTER, &ctx.ns)])
        .await
        .unwrap();

    ctx.scalers()
        .delete("front", &DeleteParams::default())
        .await
        .unwrap();

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let gone = !ctx.datahub.namespaces().iter().any(|n| n.name() == ctx.ns);
            async move { gone }
        })
        .await,
        "expected the excluded namespace record to be removed"
    );
    assert!(ctx.recorded_applications().is_empty());
}

/// While Datahub rejects writes for the namespace, status is still written
/// and the reconcile requeues; once the store recovers, the records appear.
#[tokio::test]
async fn scaler_converges_after_store_recovers() {
    let ctx = TestContext::new().await;
    ctx.datahub
        .fail_namespace_with(&ctx.ns, 14, "datahub unavailable");

    let deployment = create_deployment(&ctx, "shop", "shop", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "4b7d2").await;
    let pod = create_running_pod(&ctx, &rs, "qqqqq").await;
    create_scaler(&ctx, "flaky", "shop").await;

    assert!(wait_for_status_pods(&ctx, "flaky", &[&pod.name_any()]).await);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(ctx.recorded_applications().is_empty());
    assert!(ctx.recorded_pods().is_empty());

    ctx.datahub.recover_namespace(&ctx.ns);

    assert!(
        wait_for_recorded_pods(&ctx, &[&pod.name_any()]).await,
        "expected the pod record after recovery"
    );
    assert_eq!(ctx.recorded_controllers(), vec!["shop".to_string()]);
    assert_eq!(ctx.recorded_applications(), vec!["flaky".to_string()]);
}
