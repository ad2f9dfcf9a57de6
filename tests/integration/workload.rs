use std::time::Duration;

use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use serde_json::json;

use super::common::*;
use alameda_operator::controller::helpers::{FIELD_MANAGER, LAST_MONITOR_ANNOTATION};
use alameda_operator::crd::alameda_scaler::{
    AlamedaResource, AlamedaScaler, AlamedaScalerSpec, ControllerKind,
};
use alameda_operator::crd::deployment_config::{DeploymentConfig, DeploymentConfigSpec};
use alameda_operator::datahub::proto::Controller;

async fn wait_for_last_monitor(ctx: &TestContext, deployment: &str, expected: Option<&str>) -> bool {
    wait_for(TIMEOUT, POLL, || {
        let api = ctx.deployments();
        let name = deployment.to_string();
        let expected = expected.map(str::to_string);
        async move {
            api.get(&name).await.is_ok_and(|d| {
                d.annotations().get(LAST_MONITOR_ANNOTATION).cloned() == expected
            })
        }
    })
    .await
}

async fn wait_for_status_claim(ctx: &TestContext, scaler: &str, key: &str, claimed: bool) -> bool {
    wait_for(TIMEOUT, POLL, || {
        let api = ctx.scalers();
        let scaler = scaler.to_string();
        let key = key.to_string();
        async move {
            api.get_status(&scaler).await.is_ok_and(|s| {
                s.alameda_controller()
                    .is_some_and(|c| c.deployments.contains_key(&key))
                    == claimed
            })
        }
    })
    .await
}

async fn custom_resource_version(ctx: &TestContext, scaler: &str) -> Option<String> {
    ctx.scalers()
        .get(scaler)
        .await
        .ok()
        .and_then(|s| s.spec.custom_resource_version)
}

/// A deployment matched by a scaler is annotated with it, and the scaler is
/// woken by bumping its customResourceVersion.
#[tokio::test]
async fn matched_deployment_records_last_monitor() {
    let ctx = TestContext::new().await;
    create_scaler(&ctx, "front", "web").await;
    create_deployment(&ctx, "web", "web", 1).await;

    assert!(
        wait_for_last_monitor(&ctx, "web", Some("front")).await,
        "expected the last-monitor annotation"
    );
    assert!(custom_resource_version(&ctx, "front").await.is_some());
}

/// Relabelling a deployment away from its scaler wakes that scaler, which
/// then stops listing the deployment and drops its controller record.
#[tokio::test]
async fn relabelled_deployment_wakes_claiming_scaler() {
    let ctx = TestContext::new().await;
    create_scaler(&ctx, "front", "web").await;
    create_deployment(&ctx, "web", "web", 1).await;
    assert!(wait_for_last_monitor(&ctx, "web", Some("front")).await);
    let key = format!("{}/web", ctx.ns);
    assert!(
        wait_for_status_claim(&ctx, "front", &key, true).await,
        "expected the scaler to list the deployment"
    );
    assert!(
        wait_for(TIMEOUT, POLL, || {
            let recorded = ctx.recorded_controllers() == vec!["web".to_string()];
            async move { recorded }
        })
        .await,
        "expected the controller record"
    );

    // Let wakes from the annotation write land before the baseline.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let before = custom_resource_version(&ctx, "front").await;
    let patch = json!({ "metadata": { "labels": { "app": "other" } } });
    ctx.deployments()
        .patch("web", &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
        .unwrap();

    assert!(
        wait_for_status_claim(&ctx, "front", &key, false).await,
        "expected the scaler to drop the relabelled deployment"
    );
    let after = custom_resource_version(&ctx, "front").await;
    assert_ne!(before, after, "expected the scaler to be woken");

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let empty = ctx.recorded_controllers().is_empty();
            async move { empty }
        })
        .await,
        "expected the controller record linked to the scaler to be removed"
    );
    assert!(
        wait_for_last_monitor(&ctx, "web", None).await,
        "expected the annotation to stop naming a scaler that dropped the deployment"
    );
}

/// Moving a deployment from one scaler's selector to another's wakes both,
/// moves the status entry and repoints the last-monitor annotation.
#[tokio::test]
async fn relabelled_deployment_moves_to_new_scaler() {
    let ctx = TestContext::new().await;
    create_scaler(&ctx, "s1", "web").await;
    create_scaler(&ctx, "s2", "api").await;
    create_deployment(&ctx, "web", "web", 1).await;
    assert!(wait_for_last_monitor(&ctx, "web", Some("s1")).await);
    let key = format!("{}/web", ctx.ns);
    assert!(wait_for_status_claim(&ctx, "s1", &key, true).await);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let before = custom_resource_version(&ctx, "s1").await;
    let patch = json!({ "metadata": { "labels": { "app": "api" } } });
    ctx.deployments()
        .patch("web", &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
        .unwrap();

    assert!(
        wait_for_last_monitor(&ctx, "web", Some("s2")).await,
        "expected the annotation to name the new scaler"
    );
    assert_ne!(
        before,
        custom_resource_version(&ctx, "s1").await,
        "expected the previous scaler to be woken"
    );
    assert!(
        wait_for_status_claim(&ctx, "s1", &key, false).await,
        "expected the previous scaler to drop the deployment"
    );
    assert!(
        wait_for_status_claim(&ctx, "s2", &key, true).await,
        "expected the new scaler to list the deployment"
    );
}

/// A deleted deployment drops its Datahub controller record.
#[tokio::test]
async fn deleted_deployment_drops_controller_record() {
    let ctx = TestContext::new().await;
    let deployment = create_deployment(&ctx, "web", "web", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "5d9f8").await;
    let pod = create_running_pod(&ctx, &rs, "abcde").await;
    create_scaler(&ctx, "front", "web").await;
    assert!(wait_for_recorded_pods(&ctx, &[&pod.name_any()]).await);
    assert_eq!(ctx.recorded_controllers(), vec!["web".to_string()]);

    ctx.deployments()
        .delete("web", &DeleteParams::default())
        .await
        .unwrap();

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let empty = ctx.recorded_controllers().is_empty();
            async move { empty }
        })
        .await,
        "expected the controller record to be deleted"
    );
}

/// A deleted DeploymentConfig drops its Datahub controller record just like
/// the other workload kinds.
#[tokio::test]
async fn deleted_deployment_config_drops_controller_record() {
    let ctx = TestContext::new().await;
    let mut owner = AlamedaScaler::new("front", AlamedaScalerSpec::default());
    owner.metadata.namespace = Some(ctx.ns.clone());
    let resource = AlamedaResource {
        namespace: ctx.ns.clone(),
        name: "legacy".into(),
        uid: "legacy-uid".into(),
        spec_replicas: 1,
        ..Default::default()
    };
    ctx.datahub_client()
        .controllers
        .create_controllers(vec![Controller::from_status(
            CLUSTER,
            &owner,
            ControllerKind::DeploymentConfig,
            &resource,
        )])
        .await
        .unwrap();

    let mut dc = DeploymentConfig::new(
        "legacy",
        DeploymentConfigSpec {
            replicas: 1,
            selector: Some([("app".to_string(), "legacy".to_string())].into()),
        },
    );
    dc.metadata.namespace = Some(ctx.ns.clone());
    ctx.deployment_configs()
        .create(&PostParams::default(), &dc)
        .await
        .expect("failed to create DeploymentConfig");
    assert_eq!(ctx.recorded_controllers(), vec!["legacy".to_string()]);

    ctx.deployment_configs()
        .delete("legacy", &DeleteParams::default())
        .await
        .unwrap();

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let empty = ctx.recorded_controllers().is_empty();
            async move { empty }
        })
        .await,
        "expected the DeploymentConfig controller record to be deleted"
    );
}
