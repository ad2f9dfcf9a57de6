use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ListParams;
use kube::ResourceExt;

use super::common::*;
use alameda_operator::crd::alameda_recommendation::SCALER_LABEL;
use alameda_operator::datahub::proto::{
    ContainerRecommendation, MetricData, MetricType, ObjectMeta, PodRecommendation, Sample,
};

fn sample(seconds: i64, value: &str) -> Sample {
    Sample {
        time: Some(prost_types::Timestamp { seconds, nanos: 0 }),
        num_value: value.to_string(),
    }
}

fn cpu_recommendation(ns: &str, pod: &str) -> PodRecommendation {
    PodRecommendation {
        object_meta: Some(ObjectMeta {
            namespace: ns.into(),
            name: pod.into(),
            cluster_name: CLUSTER.into(),
            ..Default::default()
        }),
        container_recommendations: vec![ContainerRecommendation {
            name: "app".into(),
            limit_recommendations: vec![MetricData {
                metric_type: MetricType::CpuUsageSecondsPercentage as i32,
                data: vec![sample(100, "500"), sample(200, "750")],
            }],
            request_recommendations: vec![MetricData {
                metric_type: MetricType::MemoryUsageBytes as i32,
                data: vec![sample(200, "268435456")],
            }],
        }],
    }
}

/// Every monitored pod gets an AlamedaRecommendation owned by the scaler,
/// which is filled from Datahub's newest samples.
#[tokio::test]
async fn recommendation_is_created_and_filled() {
    let ctx = TestContext::new().await;

    let deployment = create_deployment(&ctx, "web", "web", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "5d9f8").await;
    let pod = create_running_pod(&ctx, &rs, "abcde").await;
    let pod_name = pod.name_any();
    create_scaler(&ctx, "front", "web").await;

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let api = ctx.recommendations();
            let name = pod_name.clone();
            async move { api.get_opt(&name).await.is_ok_and(|r| r.is_some()) }
        })
        .await,
        "expected an AlamedaRecommendation named after the pod"
    );

    let rec = ctx.recommendations().get(&pod_name).await.unwrap();
    assert_eq!(
        rec.labels().get(SCALER_LABEL),
        Some(&format!("front.{}", ctx.ns))
    );
    let owner = &rec.owner_references()[0];
    assert_eq!(owner.kind, "AlamedaScaler");
    assert_eq!(owner.name, "front");
    assert_eq!(rec.spec.containers.len(), 1);
    assert_eq!(rec.spec.containers[0].name, "app");

    ctx.datahub
        .push_pod_recommendation(cpu_recommendation(&ctx.ns, &pod_name));

    let expected_limits: BTreeMap<String, Quantity> =
        [("cpu".to_string(), Quantity("750m".into()))].into();
    let expected_requests: BTreeMap<String, Quantity> =
        [("memory".to_string(), Quantity("256Mi".into()))].into();
    assert!(
        wait_for(TIMEOUT, POLL, || {
            let api = ctx.recommendations();
            let name = pod_name.clone();
            let (limits, requests) = (expected_limits.clone(), expected_requests.clone());
            async move {
                let Ok(rec) = api.get(&name).await else {
                    return false;
                };
                let resources = &rec.spec.containers[0].resources;
                resources.limits.as_ref() == Some(&limits)
                    && resources.requests.as_ref() == Some(&requests)
            }
        })
        .await,
        "expected the newest samples in the recommendation"
    );
}

/// A recommendation whose pod is no longer monitored is deleted.
#[tokio::test]
async fn orphaned_recommendation_is_deleted() {
    let ctx = TestContext::new().await;

    let deployment = create_deployment(&ctx, "web", "web", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "5d9f8").await;
    let pod = create_running_pod(&ctx, &rs, "abcde").await;
    let pod_name = pod.name_any();
    create_scaler(&ctx, "front", "web").await;

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let api = ctx.recommendations();
            let name = pod_name.clone();
            async move { api.get_opt(&name).await.is_ok_and(|r| r.is_some()) }
        })
        .await
    );

    set_pod_phase(&ctx, &pod_name, "Failed").await;

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let api = ctx.recommendations();
            let name = pod_name.clone();
            async move { api.get_opt(&name).await.is_ok_and(|r| r.is_none()) }
        })
        .await,
        "expected the orphaned recommendation to be removed"
    );
}

/// Once a recommendation exists and carries Datahub's newest samples, later
/// passes neither recreate, delete nor rewrite it.
#[tokio::test]
async fn filled_recommendation_is_left_alone() {
    let ctx = TestContext::new().await;

    let deployment = create_deployment(&ctx, "api", "api", 1).await;
    let rs = create_replica_set(&ctx, &deployment, "6c8e1").await;
    let pod = create_running_pod(&ctx, &rs, "fghij").await;
    let pod_name = pod.name_any();
    create_scaler(&ctx, "back", "api").await;
    ctx.datahub
        .push_pod_recommendation(cpu_recommendation(&ctx.ns, &pod_name));

    assert!(
        wait_for(TIMEOUT, POLL, || {
            let api = ctx.recommendations();
            let name = pod_name.clone();
            async move {
                api.get_opt(&name).await.is_ok_and(|r| {
                    r.is_some_and(|r| r.spec.containers[0].resources.limits.is_some())
                })
            }
        })
        .await,
        "expected a filled recommendation"
    );

    // Let in-flight reconciles settle before taking the baseline.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let before = ctx.recommendations().get(&pod_name).await.unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    let listed = ctx
        .recommendations()
        .list(&ListParams::default())
        .await
        .unwrap()
        .items;
    assert_eq!(listed.len(), 1, "expected exactly one recommendation");
    let after = &listed[0];
    assert_eq!(after.uid(), before.uid(), "expected the same object, not a recreation");
    assert_eq!(
        after.resource_version(),
        before.resource_version(),
        "expected no rewrite across resyncs"
    );
}
