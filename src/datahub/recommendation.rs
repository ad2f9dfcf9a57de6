use std::sync::Arc;

use super::proto::{
    Kind, ListPodRecommendationsRequest, Order, PodRecommendation, QueryCondition, TimeRange,
};
use super::{object_meta, status, DatahubService};
use crate::error::Result;

#[derive(Clone)]
pub struct RecommendationRepository {
    service: Arc<dyn DatahubService>,
    cluster_name: String,
}

impl RecommendationRepository {
    pub fn new(service: Arc<dyn DatahubService>, cluster_name: String) -> Self {
        Self {
            service,
            cluster_name,
        }
    }

    /// The newest pod-level recommendation up to now, if any.
    pub async fn latest_pod_recommendation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodRecommendation>> {
        let now = chrono::Utc::now();
        let resp = self
            .service
            .list_pod_recommendations(ListPodRecommendationsRequest {
                object_meta: vec![object_meta(&self.cluster_name, namespace, name)],
                kind: Kind::Pod as i32,
                query_condition: Some(QueryCondition {
                    time_range: Some(TimeRange {
                        end_time: Some(prost_types::Timestamp {
                            seconds: now.timestamp(),
                            nanos: now.timestamp_subsec_nanos() as i32,
                        }),
                        ..Default::default()
                    }),
                    order: Order::Desc as i32,
                    limit: 1,
                }),
            })
            .await?;
        status::check_envelope(resp.status.as_ref())?;
        Ok(resp.pod_recommendations.into_iter().next())
    }
}
