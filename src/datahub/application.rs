use std::sync::Arc;

use kube::ResourceExt;

use super::proto::{
    AlamedaApplicationSpec, Application, CreateApplicationsRequest, DeleteApplicationsRequest,
    ListApplicationsRequest, ObjectMeta,
};
use super::{object_meta, status, DatahubService};
use crate::crd::alameda_scaler::AlamedaScaler;
use crate::error::Result;

impl Application {
    /// The one application record mirroring a scaler.
    pub fn from_scaler(cluster_name: &str, scaler: &AlamedaScaler) -> Self {
        Application {
            object_meta: Some(object_meta(
                cluster_name,
                &scaler.namespace().unwrap_or_default(),
                &scaler.name_any(),
            )),
            alameda_application_spec: Some(AlamedaApplicationSpec {
                scaling_tool: super::controller::scaling_tool(scaler.scaling_tool()) as i32,
            }),
        }
    }
}

#[derive(Clone)]
pub struct ApplicationRepository {
    service: Arc<dyn DatahubService>,
    cluster_name: String,
}

impl ApplicationRepository {
    pub fn new(service: Arc<dyn DatahubService>, cluster_name: String) -> Self {
        Self {
            service,
            cluster_name,
        }
    }

    pub async fn create_applications(&self, applications: Vec<Application>) -> Result<()> {
        if applications.is_empty() {
            return Ok(());
        }
        let resp = self
            .service
            .create_applications(CreateApplicationsRequest { applications })
            .await?;
        status::check(&resp)
    }

    async fn list(&self, filter: ObjectMeta) -> Result<Vec<Application>> {
        let resp = self
            .service
            .list_applications(ListApplicationsRequest {
                object_meta: vec![filter],
            })
            .await?;
        status::check_envelope(resp.status.as_ref())?;
        Ok(resp.applications)
    }

    pub async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>> {
        let mut apps = self
            .list(object_meta(&self.cluster_name, namespace, name))
            .await?;
        Ok(apps.pop())
    }

    pub async fn list_applications_in_namespace(&self, namespace: &str) -> Result<Vec<Application>> {
        self.list(object_meta(&self.cluster_name, namespace, "")).await
    }

    pub async fn delete_application(&self, namespace: &str, name: &str) -> Result<()> {
        let resp = self
            .service
            .delete_applications(DeleteApplicationsRequest {
                object_meta: vec![object_meta(&self.cluster_name, namespace, name)],
            })
            .await?;
        status::check(&resp)
    }
}
