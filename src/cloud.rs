//! One-shot cloud metadata probe used to fill node provider/region when
//! neither labels nor configuration supply them.

use std::time::Duration;

use tracing::{debug, info};

use crate::nodeinfo::ProviderDefaults;

const AWS_REGION_URL: &str = "http://169.254.169.254/latest/meta-data/placement/region";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Ask the instance-metadata endpoint for the AWS region. `None` when the
/// endpoint is unreachable or answers with an error.
pub async fn probe_aws_region(http: &reqwest::Client) -> Option<String> {
    let resp = match http.get(AWS_REGION_URL).timeout(PROBE_TIMEOUT).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!(status = %r.status(), "cloud metadata endpoint refused region query");
            return None;
        }
        Err(e) => {
            debug!(%e, "cloud metadata endpoint unreachable");
            return None;
        }
    };
    let region = resp.text().await.ok()?.trim().to_string();
    (!region.is_empty()).then_some(region)
}

/// Fill the unset halves of `configured` from the metadata endpoint.
pub async fn resolve_provider_defaults(
    http: &reqwest::Client,
    configured: ProviderDefaults,
    probe: bool,
) -> ProviderDefaults {
    if !probe || (!configured.provider.is_empty() && !configured.region.is_empty()) {
        return configured;
    }
    match probe_aws_region(http).await {
        Some(region) => {
            info!(%region, "detected aws from instance metadata");
            ProviderDefaults {
                provider: if configured.provider.is_empty() {
                    "aws".to_string()
                } else {
                    configured.provider
                },
                region: if configured.region.is_empty() {
                    region
                } else {
                    configured.region
                },
            }
        }
        None => configured,
    }
}
