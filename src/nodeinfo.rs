//! Flatten a Kubernetes Node into the provider metadata Datahub records.
//!
//! Sources, in order of precedence: well-known labels, the provider ID
//! (`scheme://region/instance-id`), then operator-level defaults.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;

use crate::error::{Error, Result};
use crate::quantity;

pub const MASTER_ROLE: &str = "master";
pub const WORKER_ROLE: &str = "worker";
pub const DEFAULT_STORAGE_SIZE: &str = "100Gi";

const MASTER_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/master",
    "node-role.kubernetes.io/control-plane",
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub uid: String,
    pub created_time: i64,
    pub role: String,
    pub region: String,
    pub zone: String,
    pub size: String,
    pub instance_type: String,
    pub os: String,
    pub provider: String,
    pub instance_id: String,
    pub storage_size: i64,
    pub cpu_cores: i64,
    pub memory_bytes: i64,
}

/// Fallbacks applied when neither labels nor the provider ID say anything.
#[derive(Clone, Debug, Default)]
pub struct ProviderDefaults {
    pub provider: String,
    pub region: String,
}

/// The label value for `field`: a key matches when, with `-` removed, it
/// ends in `/<field>`. `stackpoint.*` keys are skipped except the role key.
fn label_value<'a>(labels: &'a BTreeMap<String, String>, field: &str) -> Option<&'a str> {
    let suffix = format!("/{field}");
    labels
        .iter()
        .filter(|(k, _)| !k.contains("stackpoint.") || k.contains("stackpoint.io/role"))
        .find(|(k, _)| k.replace('-', "").to_lowercase().ends_with(&suffix))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Split a provider ID into (provider, region, instance id): the first
/// three runs of characters other than `:` and `/`.
pub fn parse_provider_id(provider_id: &str) -> (String, String, String) {
    let mut tokens = provider_id
        .split([':', '/'])
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    (
        tokens.next().unwrap_or_default(),
        tokens.next().unwrap_or_default(),
        tokens.next().unwrap_or_default(),
    )
}

fn capacity<'a>(node: &'a Node, key: &str) -> Option<&'a Quantity> {
    node.status
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get(key))
}

impl NodeInfo {
    pub fn from_node(node: &Node, defaults: &ProviderDefaults) -> Result<Self> {
        let labels = node.labels();
        let field = |f: &str| label_value(labels, f).unwrap_or_default().to_string();

        let mut info = NodeInfo {
            name: node.name_any(),
            uid: node.uid().unwrap_or_default(),
            created_time: node
                .creation_timestamp()
                .map(|t| t.0.timestamp())
                .unwrap_or_default(),
            role: field("role"),
            region: field("region"),
            zone: field("zone"),
            size: field("size"),
            instance_type: field("instancetype"),
            os: field("os"),
            provider: field("provider"),
            instance_id: field("instanceid"),
            ..Default::default()
        };

        if info.role.is_empty() {
            info.role = if MASTER_LABELS.iter().any(|l| labels.contains_key(*l)) {
                MASTER_ROLE.to_string()
            } else {
                WORKER_ROLE.to_string()
            };
        }

        if let Some(provider_id) = node
            .spec
            .as_ref()
            .and_then(|s| s.provider_id.as_deref())
            .filter(|p| !p.is_empty())
        {
            let (provider, region, instance_id) = parse_provider_id(provider_id);
            info.provider = provider;
            info.instance_id = instance_id;
            if info.region.is_empty() {
                info.region = region;
            }
        }

        if info.provider.is_empty() {
            info.provider = defaults.provider.clone();
        }
        if info.region.is_empty() {
            info.region = defaults.region.clone();
        }

        info.cpu_cores = capacity(node, "cpu")
            .map(quantity::value)
            .transpose()?
            .ok_or_else(|| Error::reconcile(format!("node {} reports no cpu capacity", info.name)))?;
        info.memory_bytes = capacity(node, "memory")
            .map(quantity::value)
            .transpose()?
            .ok_or_else(|| {
                Error::reconcile(format!("node {} reports no memory capacity", info.name))
            })?;
        info.storage_size = match capacity(node, "ephemeral-storage") {
            Some(q) => quantity::value(q)?,
            None => 0,
        };
        if info.storage_size == 0 {
            info.storage_size = quantity::value(&Quantity(DEFAULT_STORAGE_SIZE.to_string()))?;
        }

        Ok(info)
    }
}
