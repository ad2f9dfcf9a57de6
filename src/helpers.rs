use std::time::Duration;

use kube::ResourceExt;
use regex::Regex;

use crate::crd::alameda_scaler::AlamedaScaler;
use crate::error::{Error, Result};

// ── Operator settings (injected via CLI flags / env) ──────────────────────────

/// Cluster-specific configuration injected at startup via CLI flags.
#[derive(Clone, Debug)]
pub struct OperatorSettings {
    /// Namespace the operator runs in; never mirrored unless it hosts a scaler.
    pub operator_namespace: String,
    pub excluded_namespaces: Vec<String>,
    /// Anchored patterns; a namespace must match one in full.
    pub excluded_namespace_patterns: Vec<Regex>,
    /// Fallbacks for nodes whose provider ID and labels say nothing.
    pub cloud_provider: String,
    pub region: String,
    pub cold_start_delay: Duration,
    pub resync_interval: Duration,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            operator_namespace: "alameda".to_string(),
            excluded_namespaces: Vec::new(),
            excluded_namespace_patterns: Vec::new(),
            cloud_provider: String::new(),
            region: String::new(),
            cold_start_delay: Duration::from_secs(5),
            resync_interval: Duration::from_secs(600),
        }
    }
}

impl OperatorSettings {
    /// Compile namespace patterns, anchoring each to the full name.
    pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
        patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                Regex::new(&format!("^(?:{p})$"))
                    .map_err(|e| Error::config(format!("bad namespace pattern {p:?}: {e}")))
            })
            .collect()
    }

    /// Static half of the exclusion rule. The caller still has to check that
    /// no application lives in the namespace.
    pub fn is_namespace_excluded(&self, namespace: &str) -> bool {
        namespace == self.operator_namespace
            || self.excluded_namespaces.iter().any(|n| n == namespace)
            || self
                .excluded_namespace_patterns
                .iter()
                .any(|re| re.is_match(namespace))
    }
}

/// Split a comma-separated flag value into trimmed, non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── Naming helpers ────────────────────────────────────────────────────────────

pub const APP_NAME_LABEL: &str = "app.federator.ai/name";
pub const APP_PART_OF_LABEL: &str = "app.federator.ai/part-of";

/// Application name recorded on pod records: the scaler's
/// `app.federator.ai/name` label, else `<namespace>-<name>`.
pub fn app_name(scaler: &AlamedaScaler) -> String {
    scaler
        .labels()
        .get(APP_NAME_LABEL)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| {
            format!(
                "{}-{}",
                scaler.namespace().unwrap_or_default(),
                scaler.name_any()
            )
        })
}

/// The `app.federator.ai/part-of` label, else the application name.
pub fn app_part_of(scaler: &AlamedaScaler) -> String {
    scaler
        .labels()
        .get(APP_PART_OF_LABEL)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| app_name(scaler))
}

/// Drop the generated `-<hash>` suffix: `web-5d9f8` → `web`.
pub fn trim_generated_suffix(name: &str) -> &str {
    name.rsplit_once('-').map_or(name, |(head, _)| head)
}
