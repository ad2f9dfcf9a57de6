//! Shared helpers for controller modules.
//!
//! Owner references, label-selector handling and the monitored-pod rule.
//! Pure naming and configuration helpers live in `crate::helpers` instead.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, OwnerReference,
};
use kube::{Resource, ResourceExt};

/// Field manager name used for patches.
pub const FIELD_MANAGER: &str = "alameda-operator";

/// Annotation on a workload naming the scaler that last monitored it.
pub const LAST_MONITOR_ANNOTATION: &str = "alamedascalers.autoscaling.containers.ai/last-monitor";

/// Build a controller OwnerReference for any kube-rs `Resource`.
///
/// `K: Resource<DynamicType = ()>` covers every type whose group, version and
/// kind are known at compile time, which includes every derived CRD.
pub fn controller_owner_ref<K: Resource<DynamicType = ()>>(obj: &K) -> OwnerReference {
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: obj.name_any(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// The owner marked as controller, falling back to the first owner.
pub fn controlling_owner<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    let owners = obj.meta().owner_references.as_deref().unwrap_or_default();
    owners
        .iter()
        .find(|o| o.controller == Some(true))
        .or_else(|| owners.first())
}

// ── Label selectors ───────────────────────────────────────────────────────────

fn is_empty_selector(selector: &LabelSelector) -> bool {
    selector.match_labels.as_ref().map_or(true, |m| m.is_empty())
        && selector
            .match_expressions
            .as_ref()
            .map_or(true, |e| e.is_empty())
}

fn render_requirement(req: &LabelSelectorRequirement) -> String {
    let values = req.values.as_deref().unwrap_or_default().join(",");
    match req.operator.as_str() {
        "In" => format!("{} in ({values})", req.key),
        "NotIn" => format!("{} notin ({values})", req.key),
        "Exists" => req.key.clone(),
        "DoesNotExist" => format!("!{}", req.key),
        other => format!("{} {other} ({values})", req.key),
    }
}

/// Render a selector as a list-call label query.
///
/// An empty selector renders as `None`: it selects nothing rather than
/// everything.
pub fn selector_to_query(selector: &LabelSelector) -> Option<String> {
    if is_empty_selector(selector) {
        return None;
    }
    let mut terms: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    terms.extend(
        selector
            .match_expressions
            .iter()
            .flatten()
            .map(render_requirement),
    );
    Some(terms.join(","))
}

/// Render equality labels (a DeploymentConfig selector) as a label query.
pub fn labels_to_query(labels: &BTreeMap<String, String>) -> Option<String> {
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = req.values.as_deref().unwrap_or_default();
    let value = labels.get(&req.key);
    match req.operator.as_str() {
        "In" => value.is_some_and(|v| values.contains(v)),
        "NotIn" => value.map_or(true, |v| !values.contains(v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

/// Evaluate a selector against an object's labels. Empty selectors match
/// nothing, consistent with [`selector_to_query`].
pub fn label_selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    if is_empty_selector(selector) {
        return false;
    }
    selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v))
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|req| requirement_matches(req, labels))
}

// ── Pods ──────────────────────────────────────────────────────────────────────

const MONITORED_PHASES: [&str; 3] = ["Pending", "Running", "Unknown"];

/// A pod is monitored while it is in a non-terminal phase and not being
/// deleted.
pub fn is_monitored(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_none()
        && pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| MONITORED_PHASES.contains(&phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement(key: &str, op: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.into(),
            operator: op.into(),
            values: Some(values.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn test_selector_query_covers_labels_and_expressions() {
        let selector = LabelSelector {
            match_labels: Some([("app".to_string(), "web".to_string())].into()),
            match_expressions: Some(vec![
                requirement("tier", "In", &["a", "b"]),
                requirement("canary", "DoesNotExist", &[]),
            ]),
        };
        assert_eq!(
            selector_to_query(&selector).as_deref(),
            Some("app=web,tier in (a,b),!canary")
        );
    }

    #[test]
    fn test_expression_only_selector_renders() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![requirement("env", "NotIn", &["dev"])]),
        };
        assert_eq!(
            selector_to_query(&selector).as_deref(),
            Some("env notin (dev)")
        );
    }

    #[test]
    fn test_empty_selector_selects_nothing() {
        let empty = LabelSelector::default();
        assert_eq!(selector_to_query(&empty), None);
        let labels = [("app".to_string(), "web".to_string())].into();
        assert!(!label_selector_matches(&empty, &labels));
    }

    #[test]
    fn test_label_selector_matches() {
        let selector = LabelSelector {
            match_labels: Some([("app".to_string(), "web".to_string())].into()),
            match_expressions: Some(vec![requirement("tier", "NotIn", &["db"])]),
        };
        let web: BTreeMap<String, String> = [("app".to_string(), "web".to_string())].into();
        let web_db: BTreeMap<String, String> = [
            ("app".to_string(), "web".to_string()),
            ("tier".to_string(), "db".to_string()),
        ]
        .into();
        assert!(label_selector_matches(&selector, &web));
        assert!(!label_selector_matches(&selector, &web_db));
        assert!(!label_selector_matches(&selector, &BTreeMap::new()));
    }

    fn pod(phase: &str, deleting: bool) -> Pod {
        let mut v = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "p" },
            "status": { "phase": phase }
        });
        if deleting {
            v["metadata"]["deletionTimestamp"] = "2024-01-01T00:00:00Z".into();
        }
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_is_monitored() {
        assert!(is_monitored(&pod("Running", false)));
        assert!(is_monitored(&pod("Pending", false)));
        assert!(is_monitored(&pod("Unknown", false)));
        assert!(!is_monitored(&pod("Succeeded", false)));
        assert!(!is_monitored(&pod("Failed", false)));
        assert!(!is_monitored(&pod("Running", true)));
    }
}
