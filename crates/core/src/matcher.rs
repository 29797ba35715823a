//! Policy matching for deletion events.

use crate::{GroupResource, RecyclePolicy};

/// True when any policy targets `gr` and admits `namespace`.
///
/// Recycling is opt-in: an empty policy list never matches, and cluster-scoped
/// objects (`namespace == None`) only match policies scoped to all namespaces.
pub fn matches(gr: &GroupResource, namespace: Option<&str>, policies: &[RecyclePolicy]) -> bool {
    first_match(gr, namespace, policies).is_some()
}

/// The first policy selecting this deletion, for attribution in logs.
pub fn first_match<'a>(gr: &GroupResource, namespace: Option<&str>, policies: &'a [RecyclePolicy]) -> Option<&'a RecyclePolicy> {
    policies.iter().find(|p| targets(p, gr) && p.covers_namespace(namespace))
}

/// Whether any policy could match an object of `group`, before its collection is known.
pub fn any_in_group(group: &str, policies: &[RecyclePolicy]) -> bool {
    policies.iter().any(|p| p.target.group == group)
}

fn targets(policy: &RecyclePolicy, gr: &GroupResource) -> bool {
    policy.target.group == gr.group && policy.target.resource == gr.resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Gvr, NAMESPACE_ALL};

    fn policy(group: &str, resource: &str, namespaces: &[&str]) -> RecyclePolicy {
        let ns: Vec<String> = namespaces.iter().map(|s| s.to_string()).collect();
        RecyclePolicy::new(&Gvr::new(group, "v1", resource), &ns).unwrap()
    }

    #[test]
    fn gating_by_namespace_and_resource() {
        let policies = vec![policy("apps", "deployments", &["dev"])];
        let deploy = GroupResource::new("apps", "deployments");
        assert!(matches(&deploy, Some("dev"), &policies));
        assert!(!matches(&deploy, Some("prod"), &policies));
        assert!(!matches(&GroupResource::new("", "configmaps"), Some("dev"), &policies));
    }

    #[test]
    fn no_policies_means_no_recycling() {
        assert!(!matches(&GroupResource::new("apps", "deployments"), Some("dev"), &[]));
    }

    #[test]
    fn cluster_scoped_needs_unrestricted_policy() {
        let ns_gr = GroupResource::new("", "namespaces");
        let restricted = vec![policy("", "namespaces", &["dev"])];
        assert!(!matches(&ns_gr, None, &restricted));
        let open = vec![policy("", "namespaces", &[NAMESPACE_ALL])];
        assert!(matches(&ns_gr, None, &open));
    }

    #[test]
    fn group_must_match_exactly() {
        let policies = vec![policy("apps", "deployments", &[])];
        assert!(!matches(&GroupResource::new("extensions", "deployments"), Some("dev"), &policies));
        assert!(any_in_group("apps", &policies));
        assert!(!any_in_group("", &policies));
    }

    #[test]
    fn first_match_attributes_policy() {
        let policies = vec![policy("apps", "deployments", &["prod"]), policy("apps", "deployments", &["dev"])];
        let hit = first_match(&GroupResource::new("apps", "deployments"), Some("dev"), &policies).unwrap();
        assert_eq!(hit.target.namespaces, vec!["dev".to_string()]);
    }
}
