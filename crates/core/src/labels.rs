//! Label index attached to recycle items.
//!
//! The object store has no secondary indexes, so every item carries exact-match
//! tags describing the object it holds; listing filters on those tags only.

use std::collections::BTreeMap;

pub type LabelSet = BTreeMap<String, String>;

pub const OBJECT_NAME: &str = "krb.ketches.cn/object-name";
pub const OBJECT_GR: &str = "krb.ketches.cn/object-gr";
pub const OBJECT_NAMESPACE: &str = "krb.ketches.cn/object-namespace";
pub const RECYCLED_AT: &str = "krb.ketches.cn/recycled-at";

// Older layout, before the group-resource key existed.
pub const LEGACY_OBJECT_GROUP: &str = "krb.ketches.cn/object-group";
pub const LEGACY_OBJECT_VERSION: &str = "krb.ketches.cn/object-version";
pub const LEGACY_OBJECT_KIND: &str = "krb.ketches.cn/object-kind";

/// Render a label set as an equality selector (`k1=v1,k2=v2`).
pub fn selector_string(labels: &LabelSet) -> String {
    labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
}

/// Exact-match on every selector key; an empty selector matches everything.
pub fn matches_selector(labels: Option<&LabelSet>, selector: &LabelSet) -> bool {
    selector.iter().all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}
