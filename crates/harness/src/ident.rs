//! Identities for the cluster resources a test run creates.

use uuid::Uuid;

/// Identifies one Kubernetes resource by namespace and name.
///
/// Immutable after construction. Each test run builds its idents from
/// [`random_name`] so concurrent runs never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdent {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdent {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Generate a DNS-1123 compatible resource name unique to this run.
///
/// The optional suffix tags the resource's role (e.g. `web`) for easier
/// reading of `kubectl get` output during a failed run.
#[must_use]
pub fn random_name(suffix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    let name = if suffix.is_empty() {
        format!("testing-{}", &simple[..12])
    } else {
        format!("testing-{}-{}", &simple[..12], suffix)
    };
    debug_assert!(name.len() <= 63);
    name
}
