//! Admission policy evaluation
//!
//! Decides whether a Pod should receive the lxcfs injection at all. The
//! checks run in a strict order and the first match wins: ignored
//! namespace, operation, kind, the status annotation written by a previous
//! invocation, and finally the user-facing enable annotation.

use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::Operation;
use kube::core::GroupVersionKind;
use tracing::debug;

/// Annotation that lets users opt a Pod out of injection.
///
/// The key match is exact; the value comparison is case-insensitive.
/// Absent, or any value outside [`DISABLE_VALUES`], means enabled.
pub const ENABLE_ANNOTATION: &str = "mutating.lxcfs-admission-webhook.io/enable";

/// Annotation recording the pipeline's terminal decision for a Pod.
///
/// Written on every admission pass and read back on subsequent passes to
/// guarantee the injection is applied at most once per Pod.
pub const STATUS_ANNOTATION: &str = "mutating.lxcfs-admission-webhook.io/status";

/// Status value: the injection patch was emitted.
pub const STATUS_MUTATED: &str = "mutated";
/// Status value: policy ruled the Pod out.
pub const STATUS_SKIP: &str = "skip";
/// Status value: the template collided with the Pod's own volumes/mounts.
pub const STATUS_CONFLICT: &str = "conflict";

/// Enable-annotation values (lowercased) that disable injection.
pub const DISABLE_VALUES: [&str; 4] = ["n", "no", "false", "off"];

/// Immutable policy inputs, constructed once at startup and shared
/// read-only across all requests.
#[derive(Clone, Debug)]
pub struct PolicyConfig {
    /// Namespaces that are never mutated
    pub ignored_namespaces: Vec<String>,
    /// Kinds eligible for mutation, in case the webhook registration
    /// captures a wider rule than intended
    pub allowed_kinds: Vec<GroupVersionKind>,
    /// Operation verbs eligible for mutation
    pub allowed_operations: Vec<Operation>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            ignored_namespaces: vec!["kube-system".to_string(), "kube-public".to_string()],
            allowed_kinds: vec![GroupVersionKind::gvk("", "v1", "Pod")],
            allowed_operations: vec![Operation::Create],
        }
    }
}

/// Outcome of policy evaluation for a single admission request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The Pod should receive the injection
    Required,
    /// The request namespace is in the ignored list
    SkipNamespace,
    /// The request operation or kind is not eligible
    SkipOperationOrKind,
    /// The Pod already carries the `mutated` status annotation
    SkipAlreadyMutated,
    /// The Pod opted out via the enable annotation
    SkipDisabledByAnnotation,
}

impl Decision {
    /// Whether the injection should be attempted
    pub fn is_required(&self) -> bool {
        matches!(self, Decision::Required)
    }
}

/// Evaluate whether the target Pod needs to be mutated.
///
/// Pure function of its inputs; the only side effect is a debug log entry.
pub fn evaluate(
    config: &PolicyConfig,
    namespace: &str,
    operation: &Operation,
    kind: &GroupVersionKind,
    pod: &Pod,
) -> Decision {
    if config.ignored_namespaces.iter().any(|ns| ns == namespace) {
        debug!(namespace, "skipping mutation: special namespace");
        return Decision::SkipNamespace;
    }

    if !config.allowed_operations.contains(operation) {
        debug!(?operation, "skipping mutation: operation not eligible");
        return Decision::SkipOperationOrKind;
    }

    if !config.allowed_kinds.contains(kind) {
        debug!(?kind, "skipping mutation: kind not eligible");
        return Decision::SkipOperationOrKind;
    }

    let annotations = pod.metadata.annotations.as_ref();

    let status = annotations
        .and_then(|a| a.get(STATUS_ANNOTATION))
        .map(|v| v.to_ascii_lowercase());
    if status.as_deref() == Some(STATUS_MUTATED) {
        debug!("skipping mutation: pod already mutated");
        return Decision::SkipAlreadyMutated;
    }

    let enable = annotations
        .and_then(|a| a.get(ENABLE_ANNOTATION))
        .map(|v| v.to_ascii_lowercase());
    match enable.as_deref() {
        Some(value) if DISABLE_VALUES.contains(&value) => {
            debug!(value, "skipping mutation: disabled by annotation");
            Decision::SkipDisabledByAnnotation
        }
        _ => Decision::Required,
    }
}
