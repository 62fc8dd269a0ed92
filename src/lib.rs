//! Mutating admission webhook that injects lxcfs volumes into Pods
//!
//! The webhook intercepts Pod CREATE requests and, when policy allows,
//! emits a JSON patch that mounts the lxcfs-provided `/proc` and `/sys`
//! files into every container. Its terminal decision is recorded in a
//! status annotation on the Pod so the mutation is applied at most once.

#![deny(missing_docs)]

/// Conflict detection between a Pod and the injection template
pub mod conflict;
/// Error types
pub mod error;
/// JSON patch construction
pub mod patch;
/// Admission policy evaluation
pub mod policy;
/// Injection template (volumes and volume mounts to add)
pub mod template;
/// Webhook endpoints and mutation orchestration
pub mod webhook;
