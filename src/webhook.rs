//! Webhook endpoints and mutation orchestration
//!
//! Handles AdmissionReview requests for Pods, deciding per request whether
//! the lxcfs injection applies, whether it would conflict with the Pod's
//! own volumes, and building the resulting JSON patch. Every path answers
//! `allowed: true` and records its outcome in the status annotation; only
//! an undecodable Pod payload fails the admission (the patch cannot be
//! computed for a payload that cannot be read).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use k8s_openapi::api::core::v1::{Pod, Volume, VolumeMount};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::policy::{self, PolicyConfig, STATUS_ANNOTATION, STATUS_CONFLICT, STATUS_MUTATED, STATUS_SKIP};
use crate::template::InjectionTemplate;
use crate::{conflict, patch};

/// Shared state for the webhook endpoints: the policy and the template,
/// both immutable after startup.
#[derive(Clone, Debug)]
pub struct WebhookState {
    /// Namespace/operation/kind policy
    pub policy: PolicyConfig,
    /// Volumes and mounts to inject
    pub template: InjectionTemplate,
}

/// Build the webhook router.
///
/// Routes:
/// - `POST /mutate` - Pod mutation endpoint
/// - `GET /ping` - liveness probe
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .route("/ping", get(ping_handler))
        .with_state(state)
}

/// Liveness probe handler
async fn ping_handler() -> &'static str {
    "pong"
}

/// Handle a mutating admission review for Pods.
///
/// Transport-level failures (empty body, wrong content type, malformed
/// JSON) are rejected by the `Json` extractor before this handler runs.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate(&state, &request);
    Json(response.into_review())
}

/// Process a single Pod admission request.
///
/// Single pass: evaluate policy, then conflicts, then build the patch with
/// the chosen status annotation. No state is retained between calls;
/// idempotency comes from the status annotation carried on the Pod.
pub fn mutate(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = request.uid.as_str();
    let namespace = request.namespace.as_deref().unwrap_or_default();

    let pod = match decode_pod(request.object.as_ref()) {
        Ok(pod) => pod,
        Err(e) => {
            error!(uid, error = %e, "could not decode pod from admission request");
            return AdmissionResponse::from(request).deny(e.to_string());
        }
    };

    debug!(
        uid,
        namespace,
        name = %request.name,
        kind = ?request.kind,
        operation = ?request.operation,
        "admission review received"
    );

    let decision = policy::evaluate(
        &state.policy,
        namespace,
        &request.operation,
        &request.kind,
        &pod,
    );

    let (volumes, mounts, status): (&[Volume], &[VolumeMount], &str) = if !decision.is_required() {
        info!(uid, namespace, ?decision, "skipping mutation due to policy");
        (&[], &[], STATUS_SKIP)
    } else if conflict::has_conflict(&pod, &state.template) {
        info!(uid, namespace, "skipping mutation due to volume or volume mount conflict");
        (&[], &[], STATUS_CONFLICT)
    } else {
        info!(uid, namespace, "injecting lxcfs volumes");
        (&state.template.volumes, &state.template.volume_mounts, STATUS_MUTATED)
    };

    let annotations = BTreeMap::from([(STATUS_ANNOTATION.to_string(), status.to_string())]);
    let ops = patch::build(&pod, volumes, mounts, &annotations);

    match AdmissionResponse::from(request).with_patch(json_patch::Patch(ops)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid, error = %e, "failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

/// Decode the request's object payload into a typed Pod.
///
/// Standard defaulting has already been applied by the API server before
/// the review reaches the webhook.
fn decode_pod(object: Option<&DynamicObject>) -> Result<Pod, Error> {
    let object = object.ok_or_else(|| Error::decode("admission request carried no object"))?;
    let value = serde_json::to_value(object).map_err(|e| Error::decode(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::decode(e.to_string()))
}
