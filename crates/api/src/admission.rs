//! Admission review handling for the validating webhook.
//!
//! Every review is answered with `allowed: true`: recycling is best-effort and must
//! never hold up a deletion. Only a body that is not a review at all gets an
//! "invalid" answer, since there is no request uid to echo.

use krb_core::{Gvk, Gvr};
use krb_ops::{DeleteNotification, Recycler};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{debug, warn};

/// Decode a serialized `AdmissionReview`, recycle DELETEs, and return the serialized answer.
pub async fn handle_review(recycler: &Recycler, body: &[u8]) -> Vec<u8> {
    let response = match decode(body) {
        Ok((req, old_raw)) => {
            let response = AdmissionResponse::from(&req);
            if let Some(n) = notification(&req, old_raw) {
                recycler.handle(&n).await;
            }
            response
        }
        Err(reason) => {
            warn!(error = %reason, "undecodable admission review");
            AdmissionResponse::invalid(reason)
        }
    };
    serde_json::to_vec(&response.into_review()).unwrap_or_default()
}

/// The parts of a review whose bytes are kept verbatim.
#[derive(Deserialize)]
struct RawReview<'a> {
    #[serde(borrow, default)]
    request: Option<RawRequest<'a>>,
}

#[derive(Deserialize)]
struct RawRequest<'a> {
    #[serde(rename = "oldObject", borrow, default)]
    old_object: Option<&'a RawValue>,
}

fn decode(body: &[u8]) -> Result<(AdmissionRequest<DynamicObject>, Option<Vec<u8>>), String> {
    let raw: RawReview<'_> = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let old_raw = raw.request.and_then(|r| r.old_object).map(|v| v.get().as_bytes().to_vec());
    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let req = TryInto::<AdmissionRequest<DynamicObject>>::try_into(review).map_err(|e| e.to_string())?;
    Ok((req, old_raw))
}

fn notification(req: &AdmissionRequest<DynamicObject>, old_raw: Option<Vec<u8>>) -> Option<DeleteNotification> {
    if req.operation != Operation::Delete {
        debug!(uid = %req.uid, op = ?req.operation, "not a deletion");
        return None;
    }
    if req.dry_run {
        debug!(uid = %req.uid, name = %req.name, "dry-run deletion; nothing recycled");
        return None;
    }
    let Some(old_object) = old_raw else {
        warn!(uid = %req.uid, name = %req.name, "deletion without oldObject; nothing to recycle");
        return None;
    };
    let kind = req.request_kind.as_ref().unwrap_or(&req.kind);
    let resource = req.request_resource.as_ref().unwrap_or(&req.resource);
    Some(DeleteNotification {
        kind: Gvk::new(&kind.group, &kind.version, &kind.kind),
        resource: Some(Gvr::new(&resource.group, &resource.version, &resource.resource)),
        namespace: req.namespace.clone().filter(|ns| !ns.is_empty()),
        name: req.name.clone(),
        old_object,
    })
}
