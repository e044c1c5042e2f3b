//! Adapts Kubernetes admission reviews to the injector.
//!
//! Responses always admit the object. The patch is the computed JSON patch or, when nothing is
//! injected, an empty one; either way it is base64-encoded on the wire.

use crate::core::{admission::Request, Injection};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use json_patch::Patch;
use kube::core::{
    admission::{
        AdmissionRequest, AdmissionResponse, AdmissionReview, ConvertAdmissionReviewError,
        Operation, SerializePatchError,
    },
    DynamicObject,
};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub(crate) type ReviewRequest = AdmissionRequest<DynamicObject>;

type Review = AdmissionReview<DynamicObject>;

#[derive(Debug, Error)]
pub(crate) enum InvalidReview {
    #[error("failed to parse admission review: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    NoRequest(#[from] ConvertAdmissionReviewError),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Patch(#[from] SerializePatchError),

    #[error("failed to encode admission review: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn parse(body: &[u8]) -> Result<ReviewRequest, InvalidReview> {
    let review = serde_json::from_slice::<Review>(body)?;
    Ok(review.try_into()?)
}

/// Extracts what the injector needs from a review request.
pub(crate) fn request(req: &ReviewRequest) -> serde_json::Result<Request> {
    let namespace = req
        .namespace
        .clone()
        .or_else(|| req.object.as_ref()?.metadata.namespace.clone())
        .unwrap_or_default();
    let object = req.object.as_ref().map(serde_json::to_value).transpose()?;

    Ok(Request {
        kind: req.kind.kind.clone(),
        operation: operation(&req.operation).to_string(),
        namespace,
        object,
    })
}

/// Builds the review answering `req`.
pub(crate) fn respond(req: &ReviewRequest, injection: &Injection) -> Result<Value, EncodeError> {
    let rsp = AdmissionResponse::from(req);
    let patch = injection.patch().cloned().unwrap_or_default();
    let rsp = match rsp.clone().with_patch(patch) {
        Ok(rsp) => rsp,
        Err(error) => {
            warn!(%error, "Failed to encode patch");
            rsp.with_patch(Patch::default())?
        }
    };
    Ok(encode(rsp)?)
}

/// Renders a response with its patch as base64 text, the wire form of a byte field.
fn encode(mut rsp: AdmissionResponse) -> serde_json::Result<Value> {
    let patch = rsp.patch.take().map(|bytes| BASE64.encode(bytes));
    let mut review = serde_json::to_value(rsp.into_review())?;
    if let (Some(patch), Some(response)) = (
        patch,
        review.get_mut("response").and_then(Value::as_object_mut),
    ) {
        response.insert("patch".to_string(), Value::String(patch));
    }
    Ok(review)
}

fn operation(op: &Operation) -> &'static str {
    match op {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}
