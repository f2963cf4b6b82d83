//! Webhook handler for push notifications

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::SharedState;
use crate::job::Trigger;
use crate::utils::{SIGNATURE_HEADER, push_ref, verify_signature};

const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

/// Handles the webhook POST request.
///
/// A verified request only queues a deploy cycle; the response never waits
/// for it, so cycle failures show up in the logs alone.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Rejected webhook without {} header", SIGNATURE_HEADER);
        return (StatusCode::UNAUTHORIZED, "bad signature");
    };

    if !verify_signature(state.config.secret_key.expose_secret(), &body, signature) {
        warn!("Signature verification failed for webhook");
        return (StatusCode::UNAUTHORIZED, "bad signature");
    }

    let delivery = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    match push_ref(&body) {
        Some(git_ref) => info!("Verified push to {}", git_ref),
        None => debug!("Verified webhook without a ref ({} bytes)", body.len()),
    }

    match state.jobs.submit(Trigger::Webhook { delivery }) {
        Ok(job_id) => {
            info!("Queued job {} ({} pending)", job_id, state.jobs.depth());
            (StatusCode::OK, "ok")
        }
        Err(e) => {
            warn!("Could not queue deploy: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "busy")
        }
    }
}
