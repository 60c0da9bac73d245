//! Inbound webhook boundary (spec.md §4.1, §6). Verifies the HMAC
//! signature, stores the raw delivery, and kicks off background
//! processing — the HTTP response never waits on the processor.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::NewRawWebhookDelivery;
use crate::state::AppState;
use crate::{ingestion, processor};

type HmacSha256 = Hmac<Sha256>;

fn verify_signature(secret: &str, body: &[u8], signature_header: Option<&str>) -> bool {
    let Some(header) = signature_header else { return false };
    let Some(hex_sig) = header.strip_prefix("sha256=") else { return false };
    let Ok(expected) = hex::decode(hex_sig) else { return false };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature_valid = verify_signature(
        &state.config.github_webhook_secret,
        &body,
        headers.get("x-hub-signature-256").and_then(|v| v.to_str().ok()),
    );

    if !signature_valid {
        tracing::warn!("webhook signature verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let Some(event_name) = headers.get("x-github-event").and_then(|v| v.to_str().ok()) else {
        return StatusCode::BAD_REQUEST;
    };
    let Some(delivery_id) = headers.get("x-github-delivery").and_then(|v| v.to_str().ok()) else {
        return StatusCode::BAD_REQUEST;
    };

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return StatusCode::BAD_REQUEST;
    };

    let installation_id = payload["installation"]["id"].as_i64();

    let delivery = NewRawWebhookDelivery {
        delivery_id: delivery_id.to_string(),
        event_name: event_name.to_string(),
        action: payload["action"].as_str().map(String::from),
        installation_id,
        repository_id: payload["repository"]["id"].as_i64(),
        signature_valid: true,
        payload_json: payload,
        received_at: chrono::Utc::now(),
    };

    let result = match ingestion::store_raw_delivery(&state.pool, delivery).await {
        Ok(r) => r,
        Err(err) => {
            tracing::error!(delivery_id, error = %err, "failed to store raw delivery");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    if result.stored {
        let pool = state.pool.clone();
        let config = state.config.clone();
        let github = state.github.clone();
        let delivery_id = delivery_id.to_string();
        tokio::spawn(async move {
            let rest = match installation_id {
                Some(id) => github
                    .token_for_installation(id as u64)
                    .await
                    .ok()
                    .map(crate::github::RestClient::new),
                None => None,
            };
            if let Err(err) = processor::process_delivery(&pool, &config, rest.as_ref(), &delivery_id).await {
                tracing::error!(delivery_id, error = %err, "processing delivery failed unexpectedly");
            }
        });
    }

    StatusCode::ACCEPTED
}
