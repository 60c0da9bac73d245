//! Ingestion boundary (spec.md §4.1).
//!
//! The HTTP layer (`routes::webhooks::handle`) has already verified the
//! signature and extracted the envelope fields; this module only owns the
//! idempotent insert, serialized by the unique index on `delivery_id`.

use sqlx::PgPool;

use crate::models::NewRawWebhookDelivery;

pub struct StoreResult {
    pub stored: bool,
}

/// Insert a new `RawWebhookDelivery` in state `pending`.
///
/// If a row with this `delivery_id` already exists, makes no writes and
/// returns `{stored: false}` — concurrent ingests of the same delivery
/// race on the unique index and exactly one wins.
pub async fn store_raw_delivery(
    pool: &PgPool,
    delivery: NewRawWebhookDelivery,
) -> anyhow::Result<StoreResult> {
    let result = sqlx::query(
        r#"INSERT INTO raw_webhook_deliveries
             (delivery_id, event_name, action, installation_id, repository_id,
              signature_valid, payload_json, received_at, process_state,
              process_attempts)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 0)
           ON CONFLICT (delivery_id) DO NOTHING"#,
    )
    .bind(&delivery.delivery_id)
    .bind(&delivery.event_name)
    .bind(&delivery.action)
    .bind(delivery.installation_id)
    .bind(delivery.repository_id)
    .bind(delivery.signature_valid)
    .bind(&delivery.payload_json)
    .bind(delivery.received_at)
    .execute(pool)
    .await?;

    Ok(StoreResult {
        stored: result.rows_affected() > 0,
    })
}

#[cfg(test)]
mod tests {
    // Covered end-to-end by `routes::webhooks` tests and the processor's
    // idempotent-reprocessing test (spec.md §8 scenario 5), since this
    // function has no branching logic of its own beyond the conflict clause.
}
