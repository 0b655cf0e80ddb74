use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// Best-effort audit trail. Callers treat failures as non-fatal and only
/// warn-log them; an audit outage must never fail the request it records.
pub async fn record(
    pool: &DbPool,
    actor: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    resource_id: Option<Uuid>,
    metadata: Option<Value>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, resource_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(actor)
    .bind(action)
    .bind(resource)
    .bind(resource_id)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}
