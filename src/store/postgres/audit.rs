//! Audit log queries

use sqlx::types::Json;
use sqlx::{Executor, Postgres};

use crate::domain::AuditEvent;

pub async fn append_event<'e, E>(executor: E, event: &AuditEvent) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO audit_log (entity_type, entity_id, action, actor, actor_role, details, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(event.entity_type)
    .bind(event.entity_id)
    .bind(&event.action)
    .bind(&event.actor)
    .bind(event.actor_role)
    .bind(Json(&event.details))
    .bind(event.created_at)
    .execute(executor)
    .await?;

    Ok(())
}
