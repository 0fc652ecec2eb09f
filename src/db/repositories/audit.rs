use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set};

use crate::entities::{audit_log, prelude::*};

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(
        &self,
        event_type: &str,
        level: &str,
        actor: &str,
        message: &str,
        details: Option<String>,
    ) -> Result<()> {
        let entry = audit_log::ActiveModel {
            event_type: Set(event_type.to_string()),
            level: Set(level.to_string()),
            actor: Set(actor.to_string()),
            message: Set(message.to_string()),
            details: Set(details),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        };

        AuditLog::insert(entry)
            .exec(&self.conn)
            .await
            .context("Failed to insert audit entry")?;

        Ok(())
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<audit_log::Model>> {
        AuditLog::find()
            .order_by_desc(audit_log::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to query audit log")
    }
}
