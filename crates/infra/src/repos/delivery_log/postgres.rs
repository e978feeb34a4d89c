use super::{IDeliveryLogRepo, LogInsert};

use smart_notifier_domain::{DeliveryLogStatus, MedicationLogEntry, ReminderLogEntry, ID};
use sqlx::{types::Uuid, FromRow, PgPool};
use tracing::error;

pub struct PostgresDeliveryLogRepo {
    pool: PgPool,
}

impl PostgresDeliveryLogRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ExistingLogRaw {
    log_uid: Uuid,
    status: String,
}

fn classify_existing(raw: Option<ExistingLogRaw>) -> LogInsert {
    match raw {
        Some(existing) => match existing.status.parse::<DeliveryLogStatus>() {
            Ok(DeliveryLogStatus::Sent) | Err(_) => LogInsert::AlreadySent,
            Ok(DeliveryLogStatus::Pending) => LogInsert::PendingExists(existing.log_uid.into()),
        },
        // The conflicting row disappeared between the insert and the
        // lookup, treat the delivery as handled elsewhere
        None => LogInsert::AlreadySent,
    }
}

#[async_trait::async_trait]
impl IDeliveryLogRepo for PostgresDeliveryLogRepo {
    async fn insert_reminder_entry(&self, entry: &ReminderLogEntry) -> anyhow::Result<LogInsert> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO notification_log
            (log_uid, reminder_occurrence_uid, reminder_uid, occurrence_at_utc, channel, status, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (reminder_occurrence_uid, channel) DO NOTHING
            RETURNING log_uid
            "#,
        )
        .bind(entry.id.inner_ref())
        .bind(entry.occurrence_id.inner_ref())
        .bind(entry.reminder_id.inner_ref())
        .bind(entry.occurrence_at_utc)
        .bind(entry.channel.as_str())
        .bind(entry.status.as_str())
        .bind(entry.sent_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to insert notification log entry: {:?}. DB returned error: {:?}",
                entry, e
            );
            e
        })?;

        if let Some(log_uid) = inserted {
            return Ok(LogInsert::Created(log_uid.into()));
        }

        let existing: Option<ExistingLogRaw> = sqlx::query_as::<_, ExistingLogRaw>(
            r#"
            SELECT log_uid, status FROM notification_log
            WHERE reminder_occurrence_uid = $1 AND channel = $2
            "#,
        )
        .bind(entry.occurrence_id.inner_ref())
        .bind(entry.channel.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(classify_existing(existing))
    }

    async fn insert_medication_entry(
        &self,
        entry: &MedicationLogEntry,
    ) -> anyhow::Result<LogInsert> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO medication_notification_log
            (log_uid, medication_dose_uid, channel, status, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (medication_dose_uid, channel) DO NOTHING
            RETURNING log_uid
            "#,
        )
        .bind(entry.id.inner_ref())
        .bind(entry.dose_id.inner_ref())
        .bind(entry.channel.as_str())
        .bind(entry.status.as_str())
        .bind(entry.sent_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to insert medication log entry: {:?}. DB returned error: {:?}",
                entry, e
            );
            e
        })?;

        if let Some(log_uid) = inserted {
            return Ok(LogInsert::Created(log_uid.into()));
        }

        let existing: Option<ExistingLogRaw> = sqlx::query_as::<_, ExistingLogRaw>(
            r#"
            SELECT log_uid, status FROM medication_notification_log
            WHERE medication_dose_uid = $1 AND channel = $2
            "#,
        )
        .bind(entry.dose_id.inner_ref())
        .bind(entry.channel.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(classify_existing(existing))
    }

    async fn finalize_reminder_sent(&self, log_id: &ID, sent_at: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_log
            SET status = 'sent', sent_at = $2
            WHERE log_uid = $1
            "#,
        )
        .bind(log_id.inner_ref())
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_medication_sent(&self, log_id: &ID, sent_at: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE medication_notification_log
            SET status = 'sent', sent_at = $2
            WHERE log_uid = $1
            "#,
        )
        .bind(log_id.inner_ref())
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
