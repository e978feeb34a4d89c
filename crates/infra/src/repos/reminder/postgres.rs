use super::IReminderRepo;

use chrono_tz::Tz;
use serde_json::Value;
use smart_notifier_domain::{
    MedicationDetails, OccurrenceStatus, Reminder, ReminderKind, ReminderOccurrence, ID,
};
use sqlx::{types::Uuid, FromRow, PgPool};
use std::convert::TryFrom;
use tracing::error;

pub struct PostgresReminderRepo {
    pool: PgPool,
}

impl PostgresReminderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ReminderRaw {
    reminder_uid: Uuid,
    title: String,
    household_uid: Option<Uuid>,
    created_by: Option<Uuid>,
    is_active: bool,
    kind: String,
    medication_details: Option<Value>,
    context_settings: Option<Value>,
    tz: Option<String>,
}

impl From<ReminderRaw> for Reminder {
    fn from(raw: ReminderRaw) -> Self {
        Self {
            id: raw.reminder_uid.into(),
            title: raw.title,
            household_id: raw.household_uid.map(|uid| uid.into()),
            created_by: raw.created_by.map(|uid| uid.into()),
            is_active: raw.is_active,
            kind: ReminderKind::parse(&raw.kind),
            medication_details: MedicationDetails::parse(raw.medication_details.as_ref()),
            context_settings: raw.context_settings,
            timezone: raw.tz.and_then(|tz| tz.parse::<Tz>().ok()),
        }
    }
}

#[derive(Debug, FromRow)]
struct OccurrenceRaw {
    occurrence_uid: Uuid,
    reminder_uid: Uuid,
    occur_at: i64,
    snoozed_until: Option<i64>,
    status: String,
}

impl TryFrom<OccurrenceRaw> for ReminderOccurrence {
    type Error = anyhow::Error;

    fn try_from(raw: OccurrenceRaw) -> anyhow::Result<Self> {
        Ok(Self {
            id: raw.occurrence_uid.into(),
            reminder_id: raw.reminder_uid.into(),
            occur_at: raw.occur_at,
            snoozed_until: raw.snoozed_until,
            status: raw.status.parse::<OccurrenceStatus>()?,
        })
    }
}

#[async_trait::async_trait]
impl IReminderRepo for PostgresReminderRepo {
    async fn find_many(&self, reminder_ids: &[ID]) -> anyhow::Result<Vec<Reminder>> {
        let ids = reminder_ids
            .iter()
            .map(|id| *id.inner_ref())
            .collect::<Vec<_>>();
        let reminders: Vec<ReminderRaw> = sqlx::query_as::<_, ReminderRaw>(
            r#"
            SELECT * FROM reminders
            WHERE reminder_uid = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find reminders with ids: {:?} failed. DB returned error: {:?}",
                reminder_ids, e
            );
            e
        })?;
        Ok(reminders.into_iter().map(|r| r.into()).collect())
    }

    async fn find_open_occurrences(
        &self,
        reminder_ids: &[ID],
    ) -> anyhow::Result<Vec<ReminderOccurrence>> {
        let ids = reminder_ids
            .iter()
            .map(|id| *id.inner_ref())
            .collect::<Vec<_>>();
        let occurrences: Vec<OccurrenceRaw> = sqlx::query_as::<_, OccurrenceRaw>(
            r#"
            SELECT * FROM reminder_occurrences
            WHERE reminder_uid = ANY($1) AND status IN ('open', 'snoozed')
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find occurrences for reminders: {:?} failed. DB returned error: {:?}",
                reminder_ids, e
            );
            e
        })?;
        occurrences
            .into_iter()
            .map(ReminderOccurrence::try_from)
            .collect()
    }

    async fn snooze_occurrence(&self, occurrence_id: &ID, until: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE reminder_occurrences
            SET snoozed_until = $2, status = 'snoozed'
            WHERE occurrence_uid = $1
            "#,
        )
        .bind(occurrence_id.inner_ref())
        .bind(until)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to snooze occurrence: {:?}. DB returned error: {:?}",
                occurrence_id, e
            );
            e
        })?;
        Ok(())
    }
}
