use super::INotificationJobRepo;

use smart_notifier_domain::{Channel, JobEntityType, JobStatus, NotificationJob, ID};
use sqlx::{types::Uuid, FromRow, PgPool};
use std::convert::TryFrom;
use tracing::error;

pub struct PostgresNotificationJobRepo {
    pool: PgPool,
}

impl PostgresNotificationJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct JobRaw {
    job_uid: Uuid,
    entity_type: String,
    entity_uid: Uuid,
    reminder_uid: Uuid,
    user_uid: Uuid,
    channel: String,
    notify_at: i64,
    occurrence_at_utc: i64,
    status: String,
    retry_count: i64,
    claimed_at: Option<i64>,
    claim_token: Option<String>,
    delivered_at: Option<i64>,
    next_retry_at: Option<i64>,
    last_error: Option<String>,
    action_token: Option<String>,
    action_token_expires_at: Option<i64>,
}

impl TryFrom<JobRaw> for NotificationJob {
    type Error = anyhow::Error;

    fn try_from(raw: JobRaw) -> anyhow::Result<Self> {
        Ok(Self {
            id: raw.job_uid.into(),
            entity_type: raw.entity_type.parse::<JobEntityType>()?,
            entity_id: raw.entity_uid.into(),
            reminder_id: raw.reminder_uid.into(),
            user_id: raw.user_uid.into(),
            channel: raw.channel.parse::<Channel>()?,
            notify_at: raw.notify_at,
            occurrence_at_utc: raw.occurrence_at_utc,
            status: raw.status.parse::<JobStatus>()?,
            retry_count: raw.retry_count,
            claimed_at: raw.claimed_at,
            claim_token: raw.claim_token,
            delivered_at: raw.delivered_at,
            next_retry_at: raw.next_retry_at,
            last_error: raw.last_error,
            action_token: raw.action_token,
            action_token_expires_at: raw.action_token_expires_at,
        })
    }
}

#[async_trait::async_trait]
impl INotificationJobRepo for PostgresNotificationJobRepo {
    async fn claim_batch(
        &self,
        window_start: i64,
        window_end: i64,
        limit: i64,
        channel: Channel,
        claim_token: &str,
        now: i64,
    ) -> anyhow::Result<Vec<NotificationJob>> {
        // SKIP LOCKED makes the subselect race-free across workers: a row
        // locked by a concurrent claim is passed over instead of blocking
        // or being claimed twice.
        let jobs: Vec<JobRaw> = sqlx::query_as::<_, JobRaw>(
            r#"
            UPDATE notification_jobs
            SET status = 'processing', claimed_at = $1, claim_token = $2
            WHERE job_uid IN (
                SELECT job_uid FROM notification_jobs
                WHERE status = 'pending'
                  AND channel = $3
                  AND notify_at >= $4 AND notify_at <= $5
                  AND (next_retry_at IS NULL OR next_retry_at <= $1)
                ORDER BY notify_at ASC
                LIMIT $6
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(claim_token)
        .bind(channel.as_str())
        .bind(window_start)
        .bind(window_end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to claim notification jobs batch. DB returned error: {:?}",
                e
            );
            e
        })?;

        let mut claimed = jobs
            .into_iter()
            .map(NotificationJob::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        claimed.sort_by_key(|job| job.notify_at);
        Ok(claimed)
    }

    async fn reclaim_stale(&self, cutoff: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'pending', claimed_at = NULL, claim_token = NULL
            WHERE status = 'processing' AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to reclaim stale notification jobs. DB returned error: {:?}",
                e
            );
            e
        })?;
        Ok(res.rows_affected())
    }

    async fn mark_sent(&self, job_id: &ID, now: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'sent', last_error = NULL, delivered_at = $2
            WHERE job_uid = $1
            "#,
        )
        .bind(job_id.inner_ref())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_skipped(&self, job_id: &ID, reason: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'skipped', last_error = $2
            WHERE job_uid = $1
            "#,
        )
        .bind(job_id.inner_ref())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revert_for_retry(
        &self,
        job_id: &ID,
        retry_count: i64,
        next_retry_at: i64,
        error: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'pending',
                retry_count = $2,
                next_retry_at = $3,
                last_error = $4,
                claimed_at = NULL,
                claim_token = NULL
            WHERE job_uid = $1
            "#,
        )
        .bind(job_id.inner_ref())
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: &ID, retry_count: i64, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'failed', retry_count = $2, last_error = $3
            WHERE job_uid = $1
            "#,
        )
        .bind(job_id.inner_ref())
        .bind(retry_count)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reschedule(&self, job_id: &ID, notify_at: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'pending',
                notify_at = $2,
                occurrence_at_utc = $2,
                claimed_at = NULL,
                claim_token = NULL
            WHERE job_uid = $1
            "#,
        )
        .bind(job_id.inner_ref())
        .bind(notify_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_action_token(
        &self,
        job_id: &ID,
        token: &str,
        expires_at: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET action_token = $2, action_token_expires_at = $3
            WHERE job_uid = $1
            "#,
        )
        .bind(job_id.inner_ref())
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_pending(&self, channel: Channel) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notification_jobs
            WHERE status = 'pending' AND channel = $1
            "#,
        )
        .bind(channel.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert(&self, job: &NotificationJob) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_jobs
            (job_uid, entity_type, entity_uid, reminder_uid, user_uid, channel,
             notify_at, occurrence_at_utc, status, retry_count, claimed_at,
             claim_token, delivered_at, next_retry_at, last_error, action_token,
             action_token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(job.id.inner_ref())
        .bind(job.entity_type.as_str())
        .bind(job.entity_id.inner_ref())
        .bind(job.reminder_id.inner_ref())
        .bind(job.user_id.inner_ref())
        .bind(job.channel.as_str())
        .bind(job.notify_at)
        .bind(job.occurrence_at_utc)
        .bind(job.status.as_str())
        .bind(job.retry_count)
        .bind(job.claimed_at)
        .bind(job.claim_token.as_deref())
        .bind(job.delivered_at)
        .bind(job.next_retry_at)
        .bind(job.last_error.as_deref())
        .bind(job.action_token.as_deref())
        .bind(job.action_token_expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to insert notification job: {:?}. DB returned error: {:?}",
                job, e
            );
            e
        })?;
        Ok(())
    }

    async fn find(&self, job_id: &ID) -> Option<NotificationJob> {
        let raw: Option<JobRaw> = sqlx::query_as::<_, JobRaw>(
            r#"
            SELECT * FROM notification_jobs
            WHERE job_uid = $1
            "#,
        )
        .bind(job_id.inner_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find notification job with id: {:?} failed. DB returned error: {:?}",
                job_id, e
            );
            e
        })
        .ok()?;
        raw.and_then(|job| NotificationJob::try_from(job).ok())
    }

    async fn db_now(&self) -> anyhow::Result<i64> {
        let now: i64 =
            sqlx::query_scalar("SELECT (EXTRACT(EPOCH FROM now()) * 1000)::BIGINT")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Unable to read db time. DB returned error: {:?}", e);
                    e
                })?;
        Ok(now)
    }
}
