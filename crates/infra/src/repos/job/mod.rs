mod inmemory;
mod postgres;

pub use inmemory::InMemoryNotificationJobRepo;
pub use postgres::PostgresNotificationJobRepo;
use smart_notifier_domain::{Channel, NotificationJob, ID};

#[async_trait::async_trait]
pub trait INotificationJobRepo: Send + Sync {
    /// Atomically moves up to `limit` due pending jobs to `processing`,
    /// stamping the claim, and returns them ordered by `notify_at`
    /// ascending. Two workers calling this concurrently never both
    /// receive the same job. A job whose `next_retry_at` lies in the
    /// future is not due yet even when `notify_at` is.
    async fn claim_batch(
        &self,
        window_start: i64,
        window_end: i64,
        limit: i64,
        channel: Channel,
        claim_token: &str,
        now: i64,
    ) -> anyhow::Result<Vec<NotificationJob>>;
    /// Resets jobs abandoned in `processing` by a crashed worker back to
    /// `pending`, clearing the claim fields. Returns how many were
    /// reclaimed.
    async fn reclaim_stale(&self, cutoff: i64) -> anyhow::Result<u64>;
    async fn mark_sent(&self, job_id: &ID, now: i64) -> anyhow::Result<()>;
    async fn mark_skipped(&self, job_id: &ID, reason: &str) -> anyhow::Result<()>;
    /// Failure within the retry budget: back to `pending` with the next
    /// attempt scheduled and the claim cleared.
    async fn revert_for_retry(
        &self,
        job_id: &ID,
        retry_count: i64,
        next_retry_at: i64,
        error: &str,
    ) -> anyhow::Result<()>;
    /// Terminal failure once the retry budget is exhausted.
    async fn mark_failed(&self, job_id: &ID, retry_count: i64, error: &str) -> anyhow::Result<()>;
    /// Pushes a job into the future without treating it as an error.
    /// Updates both `notify_at` and `occurrence_at_utc`.
    async fn reschedule(&self, job_id: &ID, notify_at: i64) -> anyhow::Result<()>;
    async fn set_action_token(
        &self,
        job_id: &ID,
        token: &str,
        expires_at: i64,
    ) -> anyhow::Result<()>;
    async fn count_pending(&self, channel: Channel) -> anyhow::Result<i64>;
    async fn insert(&self, job: &NotificationJob) -> anyhow::Result<()>;
    async fn find(&self, job_id: &ID) -> Option<NotificationJob>;
    /// Authoritative current time of the job store, so claim windows are
    /// not skewed by the worker host clock.
    async fn db_now(&self) -> anyhow::Result<i64>;
}
