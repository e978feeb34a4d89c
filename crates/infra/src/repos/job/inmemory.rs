use super::INotificationJobRepo;
use crate::repos::shared::inmemory_repo::*;
use chrono::Utc;
use smart_notifier_domain::{Channel, JobStatus, NotificationJob, ID};

pub struct InMemoryNotificationJobRepo {
    jobs: std::sync::Mutex<Vec<NotificationJob>>,
}

impl InMemoryNotificationJobRepo {
    pub fn new() -> Self {
        Self {
            jobs: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl INotificationJobRepo for InMemoryNotificationJobRepo {
    async fn claim_batch(
        &self,
        window_start: i64,
        window_end: i64,
        limit: i64,
        channel: Channel,
        claim_token: &str,
        now: i64,
    ) -> anyhow::Result<Vec<NotificationJob>> {
        // The mutex plays the role of the claim transaction
        let mut jobs = self.jobs.lock().unwrap();
        let mut due = jobs
            .iter_mut()
            .filter(|job| {
                job.status == JobStatus::Pending
                    && job.channel == channel
                    && job.notify_at >= window_start
                    && job.notify_at <= window_end
                    && job.next_retry_at.map(|at| at <= now).unwrap_or(true)
            })
            .collect::<Vec<_>>();
        due.sort_by_key(|job| job.notify_at);

        let mut claimed = Vec::new();
        for job in due.into_iter().take(limit.max(0) as usize) {
            job.status = JobStatus::Processing;
            job.claimed_at = Some(now);
            job.claim_token = Some(claim_token.to_string());
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn reclaim_stale(&self, cutoff: i64) -> anyhow::Result<u64> {
        let reclaimed = update_by(&self.jobs, |job| {
            let stale = job.status == JobStatus::Processing
                && job.claimed_at.map(|at| at < cutoff).unwrap_or(false);
            if stale {
                job.status = JobStatus::Pending;
                job.claimed_at = None;
                job.claim_token = None;
            }
            stale
        });
        Ok(reclaimed as u64)
    }

    async fn mark_sent(&self, job_id: &ID, now: i64) -> anyhow::Result<()> {
        update_by(&self.jobs, |job| {
            if &job.id == job_id {
                job.status = JobStatus::Sent;
                job.last_error = None;
                job.delivered_at = Some(now);
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn mark_skipped(&self, job_id: &ID, reason: &str) -> anyhow::Result<()> {
        update_by(&self.jobs, |job| {
            if &job.id == job_id {
                job.status = JobStatus::Skipped;
                job.last_error = Some(reason.to_string());
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn revert_for_retry(
        &self,
        job_id: &ID,
        retry_count: i64,
        next_retry_at: i64,
        error: &str,
    ) -> anyhow::Result<()> {
        update_by(&self.jobs, |job| {
            if &job.id == job_id {
                job.status = JobStatus::Pending;
                job.retry_count = retry_count;
                job.next_retry_at = Some(next_retry_at);
                job.last_error = Some(error.to_string());
                job.claimed_at = None;
                job.claim_token = None;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn mark_failed(&self, job_id: &ID, retry_count: i64, error: &str) -> anyhow::Result<()> {
        update_by(&self.jobs, |job| {
            if &job.id == job_id {
                job.status = JobStatus::Failed;
                job.retry_count = retry_count;
                job.last_error = Some(error.to_string());
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn reschedule(&self, job_id: &ID, notify_at: i64) -> anyhow::Result<()> {
        update_by(&self.jobs, |job| {
            if &job.id == job_id {
                job.status = JobStatus::Pending;
                job.notify_at = notify_at;
                job.occurrence_at_utc = notify_at;
                job.claimed_at = None;
                job.claim_token = None;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn set_action_token(
        &self,
        job_id: &ID,
        token: &str,
        expires_at: i64,
    ) -> anyhow::Result<()> {
        update_by(&self.jobs, |job| {
            if &job.id == job_id {
                job.action_token = Some(token.to_string());
                job.action_token_expires_at = Some(expires_at);
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn count_pending(&self, channel: Channel) -> anyhow::Result<i64> {
        let pending = find_by(&self.jobs, |job: &NotificationJob| {
            job.status == JobStatus::Pending && job.channel == channel
        });
        Ok(pending.len() as i64)
    }

    async fn insert(&self, job: &NotificationJob) -> anyhow::Result<()> {
        insert(job, &self.jobs);
        Ok(())
    }

    async fn find(&self, job_id: &ID) -> Option<NotificationJob> {
        find(job_id, &self.jobs)
    }

    async fn db_now(&self) -> anyhow::Result<i64> {
        Ok(Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smart_notifier_domain::JobEntityType;

    fn job_factory(notify_at: i64) -> NotificationJob {
        NotificationJob {
            id: Default::default(),
            entity_type: JobEntityType::Reminder,
            entity_id: Default::default(),
            reminder_id: Default::default(),
            user_id: Default::default(),
            channel: Channel::Push,
            notify_at,
            occurrence_at_utc: notify_at,
            status: JobStatus::Pending,
            retry_count: 0,
            claimed_at: None,
            claim_token: None,
            delivered_at: None,
            next_retry_at: None,
            last_error: None,
            action_token: None,
            action_token_expires_at: None,
        }
    }

    #[tokio::test]
    async fn claims_only_due_pending_jobs_in_order() {
        let repo = InMemoryNotificationJobRepo::new();
        let now = 1_000_000;

        let overdue = job_factory(now - 5000);
        let due = job_factory(now);
        let future = job_factory(now + 60_000);
        let mut backing_off = job_factory(now - 1000);
        backing_off.next_retry_at = Some(now + 30_000);
        let email = {
            let mut job = job_factory(now);
            job.channel = Channel::Email;
            job
        };
        for job in [&overdue, &due, &future, &backing_off, &email] {
            repo.insert(job).await.unwrap();
        }

        let claimed = repo
            .claim_batch(now - 10_000, now + 5000, 10, Channel::Push, "token-a", now)
            .await
            .unwrap();
        assert_eq!(
            claimed.iter().map(|j| j.id.clone()).collect::<Vec<_>>(),
            vec![overdue.id.clone(), due.id.clone()]
        );
        for job in &claimed {
            assert_eq!(job.status, JobStatus::Processing);
            assert_eq!(job.claim_token.as_deref(), Some("token-a"));
            assert_eq!(job.claimed_at, Some(now));
        }

        // A second claim over the same window finds nothing left
        let claimed = repo
            .claim_batch(now - 10_000, now + 5000, 10, Channel::Push, "token-b", now)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn claim_respects_limit() {
        let repo = InMemoryNotificationJobRepo::new();
        let now = 1_000_000;
        for offset in 0..5 {
            repo.insert(&job_factory(now - offset * 1000)).await.unwrap();
        }

        let claimed = repo
            .claim_batch(now - 10_000, now, 2, Channel::Push, "token", now)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);
        // Most overdue first
        assert!(claimed[0].notify_at <= claimed[1].notify_at);
    }

    #[tokio::test]
    async fn reclaims_only_stale_claims() {
        let repo = InMemoryNotificationJobRepo::new();
        let now = 1_000_000;
        repo.insert(&job_factory(now - 1000)).await.unwrap();
        repo.insert(&job_factory(now - 2000)).await.unwrap();

        let claimed = repo
            .claim_batch(now - 10_000, now, 10, Channel::Push, "token", now)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);

        // Nothing is stale yet
        let reclaimed = repo.reclaim_stale(now).await.unwrap();
        assert_eq!(reclaimed, 0);

        // Five minutes later both claims are stale and become claimable again
        let later = now + 5 * 60 * 1000 + 1;
        let reclaimed = repo.reclaim_stale(later - 5 * 60 * 1000 + 1).await.unwrap();
        assert_eq!(reclaimed, 2);

        let reclaimed_jobs = repo
            .claim_batch(now - 10_000, later, 10, Channel::Push, "token-2", later)
            .await
            .unwrap();
        assert_eq!(reclaimed_jobs.len(), 2);
    }

    #[tokio::test]
    async fn reschedule_moves_occurrence_and_clears_claim() {
        let repo = InMemoryNotificationJobRepo::new();
        let now = 1_000_000;
        let job = job_factory(now);
        repo.insert(&job).await.unwrap();
        repo.claim_batch(now - 1000, now, 1, Channel::Push, "token", now)
            .await
            .unwrap();

        let new_notify_at = now + 15 * 60 * 1000;
        repo.reschedule(&job.id, new_notify_at).await.unwrap();

        let updated = repo.find(&job.id).await.unwrap();
        assert_eq!(updated.status, JobStatus::Pending);
        assert_eq!(updated.notify_at, new_notify_at);
        assert_eq!(updated.occurrence_at_utc, new_notify_at);
        assert!(updated.claim_token.is_none());
        assert!(updated.claimed_at.is_none());
    }
}
