use crate::deliver::{process_job, BatchLookups, JobOutcome};
use crate::freebusy::get_busy_intervals;
use crate::shared::usecase::UseCase;
use futures::StreamExt;
use smart_notifier_domain::{find_interval_at, Channel, NotificationJob, ID};
use smart_notifier_infra::Context;
use smart_notifier_utils::create_random_secret;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{info, warn};

const CLAIM_TOKEN_LEN: usize = 32;
/// Web push is suppressed for users whose Android install was seen within
/// this window; the native app notifies them itself.
const ANDROID_PRESENCE_WINDOW_MILLIS: i64 = 1000 * 60 * 60 * 24 * 7;

/// Aggregate counters for one processing cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rescheduled: usize,
    /// Largest observed delay between a job's due time and this cycle,
    /// in seconds
    pub max_lag_secs: i64,
}

#[derive(Debug, Error)]
pub enum UseCaseError {
    #[error("Job store error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// One scheduler cycle: reclaim stale claims, claim a batch of due push
/// jobs and run them through the delivery pipeline with bounded
/// concurrency.
#[derive(Debug)]
pub struct ProcessBatchUseCase {
    /// Authoritative current time fetched from the job store
    pub now: i64,
}

impl ProcessBatchUseCase {
    async fn build_lookups(
        &self,
        jobs: &[NotificationJob],
        ctx: &Context,
    ) -> Result<BatchLookups, UseCaseError> {
        let reminder_ids = unique_ids(jobs.iter().map(|job| job.reminder_id.clone()));
        let user_ids = unique_ids(jobs.iter().map(|job| job.user_id.clone()));

        let reminders = ctx.repos.reminders.find_many(&reminder_ids).await?;
        let profiles = ctx.repos.profiles.find_many(&user_ids).await?;
        let subscriptions = ctx
            .repos
            .push_subscriptions
            .find_by_users(&user_ids)
            .await?;
        let occurrences = ctx
            .repos
            .reminders
            .find_open_occurrences(&reminder_ids)
            .await?;
        let android_users = ctx
            .repos
            .profiles
            .find_recent_android_users(&user_ids, self.now - ANDROID_PRESENCE_WINDOW_MILLIS)
            .await?;

        let profiles = profiles
            .into_iter()
            .map(|profile| (profile.user_id.clone(), profile))
            .collect::<HashMap<_, _>>();

        let mut subscription_map: HashMap<ID, Vec<_>> = HashMap::new();
        for subscription in subscriptions {
            subscription_map
                .entry(subscription.user_id.clone())
                .or_insert_with(Vec::new)
                .push(subscription);
        }

        let mut occurrence_map = HashMap::new();
        for occurrence in occurrences {
            for time in occurrence.notify_times() {
                occurrence_map.insert((occurrence.reminder_id.clone(), time), occurrence.clone());
            }
        }

        // Resolve which owners need a calendar check before the jobs fan
        // out, one freebusy lookup per user
        let mut calendar_gated_users = HashSet::new();
        let reminder_map = reminders
            .into_iter()
            .map(|reminder| {
                if let Some(owner_id) = &reminder.created_by {
                    let defaults = profiles
                        .get(owner_id)
                        .map(|profile| profile.context_defaults.clone())
                        .unwrap_or_default();
                    if reminder.resolved_settings(&defaults).calendar_busy.enabled {
                        calendar_gated_users.insert(owner_id.clone());
                    }
                }
                (reminder.id.clone(), reminder)
            })
            .collect::<HashMap<_, _>>();

        let mut busy_intervals = HashMap::new();
        for user_id in calendar_gated_users {
            let timezone = profiles
                .get(&user_id)
                .map(|profile| profile.timezone)
                .unwrap_or(chrono_tz::UTC);
            let busy_now = match get_busy_intervals(ctx, &user_id, timezone, self.now).await {
                Ok(intervals) => find_interval_at(&intervals, self.now).cloned(),
                Err(e) => {
                    warn!(
                        "Freebusy check failed for user: {}. Error: {:?}",
                        user_id, e
                    );
                    None
                }
            };
            busy_intervals.insert(user_id, busy_now);
        }

        Ok(BatchLookups {
            reminders: reminder_map,
            profiles,
            subscriptions: subscription_map,
            occurrences: occurrence_map,
            android_users: android_users.into_iter().collect(),
            busy_intervals,
        })
    }
}

fn unique_ids(ids: impl Iterator<Item = ID>) -> Vec<ID> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(id.clone())).collect()
}

#[async_trait::async_trait(?Send)]
impl UseCase for ProcessBatchUseCase {
    type Response = BatchStats;

    type Errors = UseCaseError;

    const NAME: &'static str = "ProcessNotificationBatch";

    async fn execute(&mut self, ctx: &Context) -> Result<Self::Response, Self::Errors> {
        let now = self.now;
        let config = &ctx.config;

        let reclaim_cutoff = now - config.reclaim_minutes * 60 * 1000;
        let reclaimed = ctx.repos.jobs.reclaim_stale(reclaim_cutoff).await?;
        if reclaimed > 0 {
            info!("Reclaimed {} stale notification job claims", reclaimed);
        }

        let window_start = now - config.grace_minutes * 60 * 1000;
        let window_end = now + config.claim_window_secs * 1000;
        let claim_token = create_random_secret(CLAIM_TOKEN_LEN);
        let jobs = ctx
            .repos
            .jobs
            .claim_batch(
                window_start,
                window_end,
                config.claim_limit,
                Channel::Push,
                &claim_token,
                now,
            )
            .await?;
        if jobs.is_empty() {
            return Ok(BatchStats::default());
        }

        let lookups = self.build_lookups(&jobs, ctx).await?;

        let sent = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let rescheduled = AtomicUsize::new(0);
        let max_lag_secs = AtomicI64::new(0);

        futures::stream::iter(jobs.iter())
            .for_each_concurrent(config.max_concurrency, |job| {
                let lookups = &lookups;
                let sent = &sent;
                let failed = &failed;
                let skipped = &skipped;
                let rescheduled = &rescheduled;
                let max_lag_secs = &max_lag_secs;
                async move {
                    max_lag_secs.fetch_max(job.lag_secs(now), Ordering::SeqCst);
                    // One job's failure never aborts the batch
                    match process_job(job, lookups, now, ctx).await {
                        Ok(JobOutcome::Sent) => {
                            sent.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(JobOutcome::Failed) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(JobOutcome::Skipped) => {
                            skipped.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(JobOutcome::Rescheduled) => {
                            rescheduled.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            warn!("Processing job: {} failed. Error: {:?}", job.id, e);
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
            .await;

        Ok(BatchStats {
            claimed: jobs.len(),
            sent: sent.into_inner(),
            failed: failed.into_inner(),
            skipped: skipped.into_inner(),
            rescheduled: rescheduled.into_inner(),
            max_lag_secs: max_lag_secs.into_inner(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::usecase::execute;
    use serde_json::json;
    use smart_notifier_domain::{
        BusyInterval, DeliveryLogStatus, JobEntityType, JobStatus, MedicationDetails,
        NotificationJob, OccurrenceStatus, Profile, PushSubscription, Reminder, ReminderKind,
        ReminderLogEntry, ReminderOccurrence, RETRY_DELAYS_SECS,
    };
    use smart_notifier_infra::{
        Context, DeviceInstall, IDeliveryLogRepo as _, INotificationJobRepo as _,
        IProfileRepo as _, IPushSubscriptionRepo as _, IReminderRepo as _,
        InMemoryCalendarBusyGateway, InMemoryPushGateway, InMemoryRepos,
    };
    use std::sync::Arc;

    // Tue Feb 23 2021 10:00 in Bucharest
    const NOW: i64 = 1_614_067_200_000;

    struct TestContext {
        ctx: Context,
        repos: InMemoryRepos,
        push: Arc<InMemoryPushGateway>,
        calendar: Arc<InMemoryCalendarBusyGateway>,
    }

    fn setup() -> TestContext {
        let (mut ctx, repos) = Context::create_inmemory();
        let push = Arc::new(InMemoryPushGateway::new());
        let calendar = Arc::new(InMemoryCalendarBusyGateway::new());
        ctx.push = push.clone();
        ctx.calendar = calendar.clone();
        TestContext {
            ctx,
            repos,
            push,
            calendar,
        }
    }

    fn reminder_factory(owner_id: &ID) -> Reminder {
        Reminder {
            id: Default::default(),
            title: "Plata facturi".into(),
            household_id: Some(Default::default()),
            created_by: Some(owner_id.clone()),
            is_active: true,
            kind: ReminderKind::Task,
            medication_details: MedicationDetails::default(),
            context_settings: None,
            timezone: None,
        }
    }

    fn profile_factory(user_id: &ID) -> Profile {
        Profile {
            user_id: user_id.clone(),
            email: None,
            timezone: chrono_tz::Europe::Bucharest,
            context_defaults: Default::default(),
            notify_by_push: true,
        }
    }

    fn subscription_factory(user_id: &ID, endpoint: &str) -> PushSubscription {
        PushSubscription {
            id: Default::default(),
            user_id: user_id.clone(),
            endpoint: endpoint.into(),
            p256dh: "p256dh-key".into(),
            auth: "auth-key".into(),
        }
    }

    fn occurrence_factory(reminder_id: &ID, occur_at: i64) -> ReminderOccurrence {
        ReminderOccurrence {
            id: Default::default(),
            reminder_id: reminder_id.clone(),
            occur_at,
            snoozed_until: None,
            status: OccurrenceStatus::Open,
        }
    }

    fn job_factory(reminder: &Reminder, occurrence: &ReminderOccurrence) -> NotificationJob {
        NotificationJob {
            id: Default::default(),
            entity_type: JobEntityType::Reminder,
            entity_id: occurrence.id.clone(),
            reminder_id: reminder.id.clone(),
            user_id: reminder.created_by.clone().unwrap(),
            channel: Channel::Push,
            notify_at: occurrence.occur_at,
            occurrence_at_utc: occurrence.occur_at,
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

    /// Seeds a deliverable task reminder due one minute ago and returns
    /// its job.
    async fn seed_due_job(test: &TestContext) -> NotificationJob {
        let user_id = ID::default();
        let reminder = reminder_factory(&user_id);
        let occurrence = occurrence_factory(&reminder.id, NOW - 60_000);
        let job = job_factory(&reminder, &occurrence);

        test.repos.reminders.insert(&reminder);
        test.repos.reminders.insert_occurrence(&occurrence);
        test.repos.profiles.insert(&profile_factory(&user_id));
        test.repos
            .push_subscriptions
            .insert(&subscription_factory(&user_id, "https://push.example/abc"));
        test.repos.jobs.insert(&job).await.unwrap();
        job
    }

    async fn run_cycle(test: &TestContext, now: i64) -> BatchStats {
        execute(ProcessBatchUseCase { now }, &test.ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn delivers_a_due_job_end_to_end() {
        let test = setup();
        let job = seed_due_job(&test).await;

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.max_lag_secs, 60);

        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Sent);
        assert_eq!(stored.delivered_at, Some(NOW));
        assert!(stored.last_error.is_none());
        // The action token was minted and embedded in the payload
        assert!(stored.has_valid_action_token(NOW));

        let sent = test.push.sent_payloads();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://push.example/abc");
        assert_eq!(sent[0].1.title, "Plata facturi");
        assert!(sent[0].1.body.starts_with("Scadenta: "));
        assert!(sent[0].1.url.contains("/app/reminders/"));
        assert_eq!(Some(&sent[0].1.action_token), stored.action_token.as_ref());

        let logs = test.repos.delivery_logs.reminder_entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryLogStatus::Sent);
        assert_eq!(logs[0].sent_at, Some(NOW));
    }

    #[tokio::test]
    async fn an_empty_window_produces_empty_stats() {
        let test = setup();
        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats, BatchStats::default());
    }

    #[tokio::test]
    async fn future_and_backing_off_jobs_are_not_claimed() {
        let test = setup();
        let job = seed_due_job(&test).await;

        // Push the job a minute past the claim window
        test.repos
            .jobs
            .reschedule(&job.id, NOW + 60_000)
            .await
            .unwrap();
        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.claimed, 0);

        // A job awaiting backoff is not due either
        test.repos.jobs.reschedule(&job.id, NOW).await.unwrap();
        test.repos
            .jobs
            .revert_for_retry(&job.id, 1, NOW + 30_000, "push_failed")
            .await
            .unwrap();
        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.claimed, 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_detected_and_skipped() {
        let test = setup();
        let job = seed_due_job(&test).await;

        // Another worker already delivered this occurrence
        let occurrence_id = job.entity_id.clone();
        test.repos
            .delivery_logs
            .insert_reminder_entry(&ReminderLogEntry {
                id: Default::default(),
                occurrence_id,
                reminder_id: job.reminder_id.clone(),
                occurrence_at_utc: job.occurrence_at_utc,
                channel: Channel::Push,
                status: DeliveryLogStatus::Sent,
                sent_at: Some(NOW - 1000),
            })
            .await
            .unwrap();

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.sent, 0);

        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Skipped);
        assert_eq!(stored.last_error.as_deref(), Some("duplicate"));
        assert!(test.push.sent_payloads().is_empty());
        // Still exactly one log row
        assert_eq!(test.repos.delivery_logs.reminder_entries().len(), 1);
    }

    #[tokio::test]
    async fn quiet_hours_defer_reschedules_without_sending() {
        let test = setup();
        let job = seed_due_job(&test).await;
        let mut reminder = test
            .repos
            .reminders
            .find_many(&[job.reminder_id.clone()])
            .await
            .unwrap()
            .remove(0);
        // Monday-only window; NOW is a Tuesday
        reminder.context_settings = Some(json!({
            "timeWindow": {
                "enabled": true,
                "startHour": 9,
                "endHour": 20,
                "daysOfWeek": ["monday"]
            }
        }));
        test.repos.reminders.update(&reminder);

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.rescheduled, 1);
        assert_eq!(stats.sent, 0);

        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.notify_at, NOW + 15 * 60 * 1000);
        assert!(stored.claim_token.is_none());
        assert!(test.push.sent_payloads().is_empty());
        assert!(test.repos.delivery_logs.reminder_entries().is_empty());
    }

    #[tokio::test]
    async fn calendar_busy_snoozes_past_the_busy_block() {
        let test = setup();
        let job = seed_due_job(&test).await;
        let mut reminder = test
            .repos
            .reminders
            .find_many(&[job.reminder_id.clone()])
            .await
            .unwrap()
            .remove(0);
        reminder.context_settings =
            Some(json!({ "calendarBusy": { "enabled": true, "snoozeMinutes": 15 } }));
        test.repos.reminders.update(&reminder);

        let busy_end = NOW + 30 * 60 * 1000;
        test.calendar.set_busy(vec![BusyInterval {
            start_ts: NOW - 5 * 60 * 1000,
            end_ts: busy_end,
        }]);

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.rescheduled, 1);
        assert_eq!(test.calendar.call_count(), 1);

        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert!(stored.notify_at >= busy_end);
        assert_eq!(stored.occurrence_at_utc, stored.notify_at);

        // The occurrence itself was snoozed along with the job
        let occurrence = test.repos.reminders.occurrence(&job.entity_id).unwrap();
        assert_eq!(occurrence.status, OccurrenceStatus::Snoozed);
        assert_eq!(occurrence.snoozed_until, Some(stored.notify_at));
    }

    #[tokio::test]
    async fn push_failure_retries_with_backoff_and_succeeds_later() {
        let test = setup();
        let job = seed_due_job(&test).await;
        test.push.fail_all_sends(true);

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.failed, 1);

        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.next_retry_at, Some(NOW + RETRY_DELAYS_SECS[0] * 1000));
        assert_eq!(stored.last_error.as_deref(), Some("push_failed"));
        // The reserved log row survives the failed attempt
        let logs = test.repos.delivery_logs.reminder_entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryLogStatus::Pending);

        // Backoff elapsed and the provider recovered
        test.push.fail_all_sends(false);
        let later = NOW + RETRY_DELAYS_SECS[0] * 1000 + 1000;
        let stats = run_cycle(&test, later).await;
        assert_eq!(stats.sent, 1);

        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Sent);
        // The retried attempt finalized its original row, no second insert
        let logs = test.repos.delivery_logs.reminder_entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryLogStatus::Sent);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_abandons_the_job() {
        let test = setup();
        let job = seed_due_job(&test).await;
        test.push.fail_all_sends(true);

        let mut now = NOW;
        for attempt in 0..RETRY_DELAYS_SECS.len() {
            let stats = run_cycle(&test, now).await;
            assert_eq!(stats.failed, 1, "attempt {}", attempt);
            let stored = test.repos.jobs.find(&job.id).await.unwrap();
            assert_eq!(stored.status, JobStatus::Pending);
            now = stored.next_retry_at.unwrap() + 1000;
        }

        // The budget is spent, the next failure is terminal
        let stats = run_cycle(&test, now).await;
        assert_eq!(stats.failed, 1);
        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, RETRY_DELAYS_SECS.len() as i64 + 1);

        let stats = run_cycle(&test, now + 24 * 60 * 60 * 1000).await;
        assert_eq!(stats.claimed, 0);
    }

    #[tokio::test]
    async fn gone_endpoints_are_pruned_without_failing_the_job() {
        let test = setup();
        let job = seed_due_job(&test).await;
        test.repos
            .push_subscriptions
            .insert(&subscription_factory(&job.user_id, "https://push.example/gone"));
        test.push.mark_endpoint_gone("https://push.example/gone");

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.sent, 1);

        let remaining = test.repos.push_subscriptions.all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].endpoint, "https://push.example/abc");
        // The healthy endpoint still got its notification
        assert_eq!(test.push.sent_payloads().len(), 1);
    }

    #[tokio::test]
    async fn missing_subscriptions_and_disabled_push_are_benign_skips() {
        let test = setup();
        let job = seed_due_job(&test).await;
        test.repos
            .push_subscriptions
            .delete_by_endpoints(&["https://push.example/abc".to_string()])
            .await
            .unwrap();

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.skipped, 1);
        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Skipped);
        assert_eq!(stored.last_error.as_deref(), Some("missing_push"));

        // Push preference off
        let test = setup();
        let job = seed_due_job(&test).await;
        let mut profile = test
            .repos
            .profiles
            .find_many(&[job.user_id.clone()])
            .await
            .unwrap()
            .remove(0);
        profile.notify_by_push = false;
        test.repos.profiles.update(&profile);

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.skipped, 1);
        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.last_error.as_deref(), Some("pref_push_off"));
    }

    #[tokio::test]
    async fn recent_android_install_suppresses_web_push() {
        let test = setup();
        let job = seed_due_job(&test).await;
        test.repos.profiles.insert_install(&DeviceInstall {
            user_id: job.user_id.clone(),
            platform: "android".into(),
            last_seen_at: NOW - 24 * 60 * 60 * 1000,
        });

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.skipped, 1);
        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.last_error.as_deref(), Some("mobile_app_present"));

        // An install last seen beyond the presence window does not count
        let test = setup();
        let job = seed_due_job(&test).await;
        test.repos.profiles.insert_install(&DeviceInstall {
            user_id: job.user_id.clone(),
            platform: "android".into(),
            last_seen_at: NOW - ANDROID_PRESENCE_WINDOW_MILLIS - 1000,
        });
        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.sent, 1);
    }

    #[tokio::test]
    async fn crashed_worker_claims_are_reclaimed_and_retried() {
        let test = setup();
        let job = seed_due_job(&test).await;

        // Simulate a worker that claimed the job six minutes ago and died
        let crash_time = NOW - 6 * 60 * 1000;
        test.repos
            .jobs
            .claim_batch(
                NOW - 60 * 60 * 1000,
                NOW,
                10,
                Channel::Push,
                "dead-worker",
                crash_time,
            )
            .await
            .unwrap();
        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Processing);

        // The next cycle reclaims the stale claim and delivers
        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.sent, 1);
        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Sent);
    }

    #[tokio::test]
    async fn inactive_reminders_fail_terminally() {
        let test = setup();
        let job = seed_due_job(&test).await;
        let mut reminder = test
            .repos
            .reminders
            .find_many(&[job.reminder_id.clone()])
            .await
            .unwrap()
            .remove(0);
        reminder.is_active = false;
        test.repos.reminders.update(&reminder);

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.failed, 1);

        let stored = test.repos.jobs.find(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("reminder_inactive"));
        // No backoff was consumed, the job is dead regardless of retries
        assert_eq!(stored.retry_count, 0);
        assert!(stored.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn medication_doses_deliver_with_medication_copy() {
        let test = setup();
        let user_id = ID::default();
        let mut reminder = reminder_factory(&user_id);
        reminder.kind = ReminderKind::Medication;
        reminder.medication_details = MedicationDetails {
            name: Some("Algocalmin".into()),
        };

        let dose_id = ID::default();
        let mut job = NotificationJob {
            entity_type: JobEntityType::MedicationDose,
            entity_id: dose_id,
            ..job_factory(&reminder, &occurrence_factory(&reminder.id, NOW - 60_000))
        };
        job.notify_at = NOW - 60_000;
        job.occurrence_at_utc = job.notify_at;

        test.repos.reminders.insert(&reminder);
        test.repos.profiles.insert(&profile_factory(&user_id));
        test.repos
            .push_subscriptions
            .insert(&subscription_factory(&user_id, "https://push.example/med"));
        test.repos.jobs.insert(&job).await.unwrap();

        let stats = run_cycle(&test, NOW).await;
        assert_eq!(stats.sent, 1);

        let sent = test.push.sent_payloads();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.title.contains("Algocalmin"));
        assert!(sent[0].1.body.starts_with("Este timpul pentru medicament"));
        assert!(sent[0].1.url.ends_with("/app"));

        let logs = test.repos.delivery_logs.medication_entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryLogStatus::Sent);
    }
}
