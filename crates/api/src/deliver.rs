use chrono::{Locale, TimeZone, Utc};
use chrono_tz::Tz;
use smart_notifier_domain::{
    evaluate, plan_failure, ActionToken, BusyInterval, Decision, DeliveryLogStatus,
    FailureTransition, JobEntityType, MedicationLogEntry, NotificationJob, Profile,
    PushSubscription, Reminder, ReminderKind, ReminderLogEntry, ReminderOccurrence, ID,
    DEFER_SHORT_MILLIS,
};
use smart_notifier_infra::{Context, LogInsert, PushDeliveryError, PushNotification};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{error, warn};

/// What processing one claimed job came to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Sent,
    Skipped,
    Failed,
    /// Context evaluation pushed the job into the future
    Rescheduled,
}

/// Prefetched read models for one claimed batch, shared by the
/// concurrently processed jobs.
pub struct BatchLookups {
    pub reminders: HashMap<ID, Reminder>,
    pub profiles: HashMap<ID, Profile>,
    pub subscriptions: HashMap<ID, Vec<PushSubscription>>,
    /// Occurrences keyed by `(reminder, notify time)`, under both their
    /// original and snoozed times
    pub occurrences: HashMap<(ID, i64), ReminderOccurrence>,
    /// Users with a recently seen Android install; the native app handles
    /// their notifications
    pub android_users: HashSet<ID>,
    /// Busy interval containing "now", per calendar-gated user
    pub busy_intervals: HashMap<ID, Option<BusyInterval>>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Job store error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Failure on the retry path: backs off within the budget, abandons the
/// job beyond it.
async fn fail_job(
    ctx: &Context,
    job: &NotificationJob,
    now: i64,
    reason: &str,
) -> Result<(), DeliveryError> {
    match plan_failure(job.retry_count, now) {
        FailureTransition::Retry {
            retry_count,
            next_retry_at,
        } => {
            ctx.repos
                .jobs
                .revert_for_retry(&job.id, retry_count, next_retry_at, reason)
                .await?
        }
        FailureTransition::Abandon { retry_count } => {
            ctx.repos
                .jobs
                .mark_failed(&job.id, retry_count, reason)
                .await?
        }
    }
    Ok(())
}

/// Dead jobs are failed right away, no amount of retrying will revive a
/// deactivated reminder or a missing dose.
async fn fail_job_terminal(
    ctx: &Context,
    job: &NotificationJob,
    reason: &str,
) -> Result<(), DeliveryError> {
    ctx.repos
        .jobs
        .mark_failed(&job.id, job.retry_count, reason)
        .await?;
    Ok(())
}

fn format_occurrence_label(ts: i64, timezone: &Tz) -> String {
    match Utc.timestamp_millis_opt(ts).single() {
        Some(datetime) => datetime
            .with_timezone(timezone)
            .format_localized("%d %b %Y %H:%M", Locale::ro_RO)
            .to_string(),
        None => String::new(),
    }
}

fn build_notification(
    job: &NotificationJob,
    reminder: &Reminder,
    timezone: &Tz,
    action_token: String,
    app_url: &str,
) -> PushNotification {
    let occur_label = format_occurrence_label(job.notify_at, timezone);
    match reminder.kind {
        ReminderKind::Medication => PushNotification {
            title: format!(
                "\u{1F48A} {}",
                reminder
                    .medication_details
                    .name
                    .as_deref()
                    .unwrap_or(&reminder.title)
            ),
            body: format!("Este timpul pentru medicament \u{2022} {}", occur_label),
            url: format!("{}/app", app_url),
            job_id: job.id.clone(),
            action_token,
        },
        ReminderKind::Task => PushNotification {
            title: reminder.title.clone(),
            body: format!("Scadenta: {}", occur_label),
            url: format!("{}/app/reminders/{}", app_url, reminder.id),
            job_id: job.id.clone(),
            action_token,
        },
    }
}

async fn ensure_action_token(
    ctx: &Context,
    job: &NotificationJob,
    now: i64,
) -> Result<String, DeliveryError> {
    if job.has_valid_action_token(now) {
        if let Some(token) = &job.action_token {
            return Ok(token.clone());
        }
    }
    let token = ActionToken::generate(now);
    ctx.repos
        .jobs
        .set_action_token(&job.id, &token.token, token.expires_at)
        .await?;
    Ok(token.token)
}

enum SendResult {
    Delivered,
    Unconfigured,
    Failed,
}

/// Fans the payload out to every subscription. Endpoints the provider
/// reports gone are pruned afterward without affecting the job outcome;
/// any other failure fails the whole send.
async fn send_to_subscriptions(
    ctx: &Context,
    subscriptions: &[PushSubscription],
    payload: &PushNotification,
) -> SendResult {
    let mut stale_endpoints = Vec::new();
    let mut failed = false;
    let mut unconfigured = false;

    for subscription in subscriptions {
        match ctx.push.send(subscription, payload).await {
            Ok(()) => {}
            Err(PushDeliveryError::Gone) => {
                stale_endpoints.push(subscription.endpoint.clone());
            }
            Err(PushDeliveryError::Unconfigured) => {
                unconfigured = true;
                break;
            }
            Err(PushDeliveryError::Transient(e)) => {
                failed = true;
                error!("Push send failed for job: {}. Error: {}", payload.job_id, e);
            }
        }
    }

    if !stale_endpoints.is_empty() {
        match ctx
            .repos
            .push_subscriptions
            .delete_by_endpoints(&stale_endpoints)
            .await
        {
            Ok(res) => warn!(
                "Pruned {} push subscriptions with gone endpoints",
                res.deleted_count
            ),
            Err(e) => error!("Unable to prune gone push endpoints. Error: {:?}", e),
        }
    }

    if unconfigured {
        SendResult::Unconfigured
    } else if failed {
        SendResult::Failed
    } else {
        SendResult::Delivered
    }
}

enum LogReservation {
    Reserved(ID),
    Duplicate,
}

async fn reserve_delivery(
    ctx: &Context,
    job: &NotificationJob,
    kind: ReminderKind,
    occurrence: Option<&ReminderOccurrence>,
) -> Result<LogReservation, anyhow::Error> {
    let reservation = match kind {
        ReminderKind::Medication => {
            let entry = MedicationLogEntry {
                id: Default::default(),
                dose_id: job.entity_id.clone(),
                channel: job.channel,
                status: DeliveryLogStatus::Pending,
                sent_at: None,
            };
            ctx.repos.delivery_logs.insert_medication_entry(&entry).await?
        }
        ReminderKind::Task => {
            let occurrence = occurrence
                .ok_or_else(|| anyhow::anyhow!("Occurrence missing for job: {}", job.id))?;
            let entry = ReminderLogEntry {
                id: Default::default(),
                occurrence_id: occurrence.id.clone(),
                reminder_id: job.reminder_id.clone(),
                occurrence_at_utc: job.occurrence_at_utc,
                channel: job.channel,
                status: DeliveryLogStatus::Pending,
                sent_at: None,
            };
            ctx.repos.delivery_logs.insert_reminder_entry(&entry).await?
        }
    };

    Ok(match reservation {
        LogInsert::Created(log_id) | LogInsert::PendingExists(log_id) => {
            // A pending row left by our own crashed attempt is taken over;
            // the uniqueness constraint still bounces every other worker
            LogReservation::Reserved(log_id)
        }
        LogInsert::AlreadySent => LogReservation::Duplicate,
    })
}

async fn finalize_log_sent(
    ctx: &Context,
    kind: ReminderKind,
    log_id: &ID,
    now: i64,
) -> anyhow::Result<()> {
    match kind {
        ReminderKind::Medication => {
            ctx.repos
                .delivery_logs
                .finalize_medication_sent(log_id, now)
                .await
        }
        ReminderKind::Task => {
            ctx.repos
                .delivery_logs
                .finalize_reminder_sent(log_id, now)
                .await
        }
    }
}

pub async fn process_job(
    job: &NotificationJob,
    lookups: &BatchLookups,
    now: i64,
    ctx: &Context,
) -> Result<JobOutcome, DeliveryError> {
    let reminder = match lookups.reminders.get(&job.reminder_id) {
        Some(reminder)
            if reminder.is_active
                && reminder.household_id.is_some()
                && reminder.created_by.is_some() =>
        {
            reminder
        }
        _ => {
            fail_job_terminal(ctx, job, "reminder_inactive").await?;
            return Ok(JobOutcome::Failed);
        }
    };
    // Checked above
    let owner_id = match &reminder.created_by {
        Some(owner_id) => owner_id,
        None => return Ok(JobOutcome::Failed),
    };

    let profile = match lookups.profiles.get(&job.user_id) {
        Some(profile) if profile.notify_by_push => profile,
        _ => {
            ctx.repos.jobs.mark_skipped(&job.id, "pref_push_off").await?;
            return Ok(JobOutcome::Skipped);
        }
    };
    if lookups.android_users.contains(&job.user_id) {
        ctx.repos
            .jobs
            .mark_skipped(&job.id, "mobile_app_present")
            .await?;
        return Ok(JobOutcome::Skipped);
    }

    let settings = reminder.resolved_settings(&profile.context_defaults);
    let busy_interval = if settings.calendar_busy.enabled {
        lookups
            .busy_intervals
            .get(owner_id)
            .cloned()
            .unwrap_or(None)
    } else {
        None
    };
    let timezone = reminder.display_timezone(profile.timezone);

    match evaluate(now, &settings, timezone, busy_interval.as_ref()) {
        Decision::AutoSnooze { new_notify_at } => {
            if reminder.kind != ReminderKind::Medication {
                if let Some(occurrence) = lookups
                    .occurrences
                    .get(&(reminder.id.clone(), job.notify_at))
                {
                    ctx.repos
                        .reminders
                        .snooze_occurrence(&occurrence.id, new_notify_at)
                        .await?;
                }
            }
            ctx.repos.jobs.reschedule(&job.id, new_notify_at).await?;
            return Ok(JobOutcome::Rescheduled);
        }
        Decision::DeferShort => {
            ctx.repos
                .jobs
                .reschedule(&job.id, now + DEFER_SHORT_MILLIS)
                .await?;
            return Ok(JobOutcome::Rescheduled);
        }
        Decision::SendNow => {}
    }

    let subscriptions = match lookups.subscriptions.get(&job.user_id) {
        Some(subscriptions) if !subscriptions.is_empty() => subscriptions,
        _ => {
            ctx.repos.jobs.mark_skipped(&job.id, "missing_push").await?;
            return Ok(JobOutcome::Skipped);
        }
    };

    // A medication reminder must point at an actual dose, a task reminder
    // at an open occurrence; neither comes back with retrying
    if reminder.kind == ReminderKind::Medication && job.entity_type != JobEntityType::MedicationDose
    {
        fail_job_terminal(ctx, job, "dose_missing").await?;
        return Ok(JobOutcome::Failed);
    }

    let occurrence = lookups.occurrences.get(&(reminder.id.clone(), job.notify_at));
    if reminder.kind == ReminderKind::Task && occurrence.is_none() {
        fail_job_terminal(ctx, job, "occurrence_missing").await?;
        return Ok(JobOutcome::Failed);
    }

    // Reserve the delivery before the external send; this is the
    // at-most-once gate
    let log_id = match reserve_delivery(ctx, job, reminder.kind, occurrence).await {
        Ok(LogReservation::Reserved(log_id)) => log_id,
        Ok(LogReservation::Duplicate) => {
            ctx.repos.jobs.mark_skipped(&job.id, "duplicate").await?;
            return Ok(JobOutcome::Skipped);
        }
        Err(e) => {
            error!("Delivery log insert failed for job: {}. Error: {:?}", job.id, e);
            fail_job(ctx, job, now, "log_insert_failed").await?;
            return Ok(JobOutcome::Failed);
        }
    };

    let action_token = ensure_action_token(ctx, job, now).await?;
    let payload = build_notification(job, reminder, &timezone, action_token, &ctx.config.app_url);

    match send_to_subscriptions(ctx, subscriptions, &payload).await {
        SendResult::Delivered => {
            if let Err(e) = finalize_log_sent(ctx, reminder.kind, &log_id, now).await {
                error!(
                    "Unable to finalize delivery log for job: {}. Error: {:?}",
                    job.id, e
                );
            }
            ctx.repos.jobs.mark_sent(&job.id, now).await?;
            Ok(JobOutcome::Sent)
        }
        SendResult::Unconfigured => {
            ctx.repos.jobs.mark_skipped(&job.id, "vapid_missing").await?;
            Ok(JobOutcome::Skipped)
        }
        SendResult::Failed => {
            // The log row stays pending; the retried attempt takes it over
            fail_job(ctx, job, now, "push_failed").await?;
            Ok(JobOutcome::Failed)
        }
    }
}
