use crate::shared::entity::{Entity, ID};
use smart_notifier_utils::create_random_secret;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Backoff delays in seconds, indexed by the number of failed attempts so
/// far. A job whose `retry_count` has reached the end of this table is
/// abandoned on its next failure.
pub const RETRY_DELAYS_SECS: [i64; 4] = [30, 120, 600, 3600];

const ACTION_TOKEN_LEN: usize = 40;
const ACTION_TOKEN_TTL_MILLIS: i64 = 1000 * 60 * 60 * 24 * 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Sent,
    Skipped,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Sent => "sent",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("Invalid notification job field value: {0}")]
pub struct InvalidJobFieldError(pub String);

impl FromStr for JobStatus {
    type Err = InvalidJobFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "sent" => Ok(JobStatus::Sent),
            "skipped" => Ok(JobStatus::Skipped),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(InvalidJobFieldError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Email => "email",
        }
    }
}

impl FromStr for Channel {
    type Err = InvalidJobFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Channel::Push),
            "email" => Ok(Channel::Email),
            _ => Err(InvalidJobFieldError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEntityType {
    Reminder,
    MedicationDose,
}

impl JobEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEntityType::Reminder => "reminder",
            JobEntityType::MedicationDose => "medication_dose",
        }
    }
}

impl FromStr for JobEntityType {
    type Err = InvalidJobFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reminder" => Ok(JobEntityType::Reminder),
            "medication_dose" => Ok(JobEntityType::MedicationDose),
            _ => Err(InvalidJobFieldError(s.to_string())),
        }
    }
}

/// One scheduled attempt to deliver a notification for a reminder or
/// medication dose occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    pub id: ID,
    /// What kind of occurrence this delivery represents
    pub entity_type: JobEntityType,
    /// The reminder occurrence or medication dose being delivered
    pub entity_id: ID,
    pub reminder_id: ID,
    /// The user that should receive the notification
    pub user_id: ID,
    pub channel: Channel,
    /// When the notification should fire, UTC millis
    pub notify_at: i64,
    /// The logical occurrence this delivery represents. Part of the
    /// delivery dedup key, so rescheduling a job moves this along with
    /// `notify_at`.
    pub occurrence_at_utc: i64,
    pub status: JobStatus,
    pub retry_count: i64,
    pub claimed_at: Option<i64>,
    /// Opaque value proving which worker instance owns the claim
    pub claim_token: Option<String>,
    pub delivered_at: Option<i64>,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
    /// Bearer credential embedded in the push payload so the user can act
    /// on the notification without re-authenticating. Consumed by the
    /// notification action HTTP endpoint.
    pub action_token: Option<String>,
    pub action_token_expires_at: Option<i64>,
}

impl Entity for NotificationJob {
    fn id(&self) -> &ID {
        &self.id
    }
}

impl NotificationJob {
    /// Seconds this job has been overdue, never negative.
    pub fn lag_secs(&self, now: i64) -> i64 {
        ((now - self.notify_at) / 1000).max(0)
    }

    pub fn has_valid_action_token(&self, now: i64) -> bool {
        match (&self.action_token, self.action_token_expires_at) {
            (Some(token), Some(expires_at)) => !token.is_empty() && expires_at > now,
            _ => false,
        }
    }
}

/// A freshly generated action token together with its expiry timestamp.
#[derive(Debug, Clone)]
pub struct ActionToken {
    pub token: String,
    pub expires_at: i64,
}

impl ActionToken {
    pub fn generate(now: i64) -> Self {
        Self {
            token: create_random_secret(ACTION_TOKEN_LEN),
            expires_at: now + ACTION_TOKEN_TTL_MILLIS,
        }
    }
}

/// Outcome of a failed delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureTransition {
    /// Revert to pending with claim fields cleared and retry after backoff
    Retry { retry_count: i64, next_retry_at: i64 },
    /// Retry budget exhausted, the job becomes terminally failed
    Abandon { retry_count: i64 },
}

/// Computes the lifecycle transition after a failed attempt. The current
/// `retry_count` indexes the backoff table directly, so successive failures
/// produce strictly increasing delays until the budget runs out.
pub fn plan_failure(retry_count: i64, now: i64) -> FailureTransition {
    if retry_count < RETRY_DELAYS_SECS.len() as i64 {
        FailureTransition::Retry {
            retry_count: retry_count + 1,
            next_retry_at: now + RETRY_DELAYS_SECS[retry_count as usize] * 1000,
        }
    } else {
        FailureTransition::Abandon {
            retry_count: retry_count + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_factory() -> NotificationJob {
        NotificationJob {
            id: Default::default(),
            entity_type: JobEntityType::Reminder,
            entity_id: Default::default(),
            reminder_id: Default::default(),
            user_id: Default::default(),
            channel: Channel::Push,
            notify_at: 0,
            occurrence_at_utc: 0,
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

    #[test]
    fn backoff_offsets_are_strictly_increasing_until_abandoned() {
        let now = 1_000_000;
        let mut retry_count = 0;
        let mut last_offset = 0;
        loop {
            match plan_failure(retry_count, now) {
                FailureTransition::Retry {
                    retry_count: next_count,
                    next_retry_at,
                } => {
                    let offset = next_retry_at - now;
                    assert!(offset > last_offset);
                    last_offset = offset;
                    retry_count = next_count;
                }
                FailureTransition::Abandon {
                    retry_count: next_count,
                } => {
                    assert_eq!(next_count, RETRY_DELAYS_SECS.len() as i64 + 1);
                    break;
                }
            }
        }
        assert_eq!(retry_count, RETRY_DELAYS_SECS.len() as i64);
        assert_eq!(last_offset, RETRY_DELAYS_SECS[3] * 1000);
    }

    #[test]
    fn failure_within_budget_schedules_backoff_from_table() {
        match plan_failure(0, 0) {
            FailureTransition::Retry {
                retry_count,
                next_retry_at,
            } => {
                assert_eq!(retry_count, 1);
                assert_eq!(next_retry_at, 30 * 1000);
            }
            other => panic!("Expected retry, got: {:?}", other),
        }
        match plan_failure(3, 0) {
            FailureTransition::Retry { next_retry_at, .. } => {
                assert_eq!(next_retry_at, 3600 * 1000);
            }
            other => panic!("Expected retry, got: {:?}", other),
        }
    }

    #[test]
    fn action_token_expiry() {
        let mut job = job_factory();
        let now = 500;
        assert!(!job.has_valid_action_token(now));

        let token = ActionToken::generate(now);
        assert_eq!(token.token.len(), 40);
        job.action_token = Some(token.token);
        job.action_token_expires_at = Some(token.expires_at);
        assert!(job.has_valid_action_token(now));
        assert!(!job.has_valid_action_token(token.expires_at));
    }

    #[test]
    fn job_lag_is_never_negative() {
        let mut job = job_factory();
        job.notify_at = 10_000;
        assert_eq!(job.lag_secs(40_000), 30);
        assert_eq!(job.lag_secs(5_000), 0);
    }

    #[test]
    fn status_parsing_rejects_unknown_values() {
        assert_eq!("pending".parse::<JobStatus>().unwrap(), JobStatus::Pending);
        assert!("delivered".parse::<JobStatus>().is_err());
        assert!("medication_dose".parse::<JobEntityType>().is_ok());
        assert!("sms".parse::<Channel>().is_err());
    }
}
