use crate::context::{parse_context_settings, resolve_timezone, ContextSettings};
use crate::shared::entity::{Entity, ID};
use chrono_tz::Tz;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Task,
    Medication,
}

impl ReminderKind {
    /// The editing UI stores a handful of kinds; everything that is not a
    /// medication schedule is delivered like a plain task reminder.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "medication" => ReminderKind::Medication,
            _ => ReminderKind::Task,
        }
    }
}

/// Loose medication payload attached to medication reminders. Only the
/// name is relevant for notification copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MedicationDetails {
    pub name: Option<String>,
}

impl MedicationDetails {
    pub fn parse(raw: Option<&Value>) -> Self {
        let name = raw
            .and_then(|details| details.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string());
        Self { name }
    }
}

/// Read model of a reminder as the editing UI persists it. The worker
/// never writes to these fields.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: ID,
    pub title: String,
    pub household_id: Option<ID>,
    /// The user whose context settings and calendar gate delivery
    pub created_by: Option<ID>,
    pub is_active: bool,
    pub kind: ReminderKind,
    pub medication_details: MedicationDetails,
    /// Raw per-reminder context payload, parsed against the owner's
    /// profile defaults at evaluation time
    pub context_settings: Option<Value>,
    pub timezone: Option<Tz>,
}

impl Entity for Reminder {
    fn id(&self) -> &ID {
        &self.id
    }
}

impl Reminder {
    pub fn resolved_settings(&self, defaults: &ContextSettings) -> ContextSettings {
        parse_context_settings(self.context_settings.as_ref(), defaults)
    }

    pub fn display_timezone(&self, user_tz: Tz) -> Tz {
        resolve_timezone(self.timezone, user_tz)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceStatus {
    Open,
    Snoozed,
    Done,
    Skipped,
}

impl OccurrenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceStatus::Open => "open",
            OccurrenceStatus::Snoozed => "snoozed",
            OccurrenceStatus::Done => "done",
            OccurrenceStatus::Skipped => "skipped",
        }
    }
}

#[derive(Error, Debug)]
#[error("Invalid occurrence status: {0}")]
pub struct InvalidOccurrenceStatusError(pub String);

impl FromStr for OccurrenceStatus {
    type Err = InvalidOccurrenceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OccurrenceStatus::Open),
            "snoozed" => Ok(OccurrenceStatus::Snoozed),
            "done" => Ok(OccurrenceStatus::Done),
            "skipped" => Ok(OccurrenceStatus::Skipped),
            _ => Err(InvalidOccurrenceStatusError(s.to_string())),
        }
    }
}

/// One concrete due-event of a task reminder. Medication reminders track
/// their occurrences as doses instead.
#[derive(Debug, Clone)]
pub struct ReminderOccurrence {
    pub id: ID,
    pub reminder_id: ID,
    /// Original due time, UTC millis
    pub occur_at: i64,
    pub snoozed_until: Option<i64>,
    pub status: OccurrenceStatus,
}

impl Entity for ReminderOccurrence {
    fn id(&self) -> &ID {
        &self.id
    }
}

impl ReminderOccurrence {
    /// Times a notification job for this occurrence may have been
    /// scheduled at.
    pub fn notify_times(&self) -> Vec<i64> {
        let mut times = vec![self.occur_at];
        if let Some(snoozed_until) = self.snoozed_until {
            times.push(snoozed_until);
        }
        times
    }
}

/// Per-user notification profile, read-only to the worker.
#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: ID,
    pub email: Option<String>,
    pub timezone: Tz,
    /// Household-wide defaults for reminders without their own context
    /// settings
    pub context_defaults: ContextSettings,
    pub notify_by_push: bool,
}

impl Entity for Profile {
    fn id(&self) -> &ID {
        &self.user_id
    }
}
