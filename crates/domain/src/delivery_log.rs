use crate::job::Channel;
use crate::shared::entity::{Entity, ID};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryLogStatus {
    /// Reserved by an attempt that has not finished its push yet
    Pending,
    Sent,
}

impl DeliveryLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryLogStatus::Pending => "pending",
            DeliveryLogStatus::Sent => "sent",
        }
    }
}

#[derive(Error, Debug)]
#[error("Invalid delivery log status: {0}")]
pub struct InvalidDeliveryLogStatusError(pub String);

impl FromStr for DeliveryLogStatus {
    type Err = InvalidDeliveryLogStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryLogStatus::Pending),
            "sent" => Ok(DeliveryLogStatus::Sent),
            _ => Err(InvalidDeliveryLogStatusError(s.to_string())),
        }
    }
}

/// Append-only idempotency marker for a task reminder delivery. At most
/// one row exists per `(occurrence, channel)`, enforced by a uniqueness
/// constraint, which is what makes delivery at-most-once under racing
/// workers.
#[derive(Debug, Clone)]
pub struct ReminderLogEntry {
    pub id: ID,
    pub occurrence_id: ID,
    pub reminder_id: ID,
    pub occurrence_at_utc: i64,
    pub channel: Channel,
    pub status: DeliveryLogStatus,
    pub sent_at: Option<i64>,
}

impl Entity for ReminderLogEntry {
    fn id(&self) -> &ID {
        &self.id
    }
}

/// Idempotency marker for a medication dose delivery, unique per
/// `(dose, channel)`.
#[derive(Debug, Clone)]
pub struct MedicationLogEntry {
    pub id: ID,
    pub dose_id: ID,
    pub channel: Channel,
    pub status: DeliveryLogStatus,
    pub sent_at: Option<i64>,
}

impl Entity for MedicationLogEntry {
    fn id(&self) -> &ID {
        &self.id
    }
}
