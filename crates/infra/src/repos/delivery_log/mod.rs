mod inmemory;
mod postgres;

pub use inmemory::InMemoryDeliveryLogRepo;
pub use postgres::PostgresDeliveryLogRepo;
use smart_notifier_domain::{MedicationLogEntry, ReminderLogEntry, ID};

/// Outcome of reserving a delivery in the log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogInsert {
    /// The row was inserted, this attempt owns the delivery
    Created(ID),
    /// A non-sent row already exists, left behind by an earlier failed
    /// attempt of the same occurrence. The retrying attempt takes it over
    /// instead of re-inserting.
    PendingExists(ID),
    /// A sent row exists, another attempt already delivered this
    /// occurrence
    AlreadySent,
}

#[async_trait::async_trait]
pub trait IDeliveryLogRepo: Send + Sync {
    /// Reserves the delivery for a task reminder occurrence. Bounces off
    /// the `(occurrence, channel)` uniqueness constraint when another
    /// attempt got there first.
    async fn insert_reminder_entry(&self, entry: &ReminderLogEntry) -> anyhow::Result<LogInsert>;
    async fn insert_medication_entry(
        &self,
        entry: &MedicationLogEntry,
    ) -> anyhow::Result<LogInsert>;
    async fn finalize_reminder_sent(&self, log_id: &ID, sent_at: i64) -> anyhow::Result<()>;
    async fn finalize_medication_sent(&self, log_id: &ID, sent_at: i64) -> anyhow::Result<()>;
}
