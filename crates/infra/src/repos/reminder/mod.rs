mod inmemory;
mod postgres;

pub use inmemory::InMemoryReminderRepo;
pub use postgres::PostgresReminderRepo;
use smart_notifier_domain::{Reminder, ReminderOccurrence, ID};

/// Read access to reminders and their occurrences, owned by the editing
/// UI. The only write the worker performs is the occurrence snooze.
#[async_trait::async_trait]
pub trait IReminderRepo: Send + Sync {
    async fn find_many(&self, reminder_ids: &[ID]) -> anyhow::Result<Vec<Reminder>>;
    /// Open or snoozed occurrences for the given reminders.
    async fn find_open_occurrences(
        &self,
        reminder_ids: &[ID],
    ) -> anyhow::Result<Vec<ReminderOccurrence>>;
    async fn snooze_occurrence(&self, occurrence_id: &ID, until: i64) -> anyhow::Result<()>;
}
