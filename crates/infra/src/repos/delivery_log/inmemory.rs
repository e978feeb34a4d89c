use super::{IDeliveryLogRepo, LogInsert};
use crate::repos::shared::inmemory_repo::*;
use smart_notifier_domain::{DeliveryLogStatus, MedicationLogEntry, ReminderLogEntry, ID};

pub struct InMemoryDeliveryLogRepo {
    reminder_entries: std::sync::Mutex<Vec<ReminderLogEntry>>,
    medication_entries: std::sync::Mutex<Vec<MedicationLogEntry>>,
}

impl InMemoryDeliveryLogRepo {
    pub fn new() -> Self {
        Self {
            reminder_entries: std::sync::Mutex::new(Vec::new()),
            medication_entries: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn reminder_entries(&self) -> Vec<ReminderLogEntry> {
        find_by(&self.reminder_entries, |_| true)
    }

    pub fn medication_entries(&self) -> Vec<MedicationLogEntry> {
        find_by(&self.medication_entries, |_| true)
    }
}

#[async_trait::async_trait]
impl IDeliveryLogRepo for InMemoryDeliveryLogRepo {
    async fn insert_reminder_entry(&self, entry: &ReminderLogEntry) -> anyhow::Result<LogInsert> {
        // Lock scope doubles as the uniqueness constraint
        let mut entries = self.reminder_entries.lock().unwrap();
        if let Some(existing) = entries
            .iter()
            .find(|e| e.occurrence_id == entry.occurrence_id && e.channel == entry.channel)
        {
            return Ok(match existing.status {
                DeliveryLogStatus::Sent => LogInsert::AlreadySent,
                DeliveryLogStatus::Pending => LogInsert::PendingExists(existing.id.clone()),
            });
        }
        entries.push(entry.clone());
        Ok(LogInsert::Created(entry.id.clone()))
    }

    async fn insert_medication_entry(
        &self,
        entry: &MedicationLogEntry,
    ) -> anyhow::Result<LogInsert> {
        let mut entries = self.medication_entries.lock().unwrap();
        if let Some(existing) = entries
            .iter()
            .find(|e| e.dose_id == entry.dose_id && e.channel == entry.channel)
        {
            return Ok(match existing.status {
                DeliveryLogStatus::Sent => LogInsert::AlreadySent,
                DeliveryLogStatus::Pending => LogInsert::PendingExists(existing.id.clone()),
            });
        }
        entries.push(entry.clone());
        Ok(LogInsert::Created(entry.id.clone()))
    }

    async fn finalize_reminder_sent(&self, log_id: &ID, sent_at: i64) -> anyhow::Result<()> {
        update_by(&self.reminder_entries, |entry| {
            if &entry.id == log_id {
                entry.status = DeliveryLogStatus::Sent;
                entry.sent_at = Some(sent_at);
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn finalize_medication_sent(&self, log_id: &ID, sent_at: i64) -> anyhow::Result<()> {
        update_by(&self.medication_entries, |entry| {
            if &entry.id == log_id {
                entry.status = DeliveryLogStatus::Sent;
                entry.sent_at = Some(sent_at);
                true
            } else {
                false
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smart_notifier_domain::Channel;

    fn entry_factory(occurrence_id: &ID) -> ReminderLogEntry {
        ReminderLogEntry {
            id: Default::default(),
            occurrence_id: occurrence_id.clone(),
            reminder_id: Default::default(),
            occurrence_at_utc: 1000,
            channel: Channel::Push,
            status: DeliveryLogStatus::Pending,
            sent_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_inserts_bounce_off_the_sent_entry() {
        let repo = InMemoryDeliveryLogRepo::new();
        let occurrence_id = ID::default();

        let first = entry_factory(&occurrence_id);
        let reserved = repo.insert_reminder_entry(&first).await.unwrap();
        assert_eq!(reserved, LogInsert::Created(first.id.clone()));

        repo.finalize_reminder_sent(&first.id, 2000).await.unwrap();

        let racing = entry_factory(&occurrence_id);
        assert_eq!(
            repo.insert_reminder_entry(&racing).await.unwrap(),
            LogInsert::AlreadySent
        );
        assert_eq!(repo.reminder_entries().len(), 1);
    }

    #[tokio::test]
    async fn retried_attempt_takes_over_its_pending_entry() {
        let repo = InMemoryDeliveryLogRepo::new();
        let occurrence_id = ID::default();

        let first = entry_factory(&occurrence_id);
        repo.insert_reminder_entry(&first).await.unwrap();

        // The first attempt crashed before its push went out; the retry
        // reuses the reserved row instead of re-inserting
        let retry = entry_factory(&occurrence_id);
        assert_eq!(
            repo.insert_reminder_entry(&retry).await.unwrap(),
            LogInsert::PendingExists(first.id.clone())
        );

        repo.finalize_reminder_sent(&first.id, 3000).await.unwrap();
        let entries = repo.reminder_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryLogStatus::Sent);
        assert_eq!(entries[0].sent_at, Some(3000));
    }

    #[tokio::test]
    async fn different_channels_do_not_collide() {
        let repo = InMemoryDeliveryLogRepo::new();
        let occurrence_id = ID::default();

        let push = entry_factory(&occurrence_id);
        let mut email = entry_factory(&occurrence_id);
        email.channel = Channel::Email;

        assert!(matches!(
            repo.insert_reminder_entry(&push).await.unwrap(),
            LogInsert::Created(_)
        ));
        assert!(matches!(
            repo.insert_reminder_entry(&email).await.unwrap(),
            LogInsert::Created(_)
        ));
    }
}
