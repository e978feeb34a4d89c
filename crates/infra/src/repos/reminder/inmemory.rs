use super::IReminderRepo;
use crate::repos::shared::inmemory_repo::*;
use smart_notifier_domain::{OccurrenceStatus, Reminder, ReminderOccurrence, ID};

pub struct InMemoryReminderRepo {
    reminders: std::sync::Mutex<Vec<Reminder>>,
    occurrences: std::sync::Mutex<Vec<ReminderOccurrence>>,
}

impl InMemoryReminderRepo {
    pub fn new() -> Self {
        Self {
            reminders: std::sync::Mutex::new(Vec::new()),
            occurrences: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, reminder: &Reminder) {
        insert(reminder, &self.reminders);
    }

    pub fn update(&self, reminder: &Reminder) {
        save(reminder, &self.reminders);
    }

    pub fn insert_occurrence(&self, occurrence: &ReminderOccurrence) {
        insert(occurrence, &self.occurrences);
    }

    pub fn occurrence(&self, occurrence_id: &ID) -> Option<ReminderOccurrence> {
        find(occurrence_id, &self.occurrences)
    }
}

#[async_trait::async_trait]
impl IReminderRepo for InMemoryReminderRepo {
    async fn find_many(&self, reminder_ids: &[ID]) -> anyhow::Result<Vec<Reminder>> {
        Ok(find_by(&self.reminders, |reminder: &Reminder| {
            reminder_ids.contains(&reminder.id)
        }))
    }

    async fn find_open_occurrences(
        &self,
        reminder_ids: &[ID],
    ) -> anyhow::Result<Vec<ReminderOccurrence>> {
        Ok(find_by(
            &self.occurrences,
            |occurrence: &ReminderOccurrence| {
                reminder_ids.contains(&occurrence.reminder_id)
                    && matches!(
                        occurrence.status,
                        OccurrenceStatus::Open | OccurrenceStatus::Snoozed
                    )
            },
        ))
    }

    async fn snooze_occurrence(&self, occurrence_id: &ID, until: i64) -> anyhow::Result<()> {
        update_by(&self.occurrences, |occurrence| {
            if &occurrence.id == occurrence_id {
                occurrence.snoozed_until = Some(until);
                occurrence.status = OccurrenceStatus::Snoozed;
                true
            } else {
                false
            }
        });
        Ok(())
    }
}
