mod calendar_connection;
mod delivery_log;
mod job;
mod profile;
mod push_subscription;
mod reminder;
mod shared;

use calendar_connection::PostgresCalendarConnectionRepo;
use delivery_log::PostgresDeliveryLogRepo;
use job::PostgresNotificationJobRepo;
use profile::PostgresProfileRepo;
use push_subscription::PostgresPushSubscriptionRepo;
use reminder::PostgresReminderRepo;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

pub use calendar_connection::{ICalendarConnectionRepo, InMemoryCalendarConnectionRepo};
pub use delivery_log::{IDeliveryLogRepo, InMemoryDeliveryLogRepo, LogInsert};
pub use job::{INotificationJobRepo, InMemoryNotificationJobRepo};
pub use profile::{DeviceInstall, IProfileRepo, InMemoryProfileRepo};
pub use push_subscription::{IPushSubscriptionRepo, InMemoryPushSubscriptionRepo};
pub use reminder::{IReminderRepo, InMemoryReminderRepo};
pub use shared::repo::DeleteResult;

#[derive(Clone)]
pub struct Repos {
    pub jobs: Arc<dyn INotificationJobRepo>,
    pub delivery_logs: Arc<dyn IDeliveryLogRepo>,
    pub reminders: Arc<dyn IReminderRepo>,
    pub profiles: Arc<dyn IProfileRepo>,
    pub push_subscriptions: Arc<dyn IPushSubscriptionRepo>,
    pub calendar_connections: Arc<dyn ICalendarConnectionRepo>,
}

impl Repos {
    pub async fn create_postgres(
        connection_string: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("DB CHECKING CONNECTION ...");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;
        info!("DB CHECKING CONNECTION ... [done]");
        Ok(Self {
            jobs: Arc::new(PostgresNotificationJobRepo::new(pool.clone())),
            delivery_logs: Arc::new(PostgresDeliveryLogRepo::new(pool.clone())),
            reminders: Arc::new(PostgresReminderRepo::new(pool.clone())),
            profiles: Arc::new(PostgresProfileRepo::new(pool.clone())),
            push_subscriptions: Arc::new(PostgresPushSubscriptionRepo::new(pool.clone())),
            calendar_connections: Arc::new(PostgresCalendarConnectionRepo::new(pool)),
        })
    }

    pub fn create_inmemory() -> InMemoryRepos {
        InMemoryRepos {
            jobs: Arc::new(InMemoryNotificationJobRepo::new()),
            delivery_logs: Arc::new(InMemoryDeliveryLogRepo::new()),
            reminders: Arc::new(InMemoryReminderRepo::new()),
            profiles: Arc::new(InMemoryProfileRepo::new()),
            push_subscriptions: Arc::new(InMemoryPushSubscriptionRepo::new()),
            calendar_connections: Arc::new(InMemoryCalendarConnectionRepo::new()),
        }
    }
}

/// Concrete in-memory repositories, so tests can seed and inspect state
/// through the helpers the trait objects do not expose.
#[derive(Clone)]
pub struct InMemoryRepos {
    pub jobs: Arc<InMemoryNotificationJobRepo>,
    pub delivery_logs: Arc<InMemoryDeliveryLogRepo>,
    pub reminders: Arc<InMemoryReminderRepo>,
    pub profiles: Arc<InMemoryProfileRepo>,
    pub push_subscriptions: Arc<InMemoryPushSubscriptionRepo>,
    pub calendar_connections: Arc<InMemoryCalendarConnectionRepo>,
}

impl From<InMemoryRepos> for Repos {
    fn from(repos: InMemoryRepos) -> Self {
        Self {
            jobs: repos.jobs,
            delivery_logs: repos.delivery_logs,
            reminders: repos.reminders,
            profiles: repos.profiles,
            push_subscriptions: repos.push_subscriptions,
            calendar_connections: repos.calendar_connections,
        }
    }
}
