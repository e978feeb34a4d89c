mod inmemory;
mod postgres;

pub use inmemory::{DeviceInstall, InMemoryProfileRepo};
pub use postgres::PostgresProfileRepo;
use smart_notifier_domain::{Profile, ID};

#[async_trait::async_trait]
pub trait IProfileRepo: Send + Sync {
    async fn find_many(&self, user_ids: &[ID]) -> anyhow::Result<Vec<Profile>>;
    /// Users among the given set with an Android install seen after the
    /// cutoff. The native app delivers its own notifications, so web push
    /// is suppressed for them.
    async fn find_recent_android_users(
        &self,
        user_ids: &[ID],
        last_seen_after: i64,
    ) -> anyhow::Result<Vec<ID>>;
}
