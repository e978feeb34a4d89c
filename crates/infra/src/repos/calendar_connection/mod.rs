mod inmemory;
mod postgres;

pub use inmemory::InMemoryCalendarConnectionRepo;
pub use postgres::PostgresCalendarConnectionRepo;
use smart_notifier_domain::{CalendarConnection, FreeBusyCacheEntry, TokenSet, ID};

#[async_trait::async_trait]
pub trait ICalendarConnectionRepo: Send + Sync {
    async fn find(&self, user_id: &ID) -> Option<CalendarConnection>;
    /// Persists rotated OAuth tokens after a refresh.
    async fn save_tokens(&self, user_id: &ID, tokens: &TokenSet) -> anyhow::Result<()>;
    async fn save_freebusy_cache(
        &self,
        user_id: &ID,
        cache: &FreeBusyCacheEntry,
    ) -> anyhow::Result<()>;
}
