mod inmemory;
mod postgres;

pub use inmemory::InMemoryPushSubscriptionRepo;
pub use postgres::PostgresPushSubscriptionRepo;
use smart_notifier_domain::{PushSubscription, ID};

use crate::repos::shared::repo::DeleteResult;

#[async_trait::async_trait]
pub trait IPushSubscriptionRepo: Send + Sync {
    async fn find_by_users(&self, user_ids: &[ID]) -> anyhow::Result<Vec<PushSubscription>>;
    /// Prunes endpoints the push provider reported gone (HTTP 404/410).
    async fn delete_by_endpoints(&self, endpoints: &[String]) -> anyhow::Result<DeleteResult>;
}
