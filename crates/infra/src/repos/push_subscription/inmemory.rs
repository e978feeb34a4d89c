use super::IPushSubscriptionRepo;
use crate::repos::shared::inmemory_repo::*;
use crate::repos::shared::repo::DeleteResult;
use smart_notifier_domain::{PushSubscription, ID};

pub struct InMemoryPushSubscriptionRepo {
    subscriptions: std::sync::Mutex<Vec<PushSubscription>>,
}

impl InMemoryPushSubscriptionRepo {
    pub fn new() -> Self {
        Self {
            subscriptions: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, subscription: &PushSubscription) {
        insert(subscription, &self.subscriptions);
    }

    pub fn all(&self) -> Vec<PushSubscription> {
        find_by(&self.subscriptions, |_| true)
    }
}

#[async_trait::async_trait]
impl IPushSubscriptionRepo for InMemoryPushSubscriptionRepo {
    async fn find_by_users(&self, user_ids: &[ID]) -> anyhow::Result<Vec<PushSubscription>> {
        Ok(find_by(
            &self.subscriptions,
            |subscription: &PushSubscription| user_ids.contains(&subscription.user_id),
        ))
    }

    async fn delete_by_endpoints(&self, endpoints: &[String]) -> anyhow::Result<DeleteResult> {
        let deleted = delete_by(&self.subscriptions, |subscription: &PushSubscription| {
            endpoints.contains(&subscription.endpoint)
        });
        Ok(DeleteResult {
            deleted_count: deleted.len() as i64,
        })
    }
}
