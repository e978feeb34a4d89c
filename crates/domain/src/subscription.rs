use crate::shared::entity::{Entity, ID};

/// One registered web-push endpoint for a user. The worker deletes rows
/// whose endpoint the push provider reports as gone.
#[derive(Debug, Clone)]
pub struct PushSubscription {
    pub id: ID,
    pub user_id: ID,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

impl Entity for PushSubscription {
    fn id(&self) -> &ID {
        &self.id
    }
}
