use super::IPushSubscriptionRepo;
use crate::repos::shared::repo::DeleteResult;

use smart_notifier_domain::{PushSubscription, ID};
use sqlx::{types::Uuid, FromRow, PgPool};
use tracing::error;

pub struct PostgresPushSubscriptionRepo {
    pool: PgPool,
}

impl PostgresPushSubscriptionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PushSubscriptionRaw {
    subscription_uid: Uuid,
    user_uid: Uuid,
    endpoint: String,
    p256dh: String,
    auth: String,
}

impl From<PushSubscriptionRaw> for PushSubscription {
    fn from(raw: PushSubscriptionRaw) -> Self {
        Self {
            id: raw.subscription_uid.into(),
            user_id: raw.user_uid.into(),
            endpoint: raw.endpoint,
            p256dh: raw.p256dh,
            auth: raw.auth,
        }
    }
}

#[async_trait::async_trait]
impl IPushSubscriptionRepo for PostgresPushSubscriptionRepo {
    async fn find_by_users(&self, user_ids: &[ID]) -> anyhow::Result<Vec<PushSubscription>> {
        let ids = user_ids.iter().map(|id| *id.inner_ref()).collect::<Vec<_>>();
        let subscriptions: Vec<PushSubscriptionRaw> = sqlx::query_as::<_, PushSubscriptionRaw>(
            r#"
            SELECT * FROM push_subscriptions
            WHERE user_uid = ANY($1) AND is_disabled = FALSE
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find push subscriptions for users: {:?} failed. DB returned error: {:?}",
                user_ids, e
            );
            e
        })?;
        Ok(subscriptions.into_iter().map(|s| s.into()).collect())
    }

    async fn delete_by_endpoints(&self, endpoints: &[String]) -> anyhow::Result<DeleteResult> {
        let res = sqlx::query(
            r#"
            DELETE FROM push_subscriptions
            WHERE endpoint = ANY($1)
            "#,
        )
        .bind(endpoints)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Delete push subscriptions by endpoints failed. DB returned error: {:?}",
                e
            );
            e
        })?;
        Ok(DeleteResult {
            deleted_count: res.rows_affected() as i64,
        })
    }
}
