use super::IProfileRepo;

use chrono_tz::Tz;
use serde_json::Value;
use smart_notifier_domain::{parse_context_settings, ContextSettings, Profile, ID};
use sqlx::{types::Uuid, FromRow, PgPool};
use tracing::error;

pub struct PostgresProfileRepo {
    pool: PgPool,
}

impl PostgresProfileRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ProfileRaw {
    user_uid: Uuid,
    email: Option<String>,
    time_zone: Option<String>,
    context_defaults: Option<Value>,
    notify_by_push: bool,
}

impl From<ProfileRaw> for Profile {
    fn from(raw: ProfileRaw) -> Self {
        Self {
            user_id: raw.user_uid.into(),
            email: raw.email,
            timezone: raw
                .time_zone
                .and_then(|tz| tz.parse::<Tz>().ok())
                .unwrap_or(chrono_tz::UTC),
            context_defaults: parse_context_settings(
                raw.context_defaults.as_ref(),
                &ContextSettings::default(),
            ),
            notify_by_push: raw.notify_by_push,
        }
    }
}

#[async_trait::async_trait]
impl IProfileRepo for PostgresProfileRepo {
    async fn find_many(&self, user_ids: &[ID]) -> anyhow::Result<Vec<Profile>> {
        let ids = user_ids.iter().map(|id| *id.inner_ref()).collect::<Vec<_>>();
        let profiles: Vec<ProfileRaw> = sqlx::query_as::<_, ProfileRaw>(
            r#"
            SELECT * FROM profiles
            WHERE user_uid = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find profiles with ids: {:?} failed. DB returned error: {:?}",
                user_ids, e
            );
            e
        })?;
        Ok(profiles.into_iter().map(|p| p.into()).collect())
    }

    async fn find_recent_android_users(
        &self,
        user_ids: &[ID],
        last_seen_after: i64,
    ) -> anyhow::Result<Vec<ID>> {
        let ids = user_ids.iter().map(|id| *id.inner_ref()).collect::<Vec<_>>();
        let users: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT user_uid FROM device_installations
            WHERE platform = 'android'
              AND user_uid = ANY($1)
              AND last_seen_at >= $2
            "#,
        )
        .bind(&ids)
        .bind(last_seen_after)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find android installs for users: {:?} failed. DB returned error: {:?}",
                user_ids, e
            );
            e
        })?;
        Ok(users.into_iter().map(|uid| uid.into()).collect())
    }
}
