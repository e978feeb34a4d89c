use super::ICalendarConnectionRepo;

use serde_json::Value;
use smart_notifier_domain::{BusyInterval, CalendarConnection, FreeBusyCacheEntry, TokenSet, ID};
use sqlx::{
    types::{Json, Uuid},
    FromRow, PgPool,
};
use tracing::error;

pub struct PostgresCalendarConnectionRepo {
    pool: PgPool,
}

impl PostgresCalendarConnectionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CalendarConnectionRaw {
    user_uid: Uuid,
    access_token: String,
    refresh_token: String,
    expires_ts: i64,
    scope: Option<String>,
    freebusy_cache: Option<Value>,
    freebusy_time_min: Option<i64>,
    freebusy_time_max: Option<i64>,
    freebusy_fetched_at: Option<i64>,
}

impl From<CalendarConnectionRaw> for CalendarConnection {
    fn from(raw: CalendarConnectionRaw) -> Self {
        let freebusy_cache = match (
            raw.freebusy_cache,
            raw.freebusy_time_min,
            raw.freebusy_time_max,
            raw.freebusy_fetched_at,
        ) {
            (Some(cache), Some(time_min), Some(time_max), Some(fetched_at)) => {
                serde_json::from_value::<Vec<BusyInterval>>(cache)
                    .ok()
                    .map(|busy| FreeBusyCacheEntry {
                        busy,
                        time_min,
                        time_max,
                        fetched_at,
                    })
            }
            _ => None,
        };
        Self {
            user_id: raw.user_uid.into(),
            access_token: raw.access_token,
            refresh_token: raw.refresh_token,
            expires_ts: raw.expires_ts,
            scope: raw.scope,
            freebusy_cache,
        }
    }
}

#[async_trait::async_trait]
impl ICalendarConnectionRepo for PostgresCalendarConnectionRepo {
    async fn find(&self, user_id: &ID) -> Option<CalendarConnection> {
        let raw: Option<CalendarConnectionRaw> = sqlx::query_as::<_, CalendarConnectionRaw>(
            r#"
            SELECT * FROM user_google_connections
            WHERE user_uid = $1 AND provider = 'google_calendar'
            "#,
        )
        .bind(user_id.inner_ref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Find calendar connection for user: {:?} failed. DB returned error: {:?}",
                user_id, e
            );
            e
        })
        .ok()?;
        raw.map(|connection| connection.into())
    }

    async fn save_tokens(&self, user_id: &ID, tokens: &TokenSet) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE user_google_connections
            SET access_token = $2, refresh_token = $3, expires_ts = $4, scope = $5
            WHERE user_uid = $1 AND provider = 'google_calendar'
            "#,
        )
        .bind(user_id.inner_ref())
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_ts)
        .bind(tokens.scope.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to save calendar tokens for user: {:?}. DB returned error: {:?}",
                user_id, e
            );
            e
        })?;
        Ok(())
    }

    async fn save_freebusy_cache(
        &self,
        user_id: &ID,
        cache: &FreeBusyCacheEntry,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE user_google_connections
            SET freebusy_cache = $2,
                freebusy_time_min = $3,
                freebusy_time_max = $4,
                freebusy_fetched_at = $5
            WHERE user_uid = $1 AND provider = 'google_calendar'
            "#,
        )
        .bind(user_id.inner_ref())
        .bind(Json(&cache.busy))
        .bind(cache.time_min)
        .bind(cache.time_max)
        .bind(cache.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Unable to save freebusy cache for user: {:?}. DB returned error: {:?}",
                user_id, e
            );
            e
        })?;
        Ok(())
    }
}
