use chrono_tz::Tz;
use smart_notifier_domain::{
    normalize_busy_intervals, BusyInterval, FreeBusyCacheEntry, ID, FREEBUSY_CACHE_TTL_MILLIS,
    FREEBUSY_LOOKAHEAD_MILLIS,
};
use smart_notifier_infra::Context;
use tracing::warn;

/// Busy intervals for the user over the lookahead window, served from the
/// per-user cache when it is fresh and covering, otherwise fetched from
/// the calendar provider and persisted. Redundant refreshes by concurrent
/// workers are harmless, the cache is eventually consistent.
pub async fn get_busy_intervals(
    ctx: &Context,
    user_id: &ID,
    timezone: Tz,
    now: i64,
) -> anyhow::Result<Vec<BusyInterval>> {
    let window_start = now;
    let window_end = now + FREEBUSY_LOOKAHEAD_MILLIS;

    if let Some(connection) = ctx.repos.calendar_connections.find(user_id).await {
        if let Some(cache) = &connection.freebusy_cache {
            if cache.is_fresh(window_start, window_end, now, FREEBUSY_CACHE_TTL_MILLIS) {
                return Ok(normalize_busy_intervals(cache.busy.clone()));
            }
        }
    }

    let intervals = ctx
        .calendar
        .fetch_busy(ctx, user_id, window_start, window_end, timezone.name())
        .await?;

    let cache = FreeBusyCacheEntry {
        busy: intervals.clone(),
        time_min: window_start,
        time_max: window_end,
        fetched_at: now,
    };
    if let Err(e) = ctx
        .repos
        .calendar_connections
        .save_freebusy_cache(user_id, &cache)
        .await
    {
        warn!(
            "Unable to persist freebusy cache for user: {}. Error: {:?}",
            user_id, e
        );
    }

    Ok(intervals)
}
