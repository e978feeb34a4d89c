mod auth_provider;
mod calendar_api;

use super::ICalendarBusyGateway;
use crate::Context;
use anyhow::anyhow;
use calendar_api::{FreeBusyCalendar, FreeBusyRequest, GoogleCalendarRestApi, GoogleDateTime};
use smart_notifier_domain::{normalize_busy_intervals, BusyInterval, ID};

// https://developers.google.com/calendar/v3/reference/freebusy

/// Fetches busy intervals from the user's primary Google calendar,
/// refreshing the OAuth tokens on demand.
pub struct GoogleCalendarBusyGateway;

#[async_trait::async_trait]
impl ICalendarBusyGateway for GoogleCalendarBusyGateway {
    async fn fetch_busy(
        &self,
        ctx: &Context,
        user_id: &ID,
        time_min: i64,
        time_max: i64,
        time_zone: &str,
    ) -> anyhow::Result<Vec<BusyInterval>> {
        let mut connection = ctx
            .repos
            .calendar_connections
            .find(user_id)
            .await
            .ok_or_else(|| anyhow!("No calendar connection for user: {}", user_id))?;

        let access_token = auth_provider::get_access_token(&mut connection, ctx)
            .await
            .ok_or_else(|| anyhow!("Unable to obtain calendar access token for user: {}", user_id))?;

        let api = GoogleCalendarRestApi::new(access_token);
        let body = FreeBusyRequest {
            time_min: GoogleDateTime::from_timestamp_millis(time_min),
            time_max: GoogleDateTime::from_timestamp_millis(time_max),
            time_zone: time_zone.to_string(),
            items: vec![FreeBusyCalendar::new("primary".into())],
        };
        let res = api.freebusy(&body).await?;

        let mut intervals = Vec::new();
        for (_, calendar_busy) in res.calendars {
            for span in calendar_busy.busy {
                intervals.push(BusyInterval {
                    start_ts: span.start.get_timestamp_millis()?,
                    end_ts: span.end.get_timestamp_millis()?,
                });
            }
        }
        Ok(normalize_busy_intervals(intervals))
    }
}
