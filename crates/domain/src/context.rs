use crate::freebusy::{BusyInterval, BUSY_END_BUFFER_MILLIS};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde_json::Value;

/// How long a quiet-hours veto pushes a job into the future.
pub const DEFER_SHORT_MILLIS: i64 = 1000 * 60 * 15;

const DEFAULT_START_HOUR: u32 = 9;
const DEFAULT_END_HOUR: u32 = 20;
const DEFAULT_SNOOZE_MINUTES: i64 = 15;

/// Quiet-hours gate. When enabled, notifications are only delivered on the
/// listed days (all days when the list is empty) and while the local hour
/// falls inside `[start_hour, end_hour)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
    pub days_of_week: Vec<Weekday>,
}

/// Suppress-while-busy gate against the user's external calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarBusySettings {
    pub enabled: bool,
    pub snooze_minutes: i64,
}

/// Per-reminder delivery preferences, falling back to per-user profile
/// defaults. Owned by the reminder-editing UI and read-only here.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    pub time_window: TimeWindow,
    pub calendar_busy: CalendarBusySettings,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            time_window: TimeWindow {
                enabled: false,
                start_hour: DEFAULT_START_HOUR,
                end_hour: DEFAULT_END_HOUR,
                days_of_week: Vec::new(),
            },
            calendar_busy: CalendarBusySettings {
                enabled: false,
                snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            },
        }
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn sanitize_hour(value: Option<&Value>, fallback: u32) -> u32 {
    match value.and_then(value_as_i64) {
        Some(hour) if hour < 0 => 0,
        Some(hour) if hour > 23 => 23,
        Some(hour) => hour as u32,
        None => fallback,
    }
}

fn sanitize_snooze_minutes(value: Option<&Value>, fallback: i64) -> i64 {
    match value.and_then(value_as_i64) {
        Some(minutes) if minutes <= 0 => DEFAULT_SNOOZE_MINUTES,
        Some(minutes) if minutes > 1440 => 1440,
        Some(minutes) => minutes,
        None => fallback,
    }
}

fn sanitize_days(value: Option<&Value>) -> Vec<Weekday> {
    match value.and_then(Value::as_array) {
        Some(days) => days
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|day| day.to_lowercase().parse::<Weekday>().ok())
            .collect(),
        None => Vec::new(),
    }
}

/// Parses the loosely-typed settings payload stored on a reminder into a
/// clamped, strongly-typed struct. Unknown fields are ignored and out of
/// range values are pulled back into bounds, never trusted as-is.
pub fn parse_context_settings(raw: Option<&Value>, defaults: &ContextSettings) -> ContextSettings {
    let raw = match raw {
        Some(value) if value.is_object() => value,
        _ => return defaults.clone(),
    };

    let time_window = raw.get("timeWindow");
    let calendar_busy = raw.get("calendarBusy");

    ContextSettings {
        time_window: TimeWindow {
            enabled: time_window
                .and_then(|tw| tw.get("enabled"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            start_hour: sanitize_hour(
                time_window.and_then(|tw| tw.get("startHour")),
                defaults.time_window.start_hour,
            ),
            end_hour: sanitize_hour(
                time_window.and_then(|tw| tw.get("endHour")),
                defaults.time_window.end_hour,
            ),
            days_of_week: sanitize_days(time_window.and_then(|tw| tw.get("daysOfWeek"))),
        },
        calendar_busy: CalendarBusySettings {
            enabled: calendar_busy
                .and_then(|cb| cb.get("enabled"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            snooze_minutes: sanitize_snooze_minutes(
                calendar_busy.and_then(|cb| cb.get("snoozeMinutes")),
                defaults.calendar_busy.snooze_minutes,
            ),
        },
    }
}

/// The reminder timezone wins unless it is the UTC placeholder, in which
/// case the user's profile timezone applies.
pub fn resolve_timezone(reminder_tz: Option<Tz>, user_tz: Tz) -> Tz {
    match reminder_tz {
        Some(tz) if tz != chrono_tz::UTC => tz,
        _ => user_tz,
    }
}

fn local_clock(now: i64, timezone: &Tz) -> Option<DateTime<Tz>> {
    Utc.timestamp_millis_opt(now)
        .single()
        .map(|dt| dt.with_timezone(timezone))
}

/// What to do with a claimed job given its delivery context.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    SendNow,
    /// Outside the quiet-hours window, retry in a quarter of an hour
    DeferShort,
    /// Calendar-busy, push the occurrence past the busy block
    AutoSnooze { new_notify_at: i64 },
}

/// Pure delivery-context decision. Quiet hours are a hard veto evaluated
/// first; calendar-busy is a soft defer that lands right after the busy
/// block instead of an arbitrary fixed offset.
pub fn evaluate(
    now: i64,
    settings: &ContextSettings,
    timezone: Tz,
    busy_interval: Option<&BusyInterval>,
) -> Decision {
    if settings.time_window.enabled {
        let local = match local_clock(now, &timezone) {
            Some(local) => local,
            None => return Decision::DeferShort,
        };
        let window = &settings.time_window;
        if !window.days_of_week.is_empty() && !window.days_of_week.contains(&local.weekday()) {
            return Decision::DeferShort;
        }
        let hour = local.hour();
        if hour < window.start_hour || hour >= window.end_hour {
            return Decision::DeferShort;
        }
    }

    if settings.calendar_busy.enabled {
        if let Some(interval) = busy_interval {
            let base = now + settings.calendar_busy.snooze_minutes.max(1) * 60 * 1000;
            return Decision::AutoSnooze {
                new_notify_at: base.max(interval.end_ts + BUSY_END_BUFFER_MILLIS),
            };
        }
    }

    Decision::SendNow
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Bucharest;
    use serde_json::json;

    // Tue Feb 23 2021 10:00 in Bucharest (UTC+2)
    const TUESDAY_10_LOCAL: i64 = 1_614_067_200_000;
    // Mon Feb 22 2021 10:00 in Bucharest
    const MONDAY_10_LOCAL: i64 = 1_613_980_800_000;

    fn window_settings(days: Vec<Weekday>) -> ContextSettings {
        ContextSettings {
            time_window: TimeWindow {
                enabled: true,
                start_hour: 9,
                end_hour: 20,
                days_of_week: days,
            },
            ..Default::default()
        }
    }

    #[test]
    fn quiet_hours_vetoes_excluded_days() {
        let settings = window_settings(vec![Weekday::Mon]);

        assert_eq!(
            evaluate(TUESDAY_10_LOCAL, &settings, Bucharest, None),
            Decision::DeferShort
        );
        assert_eq!(
            evaluate(MONDAY_10_LOCAL, &settings, Bucharest, None),
            Decision::SendNow
        );
    }

    #[test]
    fn quiet_hours_vetoes_hours_outside_window() {
        let settings = window_settings(Vec::new());

        // 21:00 local is past the 20:00 end
        let late = TUESDAY_10_LOCAL + 11 * 60 * 60 * 1000;
        assert_eq!(
            evaluate(late, &settings, Bucharest, None),
            Decision::DeferShort
        );
        // 08:00 local is before the 09:00 start
        let early = TUESDAY_10_LOCAL - 2 * 60 * 60 * 1000;
        assert_eq!(
            evaluate(early, &settings, Bucharest, None),
            Decision::DeferShort
        );
        // end hour is exclusive
        let settings = ContextSettings {
            time_window: TimeWindow {
                enabled: true,
                start_hour: 9,
                end_hour: 10,
                days_of_week: Vec::new(),
            },
            ..Default::default()
        };
        assert_eq!(
            evaluate(TUESDAY_10_LOCAL, &settings, Bucharest, None),
            Decision::DeferShort
        );
    }

    #[test]
    fn quiet_hours_uses_the_reminder_timezone_wall_clock() {
        // Mon Feb 22 23:30 UTC is already Tuesday 01:30 in Bucharest
        let settings = window_settings(vec![Weekday::Mon]);
        let monday_late_utc = MONDAY_10_LOCAL + 15 * 60 * 60 * 1000 + 30 * 60 * 1000;
        assert_eq!(
            evaluate(monday_late_utc, &settings, Bucharest, None),
            Decision::DeferShort
        );
        assert_eq!(
            evaluate(monday_late_utc, &settings, chrono_tz::UTC, None),
            // Still Monday in UTC, but 23:30 is outside the hour window
            Decision::DeferShort
        );
    }

    #[test]
    fn busy_interval_triggers_auto_snooze_past_the_busy_end() {
        let now = TUESDAY_10_LOCAL;
        let settings = ContextSettings {
            calendar_busy: CalendarBusySettings {
                enabled: true,
                snooze_minutes: 15,
            },
            ..Default::default()
        };
        let busy = BusyInterval {
            start_ts: now,
            end_ts: now + 30 * 60 * 1000,
        };

        match evaluate(now, &settings, Bucharest, Some(&busy)) {
            Decision::AutoSnooze { new_notify_at } => {
                assert!(new_notify_at >= busy.end_ts);
                assert_eq!(new_notify_at, busy.end_ts + BUSY_END_BUFFER_MILLIS);
            }
            other => panic!("Expected auto snooze, got: {:?}", other),
        }

        // A short busy block snoozes by the configured minutes instead
        let busy = BusyInterval {
            start_ts: now,
            end_ts: now + 60 * 1000,
        };
        match evaluate(now, &settings, Bucharest, Some(&busy)) {
            Decision::AutoSnooze { new_notify_at } => {
                assert_eq!(new_notify_at, now + 15 * 60 * 1000);
            }
            other => panic!("Expected auto snooze, got: {:?}", other),
        }

        // Not busy right now
        assert_eq!(
            evaluate(now, &settings, Bucharest, None),
            Decision::SendNow
        );
    }

    #[test]
    fn settings_parsing_clamps_out_of_range_values() {
        let raw = json!({
            "timeWindow": {
                "enabled": true,
                "startHour": -3,
                "endHour": 99,
                "daysOfWeek": ["monday", "funday", "SUNDAY"]
            },
            "calendarBusy": { "enabled": true, "snoozeMinutes": 100000 }
        });
        let settings = parse_context_settings(Some(&raw), &ContextSettings::default());

        assert!(settings.time_window.enabled);
        assert_eq!(settings.time_window.start_hour, 0);
        assert_eq!(settings.time_window.end_hour, 23);
        assert_eq!(
            settings.time_window.days_of_week,
            vec![Weekday::Mon, Weekday::Sun]
        );
        assert_eq!(settings.calendar_busy.snooze_minutes, 1440);

        let raw = json!({ "calendarBusy": { "enabled": true, "snoozeMinutes": -5 } });
        let settings = parse_context_settings(Some(&raw), &ContextSettings::default());
        assert_eq!(settings.calendar_busy.snooze_minutes, 15);
    }

    #[test]
    fn settings_parsing_falls_back_to_defaults() {
        assert_eq!(
            parse_context_settings(None, &ContextSettings::default()),
            ContextSettings::default()
        );
        // Non-object payloads are ignored entirely
        let raw = json!("corrupt");
        assert_eq!(
            parse_context_settings(Some(&raw), &ContextSettings::default()),
            ContextSettings::default()
        );

        // Profile defaults fill in missing hours
        let defaults = ContextSettings {
            time_window: TimeWindow {
                enabled: false,
                start_hour: 7,
                end_hour: 22,
                days_of_week: Vec::new(),
            },
            ..Default::default()
        };
        let raw = json!({ "timeWindow": { "enabled": true } });
        let settings = parse_context_settings(Some(&raw), &defaults);
        assert!(settings.time_window.enabled);
        assert_eq!(settings.time_window.start_hour, 7);
        assert_eq!(settings.time_window.end_hour, 22);
    }

    #[test]
    fn reminder_timezone_overrides_user_default() {
        assert_eq!(
            resolve_timezone(Some(Bucharest), chrono_tz::Europe::Oslo),
            Bucharest
        );
        // The UTC placeholder means "not set"
        assert_eq!(
            resolve_timezone(Some(chrono_tz::UTC), Bucharest),
            Bucharest
        );
        assert_eq!(resolve_timezone(None, Bucharest), Bucharest);
    }
}
