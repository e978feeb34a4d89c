mod context;
mod delivery_log;
mod freebusy;
mod job;
mod reminder;
mod shared;
mod subscription;

pub use context::{
    evaluate, parse_context_settings, resolve_timezone, CalendarBusySettings, ContextSettings,
    Decision, TimeWindow, DEFER_SHORT_MILLIS,
};
pub use delivery_log::{DeliveryLogStatus, MedicationLogEntry, ReminderLogEntry};
pub use freebusy::{
    find_interval_at, normalize_busy_intervals, BusyInterval, CalendarConnection,
    FreeBusyCacheEntry, TokenSet, BUSY_END_BUFFER_MILLIS, FREEBUSY_CACHE_TTL_MILLIS,
    FREEBUSY_LOOKAHEAD_MILLIS,
};
pub use job::{
    plan_failure, ActionToken, Channel, FailureTransition, JobEntityType, JobStatus,
    NotificationJob, RETRY_DELAYS_SECS,
};
pub use reminder::{
    MedicationDetails, OccurrenceStatus, Profile, Reminder, ReminderKind, ReminderOccurrence,
};
pub use shared::entity::{Entity, ID};
pub use subscription::PushSubscription;
