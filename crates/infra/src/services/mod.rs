pub mod google_calendar;
mod inmemory;
pub mod web_push;

use crate::Context;
use serde::Serialize;
use smart_notifier_domain::{BusyInterval, PushSubscription, ID};
use thiserror::Error;

pub use inmemory::{InMemoryCalendarBusyGateway, InMemoryPushGateway};

/// The JSON payload delivered to the push endpoint. The action token lets
/// the notification's buttons act on the reminder without a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub url: String,
    pub job_id: ID,
    #[serde(rename = "token")]
    pub action_token: String,
}

#[derive(Error, Debug)]
pub enum PushDeliveryError {
    /// The provider reported the endpoint gone (HTTP 404/410); the
    /// subscription should be deleted
    #[error("Push endpoint is gone")]
    Gone,
    /// VAPID keys are not configured, sends degrade to a benign skip
    #[error("Push delivery is not configured")]
    Unconfigured,
    #[error("Push delivery failed: {0}")]
    Transient(String),
}

#[async_trait::async_trait]
pub trait IPushGateway: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushNotification,
    ) -> Result<(), PushDeliveryError>;
}

/// Busy-interval lookup against the user's external calendar provider.
/// Implementations resolve and refresh the user's bearer token themselves;
/// the returned intervals are normalized.
#[async_trait::async_trait]
pub trait ICalendarBusyGateway: Send + Sync {
    async fn fetch_busy(
        &self,
        ctx: &Context,
        user_id: &ID,
        time_min: i64,
        time_max: i64,
        time_zone: &str,
    ) -> anyhow::Result<Vec<BusyInterval>>;
}
