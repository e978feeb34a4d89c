use anyhow::Context as _;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

const GOOGLE_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

#[derive(Debug, Serialize, Deserialize)]
pub struct GoogleDateTime(String);

impl GoogleDateTime {
    pub fn from_timestamp_millis(timestamp: i64) -> Self {
        let datetime = DateTime::<Utc>::from_timestamp_millis(timestamp).unwrap_or_default();
        Self(datetime.to_rfc3339())
    }

    pub fn get_timestamp_millis(&self) -> anyhow::Result<i64> {
        let datetime = DateTime::parse_from_rfc3339(&self.0)
            .with_context(|| format!("Invalid RFC3339 datetime from provider: {}", self.0))?;
        Ok(datetime.timestamp_millis())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyCalendarResponse {
    #[serde(default)]
    pub busy: Vec<FreeBusyTimeSpanResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyTimeSpanResponse {
    pub start: GoogleDateTime,
    pub end: GoogleDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyResponse {
    pub calendars: HashMap<String, FreeBusyCalendarResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyCalendar {
    pub id: String,
}

impl FreeBusyCalendar {
    pub fn new(id: String) -> Self {
        Self { id }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyRequest {
    pub time_min: GoogleDateTime,
    pub time_max: GoogleDateTime,
    pub time_zone: String,
    pub items: Vec<FreeBusyCalendar>,
}

pub struct GoogleCalendarRestApi {
    client: Client,
    access_token: String,
}

impl GoogleCalendarRestApi {
    pub fn new(access_token: String) -> Self {
        let client = Client::new();

        Self {
            client,
            access_token,
        }
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        body: &impl Serialize,
        path: String,
    ) -> anyhow::Result<T> {
        match self
            .client
            .post(&format!("{}/{}", GOOGLE_API_BASE_URL, path))
            .header("authorization", format!("Bearer {}", self.access_token))
            .json(body)
            .send()
            .await
        {
            Ok(res) => res.json::<T>().await.map_err(|e| {
                error!(
                    "[Unexpected Response] Google Calendar API POST error. Error message: {:?}",
                    e
                );
                anyhow::Error::new(e)
            }),
            Err(e) => {
                error!(
                    "[Network Error] Google Calendar API POST error. Error message: {:?}",
                    e
                );
                Err(anyhow::Error::new(e))
            }
        }
    }

    pub async fn freebusy(&self, body: &FreeBusyRequest) -> anyhow::Result<FreeBusyResponse> {
        self.post(body, "freeBusy".into()).await.map_err(|e| {
            error!(
                "Failed to get freebusy from google calendar with request: {:?}. Error message: {:?}",
                body, e
            );
            e
        })
    }
}
