use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "The given {}: {} is not valid, falling back to the default: {}.",
                    key, raw, default
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthSettings {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct VapidSettings {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the health endpoint listens on
    pub port: usize,
    /// Base url of the web app, used for notification deep links
    pub app_url: String,
    /// How often the scheduler loop polls for due jobs
    pub poll_interval_millis: u64,
    /// Small lookahead past "now" when claiming, to smooth the polling
    /// cadence
    pub claim_window_secs: i64,
    /// How far back a due job is still worth delivering, e.g. after
    /// worker downtime
    pub grace_minutes: i64,
    /// Maximum number of jobs claimed per cycle
    pub claim_limit: i64,
    /// Maximum number of jobs processed concurrently within one batch
    pub max_concurrency: usize,
    /// Claims older than this are considered abandoned by a crashed or
    /// stalled worker and are reclaimed
    pub reclaim_minutes: i64,
    /// How often aggregate metrics are logged, coarser than the poll loop
    pub metrics_interval_millis: i64,
    pub google: Option<GoogleOAuthSettings>,
    pub vapid: Option<VapidSettings>,
}

impl Config {
    pub fn new() -> Self {
        let app_url = std::env::var("APP_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        let google = match (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            (Ok(client_id), Ok(client_secret)) => Some(GoogleOAuthSettings {
                client_id,
                client_secret,
            }),
            _ => {
                warn!("Google OAuth credentials missing; calendar busy checks will be skipped");
                None
            }
        };

        let vapid = match (
            std::env::var("VAPID_PUBLIC_KEY"),
            std::env::var("VAPID_PRIVATE_KEY"),
            std::env::var("VAPID_SUBJECT"),
        ) {
            (Ok(public_key), Ok(private_key), Ok(subject)) => Some(VapidSettings {
                public_key,
                private_key,
                subject,
            }),
            _ => {
                warn!("VAPID keys missing; push sends will be skipped");
                None
            }
        };

        Self {
            port: parse_env_or("PORT", 8787),
            app_url,
            poll_interval_millis: parse_env_or("WORKER_POLL_MS", 5000),
            claim_window_secs: parse_env_or("WORKER_CLAIM_WINDOW_SECONDS", 5),
            grace_minutes: parse_env_or("WORKER_GRACE_MINUTES", 120),
            claim_limit: parse_env_or("WORKER_CLAIM_LIMIT", 500),
            max_concurrency: parse_env_or("WORKER_MAX_CONCURRENCY", 100),
            reclaim_minutes: parse_env_or("WORKER_RECLAIM_MINUTES", 5),
            metrics_interval_millis: parse_env_or("WORKER_METRICS_INTERVAL_MS", 60_000),
            google,
            vapid,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
