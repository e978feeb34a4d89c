mod config;
mod repos;
mod services;
mod system;

pub use config::{Config, GoogleOAuthSettings, VapidSettings};
pub use repos::{
    DeleteResult, DeviceInstall, ICalendarConnectionRepo, IDeliveryLogRepo, INotificationJobRepo,
    IProfileRepo, IPushSubscriptionRepo, IReminderRepo, InMemoryRepos, LogInsert, Repos,
};
pub use services::{
    google_calendar::GoogleCalendarBusyGateway, web_push::WebPushGateway, ICalendarBusyGateway,
    IPushGateway, InMemoryCalendarBusyGateway, InMemoryPushGateway, PushDeliveryError,
    PushNotification,
};
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
pub use system::ISys;
use system::RealSys;

#[derive(Clone)]
pub struct Context {
    pub repos: Repos,
    pub config: Config,
    pub sys: Arc<dyn ISys>,
    pub calendar: Arc<dyn ICalendarBusyGateway>,
    pub push: Arc<dyn IPushGateway>,
}

struct ContextParams {
    pub postgres_connection_string: String,
}

impl Context {
    async fn create(params: ContextParams) -> Self {
        let repos = Repos::create_postgres(&params.postgres_connection_string)
            .await
            .expect("Postgres credentials must be set and valid");
        let config = Config::new();
        let push = Arc::new(WebPushGateway::new(config.vapid.clone()));
        Self {
            repos,
            config,
            sys: Arc::new(RealSys {}),
            calendar: Arc::new(GoogleCalendarBusyGateway),
            push,
        }
    }

    /// Context backed by in-memory repositories and gateway fakes.
    /// Returns the concrete repos alongside so tests can seed state.
    pub fn create_inmemory() -> (Self, InMemoryRepos) {
        let repos = Repos::create_inmemory();
        let ctx = Self {
            repos: repos.clone().into(),
            config: Config::new(),
            sys: Arc::new(RealSys {}),
            calendar: Arc::new(InMemoryCalendarBusyGateway::new()),
            push: Arc::new(InMemoryPushGateway::new()),
        };
        (ctx, repos)
    }
}

/// Will setup the infrastructure context given the environment
pub async fn setup_context() -> Context {
    Context::create(ContextParams {
        postgres_connection_string: get_psql_connection_string(),
    })
    .await
}

fn get_psql_connection_string() -> String {
    const PSQL_CONNECTION_STRING: &str = "DATABASE_URL";

    std::env::var(PSQL_CONNECTION_STRING)
        .unwrap_or_else(|_| panic!("{} env var to be present.", PSQL_CONNECTION_STRING))
}

pub async fn run_migration() -> Result<(), MigrateError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&get_psql_connection_string())
        .await
        .expect("TO CONNECT TO POSTGRES");

    sqlx::migrate!().run(&pool).await
}
