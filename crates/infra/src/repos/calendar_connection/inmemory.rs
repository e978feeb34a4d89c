use super::ICalendarConnectionRepo;
use smart_notifier_domain::{CalendarConnection, FreeBusyCacheEntry, TokenSet, ID};

pub struct InMemoryCalendarConnectionRepo {
    connections: std::sync::Mutex<Vec<CalendarConnection>>,
}

impl InMemoryCalendarConnectionRepo {
    pub fn new() -> Self {
        Self {
            connections: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, connection: &CalendarConnection) {
        let mut connections = self.connections.lock().unwrap();
        connections.push(connection.clone());
    }
}

#[async_trait::async_trait]
impl ICalendarConnectionRepo for InMemoryCalendarConnectionRepo {
    async fn find(&self, user_id: &ID) -> Option<CalendarConnection> {
        let connections = self.connections.lock().unwrap();
        connections
            .iter()
            .find(|connection| &connection.user_id == user_id)
            .cloned()
    }

    async fn save_tokens(&self, user_id: &ID, tokens: &TokenSet) -> anyhow::Result<()> {
        let mut connections = self.connections.lock().unwrap();
        for connection in connections.iter_mut() {
            if &connection.user_id == user_id {
                connection.access_token = tokens.access_token.clone();
                connection.refresh_token = tokens.refresh_token.clone();
                connection.expires_ts = tokens.expires_ts;
                connection.scope = tokens.scope.clone();
            }
        }
        Ok(())
    }

    async fn save_freebusy_cache(
        &self,
        user_id: &ID,
        cache: &FreeBusyCacheEntry,
    ) -> anyhow::Result<()> {
        let mut connections = self.connections.lock().unwrap();
        for connection in connections.iter_mut() {
            if &connection.user_id == user_id {
                connection.freebusy_cache = Some(cache.clone());
            }
        }
        Ok(())
    }
}
