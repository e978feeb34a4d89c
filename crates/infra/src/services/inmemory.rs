use super::{ICalendarBusyGateway, IPushGateway, PushDeliveryError, PushNotification};
use crate::Context;
use smart_notifier_domain::{BusyInterval, PushSubscription, ID};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Calendar gateway stub returning a fixed interval set and counting
/// external calls, so cache behavior can be asserted in tests.
pub struct InMemoryCalendarBusyGateway {
    pub busy: Mutex<Vec<BusyInterval>>,
    pub calls: AtomicUsize,
}

impl InMemoryCalendarBusyGateway {
    pub fn new() -> Self {
        Self {
            busy: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_busy(&self, busy: Vec<BusyInterval>) {
        *self.busy.lock().unwrap() = busy;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ICalendarBusyGateway for InMemoryCalendarBusyGateway {
    async fn fetch_busy(
        &self,
        _ctx: &Context,
        _user_id: &ID,
        _time_min: i64,
        _time_max: i64,
        _time_zone: &str,
    ) -> anyhow::Result<Vec<BusyInterval>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.busy.lock().unwrap().clone())
    }
}

/// Push gateway that records deliveries instead of performing them.
/// Endpoints registered as gone produce the provider's 404/410 behavior.
pub struct InMemoryPushGateway {
    pub sent: Mutex<Vec<(String, PushNotification)>>,
    pub gone_endpoints: Mutex<HashSet<String>>,
    pub failing: Mutex<bool>,
}

impl InMemoryPushGateway {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            gone_endpoints: Mutex::new(HashSet::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn mark_endpoint_gone(&self, endpoint: &str) {
        self.gone_endpoints.lock().unwrap().insert(endpoint.to_string());
    }

    pub fn fail_all_sends(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn sent_payloads(&self) -> Vec<(String, PushNotification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IPushGateway for InMemoryPushGateway {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushNotification,
    ) -> Result<(), PushDeliveryError> {
        if self.gone_endpoints.lock().unwrap().contains(&subscription.endpoint) {
            return Err(PushDeliveryError::Gone);
        }
        if *self.failing.lock().unwrap() {
            return Err(PushDeliveryError::Transient("push provider is down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.clone()));
        Ok(())
    }
}
