//! Mock adapters for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use ringlink_api::{DisplayMessage, Endpoint};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::{
    DisplayTransport, Envelope, MetricSource, SourceError, SourceRequest, SourceResult,
    TransportError, TransportResult,
};

/// Scripted reply for one `(endpoint, end_date)` pair
#[derive(Debug, Clone)]
pub struct MockReply {
    pub result: SourceResult<Envelope>,
    pub delay: Option<Duration>,
}

/// Mock upstream source.
///
/// Replies are keyed by endpoint and `end_date` (the target day); anything
/// not scripted answers with an empty envelope.
pub struct MockSource {
    replies: Mutex<HashMap<(Endpoint, NaiveDate), MockReply>>,
    fallback: Mutex<Option<MockReply>>,
    calls: Mutex<Vec<SourceRequest>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            fallback: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script(&self, endpoint: Endpoint, day: NaiveDate, reply: MockReply) {
        self.replies.lock().unwrap().insert((endpoint, day), reply);
    }

    /// Reply with `{"data": records}`
    pub fn respond(&self, endpoint: Endpoint, day: NaiveDate, records: Vec<serde_json::Value>) {
        self.script(
            endpoint,
            day,
            MockReply {
                result: Ok(Envelope::new(records)),
                delay: None,
            },
        );
    }

    /// Same as [`respond`](Self::respond) after a delay
    pub fn respond_after(
        &self,
        endpoint: Endpoint,
        day: NaiveDate,
        records: Vec<serde_json::Value>,
        delay: Duration,
    ) {
        self.script(
            endpoint,
            day,
            MockReply {
                result: Ok(Envelope::new(records)),
                delay: Some(delay),
            },
        );
    }

    pub fn fail(&self, endpoint: Endpoint, day: NaiveDate, error: SourceError) {
        self.script(
            endpoint,
            day,
            MockReply {
                result: Err(error),
                delay: None,
            },
        );
    }

    /// Reply used for every request that has no scripted reply
    pub fn fail_everything(&self, error: SourceError) {
        *self.fallback.lock().unwrap() = Some(MockReply {
            result: Err(error),
            delay: None,
        });
    }

    /// Every request received so far
    pub fn calls(&self) -> Vec<SourceRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for MockSource {
    async fn fetch(&self, request: &SourceRequest) -> SourceResult<Envelope> {
        self.calls.lock().unwrap().push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&(request.endpoint, request.end_date))
            .cloned()
            .or_else(|| self.fallback.lock().unwrap().clone());

        match reply {
            Some(reply) => {
                if let Some(delay) = reply.delay {
                    tokio::time::sleep(delay).await;
                }
                reply.result
            }
            None => Ok(Envelope::empty()),
        }
    }
}

/// Mock display transport recording every attempt
pub struct MockTransport {
    attempts: Mutex<Vec<DisplayMessage>>,
    delivered: Mutex<Vec<DisplayMessage>>,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    connected: AtomicBool,
    /// Messages containing this key always fail
    fail_key: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    delivered_notify: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            fail_always: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            fail_key: Mutex::new(None),
            latency: Mutex::new(None),
            delivered_notify: Arc::new(Notify::new()),
        }
    }

    /// Fail the next `n` attempts, whatever they carry
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    pub fn fail_messages_with_key(&self, key: &str) {
        *self.fail_key.lock().unwrap() = Some(key.to_string());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Time every attempt takes before resolving
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Every attempt in order, failed ones included
    pub fn attempts(&self) -> Vec<DisplayMessage> {
        self.attempts.lock().unwrap().clone()
    }

    /// Successfully delivered messages in order
    pub fn delivered(&self) -> Vec<DisplayMessage> {
        self.delivered.lock().unwrap().clone()
    }

    /// Wait until at least `n` messages have been delivered
    pub async fn wait_for_delivered(&self, n: usize) {
        loop {
            let notified = self.delivered_notify.notified();
            if self.delivered.lock().unwrap().len() >= n {
                return;
            }
            notified.await;
        }
    }

    fn should_fail(&self, message: &DisplayMessage) -> bool {
        if self.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(key) = self.fail_key.lock().unwrap().as_deref()
            && message.get(key).is_some()
        {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisplayTransport for MockTransport {
    async fn send(&self, message: &DisplayMessage) -> TransportResult<()> {
        self.attempts.lock().unwrap().push(message.clone());

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.should_fail(message) {
            return Err(TransportError::Rejected("mock failure".into()));
        }

        self.delivered.lock().unwrap().push(message.clone());
        self.delivered_notify.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
