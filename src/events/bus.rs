//! In-process event bus.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::config::EventBusConfig;
use crate::events::types::{DomainEvent, EventPriority, EventType};
use crate::observability::metrics;
use crate::resilience::{retry_async, RetryPolicy};

const DEAD_LETTER_CAPACITY: usize = 1000;

/// Reacts to published events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), String>;
}

/// Transforms events before persistence and dispatch.
pub trait EventMiddleware: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, event: &DomainEvent) -> Result<DomainEvent, String>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), String> {
        (self.f)(event.clone()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HandlerId(u64);

#[derive(Clone)]
struct Registration {
    id: HandlerId,
    subscriber_id: String,
    handler: Arc<dyn EventHandler>,
}

/// An event whose handler gave up.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub event_id: String,
    pub event_type: EventType,
    pub handler: String,
    pub error: String,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    pub event: DomainEvent,
}

/// What happened to one publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub event_id: String,
    pub handlers: usize,
    pub failed_handlers: usize,
    pub timed_out: bool,
    pub routed_to: Vec<&'static str>,
}

impl PublishOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed_handlers == 0 && !self.timed_out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBusStats {
    pub total_events: u64,
    pub successful_events: u64,
    pub failed_events: u64,
    pub retry_attempts: u64,
    pub subscribers: BTreeMap<String, Vec<EventType>>,
    pub handler_count: usize,
    pub middleware_count: usize,
    pub stream_length: usize,
    pub dead_letter_count: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub dead_letter_queue: bool,
    pub persistence_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBusHealth {
    pub healthy: bool,
    pub success_rate: f64,
    pub total_events_processed: u64,
    pub failed_events: u64,
    pub stream_length: usize,
    pub active_subscribers: usize,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

/// Decoupled publish/subscribe between modules.
///
/// Handlers for one event run concurrently under a shared deadline; each
/// failing handler is retried with linearly growing delays and, once out of
/// retries, recorded as a dead letter.
pub struct EventBus {
    config: EventBusConfig,
    handlers: RwLock<HashMap<EventType, Vec<Registration>>>,
    middleware: RwLock<Vec<Arc<dyn EventMiddleware>>>,
    log: Mutex<VecDeque<DomainEvent>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    counters: Counters,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            log: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(VecDeque::new()),
            counters: Counters::default(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(
        &self,
        event_type: EventType,
        subscriber_id: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber_id = subscriber_id.into();
        tracing::info!(
            event_type = %event_type,
            subscriber_id = %subscriber_id,
            handler = handler.name(),
            "Event handler subscribed"
        );
        self.handlers
            .write()
            .expect("event handlers lock poisoned")
            .entry(event_type)
            .or_default()
            .push(Registration {
                id,
                subscriber_id,
                handler,
            });
        id
    }

    pub fn unsubscribe(&self, event_type: EventType, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().expect("event handlers lock poisoned");
        let Some(list) = handlers.get_mut(&event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&event_type);
        }
        if removed {
            tracing::info!(event_type = %event_type, handler_id = id.0, "Event handler unsubscribed");
        }
        removed
    }

    pub fn add_middleware(&self, middleware: Arc<dyn EventMiddleware>) {
        tracing::info!(middleware = middleware.name(), "Event middleware added");
        self.middleware
            .write()
            .expect("event middleware lock poisoned")
            .push(middleware);
    }

    pub fn remove_middleware(&self, name: &str) -> bool {
        let mut chain = self.middleware.write().expect("event middleware lock poisoned");
        let before = chain.len();
        chain.retain(|m| m.name() != name);
        chain.len() != before
    }

    /// Stamp, transform, persist, route and dispatch `event`.
    pub async fn publish(
        &self,
        mut event: DomainEvent,
        priority: EventPriority,
        correlation_id: Option<String>,
    ) -> PublishOutcome {
        if correlation_id.is_some() {
            event.correlation_id = correlation_id;
        }
        event.metadata.insert("priority".into(), Value::from(priority.as_str()));
        event
            .metadata
            .insert("bus_timestamp".into(), Value::from(Utc::now().to_rfc3339()));
        event
            .metadata
            .insert("source_module".into(), Value::from("event_bus"));

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            priority = priority.as_str(),
            correlation_id = ?event.correlation_id,
            "Publishing event"
        );

        let event = self.apply_middleware(event);

        if self.config.persistence_enabled {
            self.persist(&event);
        }

        let routed_to = event.event_type.target_modules().to_vec();
        for module in &routed_to {
            tracing::debug!(event_type = %event.event_type, target_module = module, "Routing event to module");
        }

        let outcome = self.dispatch(&event, routed_to).await;

        if outcome.succeeded() {
            self.counters.successful.fetch_add(1, Ordering::Relaxed);
            metrics::record_event(event.event_type.as_str(), "success");
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            metrics::record_event(event.event_type.as_str(), "failed");
        }
        outcome
    }

    /// Publish with normal priority for a user.
    pub async fn emit(&self, event_type: EventType, user_id: &str, data: Value) -> PublishOutcome {
        self.publish(
            DomainEvent::for_user(event_type, user_id, data),
            EventPriority::Normal,
            None,
        )
        .await
    }

    fn apply_middleware(&self, event: DomainEvent) -> DomainEvent {
        let chain = self
            .middleware
            .read()
            .expect("event middleware lock poisoned")
            .clone();
        let mut current = event;
        for middleware in chain {
            match middleware.process(&current) {
                Ok(next) => current = next,
                Err(e) => {
                    tracing::error!(middleware = middleware.name(), error = %e, "Middleware processing failed");
                    break;
                }
            }
        }
        current
    }

    fn persist(&self, event: &DomainEvent) {
        let mut log = self.log.lock().expect("event log mutex poisoned");
        log.push_back(event.clone());
        while log.len() > self.config.max_stream_length {
            log.pop_front();
        }
    }

    async fn dispatch(&self, event: &DomainEvent, routed_to: Vec<&'static str>) -> PublishOutcome {
        let registrations: Vec<Registration> = self
            .handlers
            .read()
            .expect("event handlers lock poisoned")
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut outcome = PublishOutcome {
            event_id: event.event_id.clone(),
            handlers: registrations.len(),
            failed_handlers: 0,
            timed_out: false,
            routed_to,
        };
        if registrations.is_empty() {
            return outcome;
        }

        let policy = RetryPolicy::linear(
            self.config.max_retries,
            Duration::from_millis(self.config.retry_delay_ms),
        );
        let runs = registrations
            .iter()
            .map(|registration| self.run_handler(registration, event, &policy));
        let deadline = Duration::from_secs(self.config.handler_timeout_secs);

        match tokio::time::timeout(deadline, join_all(runs)).await {
            Ok(results) => {
                outcome.failed_handlers = results.iter().filter(|ok| !**ok).count();
            }
            Err(_) => {
                tracing::warn!(
                    event_type = %event.event_type,
                    handler_count = registrations.len(),
                    "Some event handlers timed out"
                );
                outcome.timed_out = true;
                self.dead_letter(event, "*", "handler timeout".to_string(), 0);
            }
        }
        outcome
    }

    async fn run_handler(
        &self,
        registration: &Registration,
        event: &DomainEvent,
        policy: &RetryPolicy,
    ) -> bool {
        let handler = &registration.handler;
        let result = retry_async(policy, |_| true, |attempt| {
            if attempt > 0 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
            }
            async move {
                handler.handle(event).await.map_err(|e| {
                    tracing::warn!(
                        handler = handler.name(),
                        subscriber_id = %registration.subscriber_id,
                        event_type = %event.event_type,
                        retry_count = attempt,
                        max_retries = policy.max_retries,
                        error = %e,
                        "Event handler failed"
                    );
                    e
                })
            }
        })
        .await;

        match result {
            Ok(()) => true,
            Err((error, attempts)) => {
                tracing::error!(
                    handler = handler.name(),
                    event_type = %event.event_type,
                    error = %error,
                    "Event handler failed after max retries"
                );
                self.dead_letter(event, handler.name(), error, attempts.saturating_sub(1));
                false
            }
        }
    }

    fn dead_letter(&self, event: &DomainEvent, handler: &str, error: String, retry_count: u32) {
        if !self.config.dead_letter_queue {
            return;
        }
        let mut queue = self.dead_letters.lock().expect("dead letter mutex poisoned");
        queue.push_back(DeadLetter {
            event_id: event.event_id.clone(),
            event_type: event.event_type,
            handler: handler.to_string(),
            error,
            retry_count,
            failed_at: Utc::now(),
            event: event.clone(),
        });
        while queue.len() > DEAD_LETTER_CAPACITY {
            queue.pop_front();
        }
        tracing::info!(event_id = %event.event_id, handler = %handler, "Event sent to dead letter queue");
    }

    /// Persisted events, newest first, filtered by type and time range.
    pub fn replay(
        &self,
        event_type: Option<EventType>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        max_events: usize,
    ) -> Vec<DomainEvent> {
        let log = self.log.lock().expect("event log mutex poisoned");
        let events: Vec<DomainEvent> = log
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| from.map_or(true, |from| e.timestamp >= from))
            .filter(|e| to.map_or(true, |to| e.timestamp <= to))
            .take(max_events)
            .cloned()
            .collect();
        tracing::info!(count = events.len(), event_type = ?event_type, "Events replayed");
        events
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .expect("dead letter mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn stream_length(&self) -> usize {
        self.log.lock().expect("event log mutex poisoned").len()
    }

    pub fn stats(&self) -> EventBusStats {
        let handlers = self.handlers.read().expect("event handlers lock poisoned");
        let mut subscribers: BTreeMap<String, BTreeSet<EventType>> = BTreeMap::new();
        for (event_type, list) in handlers.iter() {
            for registration in list {
                subscribers
                    .entry(registration.subscriber_id.clone())
                    .or_default()
                    .insert(*event_type);
            }
        }

        EventBusStats {
            total_events: self.counters.total.load(Ordering::Relaxed),
            successful_events: self.counters.successful.load(Ordering::Relaxed),
            failed_events: self.counters.failed.load(Ordering::Relaxed),
            retry_attempts: self.counters.retries.load(Ordering::Relaxed),
            subscribers: subscribers
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
            handler_count: handlers.values().map(Vec::len).sum(),
            middleware_count: self
                .middleware
                .read()
                .expect("event middleware lock poisoned")
                .len(),
            stream_length: self.stream_length(),
            dead_letter_count: self.dead_letters.lock().expect("dead letter mutex poisoned").len(),
            max_retries: self.config.max_retries,
            retry_delay_ms: self.config.retry_delay_ms,
            dead_letter_queue: self.config.dead_letter_queue,
            persistence_enabled: self.config.persistence_enabled,
        }
    }

    pub fn health(&self) -> EventBusHealth {
        let stats = self.stats();
        let success_rate = if stats.total_events > 0 {
            stats.successful_events as f64 / stats.total_events as f64
        } else {
            1.0
        };
        EventBusHealth {
            healthy: stats.total_events == 0 || success_rate > 0.95,
            success_rate,
            total_events_processed: stats.total_events,
            failed_events: stats.failed_events,
            stream_length: stats.stream_length,
            active_subscribers: stats.subscribers.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn fast_config() -> EventBusConfig {
        EventBusConfig {
            max_retries: 2,
            retry_delay_ms: 1,
            handler_timeout_secs: 1,
            ..EventBusConfig::default()
        }
    }

    fn counting_handler(name: &str, counter: Arc<AtomicU32>) -> Arc<dyn EventHandler> {
        handler_fn(name, move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    struct Tagger;

    impl EventMiddleware for Tagger {
        fn name(&self) -> &str {
            "tagger"
        }

        fn process(&self, event: &DomainEvent) -> Result<DomainEvent, String> {
            Ok(event.clone().with_metadata("tagged", true))
        }
    }

    struct Broken;

    impl EventMiddleware for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn process(&self, _event: &DomainEvent) -> Result<DomainEvent, String> {
            Err("nope".into())
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_handlers() {
        let bus = EventBus::new(fast_config());
        let hits = Arc::new(AtomicU32::new(0));
        bus.subscribe(EventType::PlantAdded, "care_management", counting_handler("a", hits.clone()));
        bus.subscribe(EventType::PlantAdded, "analytics", counting_handler("b", hits.clone()));
        bus.subscribe(EventType::UserLogin, "analytics", counting_handler("c", hits.clone()));

        let outcome = bus
            .publish(
                DomainEvent::new(EventType::PlantAdded, json!({"plant_id": "p1"})),
                EventPriority::High,
                Some("corr-1".into()),
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.handlers, 2);
        assert_eq!(outcome.routed_to.len(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let stored = bus.replay(None, None, None, 10);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(stored[0].metadata["priority"], "high");
        assert_eq!(stored[0].metadata["source_module"], "event_bus");
    }

    #[tokio::test]
    async fn test_retry_then_dead_letter() {
        let bus = EventBus::new(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        bus.subscribe(
            EventType::PaymentFailed,
            "notifications",
            handler_fn("always_fails", move |_| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err("smtp down".to_string())
                }
            }),
        );

        let outcome = bus
            .publish(DomainEvent::new(EventType::PaymentFailed, json!({})), EventPriority::Critical, None)
            .await;

        assert!(!outcome.succeeded());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].handler, "always_fails");
        assert_eq!(dead[0].retry_count, 2);

        let stats = bus.stats();
        assert_eq!(stats.retry_attempts, 2);
        assert_eq!(stats.failed_events, 1);
        assert!(!bus.health().healthy);
    }

    #[tokio::test]
    async fn test_flaky_handler_recovers() {
        let bus = EventBus::new(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        bus.subscribe(
            EventType::CareReminderSent,
            "analytics",
            handler_fn("flaky", move |_| {
                let seen = seen.clone();
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err("transient".to_string())
                    } else {
                        Ok(())
                    }
                }
            }),
        );

        let outcome = bus
            .publish(DomainEvent::new(EventType::CareReminderSent, json!({})), EventPriority::Normal, None)
            .await;
        assert!(outcome.succeeded());
        assert!(bus.dead_letters().is_empty());
        assert!(bus.health().healthy);
    }

    #[tokio::test]
    async fn test_timeout_marks_failure() {
        let bus = EventBus::new(fast_config());
        bus.subscribe(
            EventType::WeatherAlertIssued,
            "care",
            handler_fn("slow", |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }),
        );
        let outcome = bus.emit(EventType::WeatherAlertIssued, "u1", json!({})).await;
        assert!(outcome.timed_out);
        assert_eq!(bus.dead_letters()[0].error, "handler timeout");
    }

    #[tokio::test]
    async fn test_middleware_chain_stops_on_error() {
        let bus = EventBus::new(fast_config());
        bus.add_middleware(Arc::new(Tagger));
        bus.add_middleware(Arc::new(Broken));
        bus.emit(EventType::UserLogin, "u1", json!({})).await;

        let stored = bus.replay(Some(EventType::UserLogin), None, None, 5);
        assert_eq!(stored[0].metadata["tagged"], true);

        assert!(bus.remove_middleware("broken"));
        assert_eq!(bus.stats().middleware_count, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_stats() {
        let bus = EventBus::new(fast_config());
        let hits = Arc::new(AtomicU32::new(0));
        let id = bus.subscribe(EventType::UserRegistered, "analytics", counting_handler("a", hits.clone()));
        assert_eq!(bus.stats().subscribers["analytics"], vec![EventType::UserRegistered]);

        assert!(bus.unsubscribe(EventType::UserRegistered, id));
        assert!(!bus.unsubscribe(EventType::UserRegistered, id));
        bus.emit(EventType::UserRegistered, "u1", json!({})).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(bus.stats().subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_log_is_bounded_and_filtered() {
        let bus = EventBus::new(EventBusConfig {
            max_stream_length: 3,
            ..fast_config()
        });
        for i in 0..5 {
            bus.emit(EventType::PlantAdded, &format!("u{i}"), json!({})).await;
        }
        bus.emit(EventType::UserLogin, "u9", json!({})).await;
        assert_eq!(bus.stream_length(), 3);

        let plants = bus.replay(Some(EventType::PlantAdded), None, None, 10);
        assert_eq!(plants.len(), 2);
        assert_eq!(plants[0].user_id.as_deref(), Some("u4"));

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(bus.replay(None, Some(future), None, 10).is_empty());
    }
}
