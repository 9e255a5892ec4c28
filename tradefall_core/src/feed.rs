//! Feed listener: connect, subscribe, decode, enqueue, reconnect.
//!
//! Runs as its own task. The only thing it shares with the simulation driver
//! is the [`AdmissionQueue`]; it never blocks on, nor is blocked by, a tick.

use crate::admission::AdmissionQueue;
use crate::config::FeedConfig;
use crate::decoder::{Decoded, EventDecoder};
use crate::error::FeedError;
use crate::metrics::{FeedStats, FeedStatsSnapshot};
use crate::shutdown::{self, ShutdownSignal};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use tradefall_env::{FeedTransport, TradefallContext};

/// Which stream to subscribe to on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub symbol: String,
    pub channel: String,
}

impl Subscription {
    pub fn new(symbol: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            channel: channel.into(),
        }
    }

    /// Exchange stream name, e.g. `btcusdt@trade`.
    pub fn stream_name(&self) -> String {
        let symbol: String = self
            .symbol
            .chars()
            .filter(|c| *c != '/')
            .collect::<String>()
            .to_lowercase();
        format!("{}@{}", symbol, self.channel)
    }

    /// The SUBSCRIBE directive sent right after connecting.
    pub fn directive(&self, request_id: u64) -> String {
        json!({
            "method": "SUBSCRIBE",
            "params": [self.stream_name()],
            "id": request_id,
        })
        .to_string()
    }
}

/// Exponential reconnect delay.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = self.initial.as_millis() as f64 * factor;
        if !millis.is_finite() || millis >= self.max.as_millis() as f64 {
            return self.max;
        }
        Duration::from_millis(millis as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

/// How a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost(FeedError),
}

/// Background task pushing decoded trades into the admission queue.
pub struct FeedListener<Ctx: TradefallContext, T: FeedTransport> {
    context: Arc<Ctx>,
    transport: T,
    decoder: EventDecoder,
    queue: AdmissionQueue,
    subscription: Subscription,
    backoff: BackoffPolicy,
    max_consecutive_failures: u32,
    stats: Arc<FeedStats>,
    request_id: u64,
}

impl<Ctx: TradefallContext, T: FeedTransport> FeedListener<Ctx, T> {
    pub fn new(
        context: Arc<Ctx>,
        transport: T,
        decoder: EventDecoder,
        queue: AdmissionQueue,
        config: &FeedConfig,
    ) -> Self {
        Self {
            context,
            transport,
            decoder,
            queue,
            subscription: Subscription::new(&config.symbol, &config.channel),
            backoff: BackoffPolicy::from_config(config),
            max_consecutive_failures: config.max_consecutive_failures,
            stats: Arc::new(FeedStats::new()),
            request_id: 0,
        }
    }

    /// Shared counters, readable while the listener runs.
    pub fn stats(&self) -> Arc<FeedStats> {
        Arc::clone(&self.stats)
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Runs until shutdown, reconnecting on every loss.
    ///
    /// Returns `Err(RetriesExhausted)` only if `max_consecutive_failures` is set
    /// and that many connects fail in a row.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<FeedStatsSnapshot, FeedError> {
        info!(
            remote = %self.transport.describe(),
            stream = %self.subscription.stream_name(),
            "feed listener started"
        );

        let mut failures: u32 = 0;
        let mut attempt: u32 = 0;

        let outcome = loop {
            if shutdown::is_triggered(&shutdown) {
                break Ok(());
            }

            let connected = tokio::select! {
                res = self.open_session() => Some(res),
                _ = shutdown::triggered(&mut shutdown) => None,
            };

            match connected {
                None => break Ok(()),
                Some(Ok(())) => {
                    failures = 0;
                    attempt = 0;
                    self.stats.record_connection();
                    info!(stream = %self.subscription.stream_name(), "feed subscribed");

                    match self.read_session(&mut shutdown).await {
                        SessionEnd::Shutdown => break Ok(()),
                        SessionEnd::Lost(err) => warn!(error = %err, "feed connection lost"),
                    }
                }
                Some(Err(err)) => {
                    failures += 1;
                    warn!(error = %err, failures, "feed connect failed");
                    if self.max_consecutive_failures > 0 && failures >= self.max_consecutive_failures {
                        break Err(FeedError::RetriesExhausted(failures));
                    }
                }
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting after backoff");

            let stop = tokio::select! {
                _ = self.context.sleep(delay) => false,
                _ = shutdown::triggered(&mut shutdown) => true,
            };
            if stop {
                break Ok(());
            }
            self.stats.record_reconnect_attempt();
        };

        self.transport.close().await;
        let stats = self.stats.snapshot();
        info!(
            messages = stats.messages,
            trades = stats.trades,
            decode_errors = stats.decode_errors,
            connections = stats.connections,
            "feed listener stopped"
        );
        outcome.map(|_| stats)
    }

    /// Connects and sends the subscribe directive.
    async fn open_session(&mut self) -> Result<(), FeedError> {
        self.transport
            .connect()
            .await
            .map_err(|e| FeedError::ConnectionLost(e.to_string()))?;

        self.request_id += 1;
        let directive = self.subscription.directive(self.request_id);
        if let Err(e) = self.transport.send_text(directive).await {
            self.transport.close().await;
            return Err(FeedError::Subscription(e.to_string()));
        }
        Ok(())
    }

    async fn read_session(&mut self, shutdown: &mut ShutdownSignal) -> SessionEnd {
        loop {
            let next = tokio::select! {
                next = self.transport.next_text() => next,
                _ = shutdown::triggered(shutdown) => return SessionEnd::Shutdown,
            };

            match next {
                Some(Ok(text)) => self.handle_text(&text),
                Some(Err(e)) => return SessionEnd::Lost(FeedError::ConnectionLost(e.to_string())),
                None => {
                    return SessionEnd::Lost(FeedError::ConnectionLost(
                        "closed by peer".to_string(),
                    ))
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        self.stats.record_message();
        match self.decoder.decode(text) {
            Ok(Decoded::Trade(event)) => {
                trace!(id = %event.id(), side = ?event.side(), notional = event.notional_value(), "trade");
                self.stats.record_trade();
                self.queue.enqueue(event);
            }
            Ok(Decoded::Skip) => {
                trace!("skipped non-trade message");
                self.stats.record_skip();
            }
            Err(err) => {
                warn!(error = %err, "dropping undecodable feed message");
                self.stats.record_decode_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;
    use crate::entity::{EntityId, IdGenerator, Side};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::future::Future;
    use tokio::task::JoinHandle;
    use tradefall_env::EnvError;

    /// One scripted connection: frames delivered, then closed or held open.
    struct Session {
        frames: VecDeque<String>,
        hold_open: bool,
    }

    #[derive(Default)]
    struct Log {
        connects: u32,
        sent: Vec<String>,
        closes: u32,
    }

    /// Transport replaying scripted sessions; `None` entries refuse the connect.
    struct MockTransport {
        sessions: VecDeque<Option<Session>>,
        current: Option<Session>,
        log: Arc<Mutex<Log>>,
    }

    impl MockTransport {
        fn new(sessions: Vec<Option<Session>>) -> (Self, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            let transport = Self {
                sessions: sessions.into(),
                current: None,
                log: Arc::clone(&log),
            };
            (transport, log)
        }
    }

    #[async_trait]
    impl FeedTransport for MockTransport {
        async fn connect(&mut self) -> Result<(), EnvError> {
            self.log.lock().connects += 1;
            match self.sessions.pop_front() {
                Some(Some(session)) => {
                    self.current = Some(session);
                    Ok(())
                }
                _ => Err(EnvError::connection("refused")),
            }
        }

        async fn send_text(&mut self, text: String) -> Result<(), EnvError> {
            if self.current.is_none() {
                return Err(EnvError::NotConnected);
            }
            self.log.lock().sent.push(text);
            Ok(())
        }

        async fn next_text(&mut self) -> Option<Result<String, EnvError>> {
            let session = self.current.as_mut()?;
            if let Some(frame) = session.frames.pop_front() {
                return Some(Ok(frame));
            }
            if session.hold_open {
                std::future::pending::<()>().await;
            }
            self.current = None;
            None
        }

        async fn close(&mut self) {
            self.current = None;
            self.log.lock().closes += 1;
        }

        fn describe(&self) -> String {
            "mock://feed".to_string()
        }
    }

    /// Context whose sleeps return at once.
    struct InstantContext;

    #[async_trait]
    impl TradefallContext for InstantContext {
        fn now(&self) -> Duration {
            Duration::ZERO
        }

        async fn sleep(&self, _duration: Duration) {
            tokio::task::yield_now().await;
        }

        fn spawn<F>(&self, _name: &str, future: F) -> JoinHandle<()>
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future)
        }
    }

    fn session(frames: &[&str], hold_open: bool) -> Option<Session> {
        Some(Session {
            frames: frames.iter().map(|s| s.to_string()).collect(),
            hold_open,
        })
    }

    fn listener(
        transport: MockTransport,
        queue: &AdmissionQueue,
        config: &FeedConfig,
    ) -> FeedListener<InstantContext, MockTransport> {
        let decoder = EventDecoder::new(&DecoderConfig::default(), Arc::new(IdGenerator::default()));
        FeedListener::new(Arc::new(InstantContext), transport, decoder, queue.clone(), config)
    }

    const BUY: &str = r#"{"e":"trade","m":false,"q":"0.5","p":"60000"}"#;
    const SELL: &str = r#"{"e":"trade","m":true,"q":"2","p":"100"}"#;
    const ACK: &str = r#"{"result":null,"id":1}"#;

    #[test]
    fn test_stream_name_and_directive() {
        let sub = Subscription::new("BTC/USDT", "trade");
        assert_eq!(sub.stream_name(), "btcusdt@trade");

        let directive: serde_json::Value = serde_json::from_str(&sub.directive(7)).unwrap();
        assert_eq!(directive["method"], "SUBSCRIBE");
        assert_eq!(directive["params"][0], "btcusdt@trade");
        assert_eq!(directive["id"], 7);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay(10), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_decodes_and_enqueues_after_subscribe() {
        let (transport, log) = MockTransport::new(vec![session(&[ACK, BUY, "not json", SELL], true)]);
        let queue = AdmissionQueue::new();
        let listener = listener(transport, &queue, &FeedConfig::default());
        let stats = listener.stats();

        let (trigger, signal) = shutdown::channel();
        let task = tokio::spawn(listener.run(signal));

        while stats.snapshot().messages < 4 {
            tokio::task::yield_now().await;
        }
        trigger.send(true).unwrap();
        let snap = task.await.unwrap().unwrap();

        assert_eq!(snap.messages, 4);
        assert_eq!(snap.trades, 2);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.decode_errors, 1);
        assert_eq!(snap.connections, 1);

        let batch = queue.drain_all();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id(), EntityId(1));
        assert_eq!(batch[0].side(), Side::Buy);
        assert_eq!(batch[1].id(), EntityId(2));
        assert_eq!(batch[1].side(), Side::Sell);

        let log = log.lock();
        assert_eq!(log.sent.len(), 1);
        assert!(log.sent[0].contains("btcusdt@trade"));
        assert!(log.closes >= 1);
    }

    #[tokio::test]
    async fn test_reconnects_and_resubscribes_after_drop() {
        let (transport, log) = MockTransport::new(vec![
            session(&[BUY], false),
            None,
            session(&[SELL], true),
        ]);
        let queue = AdmissionQueue::new();
        let listener = listener(transport, &queue, &FeedConfig::default());
        let stats = listener.stats();

        let (trigger, signal) = shutdown::channel();
        let task = tokio::spawn(listener.run(signal));

        while stats.snapshot().trades < 2 {
            tokio::task::yield_now().await;
        }
        trigger.send(true).unwrap();
        let snap = task.await.unwrap().unwrap();

        assert_eq!(snap.connections, 2);
        assert_eq!(snap.reconnect_attempts, 2);

        let log = log.lock();
        assert_eq!(log.connects, 3);
        assert_eq!(log.sent.len(), 2);
        assert!(log.sent[0].contains(r#""id":1"#));
        assert!(log.sent[1].contains(r#""id":2"#));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_consecutive_failures() {
        let (transport, log) = MockTransport::new(vec![]);
        let config = FeedConfig {
            max_consecutive_failures: 3,
            ..FeedConfig::default()
        };
        let listener = listener(transport, &AdmissionQueue::new(), &config);

        let (_trigger, signal) = shutdown::channel();
        let result = listener.run(signal).await;

        assert_eq!(result, Err(FeedError::RetriesExhausted(3)));
        assert_eq!(log.lock().connects, 3);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_never_connects() {
        let (transport, log) = MockTransport::new(vec![session(&[BUY], true)]);
        let listener = listener(transport, &AdmissionQueue::new(), &FeedConfig::default());

        let (trigger, signal) = shutdown::channel();
        trigger.send(true).unwrap();
        let snap = listener.run(signal).await.unwrap();

        assert_eq!(snap, FeedStatsSnapshot::default());
        assert_eq!(log.lock().connects, 0);
    }
}
