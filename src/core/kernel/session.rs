//! Lifecycle of one streaming connection for one (venue, asset class).
//!
//! ```text
//! Disconnected -> Connecting -> [Authenticating] -> Connected
//!     -> Authenticated | PublicOnly -> Active -> ShuttingDown -> Disconnected
//! ```
//!
//! The listen key is acquired before dialing. An authenticated session dials
//! the key's private URL and subscribes its public channels on that same
//! connection; a public one dials the multiplexed URL.
//!
//! A running session owns two tasks: the read loop, which demultiplexes
//! frames onto the bounded event channel, and the keep-alive loop, which
//! renews the listen key while the session is authenticated. Both watch
//! one shutdown signal. Reconnecting after a peer close is left to the
//! caller: the session reports [`SessionEvent::ConnectionClosed`], drops to
//! `Disconnected` and accepts a fresh [`StreamSession::start`]. A renewal
//! that hands back a different key ends the connection the same way, since
//! the old key is part of the dialed URL.

use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::core::kernel::ws::{self, WsConfig, WsSink, WsSource};
use crate::core::traits::ListenKeyApi;
use crate::core::types::{AssetClass, NormalizedEvent, Subscription};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    /// Listen key acquisition failed or was not requested; public channels only
    PublicOnly,
    Active,
    ShuttingDown,
}

impl SessionState {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub const fn is_connecting(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Authenticating)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::PublicOnly => "public_only",
            Self::Active => "active",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that parameterizes a session. One session type serves every
/// venue and asset class.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub exchange_name: String,
    pub asset: AssetClass,
    /// Multiplexed market data URL dialed by public sessions
    pub public_url: String,
    /// Base for the per-key private URL dialed by authenticated sessions,
    /// e.g. `wss://fstream.binance.com`
    pub ws_base: String,
    /// Acquire a listen key and subscribe to user data
    pub authenticate: bool,
    pub keepalive_interval: Duration,
    pub listen_key_timeout: Duration,
    /// Consecutive renewal failures after which credentials are considered
    /// lost. `None` keeps renewing forever.
    pub max_consecutive_renewal_failures: Option<u32>,
    /// Release the listen key on the venue when the session stops
    pub close_listen_key_on_stop: bool,
    pub ws: WsConfig,
}

impl StreamConfig {
    pub fn new(
        exchange_name: impl Into<String>,
        asset: AssetClass,
        public_url: impl Into<String>,
        ws_base: impl Into<String>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            asset,
            public_url: public_url.into(),
            ws_base: ws_base.into(),
            authenticate: false,
            keepalive_interval: Duration::from_secs(30 * 60),
            listen_key_timeout: Duration::from_secs(60),
            max_consecutive_renewal_failures: None,
            close_listen_key_on_stop: false,
            ws: WsConfig::default(),
        }
    }

    #[must_use]
    pub const fn with_authentication(mut self, authenticate: bool) -> Self {
        self.authenticate = authenticate;
        self
    }

    #[must_use]
    pub const fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_listen_key_timeout(mut self, timeout: Duration) -> Self {
        self.listen_key_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_consecutive_renewal_failures(mut self, max: Option<u32>) -> Self {
        self.max_consecutive_renewal_failures = max;
        self
    }

    #[must_use]
    pub fn with_ws(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }

    /// Dedicated user data URL for `listen_key`.
    pub fn private_url(&self, listen_key: &str) -> String {
        format!("{}/ws/{}", self.ws_base.trim_end_matches('/'), listen_key)
    }
}

/// Venue-issued credential for the user data stream.
#[derive(Clone, PartialEq, Eq)]
pub struct ListenKey {
    value: String,
    acquired_at: DateTime<Utc>,
    renewal_interval: Duration,
}

impl ListenKey {
    pub fn new(value: String, renewal_interval: Duration) -> Self {
        Self {
            value,
            acquired_at: Utc::now(),
            renewal_interval,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub const fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub const fn renewal_interval(&self) -> Duration {
        self.renewal_interval
    }

    /// When the next renewal should happen.
    pub fn renewal_due(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.renewal_interval)
            .map_or(self.acquired_at, |interval| self.acquired_at + interval)
    }

    fn refresh(&mut self) {
        self.acquired_at = Utc::now();
    }
}

impl fmt::Debug for ListenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenKey")
            .field("value", &"[REDACTED]")
            .field("acquired_at", &self.acquired_at)
            .field("renewal_interval", &self.renewal_interval)
            .finish()
    }
}

/// Everything a session pushes to its consumer.
#[derive(Debug)]
pub enum SessionEvent {
    Data(NormalizedEvent),
    /// Non-fatal problem: decode failure, renewal failure, venue error frame
    Error(ExchangeError),
    /// The connection ended; the session is `Disconnected`. Also sent when
    /// the venue replaced the listen key the connection was dialed with.
    ConnectionClosed { reason: String },
    /// Renewal kept failing; user data may stop while public data continues
    AuthenticationLost { consecutive_failures: u32 },
}

struct Running {
    shutdown: Arc<watch::Sender<bool>>,
    read_task: JoinHandle<()>,
    keepalive_task: Option<JoinHandle<()>>,
}

impl Running {
    fn is_finished(&self) -> bool {
        self.read_task.is_finished()
            && self
                .keepalive_task
                .as_ref()
                .map_or(true, JoinHandle::is_finished)
    }

    async fn shutdown_and_join(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.read_task.await {
            error!(error = %e, "Read loop terminated abnormally");
        }
        if let Some(task) = self.keepalive_task {
            if let Err(e) = task.await {
                error!(error = %e, "Keep-alive loop terminated abnormally");
            }
        }
    }
}

const TRANSITION_BACKLOG: usize = 32;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared<C> {
    config: StreamConfig,
    codec: C,
    listen_keys: Option<Arc<dyn ListenKeyApi>>,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<SessionState>,
    transitions: broadcast::Sender<SessionState>,
    subscriptions: Mutex<BTreeMap<String, Subscription>>,
    listen_key: Mutex<Option<ListenKey>>,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    active_loops: AtomicUsize,
}

impl<C: WsCodec> Shared<C> {
    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            // no receivers is fine
            let _ = self.transitions.send(state);
            debug!(
                exchange = %self.config.exchange_name,
                asset = %self.config.asset,
                from = %previous,
                to = %state,
                "Session state changed"
            );
        }
    }

    fn listen_key_value(&self) -> Option<String> {
        lock(&self.listen_key).as_ref().map(|key| key.value.clone())
    }

    fn channels(&self) -> Vec<String> {
        lock(&self.subscriptions).keys().cloned().collect()
    }

    async fn send_frame(&self, message: Message) -> Result<(), ExchangeError> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| ExchangeError::ConnectionError("session is not connected".to_string()))?;
        ws::send(sink, message).await
    }

    /// Deliver an event, blocking while the channel is full. Returns `false`
    /// once shutdown is signalled. A dropped receiver discards the event.
    async fn emit(&self, event: SessionEvent, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!(exchange = %self.config.exchange_name, "Event receiver dropped, discarding event");
                }
                true
            }
            _ = shutdown.changed() => false,
        }
    }
}

/// Decrements the loop counter when a loop exits, however it exits.
struct LoopGuard<C: WsCodec>(Arc<Shared<C>>);

impl<C: WsCodec> LoopGuard<C> {
    fn new(shared: &Arc<Shared<C>>) -> Self {
        shared.active_loops.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(shared))
    }
}

impl<C: WsCodec> Drop for LoopGuard<C> {
    fn drop(&mut self) {
        self.0.active_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One streaming connection for one (venue, asset class).
pub struct StreamSession<C: WsCodec> {
    shared: Arc<Shared<C>>,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
}

impl<C: WsCodec> fmt::Debug for StreamSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("exchange", &self.shared.config.exchange_name)
            .field("asset", &self.shared.config.asset)
            .field("state", &self.state())
            .field("subscriptions", &self.shared.channels())
            .finish_non_exhaustive()
    }
}

impl<C: WsCodec> StreamSession<C> {
    /// Create a disconnected session and the receiving end of its event
    /// channel. `listen_keys` is only consulted when the config asks for
    /// authentication.
    pub fn new(
        config: StreamConfig,
        codec: C,
        listen_keys: Option<Arc<dyn ListenKeyApi>>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, receiver) = mpsc::channel(config.ws.message_buffer_size.max(1));
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_BACKLOG);
        let shared = Arc::new(Shared {
            config,
            codec,
            listen_keys,
            events,
            state,
            transitions,
            subscriptions: Mutex::new(BTreeMap::new()),
            listen_key: Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            active_loops: AtomicUsize::new(0),
        });
        (
            Self {
                shared,
                lifecycle: tokio::sync::Mutex::new(None),
            },
            receiver,
        )
    }

    /// Seed the subscription set sent on the next start.
    #[must_use]
    pub fn with_subscriptions(self, subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        {
            let mut set = lock(&self.shared.subscriptions);
            for subscription in subscriptions {
                set.insert(subscription.channel.clone(), subscription);
            }
        }
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Every state change from now on, in order. Unlike [`Self::watch_state`]
    /// short-lived states are not coalesced; a receiver lagging more than a
    /// few dozen changes behind loses the oldest ones.
    pub fn state_transitions(&self) -> broadcast::Receiver<SessionState> {
        self.shared.transitions.subscribe()
    }

    /// Mirrored subscription set, ordered by channel.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        lock(&self.shared.subscriptions).values().cloned().collect()
    }

    pub fn listen_key(&self) -> Option<ListenKey> {
        lock(&self.shared.listen_key).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.shared.listen_key).is_some()
    }

    /// Number of session loops currently alive.
    pub fn active_loops(&self) -> usize {
        self.shared.active_loops.load(Ordering::SeqCst)
    }

    /// Dial, authenticate if configured, replay the subscription set and
    /// spawn the session loops.
    ///
    /// A dial failure returns `ConnectionError` and leaves the session
    /// `Disconnected`. Listen key failure is not an error: the session
    /// continues as `PublicOnly`.
    #[instrument(skip(self), fields(exchange = %self.shared.config.exchange_name, asset = %self.shared.config.asset))]
    pub async fn start(&self) -> Result<(), ExchangeError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(running) = lifecycle.take() {
            if !running.is_finished() && self.state() != SessionState::Disconnected {
                *lifecycle = Some(running);
                return Err(ExchangeError::InvalidState(format!(
                    "session is already {}",
                    self.state()
                )));
            }
            // leftovers of a peer-closed connection
            running.shutdown_and_join().await;
            self.shared.writer.lock().await.take();
        }

        let shared = &self.shared;
        shared.set_state(SessionState::Connecting);
        lock(&shared.listen_key).take();
        let acquired = self.acquire_listen_key().await;

        let url = acquired.as_ref().map_or_else(
            || shared.config.public_url.clone(),
            |(_, key)| shared.config.private_url(key.value()),
        );
        let (mut sink, source) = match ws::connect(&url, &shared.config.ws).await {
            Ok(halves) => halves,
            Err(e) => {
                error!(error = %e, private = acquired.is_some(), "Stream dial failed");
                shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };
        shared.set_state(SessionState::Connected);

        let keepalive_api = match acquired {
            Some((api, key)) => {
                *lock(&shared.listen_key) = Some(key);
                shared.set_state(SessionState::Authenticated);
                Some(api)
            }
            None => {
                shared.set_state(SessionState::PublicOnly);
                None
            }
        };

        let streams = shared.channels();
        if !streams.is_empty() {
            let sent = match shared.codec.encode_subscription(streams.as_slice()) {
                Ok(frame) => ws::send(&mut sink, frame).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                error!(error = %e, "Initial subscription failed");
                ws::close(&mut sink).await;
                lock(&shared.listen_key).take();
                shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
            debug!(count = streams.len(), "Subscriptions sent");
        }
        *shared.writer.lock().await = Some(sink);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown);
        let key_replaced = Arc::new(Notify::new());

        // Active before the loops exist so a fast peer close cannot be overwritten
        shared.set_state(SessionState::Active);

        let read_task = tokio::spawn(read_loop(
            LoopGuard::new(shared),
            source,
            Arc::clone(&shutdown),
            shutdown_rx.clone(),
            Arc::clone(&key_replaced),
        ));
        let keepalive_task = keepalive_api.map(|api| {
            tokio::spawn(keepalive_loop(
                LoopGuard::new(shared),
                api,
                shutdown_rx,
                key_replaced,
            ))
        });

        info!(authenticated = keepalive_task.is_some(), "Stream session active");
        *lifecycle = Some(Running {
            shutdown,
            read_task,
            keepalive_task,
        });
        Ok(())
    }

    /// Acquire a listen key when the config asks for one. `None` means the
    /// session continues public only.
    async fn acquire_listen_key(&self) -> Option<(Arc<dyn ListenKeyApi>, ListenKey)> {
        let shared = &self.shared;
        if !shared.config.authenticate {
            return None;
        }
        let Some(api) = shared.listen_keys.clone() else {
            warn!("Authentication requested without a listen key source, continuing public only");
            return None;
        };

        shared.set_state(SessionState::Authenticating);
        let acquired = tokio::time::timeout(
            shared.config.listen_key_timeout,
            api.create_listen_key(shared.config.asset),
        )
        .await;

        match acquired {
            Ok(Ok(value)) => {
                let key = ListenKey::new(value, shared.config.keepalive_interval);
                Some((api, key))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Listen key acquisition failed, continuing public only");
                None
            }
            Err(_) => {
                warn!(
                    timeout_secs = shared.config.listen_key_timeout.as_secs(),
                    "Listen key acquisition timed out, continuing public only"
                );
                None
            }
        }
    }

    /// Signal both loops, wait for them to exit and close the transport.
    ///
    /// Idempotent. Concurrent callers queue on the lifecycle lock, so every
    /// caller returns only after the loops are gone.
    #[instrument(skip(self), fields(exchange = %self.shared.config.exchange_name, asset = %self.shared.config.asset))]
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };

        self.shared.set_state(SessionState::ShuttingDown);
        running.shutdown_and_join().await;

        if let Some(mut sink) = self.shared.writer.lock().await.take() {
            ws::close(&mut sink).await;
        }

        let listen_key = lock(&self.shared.listen_key).take();
        if self.shared.config.close_listen_key_on_stop {
            if let (Some(api), Some(key)) = (self.shared.listen_keys.as_ref(), listen_key) {
                if let Err(e) = api.close_listen_key(self.shared.config.asset, key.value()).await {
                    debug!(error = %e, "Listen key close failed");
                }
            }
        }

        self.shared.set_state(SessionState::Disconnected);
        info!("Stream session stopped");
    }

    fn ensure_active(&self) -> Result<(), ExchangeError> {
        let state = self.state();
        if state.is_active() {
            Ok(())
        } else {
            Err(ExchangeError::SubscriptionError(format!(
                "session is {}, subscriptions require an active session",
                state
            )))
        }
    }

    /// Send a subscribe frame and add the channels to the mirrored set.
    /// Does not wait for the venue's acknowledgement.
    pub async fn subscribe(&self, subscriptions: &[Subscription]) -> Result<(), ExchangeError> {
        self.ensure_active()?;
        if subscriptions.is_empty() {
            return Ok(());
        }
        let channels: Vec<&str> = subscriptions.iter().map(|s| s.channel.as_str()).collect();
        let frame = self.shared.codec.encode_subscription(channels.as_slice())?;
        self.shared
            .send_frame(frame)
            .await
            .map_err(|e| ExchangeError::SubscriptionError(e.to_string()))?;

        let mut set = lock(&self.shared.subscriptions);
        for subscription in subscriptions {
            set.insert(subscription.channel.clone(), subscription.clone());
        }
        debug!(channels = ?channels, "Subscribed");
        Ok(())
    }

    /// Send an unsubscribe frame and drop the channels from the mirrored set.
    pub async fn unsubscribe(&self, channels: &[&str]) -> Result<(), ExchangeError> {
        self.ensure_active()?;
        if channels.is_empty() {
            return Ok(());
        }
        let frame = self.shared.codec.encode_unsubscription(channels)?;
        self.shared
            .send_frame(frame)
            .await
            .map_err(|e| ExchangeError::SubscriptionError(e.to_string()))?;

        let mut set = lock(&self.shared.subscriptions);
        for channel in channels {
            set.remove(*channel);
        }
        debug!(channels = ?channels, "Unsubscribed");
        Ok(())
    }
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn read_loop<C: WsCodec>(
    guard: LoopGuard<C>,
    mut source: WsSource,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
    key_replaced: Arc<Notify>,
) {
    let shared = Arc::clone(&guard.0);
    let mut ping = shared.config.ws.ping_interval().map(|period| {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let closed = loop {
        tokio::select! {
            _ = shutdown.changed() => break None,
            () = key_replaced.notified() => break Some("listen key replaced by venue".to_string()),
            () = next_ping(&mut ping) => {
                if let Err(e) = shared.send_frame(Message::Ping(Vec::new())).await {
                    break Some(format!("ping failed: {}", e));
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = shared.send_frame(Message::Pong(payload)).await {
                        debug!(error = %e, "Pong not delivered");
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    break Some(frame.map_or_else(
                        || "closed by peer".to_string(),
                        |f| format!("closed by peer ({}): {}", u16::from(f.code), f.reason),
                    ));
                }
                Some(Ok(message)) => {
                    let event = match shared.codec.decode_message(message) {
                        Ok(Some(event)) => {
                            if matches!(event, NormalizedEvent::ListenKeyExpired(_)) {
                                forget_expired_listen_key(&shared);
                            }
                            SessionEvent::Data(event)
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(exchange = %shared.config.exchange_name, error = %e, "Dropping undecodable frame");
                            SessionEvent::Error(e)
                        }
                    };
                    if !shared.emit(event, &mut shutdown).await {
                        break None;
                    }
                }
                Some(Err(e)) => break Some(format!("transport error: {}", e)),
                None => break Some("stream ended".to_string()),
            }
        }
    };

    if let Some(reason) = closed {
        warn!(exchange = %shared.config.exchange_name, asset = %shared.config.asset, %reason, "Stream disconnected");
        shared.set_state(SessionState::Disconnected);
        shared
            .emit(SessionEvent::ConnectionClosed { reason }, &mut shutdown)
            .await;
        // stops the keep-alive loop
        let _ = shutdown_tx.send(true);
    }
}

async fn keepalive_loop<C: WsCodec>(
    guard: LoopGuard<C>,
    api: Arc<dyn ListenKeyApi>,
    mut shutdown: watch::Receiver<bool>,
    key_replaced: Arc<Notify>,
) {
    let shared = Arc::clone(&guard.0);
    let asset = shared.config.asset;
    let period = shared.config.keepalive_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        let Some(current) = shared.listen_key_value() else {
            break;
        };

        let renewal = tokio::select! {
            _ = shutdown.changed() => break,
            renewal = tokio::time::timeout(
                shared.config.listen_key_timeout,
                api.keepalive_listen_key(asset, &current),
            ) => renewal,
        };

        let error = match renewal {
            Ok(Ok(renewed)) => {
                failures = 0;
                if let Some(fresh) = renewed.filter(|fresh| *fresh != current) {
                    if let Some(key) = lock(&shared.listen_key).as_mut() {
                        key.value = fresh;
                        key.refresh();
                    }
                    info!(exchange = %shared.config.exchange_name, %asset, "Listen key replaced by venue, closing connection");
                    key_replaced.notify_one();
                    break;
                }
                if let Some(key) = lock(&shared.listen_key).as_mut() {
                    key.refresh();
                }
                debug!(exchange = %shared.config.exchange_name, %asset, "Listen key renewed");
                continue;
            }
            Ok(Err(e)) => ExchangeError::ListenKeyRenewalError(e.to_string()),
            Err(_) => ExchangeError::ListenKeyRenewalError(format!(
                "renewal timed out after {}s",
                shared.config.listen_key_timeout.as_secs()
            )),
        };

        failures += 1;
        warn!(exchange = %shared.config.exchange_name, %asset, failures, error = %error, "Listen key renewal failed");
        if !shared.emit(SessionEvent::Error(error), &mut shutdown).await {
            break;
        }

        if let Some(max) = shared.config.max_consecutive_renewal_failures {
            if failures >= max {
                warn!(exchange = %shared.config.exchange_name, %asset, failures, "Giving up on listen key renewal");
                shared
                    .emit(
                        SessionEvent::AuthenticationLost {
                            consecutive_failures: failures,
                        },
                        &mut shutdown,
                    )
                    .await;
                break;
            }
        }
    }
}

/// The venue no longer accepts the key. The keep-alive loop stops at its
/// next tick instead of renewing it.
fn forget_expired_listen_key<C: WsCodec>(shared: &Shared<C>) {
    if lock(&shared.listen_key).take().is_some() {
        warn!(
            exchange = %shared.config.exchange_name,
            asset = %shared.config.asset,
            "Listen key expired, user data stopped until restart"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_url_joins_key() {
        let config = StreamConfig::new(
            "binance",
            AssetClass::UsdMargined,
            "wss://fstream.binance.com/stream",
            "wss://fstream.binance.com/",
        );
        assert_eq!(config.private_url("abc"), "wss://fstream.binance.com/ws/abc");
        assert_eq!(config.keepalive_interval, Duration::from_secs(1800));
        assert_eq!(config.listen_key_timeout, Duration::from_secs(60));
    }

    #[test]
    fn listen_key_debug_is_redacted() {
        let key = ListenKey::new("secret-key-value".to_string(), Duration::from_secs(1800));
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("secret-key-value"));
        assert_eq!(
            key.renewal_due() - key.acquired_at(),
            chrono::Duration::minutes(30)
        );
    }

    #[test]
    fn state_helpers() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert!(SessionState::Active.is_active());
        assert!(SessionState::Authenticating.is_connecting());
        assert_eq!(SessionState::PublicOnly.to_string(), "public_only");
    }
}
