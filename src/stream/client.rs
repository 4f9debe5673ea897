use super::codec::{decode_message, StreamCommand};
use super::registry::{Consumer, Registry, SubscriptionKey};
use super::types::{
    BalanceRecord, CandleRecord, KeepAliveRecord, NewsRecord, ProfitRecord, RecordKind,
    StreamRecord, StreamTradeRecord, TickPriceRecord, TradeStatusRecord,
};
use crate::core::config::StreamOptions;
use crate::core::errors::{CloseError, ConnectError, ListenError, RecvError, SendError, StreamError};
use crate::core::kernel::Connection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

const LIVENESS_FAILURE_CAPACITY: usize = 16;
const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of a stream dispatcher
///
/// `Idle -> Connected -> Listening -> Stopped`. Only `listen` moves a
/// dispatcher into `Listening`; it leaves it `Stopped` when it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Connected,
    Listening,
    Stopped,
}

/// What to stream: a record kind, a symbol for symbol-scoped kinds, and the
/// tick tuning the venue accepts for `tickPrices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub kind: RecordKind,
    pub symbol: Option<String>,
    /// Minimum milliseconds between two tick updates
    pub min_arrival_time: Option<u32>,
    /// Deepest order book level to stream
    pub max_level: Option<u32>,
}

impl Subscription {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            symbol: None,
            min_arrival_time: None,
            max_level: None,
        }
    }

    pub fn for_symbol(kind: RecordKind, symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Self::new(kind)
        }
    }

    pub fn with_min_arrival_time(mut self, millis: u32) -> Self {
        self.min_arrival_time = Some(millis);
        self
    }

    pub fn with_max_level(mut self, level: u32) -> Self {
        self.max_level = Some(level);
        self
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.kind, self.symbol.as_deref())
    }

    fn start_command<'a>(&'a self, session_id: &'a str) -> StreamCommand<'a> {
        let tick_tuning = self.kind == RecordKind::TickPrices;
        StreamCommand {
            min_arrival_time: self.min_arrival_time.filter(|_| tick_tuning),
            max_level: self.max_level.filter(|_| tick_tuning),
            ..StreamCommand::new(self.kind.start_command())
                .with_session(session_id)
                .with_symbol(self.symbol.as_deref().filter(|_| self.kind.is_symbol_scoped()))
        }
    }
}

struct ActiveListen {
    id: u64,
    token: CancellationToken,
}

/// Releases a listen's registration however its future ends
///
/// Stops the keep-alive task and, if the listen is still the active one,
/// moves the dispatcher to `end_state`.
struct ListenGuard<'a> {
    client: &'a StreamClient,
    id: u64,
    token: CancellationToken,
    liveness: Option<JoinHandle<()>>,
    end_state: DispatcherState,
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(liveness) = self.liveness.take() {
            liveness.abort();
        }
        self.client.finish_listen(self.id, self.end_state);
    }
}

/// Demultiplexes the venue's push stream to per-subscription consumers
///
/// Subscriptions are registered before their start command is sent.
/// Records are routed by kind, and by symbol for candles and tick prices;
/// records nobody subscribed to are dropped.
pub struct StreamClient {
    options: StreamOptions,
    conn: RwLock<Option<Arc<Connection>>>,
    session_id: RwLock<Option<String>>,
    registry: Registry,
    state: watch::Sender<DispatcherState>,
    // serializes attach, disconnect and the start of a listen
    lifecycle: Mutex<()>,
    active_listen: StdMutex<Option<ActiveListen>>,
    next_listen_id: AtomicU64,
    liveness_failures: broadcast::Sender<SendError>,
    cancellation_token: CancellationToken,
}

impl StreamClient {
    pub fn new(options: StreamOptions) -> Self {
        let (state, _) = watch::channel(DispatcherState::Idle);
        let (liveness_failures, _) = broadcast::channel(LIVENESS_FAILURE_CAPACITY);
        Self {
            options,
            conn: RwLock::new(None),
            session_id: RwLock::new(None),
            registry: Registry::default(),
            state,
            lifecycle: Mutex::new(()),
            active_listen: StdMutex::new(None),
            next_listen_id: AtomicU64::new(0),
            liveness_failures,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Keep-alive send failures observed while listening
    pub fn liveness_failures(&self) -> broadcast::Receiver<SendError> {
        self.liveness_failures.subscribe()
    }

    /// Token observed by connect and by subscription commands
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn cancel_all_requests(&self) {
        self.cancellation_token.cancel();
    }

    /// Session id issued by the call channel's `login`
    pub async fn set_session_id(&self, session_id: impl Into<String>) {
        *self.session_id.write().await = Some(session_id.into());
    }

    #[instrument(skip(self), fields(url = %self.options.url))]
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let conn = Connection::connect(
            &self.options.url,
            self.options.connect_timeout,
            &self.cancellation_token,
        )
        .await?;
        self.attach(conn).await;
        info!("Stream connected");
        Ok(())
    }

    /// Start over on `conn`
    ///
    /// A running `listen` is cancelled, the previous connection closed and
    /// every subscription dropped, since the venue forgets them with the socket.
    pub async fn attach(&self, conn: Connection) {
        let lifecycle = self.lifecycle.lock().await;
        self.stop_active_listen();
        let previous = self.conn.write().await.replace(Arc::new(conn));
        self.registry.clear().await;
        self.state.send_replace(DispatcherState::Connected);
        drop(lifecycle);

        if let Some(previous) = previous {
            if let Err(e) = previous.disconnect().await {
                debug!(error = %e, "Previous stream connection already gone");
            }
        }
    }

    /// Stop listening, drop every subscription and close the connection
    #[instrument(skip(self), fields(url = %self.options.url))]
    pub async fn disconnect(&self) -> Result<(), CloseError> {
        let lifecycle = self.lifecycle.lock().await;
        let was_listening = self.stop_active_listen();
        let conn = self.conn.write().await.take();
        self.registry.clear().await;
        self.state.send_replace(if was_listening {
            DispatcherState::Stopped
        } else {
            DispatcherState::Idle
        });
        drop(lifecycle);

        match conn {
            Some(conn) => conn.disconnect().await,
            None => Err(CloseError::AlreadyClosed),
        }
    }

    /// Currently registered routing keys
    pub async fn subscriptions(&self) -> Vec<SubscriptionKey> {
        self.registry.keys().await
    }

    /// Register `consumer` and ask the venue to start streaming
    ///
    /// Subscribing again to the same key replaces the previous consumer. If
    /// the start command cannot be sent the registry is restored.
    #[instrument(skip(self, consumer), fields(key = %subscription.key()))]
    pub async fn subscribe(
        &self,
        subscription: Subscription,
        consumer: Consumer,
    ) -> Result<(), StreamError> {
        if subscription.kind.is_symbol_scoped() && subscription.symbol.is_none() {
            return Err(StreamError::MissingSymbol(subscription.kind));
        }
        let session_id = self
            .session_id
            .read()
            .await
            .clone()
            .ok_or(StreamError::MissingSession)?;
        let conn = self.connection().await?;

        let key = subscription.key();
        let previous = self.registry.insert(key.clone(), consumer).await;

        let command = subscription.start_command(&session_id);
        if let Err(e) = self.send_command(&conn, &command).await {
            match previous {
                Some(previous) => self.registry.insert(key, previous).await,
                None => self.registry.remove(&key).await,
            };
            return Err(e);
        }

        debug!("Subscribed");
        Ok(())
    }

    /// Remove the consumer for `(kind, symbol)` and ask the venue to stop
    #[instrument(skip(self))]
    pub async fn unsubscribe(&self, kind: RecordKind, symbol: Option<&str>) -> Result<(), StreamError> {
        let conn = self.connection().await?;
        let key = SubscriptionKey::new(kind, symbol);
        self.registry.remove(&key).await;

        let command = StreamCommand::new(kind.stop_command()).with_symbol(key.symbol.as_deref());
        self.send_command(&conn, &command).await?;
        debug!("Unsubscribed");
        Ok(())
    }

    /// Subscribe with a bounded queue sized by `incoming_buffer_size`
    pub async fn subscribe_channel(
        &self,
        subscription: Subscription,
    ) -> Result<mpsc::Receiver<StreamRecord>, StreamError> {
        let (tx, rx) = mpsc::channel(self.options.incoming_buffer_size.max(1));
        self.subscribe(subscription, Consumer::Queue(tx)).await?;
        Ok(rx)
    }

    pub async fn subscribe_balance<F>(&self, callback: F) -> Result<(), StreamError>
    where
        F: Fn(BalanceRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<BalanceRecord, _>(
            |record| match record {
                StreamRecord::Balance(balance) => Some(balance),
                _ => None,
            },
            callback,
        );
        self.subscribe(Subscription::new(RecordKind::Balance), consumer)
            .await
    }

    pub async fn subscribe_candles<F>(&self, symbol: &str, callback: F) -> Result<(), StreamError>
    where
        F: Fn(CandleRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<CandleRecord, _>(
            |record| match record {
                StreamRecord::Candle(candle) => Some(candle),
                _ => None,
            },
            callback,
        );
        self.subscribe(Subscription::for_symbol(RecordKind::Candle, symbol), consumer)
            .await
    }

    pub async fn subscribe_keep_alive<F>(&self, callback: F) -> Result<(), StreamError>
    where
        F: Fn(KeepAliveRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<KeepAliveRecord, _>(
            |record| match record {
                StreamRecord::KeepAlive(keep_alive) => Some(keep_alive),
                _ => None,
            },
            callback,
        );
        self.subscribe(Subscription::new(RecordKind::KeepAlive), consumer)
            .await
    }

    pub async fn subscribe_news<F>(&self, callback: F) -> Result<(), StreamError>
    where
        F: Fn(NewsRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<NewsRecord, _>(
            |record| match record {
                StreamRecord::News(news) => Some(news),
                _ => None,
            },
            callback,
        );
        self.subscribe(Subscription::new(RecordKind::News), consumer)
            .await
    }

    pub async fn subscribe_profits<F>(&self, callback: F) -> Result<(), StreamError>
    where
        F: Fn(ProfitRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<ProfitRecord, _>(
            |record| match record {
                StreamRecord::Profit(profit) => Some(profit),
                _ => None,
            },
            callback,
        );
        self.subscribe(Subscription::new(RecordKind::Profit), consumer)
            .await
    }

    pub async fn subscribe_tick_prices<F>(
        &self,
        symbol: &str,
        min_arrival_time: Option<u32>,
        max_level: Option<u32>,
        callback: F,
    ) -> Result<(), StreamError>
    where
        F: Fn(TickPriceRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<TickPriceRecord, _>(
            |record| match record {
                StreamRecord::TickPrices(tick) => Some(tick),
                _ => None,
            },
            callback,
        );
        let subscription = Subscription {
            min_arrival_time,
            max_level,
            ..Subscription::for_symbol(RecordKind::TickPrices, symbol)
        };
        self.subscribe(subscription, consumer).await
    }

    pub async fn subscribe_trades<F>(&self, callback: F) -> Result<(), StreamError>
    where
        F: Fn(StreamTradeRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<StreamTradeRecord, _>(
            |record| match record {
                StreamRecord::Trade(trade) => Some(trade),
                _ => None,
            },
            callback,
        );
        self.subscribe(Subscription::new(RecordKind::Trade), consumer)
            .await
    }

    pub async fn subscribe_trade_status<F>(&self, callback: F) -> Result<(), StreamError>
    where
        F: Fn(TradeStatusRecord) + Send + Sync + 'static,
    {
        let consumer = typed::<TradeStatusRecord, _>(
            |record| match record {
                StreamRecord::TradeStatus(status) => Some(status),
                _ => None,
            },
            callback,
        );
        self.subscribe(Subscription::new(RecordKind::TradeStatus), consumer)
            .await
    }

    /// Send one liveness message now
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), StreamError> {
        let session_id = self
            .session_id
            .read()
            .await
            .clone()
            .ok_or(StreamError::MissingSession)?;
        let conn = self.connection().await?;
        self.send_command(&conn, &StreamCommand::ping(&session_id))
            .await
    }

    /// Run the receive loop and the keep-alive timer until `cancel` fires
    ///
    /// Consumers run on this task, in wire order per key. Returns `Ok` on
    /// cancellation (or `disconnect`), and an error for an unknown record kind,
    /// an undecodable message or a failed read. The registry is left as it was.
    ///
    /// Dropping the future stops the keep-alive and returns the dispatcher to
    /// `Connected`, so `listen` can be called again on the same connection.
    #[instrument(skip_all, fields(url = %self.options.url))]
    pub async fn listen(&self, cancel: &CancellationToken) -> Result<(), ListenError> {
        let token = cancel.child_token();
        let id = self.next_listen_id.fetch_add(1, Ordering::Relaxed);

        let conn = {
            let _lifecycle = self.lifecycle.lock().await;
            let conn = self.conn.read().await.clone();
            let mut active = self.active_listen.lock().unwrap_or_else(PoisonError::into_inner);
            let state = self.state();
            if state != DispatcherState::Connected {
                return Err(ListenError::InvalidState(state));
            }
            let conn = conn.ok_or(ListenError::InvalidState(DispatcherState::Idle))?;
            *active = Some(ActiveListen {
                id,
                token: token.clone(),
            });
            self.state.send_replace(DispatcherState::Listening);
            conn
        };
        let mut guard = ListenGuard {
            client: self,
            id,
            token: token.clone(),
            liveness: None,
            end_state: DispatcherState::Connected,
        };

        let session_id = self.session_id.read().await.clone();
        if session_id.is_none() {
            warn!("Listening without a session id, keep-alive disabled");
        }
        guard.liveness = Some(tokio::spawn(keep_alive(
            Arc::clone(&conn),
            session_id,
            self.options.keep_alive_interval,
            self.options.write_timeout,
            self.liveness_failures.clone(),
            token.clone(),
        )));
        info!("Listening");

        let result = loop {
            let data = match conn.receive(None, &token).await {
                Ok(data) => data,
                Err(RecvError::Cancelled) => break Ok(()),
                Err(e) => break Err(ListenError::from(e)),
            };

            let record = match decode_message(&data) {
                Ok(record) => record,
                Err(e) => break Err(e),
            };

            tokio::select! {
                biased;
                () = token.cancelled() => break Ok(()),
                () = self.dispatch(record) => {}
            }
        };

        guard.end_state = DispatcherState::Stopped;
        token.cancel();
        if let Some(liveness) = guard.liveness.take() {
            if let Err(e) = liveness.await {
                warn!(error = %e, "Keep-alive task did not finish cleanly");
            }
        }
        drop(guard);

        match &result {
            Ok(()) => info!("Stopped listening"),
            Err(e) => warn!(error = %e, "Listen loop failed"),
        }
        result
    }

    /// Cancel the running listen, if any; true when one was running
    fn stop_active_listen(&self) -> bool {
        let active = self
            .active_listen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match active {
            Some(listen) => {
                listen.token.cancel();
                true
            }
            None => false,
        }
    }

    fn finish_listen(&self, id: u64, end_state: DispatcherState) {
        let mut active = self.active_listen.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|listen| listen.id == id) {
            *active = None;
            self.state.send_replace(end_state);
        }
    }

    async fn dispatch(&self, record: StreamRecord) {
        let key = SubscriptionKey::for_record(&record);
        match self.registry.get(&key).await {
            Some(consumer) => {
                if !consumer.deliver(record).await {
                    debug!(key = %key, "Consumer queue closed, record dropped");
                }
            }
            None => trace!(key = %key, "No consumer, record discarded"),
        }
    }

    async fn connection(&self) -> Result<Arc<Connection>, StreamError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or(StreamError::NotConnected)
    }

    async fn send_command(
        &self,
        conn: &Connection,
        command: &StreamCommand<'_>,
    ) -> Result<(), StreamError> {
        let text = serde_json::to_string(command)?;
        debug!(command = command.command, bytes = text.len(), "write");
        let deadline = Instant::now().checked_add(self.options.write_timeout);
        conn.send(text, deadline, &self.cancellation_token)
            .await?;
        Ok(())
    }
}

/// Wrap a typed callback so it only sees the records `extract` accepts
fn typed<T, F>(extract: fn(StreamRecord) -> Option<T>, callback: F) -> Consumer
where
    T: 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    Consumer::callback(move |record| {
        if let Some(record) = extract(record) {
            callback(record);
        }
    })
}

/// Ping the venue every `period` until `token` fires
///
/// Failures are reported and the loop keeps going; the read side decides
/// when the stream is dead.
async fn keep_alive(
    conn: Arc<Connection>,
    session_id: Option<String>,
    period: Duration,
    write_timeout: Duration,
    failures: broadcast::Sender<SendError>,
    token: CancellationToken,
) {
    let Some(session_id) = session_id else {
        token.cancelled().await;
        return;
    };

    let period = period.max(MIN_KEEP_ALIVE_INTERVAL);
    let Some(first_tick) = Instant::now().checked_add(period) else {
        token.cancelled().await;
        return;
    };
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let text = match serde_json::to_string(&StreamCommand::ping(&session_id)) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode keep-alive");
                continue;
            }
        };

        match conn
            .send(text, Instant::now().checked_add(write_timeout), &token)
            .await
        {
            Ok(()) => trace!("Keep-alive sent"),
            Err(SendError::Cancelled) => return,
            Err(e) => {
                warn!(error = %e, "Keep-alive failed");
                let _ = failures.send(e);
            }
        }
    }
}
