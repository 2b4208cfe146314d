//! Connection manager for a single realtime channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use crate::{
    BackoffPolicy, ChangeEvent, ChannelMessage, ChannelStatus, ExponentialBackoff,
    RealtimeTransport,
};

type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// How a subscription session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Errored or timed out; always retried.
    Failed,
    /// Closed; retried only while still connected.
    Closed,
}

struct Shared {
    transport: Arc<dyn RealtimeTransport>,
    channel: String,
    backoff: Arc<dyn BackoffPolicy>,
    handlers: RwLock<Vec<ChangeHandler>>,
    active: AtomicBool,
    subscribed: AtomicBool,
    attempt: AtomicU32,
}

struct Driver {
    connected: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Keeps one channel subscribed until told to stop.
///
/// The manager is owned by its caller; there is no global connection
/// state. `connect` starts a background driver task, `disconnect` stops
/// it and releases the subscription.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl ConnectionManager {
    /// Creates a manager for `channel`. Nothing is subscribed until
    /// [`Self::connect`].
    #[must_use]
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        channel: impl Into<String>,
        backoff: Arc<dyn BackoffPolicy>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                channel: channel.into(),
                backoff,
                handlers: RwLock::new(vec![]),
                active: AtomicBool::new(false),
                subscribed: AtomicBool::new(false),
                attempt: AtomicU32::new(0),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Creates a manager with [`ExponentialBackoff::default`].
    #[must_use]
    pub fn with_default_backoff(
        transport: Arc<dyn RealtimeTransport>,
        channel: impl Into<String>,
    ) -> Self {
        Self::new(transport, channel, Arc::new(ExponentialBackoff::default()))
    }

    /// Registers a handler called for every row change.
    pub async fn on_event(&self, handler: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.shared.handlers.write().await.push(Arc::new(handler));
    }

    /// Whether the channel is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.shared.subscribed.load(Ordering::SeqCst)
    }

    /// Number of consecutive failed sessions since the last successful
    /// subscription.
    #[must_use]
    pub fn retry_attempt(&self) -> u32 {
        self.shared.attempt.load(Ordering::SeqCst)
    }

    /// Starts subscribing. Does nothing if already running.
    pub async fn connect(&self) {
        let mut driver = self.driver.lock().await;
        if driver.as_ref().is_some_and(|d| !d.handle.is_finished()) {
            log::debug!("Realtime channel {} already connecting", self.shared.channel);
            return;
        }

        self.shared.attempt.store(0, Ordering::SeqCst);
        let (connected, watcher) = watch::channel(true);
        let handle = tokio::spawn(drive(self.shared.clone(), watcher));
        *driver = Some(Driver { connected, handle });
    }

    /// Stops retrying and releases the subscription.
    pub async fn disconnect(&self) {
        let Some(driver) = self.driver.lock().await.take() else {
            return;
        };

        let _ = driver.connected.send(false);
        if let Err(e) = driver.handle.await {
            log::error!("Realtime driver for {} failed: {e}", self.shared.channel);
        }
        self.shared.attempt.store(0, Ordering::SeqCst);
        self.shared.subscribed.store(false, Ordering::SeqCst);
    }
}

async fn drive(shared: Arc<Shared>, mut connected: watch::Receiver<bool>) {
    loop {
        let end = tokio::select! {
            end = shared.session() => end,
            () = stopped(&mut connected) => break,
        };

        shared.teardown().await;

        if end == SessionEnd::Closed && !*connected.borrow() {
            break;
        }

        let attempt = shared.attempt.fetch_add(1, Ordering::SeqCst);
        let delay = shared.backoff.delay(attempt);
        log::debug!(
            "Retrying realtime channel {} in {delay:?} (attempt {})",
            shared.channel,
            attempt + 1
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = stopped(&mut connected) => break,
        }
    }

    shared.teardown().await;
}

async fn stopped(connected: &mut watch::Receiver<bool>) {
    let _ = connected.wait_for(|c| !*c).await;
}

impl Shared {
    async fn session(&self) -> SessionEnd {
        let mut subscription = match self.transport.subscribe(&self.channel).await {
            Ok(subscription) => subscription,
            Err(e) => {
                log::warn!("Failed to subscribe to realtime channel {}: {e}", self.channel);
                return SessionEnd::Failed;
            }
        };
        self.active.store(true, Ordering::SeqCst);

        while let Some(message) = subscription.receiver.recv().await {
            match message {
                ChannelMessage::Status(ChannelStatus::Subscribed) => {
                    log::info!("Realtime channel {} subscribed", self.channel);
                    self.attempt.store(0, Ordering::SeqCst);
                    self.subscribed.store(true, Ordering::SeqCst);
                }
                ChannelMessage::Status(
                    status @ (ChannelStatus::ChannelError | ChannelStatus::TimedOut),
                ) => {
                    log::warn!("Realtime channel {} status: {status:?}", self.channel);
                    return SessionEnd::Failed;
                }
                ChannelMessage::Status(ChannelStatus::Closed) => {
                    log::info!("Realtime channel {} closed", self.channel);
                    return SessionEnd::Closed;
                }
                ChannelMessage::Change(change) => {
                    let handlers = self.handlers.read().await.clone();
                    for handler in &handlers {
                        handler(&change);
                    }
                }
            }
        }

        log::info!("Realtime channel {} stream ended", self.channel);
        SessionEnd::Closed
    }

    async fn teardown(&self) {
        self.subscribed.store(false, Ordering::SeqCst);
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.transport.unsubscribe(&self.channel).await {
            log::warn!("Failed to unsubscribe from realtime channel {}: {e}", self.channel);
        }
    }
}
