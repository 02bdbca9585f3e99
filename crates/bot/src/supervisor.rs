use core::time::Duration;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, OptionFuture};
use plugin_core::InboundMessage;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::qr;

/// Connection lifecycle reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed { logged_out: bool, reason: Option<i64> },
}

/// Everything the supervisor reacts to, decoded from webhook deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message(InboundMessage),
    State(ConnectionState),
    /// Raw pairing code to render as a QR code.
    Qr(String),
}

/// (Re)establishes the session with the chat network.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Ask for the session to be opened. Returns a pairing code when the
    /// account still has to be linked.
    async fn connect(&self) -> Result<Option<String>>;
}

/// Exponential reconnect delay: `min`, doubling per attempt, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Backoff {
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Delay before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub const fn reset(&mut self) {
        self.current = self.min;
    }
}

/// A connect request in flight, possibly still waiting out its backoff delay.
type Attempt = BoxFuture<'static, Result<Option<String>>>;

/// Keeps the session alive and feeds inbound messages to the dispatcher, one
/// task per message. Reconnects run alongside event handling, so messages and
/// a logout are still seen while the gateway is unreachable.
pub struct Supervisor {
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    backoff: Backoff,
}

impl core::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Supervisor")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(connector: Arc<dyn Connector>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            connector,
            dispatcher,
            backoff: Backoff::default(),
        }
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn attempt(&self, delay: Duration) -> Attempt {
        let connector = Arc::clone(&self.connector);
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            connector.connect().await
        })
    }

    fn retry(&mut self) -> (Attempt, Duration) {
        let delay = self.backoff.next_delay();
        (self.attempt(delay), delay)
    }

    /// Run until the event channel closes or the account is logged out.
    /// A pending reconnect is dropped on exit; in-flight handlers are awaited.
    ///
    /// # Errors
    ///
    /// Fails when the gateway reports a logout; the account must be paired again.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> Result<()> {
        let mut tasks = JoinSet::new();
        let mut pending: Option<Attempt> = Some(self.attempt(Duration::ZERO));

        let logged_out = loop {
            tokio::select! {
                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = done {
                        warn!(error = %e, "Message handler panicked");
                    }
                }
                Some(result) = OptionFuture::from(pending.as_mut()), if pending.is_some() => {
                    pending = match result {
                        Ok(code) => {
                            if let Some(code) = code {
                                show_pairing_code(&code);
                            }
                            None
                        }
                        Err(e) => {
                            let (next, delay) = self.retry();
                            warn!(error = %format!("{e:#}"), retry_in = ?delay, "Connect failed");
                            Some(next)
                        }
                    };
                }
                event = events.recv() => {
                    let Some(event) = event else { break false };
                    match event {
                        SessionEvent::Message(msg) if msg.from_me => {
                            debug!(id = %msg.id, "Ignoring own message");
                        }
                        SessionEvent::Message(msg) => {
                            let dispatcher = Arc::clone(&self.dispatcher);
                            tasks.spawn(async move { dispatcher.handle(msg).await });
                        }
                        SessionEvent::Qr(code) => show_pairing_code(&code),
                        SessionEvent::State(ConnectionState::Open) => {
                            info!("Connected");
                            self.backoff.reset();
                            pending = None;
                        }
                        SessionEvent::State(ConnectionState::Connecting) => {
                            debug!("Connecting");
                        }
                        SessionEvent::State(ConnectionState::Closed { logged_out: true, reason }) => {
                            warn!(?reason, "Logged out");
                            break true;
                        }
                        SessionEvent::State(ConnectionState::Closed { logged_out: false, reason }) => {
                            // Replaces any attempt still in flight.
                            let (next, delay) = self.retry();
                            warn!(?reason, retry_in = ?delay, "Connection closed, reconnecting");
                            pending = Some(next);
                        }
                    }
                }
            }
        };
        drop(pending);

        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "Message handler panicked");
            }
        }
        if logged_out {
            bail!("session logged out; pair the gateway instance again");
        }
        Ok(())
    }
}

fn show_pairing_code(code: &str) {
    match qr::render(code) {
        Ok(art) => {
            info!("Scan the QR code below with WhatsApp (Linked devices)");
            eprintln!("{art}");
        }
        Err(e) => warn!(error = %e, "Could not render pairing QR code"),
    }
}
