//! Reconnecting WebSocket link shared by camera sessions and the control
//! channel.
//!
//! # Architecture
//!
//! ```text
//! owner (session / control channel)
//!     │  mpsc<ControlCommand>          CancellationToken
//!     ▼                                      │
//! run_link ── connect ──► message loop ──────┤
//!     ▲          │             │             │
//!     │          ▼             ▼             ▼
//!     └── sleep(policy) ◄── Closed      stop at any await
//!                              │
//!                              └── unsent commands → CommandFallback
//! ```
//!
//! The loop owns the socket. Owners only see [`LinkEvent`]s through the
//! `emit` callback and the [`SharedConnectionState`] watch. Inbound text is
//! decoded by the link's [`Codec`] inside the task, so malformed payloads
//! never reach the console loop.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::{CONNECT_TIMEOUT, RECONNECT_DELAY};
use crate::error::ConsoleError;
use crate::protocol::{Codec, ControlCommand};
use crate::rest::CommandFallback;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Connection state of a link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never opened.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Connected and ready.
    Open,
    /// Connection lost or closed.
    Closed,
    /// Waiting before the next connect attempt.
    Reconnecting {
        /// Attempt number, starting at 1 after each successful open.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
}

impl ConnectionState {
    /// Short label for indicators and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Reconnecting { .. } => "reconnecting",
        }
    }
}

/// Connection state that can be observed from outside the link task.
#[derive(Debug)]
pub struct SharedConnectionState {
    tx: watch::Sender<ConnectionState>,
}

impl SharedConnectionState {
    /// Create new shared state, starting at [`ConnectionState::Idle`].
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(ConnectionState::Idle);
        Arc::new(Self { tx })
    }

    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    /// Set the state.
    pub fn set(&self, new_state: ConnectionState) {
        self.tx.send_replace(new_state);
    }

    /// Set the state unless `cancel` has fired.
    ///
    /// The check and the write happen under the watch lock, so once an
    /// owner has cancelled and then called [`set`](Self::set), a late write
    /// from the link task cannot overwrite it.
    pub fn set_unless_cancelled(&self, new_state: ConnectionState, cancel: &CancellationToken) {
        self.tx.send_if_modified(|state| {
            if cancel.is_cancelled() {
                false
            } else {
                *state = new_state;
                true
            }
        });
    }

    /// Check if open.
    pub fn is_open(&self) -> bool {
        matches!(*self.tx.borrow(), ConnectionState::Open)
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

/// Reconnect timing. Retries are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Base delay before a reconnect attempt.
    pub delay: Duration,
    /// When set, the delay doubles per attempt up to this cap.
    pub max_delay: Option<Duration>,
    /// Handshake timeout for each attempt.
    pub connect_timeout: Duration,
}

impl ReconnectPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: None,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Switch to capped exponential backoff.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Delay before the given attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.max_delay {
            None => self.delay,
            Some(max) => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(max.max(self.delay))
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(RECONNECT_DELAY)
    }
}

/// Event emitted by a link task.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent<T> {
    /// Connect attempt started.
    Connecting,
    /// Handshake succeeded.
    Open,
    /// Decoded inbound message.
    Message(T),
    /// Non-fatal error (decode failure, connect failure, send failure).
    Error(ConsoleError),
    /// Connection ended.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason or failure description.
        reason: String,
    },
    /// Reconnect scheduled.
    Reconnecting {
        /// Attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
}

/// Everything a link task needs besides its queues.
#[derive(Debug)]
pub struct LinkConfig<C> {
    /// Name used in log lines (`camera 1`, `control`).
    pub label: String,
    /// WebSocket URL.
    pub url: String,
    /// Wire codec.
    pub codec: C,
    /// Reconnect timing.
    pub policy: ReconnectPolicy,
    /// Observable state. The owner sets the final state after cancelling.
    pub state: Arc<SharedConnectionState>,
    /// Cancels the loop at any await point.
    pub cancel: CancellationToken,
}

impl<C> LinkConfig<C> {
    fn set_state(&self, state: ConnectionState) {
        self.state.set_unless_cancelled(state, &self.cancel);
    }
}

/// How a message loop ended.
enum LoopEnd {
    Cancelled,
    Closed {
        code: Option<u16>,
        reason: String,
        unsent: Option<ControlCommand>,
    },
}

/// Spawn the link task.
///
/// `emit` is never called after `cancel` fires.
pub fn spawn<C, F>(
    config: LinkConfig<C>,
    outbound_rx: mpsc::Receiver<ControlCommand>,
    fallback: Arc<dyn CommandFallback>,
    emit: F,
) -> JoinHandle<()>
where
    C: Codec,
    F: FnMut(LinkEvent<C::Inbound>) + Send + 'static,
{
    tokio::spawn(run_link(config, outbound_rx, fallback, emit))
}

async fn run_link<C, F>(
    config: LinkConfig<C>,
    mut outbound_rx: mpsc::Receiver<ControlCommand>,
    fallback: Arc<dyn CommandFallback>,
    mut emit_raw: F,
) where
    C: Codec,
    F: FnMut(LinkEvent<C::Inbound>) + Send + 'static,
{
    let cancel = config.cancel.clone();
    let mut emit = move |event: LinkEvent<C::Inbound>| {
        if !cancel.is_cancelled() {
            emit_raw(event);
        }
    };
    let mut attempt: u32 = 0;

    loop {
        if config.cancel.is_cancelled() {
            break;
        }

        config.set_state(ConnectionState::Connecting);
        emit(LinkEvent::Connecting);
        log::debug!("[{}] connecting to {}", config.label, config.url);

        let connected = tokio::select! {
            () = config.cancel.cancelled() => break,
            result = ws::connect(&config.url, config.policy.connect_timeout) => result,
        };

        let unsent = match connected {
            Ok((mut writer, mut reader)) => {
                log::info!("[{}] connected to {}", config.label, config.url);
                attempt = 0;
                config.set_state(ConnectionState::Open);
                emit(LinkEvent::Open);

                let end = run_message_loop(
                    &config,
                    &mut writer,
                    &mut reader,
                    &mut outbound_rx,
                    &mut emit,
                )
                .await;

                match end {
                    LoopEnd::Cancelled => {
                        if let Err(e) = writer.close().await {
                            log::debug!("[{}] close on cancel: {}", config.label, e);
                        }
                        break;
                    }
                    LoopEnd::Closed {
                        code,
                        reason,
                        unsent,
                    } => {
                        log::warn!(
                            "[{}] disconnected (code {:?}): {}",
                            config.label,
                            code,
                            reason
                        );
                        config.set_state(ConnectionState::Closed);
                        emit(LinkEvent::Closed { code, reason });
                        unsent
                    }
                }
            }
            Err(e) => {
                log::warn!("[{}] {}", config.label, e);
                config.set_state(ConnectionState::Closed);
                emit(LinkEvent::Error(e.clone()));
                emit(LinkEvent::Closed {
                    code: None,
                    reason: e.to_string(),
                });
                None
            }
        };

        let drained = tokio::select! {
            () = config.cancel.cancelled() => false,
            () = drain_to_fallback(&config.label, unsent, &mut outbound_rx, fallback.as_ref()) => true,
        };
        if !drained {
            break;
        }

        attempt = attempt.saturating_add(1);
        let delay = config.policy.delay_for(attempt);
        config.set_state(ConnectionState::Reconnecting { attempt, delay });
        emit(LinkEvent::Reconnecting { attempt, delay });

        log::info!(
            "[{}] reconnecting in {:.1}s (attempt {})",
            config.label,
            delay.as_secs_f32(),
            attempt
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = config.cancel.cancelled() => {
                log::debug!("[{}] cancelled during reconnect delay", config.label);
                break;
            }
        }
    }

    log::debug!("[{}] link task finished", config.label);
}

async fn run_message_loop<C, F>(
    config: &LinkConfig<C>,
    writer: &mut WsWriter,
    reader: &mut WsReader,
    outbound_rx: &mut mpsc::Receiver<ControlCommand>,
    emit: &mut F,
) -> LoopEnd
where
    C: Codec,
    F: FnMut(LinkEvent<C::Inbound>),
{
    loop {
        tokio::select! {
            () = config.cancel.cancelled() => return LoopEnd::Cancelled,

            command = outbound_rx.recv() => {
                let Some(command) = command else {
                    // Owner dropped its sender.
                    return LoopEnd::Cancelled;
                };
                match config.codec.encode(&command) {
                    Ok(text) => {
                        log::debug!("[{}] -> {}", config.label, command.name());
                        if let Err(e) = writer.send_text(text).await {
                            emit(LinkEvent::Error(e.clone()));
                            return LoopEnd::Closed {
                                code: None,
                                reason: e.to_string(),
                                unsent: Some(command),
                            };
                        }
                    }
                    Err(e) => {
                        log::warn!("[{}] not sending {}: {}", config.label, command.name(), e);
                        emit(LinkEvent::Error(e));
                    }
                }
            }

            message = reader.recv() => match message {
                Some(Ok(WsMessage::Text(text))) => handle_text(config, &text, emit),
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => handle_text(config, &text, emit),
                    Err(e) => emit(LinkEvent::Error(ConsoleError::Decode(format!(
                        "binary frame is not UTF-8: {e}"
                    )))),
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = writer.send_pong(data).await {
                        return LoopEnd::Closed { code: None, reason: e.to_string(), unsent: None };
                    }
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    return LoopEnd::Closed { code: Some(code), reason, unsent: None };
                }
                Some(Err(e)) => {
                    emit(LinkEvent::Error(e.clone()));
                    return LoopEnd::Closed { code: None, reason: e.to_string(), unsent: None };
                }
                None => {
                    return LoopEnd::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                        unsent: None,
                    };
                }
            },
        }
    }
}

fn handle_text<C, F>(config: &LinkConfig<C>, text: &str, emit: &mut F)
where
    C: Codec,
    F: FnMut(LinkEvent<C::Inbound>),
{
    match config.codec.decode(text) {
        Ok(Some(message)) => {
            log::trace!("[{}] <- {:?}", config.label, message);
            emit(LinkEvent::Message(message));
        }
        Ok(None) => {}
        Err(e) => {
            log::debug!("[{}] dropping malformed message: {}", config.label, e);
            emit(LinkEvent::Error(e));
        }
    }
}

/// Hand commands that never reached the socket to the fallback.
async fn drain_to_fallback(
    label: &str,
    unsent: Option<ControlCommand>,
    outbound_rx: &mut mpsc::Receiver<ControlCommand>,
    fallback: &dyn CommandFallback,
) {
    let queued = std::iter::from_fn(|| outbound_rx.try_recv().ok());
    let pending: Vec<ControlCommand> = unsent.into_iter().chain(queued).collect();

    for command in pending {
        log::info!("[{}] rerouting unsent {} to REST", label, command.name());
        if let Err(e) = fallback.deliver(&command).await {
            log::warn!("[{}] fallback for {} failed: {}", label, command.name(), e);
        }
    }
}
