//! Shared control/status channel.
//!
//! [`ControlChannel`] is a cloneable handle over reference-counted inner
//! state. Panels and the console each hold a clone. There is one link to the
//! control endpoint and one handler per event name.
//!
//! # Handlers
//!
//! ```text
//! on("status_update", h1)  -> Subscription(id 1)
//! on("status_update", h2)  -> Subscription(id 2)   h1 replaced, never stacked
//! drop(Subscription id 1)  -> no-op, id 2 is current
//! drop(Subscription id 2)  -> handler removed
//! ```
//!
//! `dispatch` clones the handler out of the table and calls it after the
//! lock is released, so a handler may itself call `on`/`off`.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::OUTBOUND_QUEUE_CAPACITY;
use crate::error::ConsoleError;
use crate::link::{self, ConnectionState, LinkConfig, LinkEvent, ReconnectPolicy, SharedConnectionState};
use crate::protocol::{ControlCodec, ControlCommand, ControlEvent};
use crate::rest::CommandFallback;
use crate::session::Delivery;
use crate::ws::http_to_ws_scheme;

/// Event handler.
pub type ControlHandler = Arc<dyn Fn(&ControlEvent) + Send + Sync>;

/// Ordered stream of control link events.
pub type ControlReceiver = mpsc::UnboundedReceiver<LinkEvent<ControlEvent>>;

type HandlerId = u64;

#[derive(Default)]
struct HandlerTable {
    handlers: HashMap<String, (HandlerId, ControlHandler)>,
    next_id: HandlerId,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[derive(Debug)]
struct LinkHandle {
    outbound: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    url: String,
    policy: ReconnectPolicy,
    fallback: Arc<dyn CommandFallback>,
    state: Arc<SharedConnectionState>,
    handlers: Mutex<HandlerTable>,
    link: Mutex<Option<LinkHandle>>,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, HandlerTable> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn link(&self) -> MutexGuard<'_, Option<LinkHandle>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to the control channel.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    inner: Arc<Inner>,
}

impl ControlChannel {
    /// Create a disconnected channel for `url` (http(s) or ws(s)).
    pub fn new(
        url: impl AsRef<str>,
        policy: ReconnectPolicy,
        fallback: Arc<dyn CommandFallback>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: http_to_ws_scheme(url.as_ref()),
                policy,
                fallback,
                state: SharedConnectionState::new(),
                handlers: Mutex::new(HandlerTable::default()),
                link: Mutex::new(None),
            }),
        }
    }

    /// WebSocket URL of the control endpoint.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Start (or restart) the link. Returns the ordered event receiver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> ControlReceiver {
        let mut slot = self.inner.link();
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();

        let task = link::spawn(
            LinkConfig {
                label: "control".to_string(),
                url: self.inner.url.clone(),
                codec: ControlCodec,
                policy: self.inner.policy,
                state: Arc::clone(&self.inner.state),
                cancel: cancel.clone(),
            },
            outbound_rx,
            Arc::clone(&self.inner.fallback),
            move |event| {
                let _ = events_tx.send(event);
            },
        );

        *slot = Some(LinkHandle {
            outbound,
            cancel,
            task,
        });
        log::info!("Control channel connecting to {}", self.inner.url);
        events_rx
    }

    /// Stop the link. Handlers stay registered.
    pub fn disconnect(&self) {
        if let Some(link) = self.inner.link().take() {
            link.cancel.cancel();
            log::info!("Control channel disconnected");
        }
        self.inner.state.set(ConnectionState::Closed);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Whether the link is open.
    pub fn is_open(&self) -> bool {
        self.inner.state.is_open()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Whether the link task has exited (or was never started).
    pub fn is_finished(&self) -> bool {
        self.inner
            .link()
            .as_ref()
            .map_or(true, |link| link.task.is_finished())
    }

    /// Register the handler for `event`, replacing any previous one.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        let mut table = self.inner.table();
        table.next_id += 1;
        let id = table.next_id;
        if table
            .handlers
            .insert(event.to_string(), (id, Arc::new(handler)))
            .is_some()
        {
            log::debug!("Replaced handler for '{}'", event);
        }
        Subscription {
            channel: Arc::downgrade(&self.inner),
            event: event.to_string(),
            id,
            detached: false,
        }
    }

    /// Remove the handler for `event`. Returns whether one was registered.
    pub fn off(&self, event: &str) -> bool {
        self.inner.table().handlers.remove(event).is_some()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.table().handlers.len()
    }

    /// Invoke the handler for `event`. Returns whether one ran.
    pub fn dispatch(&self, event: &ControlEvent) -> bool {
        let handler = self
            .inner
            .table()
            .handlers
            .get(event.name())
            .map(|(_, handler)| Arc::clone(handler));

        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => {
                log::trace!("No handler for '{}'", event.name());
                false
            }
        }
    }

    /// Send a command, degrading to the REST fallback when the link is not
    /// open.
    pub async fn emit(&self, command: ControlCommand) -> Result<Delivery, ConsoleError> {
        let queued = if self.inner.state.is_open() {
            self.inner
                .link()
                .as_ref()
                .map(|link| link.outbound.try_send(command.clone()).is_ok())
                .unwrap_or(false)
        } else {
            false
        };

        if queued {
            log::debug!("Emitted {}", command.name());
            return Ok(Delivery::Channel);
        }

        log::debug!(
            "Control channel {}; sending {} via REST",
            self.state().label(),
            command.name()
        );
        match self.inner.fallback.deliver(&command).await {
            Ok(()) => Ok(Delivery::Fallback),
            Err(e) => {
                log::warn!("Could not deliver {}: {}", command.name(), e);
                Err(e)
            }
        }
    }
}

/// Registration guard returned by [`ControlChannel::on`].
///
/// Dropping it removes the handler, unless a newer registration for the
/// same event has replaced it.
#[derive(Debug)]
#[must_use = "dropping a Subscription removes its handler"]
pub struct Subscription {
    channel: Weak<Inner>,
    event: String,
    id: HandlerId,
    detached: bool,
}

impl Subscription {
    /// Event this subscription is for.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether this registration is still the active handler.
    pub fn is_current(&self) -> bool {
        self.channel.upgrade().is_some_and(|inner| {
            inner
                .table()
                .handlers
                .get(&self.event)
                .is_some_and(|(id, _)| *id == self.id)
        })
    }

    /// Keep the handler registered for the life of the channel.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        let Some(inner) = self.channel.upgrade() else {
            return;
        };
        let mut table = inner.table();
        if table
            .handlers
            .get(&self.event)
            .is_some_and(|(id, _)| *id == self.id)
        {
            table.handlers.remove(&self.event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StatusEvent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct RecordingFallback {
        delivered: Mutex<Vec<ControlCommand>>,
    }

    #[async_trait]
    impl CommandFallback for RecordingFallback {
        async fn deliver(&self, command: &ControlCommand) -> Result<(), ConsoleError> {
            self.delivered.lock().unwrap().push(command.clone());
            Ok(())
        }
    }

    fn channel() -> (ControlChannel, Arc<RecordingFallback>) {
        let fallback = Arc::new(RecordingFallback::default());
        let channel = ControlChannel::new(
            "http://127.0.0.1:1",
            ReconnectPolicy::default(),
            Arc::clone(&fallback) as Arc<dyn CommandFallback>,
        );
        (channel, fallback)
    }

    fn status(text: &str) -> ControlEvent {
        ControlEvent::StatusUpdate(StatusEvent {
            status: text.to_string(),
        })
    }

    #[test]
    fn test_url_scheme_converted() {
        let (channel, _) = channel();
        assert_eq!(channel.url(), "ws://127.0.0.1:1");
    }

    #[test]
    fn test_reregistering_replaces_handler() {
        let (channel, _) = channel();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        let sub1 = channel.on("status_update", move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&second);
        let sub2 = channel.on("status_update", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert!(channel.dispatch(&status("Cameras ready")));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(channel.handler_count(), 1);
        assert!(!sub1.is_current());
        assert!(sub2.is_current());
    }

    #[test]
    fn test_stale_subscription_drop_keeps_newer_handler() {
        let (channel, _) = channel();
        let sub1 = channel.on("status_update", |_| {});
        let sub2 = channel.on("status_update", |_| {});
        drop(sub1);
        assert_eq!(channel.handler_count(), 1);
        drop(sub2);
        assert_eq!(channel.handler_count(), 0);
    }

    #[test]
    fn test_mount_unmount_cycles_do_not_leak() {
        let (channel, _) = channel();
        for _ in 0..100 {
            let _sub = channel.on("camera_poses_update", |_| {});
        }
        assert_eq!(channel.handler_count(), 0);
    }

    #[test]
    fn test_handler_may_reregister_during_dispatch() {
        let (channel, _) = channel();
        let inner = channel.clone();
        channel
            .on("status_update", move |_| {
                inner.on("marker_data", |_| {}).detach();
                inner.off("status_update");
            })
            .detach();

        assert!(channel.dispatch(&status("x")));
        assert!(!channel.dispatch(&status("y")));
        assert_eq!(channel.handler_count(), 1);
    }

    #[tokio::test]
    async fn test_emit_while_disconnected_uses_fallback() {
        let (channel, fallback) = channel();
        let delivery = channel
            .emit(ControlCommand::ToggleDetection { value: true })
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Fallback);
        assert_eq!(
            *fallback.delivered.lock().unwrap(),
            vec![ControlCommand::ToggleDetection { value: true }]
        );
    }

    #[tokio::test]
    async fn test_disconnect_stops_link() {
        let (channel, _) = channel();
        let _rx = channel.connect();
        channel.disconnect();
        assert_eq!(channel.state(), ConnectionState::Closed);
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while !channel.is_finished() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
