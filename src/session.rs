//! Per-camera connection session.
//!
//! A [`ConnectionSession`] owns one camera's duplex link and its reconnect
//! state. It is a constructed value with explicit open and close: opening
//! spawns the link task, closing (or dropping) cancels it, including any
//! pending reconnect delay.
//!
//! Events are tagged with the camera id and a registry-unique session id so
//! the console can discard anything emitted by a superseded session.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::{FRAME_BACKLOG, OUTBOUND_QUEUE_CAPACITY};
use crate::error::ConsoleError;
use crate::link::{self, ConnectionState, LinkConfig, LinkEvent, ReconnectPolicy, SharedConnectionState};
use crate::protocol::{CameraCodec, CameraId, CameraMessage, ControlCommand};
use crate::rest::CommandFallback;

/// Registry-unique session identifier.
pub type SessionId = u64;

/// Link event tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Camera the session belongs to.
    pub camera_id: CameraId,
    /// Session that produced the event.
    pub session_id: SessionId,
    /// What happened.
    pub kind: LinkEvent<CameraMessage>,
}

/// Route a command took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the open WebSocket.
    Channel,
    /// Delivered through the REST fallback.
    Fallback,
}

/// Count of frames sitting in the session event queue.
#[derive(Debug)]
struct FrameBacklog {
    queued: AtomicUsize,
    limit: usize,
}

impl FrameBacklog {
    fn new(limit: usize) -> Self {
        Self {
            queued: AtomicUsize::new(0),
            limit,
        }
    }

    /// Reserve a slot. `false` when the backlog is full.
    fn try_admit(&self) -> bool {
        self.queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        // Already zero only if the console consumed a frame it never admitted.
        let _ = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// One camera's live duplex connection plus its reconnect state.
#[derive(Debug)]
pub struct ConnectionSession {
    camera_id: CameraId,
    session_id: SessionId,
    endpoint: String,
    state: Arc<SharedConnectionState>,
    outbound: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    fallback: Arc<dyn CommandFallback>,
    backlog: Arc<FrameBacklog>,
}

impl ConnectionSession {
    /// Open a session and start connecting to `endpoint`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        camera_id: CameraId,
        session_id: SessionId,
        endpoint: String,
        policy: ReconnectPolicy,
        fallback: Arc<dyn CommandFallback>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let state = SharedConnectionState::new();
        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let backlog = Arc::new(FrameBacklog::new(FRAME_BACKLOG));

        let tag = camera_id.clone();
        let gate = Arc::clone(&backlog);
        let task = link::spawn(
            LinkConfig {
                label: format!("camera {camera_id}"),
                url: endpoint.clone(),
                codec: CameraCodec,
                policy,
                state: Arc::clone(&state),
                cancel: cancel.clone(),
            },
            outbound_rx,
            Arc::clone(&fallback),
            move |kind| {
                if matches!(kind, LinkEvent::Message(CameraMessage::Frame(_))) && !gate.try_admit()
                {
                    log::trace!("camera {}: console behind, dropping frame", tag);
                    return;
                }
                // Receiver gone means the console is shutting down.
                let _ = events.send(SessionEvent {
                    camera_id: tag.clone(),
                    session_id,
                    kind,
                });
            },
        );

        log::info!("Opened session {} for camera {}", session_id, camera_id);

        Self {
            camera_id,
            session_id,
            endpoint,
            state,
            outbound,
            cancel,
            task,
            fallback,
            backlog,
        }
    }

    /// Camera this session serves.
    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    /// Registry-unique id of this session.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Resolved WebSocket URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether the link is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Mark one queued frame as taken by the console, making room for the
    /// next.
    pub fn frame_consumed(&self) {
        self.backlog.release();
    }

    /// Queue a command on the open link without falling back.
    ///
    /// # Errors
    ///
    /// `Protocol` for commands with no per-camera form, `Transport` when the
    /// link is not open or its queue is full or closed.
    pub fn try_send_channel(&self, command: ControlCommand) -> Result<(), ConsoleError> {
        if !command.is_camera_scoped() {
            return Err(ConsoleError::Protocol(format!(
                "{} has no per-camera form",
                command.name()
            )));
        }
        if self.cancel.is_cancelled() || !self.state.is_open() {
            return Err(ConsoleError::Transport(format!(
                "camera {} is {}",
                self.camera_id,
                self.state.get().label()
            )));
        }
        self.outbound.try_send(command).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "queue full",
                TrySendError::Closed(_) => "link stopped",
            };
            ConsoleError::Transport(format!("camera {}: {}", self.camera_id, reason))
        })
    }

    /// Send a command, degrading to the REST fallback when the link cannot
    /// take it.
    pub async fn send(&self, command: ControlCommand) -> Result<Delivery, ConsoleError> {
        match self.try_send_channel(command.clone()) {
            Ok(()) => Ok(Delivery::Channel),
            Err(ConsoleError::Transport(reason)) => {
                log::debug!("{}; sending {} via REST", reason, command.name());
                self.fallback.deliver(&command).await?;
                Ok(Delivery::Fallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Stop the session. Cancels the connection and any pending reconnect.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            log::info!(
                "Closing session {} for camera {}",
                self.session_id,
                self.camera_id
            );
            self.cancel.cancel();
            self.state.set(ConnectionState::Closed);
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the link task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::NoFallback;
    use std::time::Duration;

    fn unreachable_session() -> (ConnectionSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ConnectionSession::open(
            CameraId::from("1"),
            7,
            "ws://127.0.0.1:1/ws/camera/1".to_string(),
            ReconnectPolicy::fixed(Duration::from_secs(60))
                .with_connect_timeout(Duration::from_millis(200)),
            Arc::new(NoFallback),
            tx,
        );
        (session, rx)
    }

    #[test]
    fn test_frame_backlog_admits_up_to_limit() {
        let backlog = FrameBacklog::new(2);
        assert!(backlog.try_admit());
        assert!(backlog.try_admit());
        assert!(!backlog.try_admit());

        backlog.release();
        assert!(backlog.try_admit());
        assert!(!backlog.try_admit());

        backlog.release();
        backlog.release();
        backlog.release();
        assert_eq!(backlog.queued.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn test_events_are_tagged() {
        let (session, mut rx) = unreachable_session();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.camera_id, CameraId::from("1"));
        assert_eq!(event.session_id, 7);
        assert_eq!(session.session_id(), 7);
    }

    #[tokio::test]
    async fn test_send_while_not_open_uses_fallback() {
        let (session, _rx) = unreachable_session();
        // NoFallback rejects, which proves the fallback path was taken.
        let err = session
            .send(ControlCommand::ToggleMarkerDetection { enable: true })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("no fallback configured"));
    }

    #[tokio::test]
    async fn test_control_only_command_is_protocol_error() {
        let (session, _rx) = unreachable_session();
        let err = session
            .send(ControlCommand::InitializeCameras)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[tokio::test]
    async fn test_close_stops_pending_reconnect() {
        let (session, mut rx) = unreachable_session();
        loop {
            let event = rx.recv().await.unwrap();
            if matches!(event.kind, LinkEvent::Reconnecting { .. }) {
                break;
            }
        }
        session.close();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !session.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(session.is_closed());
        assert_eq!(session.state(), ConnectionState::Closed);
    }
}
