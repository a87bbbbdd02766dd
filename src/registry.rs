//! Camera id → session registry.
//!
//! The registry is the only place sessions are created or destroyed, so no
//! two sessions can share a camera id. Removing a camera closes its session,
//! which cancels any pending reconnect, and drops it from the map: nothing
//! can resurrect it afterwards.
//!
//! Every session gets a fresh, monotonically increasing [`SessionId`]. The
//! console checks [`SessionRegistry::is_current`] before applying an event.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ConsoleError;
use crate::link::{ConnectionState, ReconnectPolicy};
use crate::protocol::{CameraId, ControlCommand};
use crate::rest::CommandFallback;
use crate::session::{ConnectionSession, SessionEvent, SessionId};
use crate::ws::camera_endpoint;

/// Outcome of a best-effort broadcast.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BroadcastReport {
    /// Cameras the command was queued for.
    pub delivered: Vec<CameraId>,
    /// Open cameras that could not take the command.
    pub failed: Vec<(CameraId, ConsoleError)>,
    /// Cameras that were not open.
    pub skipped: Vec<CameraId>,
}

/// Result of [`SessionRegistry::sync`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Cameras that got a new session.
    pub added: Vec<CameraId>,
    /// Cameras whose session was closed.
    pub removed: Vec<CameraId>,
}

/// Owns every camera session.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<CameraId, ConnectionSession>,
    next_session_id: SessionId,
    policy: ReconnectPolicy,
    fallback: Arc<dyn CommandFallback>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionRegistry {
    /// Create an empty registry and the receiver for all session events.
    pub fn new(
        policy: ReconnectPolicy,
        fallback: Arc<dyn CommandFallback>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions: BTreeMap::new(),
                next_session_id: 1,
                policy,
                fallback,
                events,
            },
            events_rx,
        )
    }

    /// Return the session for `camera_id`, opening one if needed.
    ///
    /// `endpoint_template` has its `{cameraId}` placeholder substituted.
    pub fn ensure(&mut self, camera_id: &CameraId, endpoint_template: &str) -> &ConnectionSession {
        if !self.sessions.contains_key(camera_id) {
            let session_id = self.next_session_id;
            self.next_session_id += 1;
            let session = ConnectionSession::open(
                camera_id.clone(),
                session_id,
                camera_endpoint(endpoint_template, camera_id),
                self.policy,
                Arc::clone(&self.fallback),
                self.events.clone(),
            );
            self.sessions.insert(camera_id.clone(), session);
        }
        &self.sessions[camera_id]
    }

    /// Close and discard the session for `camera_id`.
    ///
    /// Returns `false` if there was none.
    pub fn remove(&mut self, camera_id: &CameraId) -> bool {
        match self.sessions.remove(camera_id) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Make the session set exactly equal to `camera_ids`.
    pub fn sync(&mut self, camera_ids: &[CameraId], endpoint_template: &str) -> SyncReport {
        let mut report = SyncReport::default();

        let stale: Vec<CameraId> = self
            .sessions
            .keys()
            .filter(|id| !camera_ids.contains(id))
            .cloned()
            .collect();
        for id in stale {
            self.remove(&id);
            report.removed.push(id);
        }

        for id in camera_ids {
            if !self.sessions.contains_key(id) {
                self.ensure(id, endpoint_template);
                report.added.push(id.clone());
            }
        }

        report
    }

    /// Queue `command` on every open session.
    ///
    /// Best-effort: one session failing does not stop the others, and no
    /// REST fallback is attempted.
    pub fn broadcast(&self, command: &ControlCommand) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (id, session) in &self.sessions {
            if !session.is_open() {
                report.skipped.push(id.clone());
                continue;
            }
            match session.try_send_channel(command.clone()) {
                Ok(()) => report.delivered.push(id.clone()),
                Err(e) => {
                    log::warn!("Broadcast of {} to camera {} failed: {}", command.name(), id, e);
                    report.failed.push((id.clone(), e));
                }
            }
        }
        report
    }

    /// Session for `camera_id`.
    pub fn get(&self, camera_id: &CameraId) -> Option<&ConnectionSession> {
        self.sessions.get(camera_id)
    }

    /// Id of the live session for `camera_id`.
    pub fn session_id(&self, camera_id: &CameraId) -> Option<SessionId> {
        self.sessions.get(camera_id).map(ConnectionSession::session_id)
    }

    /// Whether `session_id` is the live session for `camera_id`.
    pub fn is_current(&self, camera_id: &CameraId, session_id: SessionId) -> bool {
        self.session_id(camera_id) == Some(session_id)
    }

    /// Connection state of `camera_id`'s session.
    pub fn state(&self, camera_id: &CameraId) -> Option<ConnectionState> {
        self.sessions.get(camera_id).map(ConnectionSession::state)
    }

    /// Registered cameras, sorted.
    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.sessions.keys().cloned().collect()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close and discard every session.
    pub fn close_all(&mut self) {
        for (_, session) in std::mem::take(&mut self.sessions) {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::NoFallback;
    use std::time::Duration;

    const TEMPLATE: &str = "ws://127.0.0.1:1/ws/camera/{cameraId}";

    fn registry() -> (SessionRegistry, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionRegistry::new(
            ReconnectPolicy::fixed(Duration::from_secs(60))
                .with_connect_timeout(Duration::from_millis(200)),
            Arc::new(NoFallback),
        )
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (mut registry, _rx) = registry();
        let id = CameraId::from("1");
        let first = registry.ensure(&id, TEMPLATE).session_id();
        let second = registry.ensure(&id, TEMPLATE).session_id();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&id).unwrap().endpoint(),
            "ws://127.0.0.1:1/ws/camera/1"
        );
    }

    #[tokio::test]
    async fn test_session_ids_are_never_reused() {
        let (mut registry, _rx) = registry();
        let id = CameraId::from("1");
        let first = registry.ensure(&id, TEMPLATE).session_id();
        assert!(registry.remove(&id));
        let second = registry.ensure(&id, TEMPLATE).session_id();
        assert!(second > first);
        assert!(!registry.is_current(&id, first));
        assert!(registry.is_current(&id, second));
    }

    #[tokio::test]
    async fn test_remove_unknown_camera() {
        let (mut registry, _rx) = registry();
        assert!(!registry.remove(&CameraId::from("9")));
    }

    #[tokio::test]
    async fn test_sync_adds_and_removes() {
        let (mut registry, _rx) = registry();
        registry.sync(&["1".into(), "2".into()], TEMPLATE);
        let report = registry.sync(&["2".into(), "3".into()], TEMPLATE);
        assert_eq!(report.added, vec![CameraId::from("3")]);
        assert_eq!(report.removed, vec![CameraId::from("1")]);
        assert_eq!(
            registry.camera_ids(),
            vec![CameraId::from("2"), CameraId::from("3")]
        );
    }

    #[tokio::test]
    async fn test_broadcast_skips_sessions_that_are_not_open() {
        let (mut registry, _rx) = registry();
        registry.sync(&["1".into(), "2".into()], TEMPLATE);
        let report = registry.broadcast(&ControlCommand::ToggleMarkerDetection { enable: true });
        assert!(report.delivered.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.skipped.len(), 2);
    }
}
