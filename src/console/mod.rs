//! Root orchestrator for the rig console.
//!
//! # Architecture
//!
//! ```text
//! Console (owns all mutable state, one task)
//!     ├── SessionRegistry ── ConnectionSession per camera ──┐
//!     ├── ControlChannel (cloneable handle) ────────────────┤ link tasks
//!     ├── FrameSink ── spawn_blocking decodes ──────────────┤
//!     ├── PoseStore (shared snapshot)                       │
//!     ├── SceneProjector                                    ▼
//!     ├── RestClient (CommandFallback)              ConsoleEvent queues
//!     └── ConsoleState                                      │
//!                                                           ▼
//!                                       run(): tokio::select! → handle_event
//! ```
//!
//! Background tasks only produce events. Every mutation happens in
//! [`Console::handle_event`] or an operator command, both on the task that
//! owns the console.

// Rust guideline compliant 2026-02

pub mod events;
pub mod state;

pub use events::ConsoleEvent;
pub use state::{CameraIndicator, ConsoleState, FrameWork, PoseUpdate, RigState};

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::control::{ControlChannel, ControlReceiver};
use crate::error::ConsoleError;
use crate::frame_sink::{DecodeOutcome, FrameDecoder, FrameSink, JpegDecoder, PresentedFrame};
use crate::link::{ConnectionState, LinkEvent};
use crate::pose_store::PoseStore;
use crate::protocol::{
    CameraId, CameraMessage, CameraSettings, ControlCommand, ControlEvent, Direction, Threshold,
};
use crate::registry::{SessionRegistry, SyncReport};
use crate::rest::{CalibrationOutcome, CalibrationStatus, CommandFallback, RestClient};
use crate::scene::{Scene, SceneProjector};
use crate::session::{Delivery, SessionEvent};

/// Stream and state-sync core of the rig console.
#[derive(Debug)]
pub struct Console {
    config: Config,
    endpoint_template: String,
    rest: Arc<RestClient>,
    registry: SessionRegistry,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    control: ControlChannel,
    control_rx: Option<ControlReceiver>,
    frames: FrameSink,
    decode_rx: mpsc::UnboundedReceiver<DecodeOutcome>,
    poses: PoseStore,
    projector: SceneProjector,
    state: ConsoleState,
}

impl Console {
    /// Build a console that decodes JPEG frames.
    ///
    /// Nothing connects until [`start`](Self::start).
    pub fn new(config: Config) -> Result<Self, ConsoleError> {
        Self::with_decoder(config, Arc::new(JpegDecoder))
    }

    /// Build a console with a custom frame decoder.
    pub fn with_decoder(
        config: Config,
        decoder: Arc<dyn FrameDecoder>,
    ) -> Result<Self, ConsoleError> {
        let rest = Arc::new(RestClient::new(config.api_url.clone())?);
        let fallback: Arc<dyn CommandFallback> = Arc::clone(&rest) as Arc<dyn CommandFallback>;
        let policy = config.reconnect_policy();

        let (registry, session_rx) = SessionRegistry::new(policy, Arc::clone(&fallback));
        let control = ControlChannel::new(&config.control_url, policy, fallback);
        let (frames, decode_rx) = FrameSink::new(decoder);

        Ok(Self {
            endpoint_template: config.camera_endpoint_template(),
            config,
            rest,
            registry,
            session_rx,
            control,
            control_rx: None,
            frames,
            decode_rx,
            poses: PoseStore::new(),
            projector: SceneProjector::default(),
            state: ConsoleState::default(),
        })
    }

    /// Connect the control channel and open a session per configured camera.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.control_rx = Some(self.control.connect());
        let cameras = self.config.cameras.clone();
        self.sync_cameras(&cameras);
        log::info!(
            "Console started: {} cameras, control at {}",
            self.registry.len(),
            self.control.url()
        );
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Console state.
    pub fn state(&self) -> &ConsoleState {
        &self.state
    }

    /// Configuration the console was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clone of the control channel handle, for panels.
    pub fn control(&self) -> ControlChannel {
        self.control.clone()
    }

    /// Clone of the pose store handle.
    pub fn poses(&self) -> PoseStore {
        self.poses.clone()
    }

    /// Camera sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Frame pipeline.
    pub fn frames(&self) -> &FrameSink {
        &self.frames
    }

    /// Frame currently shown for a camera.
    pub fn presented(&self, camera_id: &CameraId) -> Option<&PresentedFrame> {
        self.frames.presented(camera_id)
    }

    /// Live connection state of a camera's session.
    pub fn camera_state(&self, camera_id: &CameraId) -> Option<ConnectionState> {
        self.registry.state(camera_id)
    }

    /// Scene for the current pose set.
    pub fn scene(&self) -> Scene {
        let (poses, revision) = self.poses.snapshot();
        self.projector.project(&poses, revision)
    }

    // =========================================================================
    // Camera set
    // =========================================================================

    /// Open a session for a camera, if it has none.
    pub fn add_camera(&mut self, camera_id: &CameraId) {
        self.registry.ensure(camera_id, &self.endpoint_template);
        self.state.track_camera(camera_id);
    }

    /// Close a camera's session and forget its frames. Pending reconnects
    /// are cancelled.
    pub fn remove_camera(&mut self, camera_id: &CameraId) -> bool {
        let removed = self.registry.remove(camera_id);
        self.frames.remove(camera_id);
        self.state.forget_camera(camera_id);
        removed
    }

    /// Make the camera set exactly `camera_ids`.
    pub fn sync_cameras(&mut self, camera_ids: &[CameraId]) -> SyncReport {
        let report = self.registry.sync(camera_ids, &self.endpoint_template);
        for id in &report.removed {
            self.frames.remove(id);
            self.state.forget_camera(id);
        }
        for id in camera_ids {
            self.state.track_camera(id);
        }
        report
    }

    // =========================================================================
    // Operator commands
    // =========================================================================

    /// Move the calibration pattern, through `camera`'s session if given,
    /// otherwise over REST.
    pub async fn move_pattern(
        &self,
        camera: Option<&CameraId>,
        direction: Direction,
    ) -> Result<Delivery, ConsoleError> {
        let command = ControlCommand::move_pattern(direction, self.config.move_amount);
        match camera.and_then(|id| self.registry.get(id)) {
            Some(session) => session.send(command).await,
            None => {
                if let Some(id) = camera {
                    log::warn!("No session for camera {}, moving pattern via REST", id);
                }
                self.rest.deliver(&command).await?;
                Ok(Delivery::Fallback)
            }
        }
    }

    /// Flip rig-wide detection.
    pub async fn toggle_detection(&mut self) -> Result<Delivery, ConsoleError> {
        let enabled = !self.state.detection_enabled;
        self.set_detection(enabled).await
    }

    /// Turn rig-wide detection on or off.
    pub async fn set_detection(&mut self, enabled: bool) -> Result<Delivery, ConsoleError> {
        self.state.detection_enabled = enabled;
        self.control
            .emit(ControlCommand::ToggleDetection { value: enabled })
            .await
    }

    /// Update exposure and gain. Values are clamped to their ranges.
    pub async fn set_camera_settings(
        &mut self,
        exposure: i64,
        gain: i64,
    ) -> Result<Delivery, ConsoleError> {
        let settings = CameraSettings::clamped(exposure, gain);
        self.state.settings = settings;
        self.control
            .emit(ControlCommand::UpdateCameraSettings(settings))
            .await
    }

    /// Update the dot threshold. The value is clamped to its range.
    pub async fn set_threshold(&mut self, value: i64) -> Result<Delivery, ConsoleError> {
        let threshold = Threshold::clamped(value);
        self.state.threshold = threshold;
        self.control
            .emit(ControlCommand::UpdateThreshold(threshold))
            .await
    }

    /// Ask the rig to bring its cameras up.
    pub async fn initialize_cameras(&self) -> Result<Delivery, ConsoleError> {
        self.control.emit(ControlCommand::InitializeCameras).await
    }

    /// Ask the rig to release its cameras.
    pub async fn disconnect_cameras(&self) -> Result<Delivery, ConsoleError> {
        self.control.emit(ControlCommand::DisconnectCameras).await
    }

    /// Initialize or disconnect, depending on the reported rig state.
    pub async fn toggle_cameras(&self) -> Result<Delivery, ConsoleError> {
        if self.state.cameras_initialized() {
            self.disconnect_cameras().await
        } else {
            self.initialize_cameras().await
        }
    }

    /// Submit JPEG frames for calibration.
    pub async fn calibrate(&self, frames: &[Bytes]) -> Result<CalibrationOutcome, ConsoleError> {
        self.rest.calibrate(frames).await
    }

    /// Fetch the server's calibration state.
    pub async fn calibration_status(&self) -> Result<CalibrationStatus, ConsoleError> {
        self.rest.calibration_status().await
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Wait for the next background event.
    ///
    /// Returns `None` only if every producer is gone.
    pub async fn next_event(&mut self) -> Option<ConsoleEvent> {
        loop {
            let event = tokio::select! {
                Some(event) = self.session_rx.recv() => Some(ConsoleEvent::Session(event)),
                Some(outcome) = self.decode_rx.recv() => Some(ConsoleEvent::Decoded(outcome)),
                event = recv_control(self.control_rx.as_mut()) => event.map(ConsoleEvent::Control),
                else => return None,
            };
            match event {
                Some(event) => return Some(event),
                None => {
                    log::debug!("Control event stream ended");
                    self.control_rx = None;
                }
            }
        }
    }

    /// Apply one event.
    pub fn handle_event(&mut self, event: ConsoleEvent) {
        log::trace!("Handling {} event", event.kind());
        match event {
            ConsoleEvent::Session(event) => self.handle_session_event(event),
            ConsoleEvent::Control(event) => self.handle_control_event(event),
            ConsoleEvent::Decoded(outcome) => {
                self.frames.complete(outcome);
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        let SessionEvent {
            camera_id,
            session_id,
            kind,
        } = event;

        if !self.registry.is_current(&camera_id, session_id) {
            log::trace!(
                "Ignoring event from stale session {} (camera {})",
                session_id,
                camera_id
            );
            return;
        }

        if matches!(kind, LinkEvent::Message(CameraMessage::Frame(_))) {
            if let Some(session) = self.registry.get(&camera_id) {
                session.frame_consumed();
            }
        }

        match self.state.apply_session(&camera_id, kind) {
            Some(FrameWork::Present(data)) => self.frames.present(&camera_id, data),
            Some(FrameWork::Cancel) => self.frames.cancel(&camera_id),
            None => {}
        }
    }

    fn handle_control_event(&mut self, event: LinkEvent<ControlEvent>) {
        match event {
            LinkEvent::Connecting => {
                self.state.control = ConnectionState::Connecting;
            }
            LinkEvent::Open => {
                log::info!("Control channel open");
                self.state.control = ConnectionState::Open;
            }
            LinkEvent::Closed { .. } => {
                self.state.control = ConnectionState::Closed;
            }
            LinkEvent::Reconnecting { attempt, delay } => {
                self.state.control = ConnectionState::Reconnecting { attempt, delay };
            }
            LinkEvent::Error(e) => {
                log::warn!("Control channel: {}", e);
            }
            LinkEvent::Message(event) => {
                // Panels only see events the reducer accepted, after the
                // pose store reflects them.
                match self.state.apply_control(event.clone()) {
                    Ok(Some(PoseUpdate::Replace(poses))) => {
                        self.poses.replace(poses);
                    }
                    Ok(Some(PoseUpdate::Clear)) => {
                        self.poses.clear();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("{}", e);
                        return;
                    }
                }
                self.control.dispatch(&event);
            }
        }
    }

    /// Process one event. Returns `false` when there is nothing left to
    /// wait for.
    pub async fn step(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Run until `shutdown` resolves, then shut down.
    pub async fn run<S>(&mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        log::info!("Console event loop starting");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    log::info!("Shutdown requested");
                    break;
                }
                event = self.next_event() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        self.shutdown();
        log::info!("Console event loop exiting");
    }

    /// Close every session, disconnect the control channel and clear poses.
    pub fn shutdown(&mut self) {
        self.registry.close_all();
        self.control.disconnect();
        self.control_rx = None;
        self.poses.clear();
        self.state.control = ConnectionState::Closed;
    }
}

async fn recv_control(
    rx: Option<&mut ControlReceiver>,
) -> Option<LinkEvent<ControlEvent>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
