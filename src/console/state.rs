//! Console state and reducer.
//!
//! [`ConsoleState`] is plain data owned by the console loop. The reducer
//! methods apply one inbound event and return the side effect the console
//! must perform on the pose store or frame sink, so the rules can be tested
//! without sockets.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::ConsoleError;
use crate::link::{ConnectionState, LinkEvent};
use crate::protocol::{
    CameraId, CameraMessage, CameraPose, CameraSettings, ControlEvent, Threshold,
};

/// Rig initialization state as last reported by the control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RigState {
    /// No `cameras_initialized_status` seen yet.
    #[default]
    Unknown,
    /// Cameras are up.
    Initialized,
    /// Cameras were released or failed to start.
    Disconnected,
}

/// Per-camera indicator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraIndicator {
    /// Session connection state.
    pub state: ConnectionState,
    /// Last error, cleared when the session opens.
    pub last_error: Option<String>,
    /// Marker detection as reported by the camera service.
    pub marker_detection: Option<bool>,
}

/// Pose store mutation requested by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum PoseUpdate {
    /// Replace with a complete set.
    Replace(Vec<CameraPose>),
    /// Drop every pose.
    Clear,
}

/// Frame sink work requested by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameWork {
    /// Decode and present a frame.
    Present(Bytes),
    /// Drop pending and in-flight decodes.
    Cancel,
}

/// Everything the console shows besides frames and poses.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleState {
    /// Rig status text.
    pub status: String,
    /// Rig initialization state.
    pub rig: RigState,
    /// Message that came with the last initialization status.
    pub rig_message: String,
    /// Rig-wide detection flag.
    pub detection_enabled: bool,
    /// Last requested exposure/gain.
    pub settings: CameraSettings,
    /// Last requested threshold.
    pub threshold: Threshold,
    /// Control channel state.
    pub control: ConnectionState,
    /// Per-camera indicators.
    pub cameras: BTreeMap<CameraId, CameraIndicator>,
    /// Latest marker coordinates, one list per camera.
    pub markers: Vec<Vec<[f64; 2]>>,
}

impl Default for ConsoleState {
    fn default() -> Self {
        Self {
            status: "Connecting...".to_string(),
            rig: RigState::Unknown,
            rig_message: String::new(),
            detection_enabled: false,
            settings: CameraSettings::default(),
            threshold: Threshold::default(),
            control: ConnectionState::Idle,
            cameras: BTreeMap::new(),
            markers: Vec::new(),
        }
    }
}

impl ConsoleState {
    /// Apply a control event.
    ///
    /// # Errors
    ///
    /// `StateConflict` for a pose update while the rig is disconnected.
    pub fn apply_control(&mut self, event: ControlEvent) -> Result<Option<PoseUpdate>, ConsoleError> {
        match event {
            ControlEvent::StatusUpdate(update) => {
                self.status = update.status;
                Ok(None)
            }
            ControlEvent::CamerasInitialized(init) => {
                log::info!(
                    "Cameras initialized: {} ({})",
                    init.success,
                    init.message
                );
                self.rig_message = init.message;
                if init.success {
                    self.rig = RigState::Initialized;
                    Ok(None)
                } else {
                    self.rig = RigState::Disconnected;
                    self.detection_enabled = false;
                    self.markers.clear();
                    Ok(Some(PoseUpdate::Clear))
                }
            }
            ControlEvent::CameraPoses(poses) => {
                if self.rig == RigState::Disconnected {
                    return Err(ConsoleError::StateConflict(format!(
                        "ignoring {} poses while cameras are disconnected",
                        poses.len()
                    )));
                }
                Ok(Some(PoseUpdate::Replace(poses)))
            }
            ControlEvent::MarkerData(data) => {
                self.markers = data.markers;
                Ok(None)
            }
        }
    }

    /// Apply a session event for a live session.
    pub fn apply_session(
        &mut self,
        camera_id: &CameraId,
        event: LinkEvent<CameraMessage>,
    ) -> Option<FrameWork> {
        let indicator = self.cameras.entry(camera_id.clone()).or_default();
        match event {
            LinkEvent::Connecting => {
                indicator.state = ConnectionState::Connecting;
                None
            }
            LinkEvent::Open => {
                indicator.state = ConnectionState::Open;
                indicator.last_error = None;
                None
            }
            LinkEvent::Error(e) => {
                indicator.last_error = Some(e.to_string());
                None
            }
            LinkEvent::Closed { .. } => {
                indicator.state = ConnectionState::Closed;
                Some(FrameWork::Cancel)
            }
            LinkEvent::Reconnecting { attempt, delay } => {
                indicator.state = ConnectionState::Reconnecting { attempt, delay };
                None
            }
            LinkEvent::Message(CameraMessage::Frame(frame)) => {
                if let Some(reported) = &frame.camera_id {
                    if reported != camera_id {
                        log::debug!(
                            "camera {} sent a frame tagged {}",
                            camera_id,
                            reported
                        );
                    }
                }
                Some(FrameWork::Present(frame.data))
            }
            LinkEvent::Message(CameraMessage::MarkerDetectionStatus { enabled }) => {
                indicator.marker_detection = Some(enabled);
                None
            }
        }
    }

    /// Track a camera. Keeps an existing indicator.
    pub fn track_camera(&mut self, camera_id: &CameraId) {
        self.cameras.entry(camera_id.clone()).or_default();
    }

    /// Stop tracking a camera.
    pub fn forget_camera(&mut self, camera_id: &CameraId) {
        self.cameras.remove(camera_id);
    }

    /// Whether the rig reported its cameras as initialized.
    pub fn cameras_initialized(&self) -> bool {
        self.rig == RigState::Initialized
    }
}
