//! Wire types and codecs for the camera and control endpoints.
//!
//! # Camera endpoint (`/ws/camera/{cameraId}`)
//!
//! ```text
//! inbound   {"type":"frame","frame":"<base64 JPEG>","camera_id":"1","timestamp":null}
//!           {"type":"marker_detection_status","enabled":true}
//! outbound  {"type":"move_pattern","direction":"up","amount":10}
//!           {"type":"toggle_marker_detection","enable":true}
//! ```
//!
//! # Control endpoint
//!
//! Every text frame is an event envelope:
//!
//! ```text
//! {"event":"camera_poses_update","data":{"poses":[{"position":[1,0,0],"rotation":[0,90,0]}]}}
//! {"event":"initialize_cameras"}
//! ```
//!
//! Inbound messages are decoded defensively: the `type` (or `event`) field
//! selects the payload, unknown kinds decode to `Ok(None)` and malformed
//! payloads to [`ConsoleError::Decode`].
//!
//! Setting values are clamped when a [`ControlCommand`] is built, so an
//! out-of-range value can never reach the wire.

use std::collections::HashSet;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{
    DEFAULT_EXPOSURE, DEFAULT_GAIN, DEFAULT_MOVE_AMOUNT, DEFAULT_THRESHOLD, EXPOSURE_RANGE,
    GAIN_RANGE, THRESHOLD_RANGE,
};
use crate::error::ConsoleError;

// =============================================================================
// Identifiers
// =============================================================================

/// Stable identifier of one physical camera.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub String);

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CameraId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CameraId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for CameraId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Camera ids arrive as strings from the camera service and as integers from
/// the pose solver.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireId> for CameraId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(s) => Self(s),
            WireId::Number(n) => Self(n.to_string()),
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Pattern movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// +Y
    Up,
    /// -Y
    Down,
    /// -X
    Left,
    /// +X
    Right,
    /// +Z
    Forward,
    /// -Z
    Backward,
}

impl Direction {
    /// Every direction, in button order.
    pub const ALL: [Self; 6] = [
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::Forward,
        Self::Backward,
    ];

    /// Wire name of the direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                ConsoleError::Protocol(format!(
                    "invalid direction '{s}', use one of: up, down, left, right, forward, backward"
                ))
            })
    }
}

fn clamp_to_u8(value: i64, range: &std::ops::RangeInclusive<i64>) -> u8 {
    value.clamp(*range.start(), *range.end()) as u8
}

/// Exposure and gain, clamped to the rig's slider ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraSettings {
    exposure: u8,
    gain: u8,
}

impl CameraSettings {
    /// Clamp raw operator input into exposure ∈ [0,255] and gain ∈ [0,63].
    pub fn clamped(exposure: i64, gain: i64) -> Self {
        Self {
            exposure: clamp_to_u8(exposure, &EXPOSURE_RANGE),
            gain: clamp_to_u8(gain, &GAIN_RANGE),
        }
    }

    /// Exposure value.
    pub fn exposure(self) -> u8 {
        self.exposure
    }

    /// Gain value.
    pub fn gain(self) -> u8 {
        self.gain
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            exposure: DEFAULT_EXPOSURE,
            gain: DEFAULT_GAIN,
        }
    }
}

/// Dot-detection threshold, clamped to [0,255].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Threshold(u8);

impl Threshold {
    /// Clamp raw operator input into [0,255].
    pub fn clamped(value: i64) -> Self {
        Self(clamp_to_u8(value, &THRESHOLD_RANGE))
    }

    /// Threshold value.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

/// Operator command, routed to a camera session, the control channel or the
/// REST fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Move the calibration pattern.
    MovePattern {
        /// Movement direction.
        direction: Direction,
        /// Movement step.
        amount: f64,
    },
    /// Per-camera marker detection toggle.
    ToggleMarkerDetection {
        /// Whether detection should run.
        enable: bool,
    },
    /// Rig-wide detection toggle.
    ToggleDetection {
        /// Whether detection should run.
        value: bool,
    },
    /// Exposure/gain update.
    UpdateCameraSettings(CameraSettings),
    /// Threshold update.
    UpdateThreshold(Threshold),
    /// Ask the rig to bring the cameras up.
    InitializeCameras,
    /// Ask the rig to release the cameras.
    DisconnectCameras,
}

impl ControlCommand {
    /// Pattern movement. Non-finite amounts fall back to the default step.
    pub fn move_pattern(direction: Direction, amount: f64) -> Self {
        let amount = if amount.is_finite() {
            amount
        } else {
            DEFAULT_MOVE_AMOUNT
        };
        Self::MovePattern { direction, amount }
    }

    /// Settings update with exposure/gain clamped to their ranges.
    pub fn camera_settings(exposure: i64, gain: i64) -> Self {
        Self::UpdateCameraSettings(CameraSettings::clamped(exposure, gain))
    }

    /// Threshold update clamped to its range.
    pub fn threshold(value: i64) -> Self {
        Self::UpdateThreshold(Threshold::clamped(value))
    }

    /// Wire name (message `type` on camera links, `event` on the control link).
    pub fn name(&self) -> &'static str {
        match self {
            Self::MovePattern { .. } => "move_pattern",
            Self::ToggleMarkerDetection { .. } => "toggle_marker_detection",
            Self::ToggleDetection { .. } => "toggle_detection",
            Self::UpdateCameraSettings(_) => "update_camera_settings",
            Self::UpdateThreshold(_) => "update_threshold",
            Self::InitializeCameras => "initialize_cameras",
            Self::DisconnectCameras => "disconnect_cameras",
        }
    }

    /// Whether the command has a per-camera wire form.
    pub fn is_camera_scoped(&self) -> bool {
        matches!(
            self,
            Self::MovePattern { .. } | Self::ToggleMarkerDetection { .. }
        )
    }

    /// Event payload, `Value::Null` for commands without data.
    pub fn payload(&self) -> Value {
        match self {
            Self::MovePattern { direction, amount } => {
                json!({ "direction": direction, "amount": amount })
            }
            Self::ToggleMarkerDetection { enable } => json!({ "enable": enable }),
            Self::ToggleDetection { value } => json!({ "value": value }),
            Self::UpdateCameraSettings(settings) => {
                json!({ "exposure": settings.exposure, "gain": settings.gain })
            }
            Self::UpdateThreshold(threshold) => json!({ "value": threshold.0 }),
            Self::InitializeCameras | Self::DisconnectCameras => Value::Null,
        }
    }
}

// =============================================================================
// Camera endpoint
// =============================================================================

/// Frame payload with the base64 layer already removed.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// JPEG bytes.
    pub data: Bytes,
    /// Camera id echoed by the server, if any.
    pub camera_id: Option<CameraId>,
    /// Server capture timestamp, if any.
    pub timestamp: Option<f64>,
}

/// Decoded inbound message on a camera link.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraMessage {
    /// A new frame.
    Frame(EncodedFrame),
    /// Marker detection state reported by the camera service.
    MarkerDetectionStatus {
        /// Whether detection is running for this camera.
        enabled: bool,
    },
}

#[derive(Debug, Deserialize)]
struct FrameWire {
    frame: String,
    #[serde(default)]
    camera_id: Option<WireId>,
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarkerStatusWire {
    enabled: bool,
}

/// Decode one text frame from a camera endpoint.
pub fn decode_camera_message(text: &str) -> Result<Option<CameraMessage>, ConsoleError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(ConsoleError::Decode("camera message without type".into()));
    };

    match kind {
        "frame" => {
            let wire: FrameWire = serde_json::from_value(value)?;
            let data = BASE64
                .decode(wire.frame.as_bytes())
                .map_err(|e| ConsoleError::Decode(format!("frame is not base64: {e}")))?;
            Ok(Some(CameraMessage::Frame(EncodedFrame {
                data: Bytes::from(data),
                camera_id: wire.camera_id.map(CameraId::from),
                timestamp: wire.timestamp,
            })))
        }
        "marker_detection_status" => {
            let wire: MarkerStatusWire = serde_json::from_value(value)?;
            Ok(Some(CameraMessage::MarkerDetectionStatus {
                enabled: wire.enabled,
            }))
        }
        other => {
            log::debug!("Ignoring camera message of unknown type '{}'", other);
            Ok(None)
        }
    }
}

/// Encode a command for a camera endpoint.
pub fn encode_camera_command(command: &ControlCommand) -> Result<String, ConsoleError> {
    if !command.is_camera_scoped() {
        return Err(ConsoleError::Protocol(format!(
            "{} has no per-camera form",
            command.name()
        )));
    }
    let mut body = command.payload();
    if let Value::Object(ref mut map) = body {
        map.insert("type".to_string(), Value::from(command.name()));
    }
    Ok(body.to_string())
}

// =============================================================================
// Control endpoint
// =============================================================================

/// Event names on the control channel.
pub mod events {
    /// Rig status text.
    pub const STATUS_UPDATE: &str = "status_update";
    /// Camera initialization result.
    pub const CAMERAS_INITIALIZED_STATUS: &str = "cameras_initialized_status";
    /// Full pose set.
    pub const CAMERA_POSES_UPDATE: &str = "camera_poses_update";
    /// Detected marker coordinates per camera.
    pub const MARKER_DATA: &str = "marker_data";
}

/// `status_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusEvent {
    /// Human-readable rig status.
    pub status: String,
}

/// `cameras_initialized_status` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CamerasInitializedEvent {
    /// `false` resets detection and clears poses.
    pub success: bool,
    /// Server message.
    #[serde(default)]
    pub message: String,
}

/// `marker_data` payload: pixel coordinates per camera, in camera order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkerDataEvent {
    /// One list of `[x, y]` points per camera.
    pub markers: Vec<Vec<[f64; 2]>>,
}

/// A camera's pose in the reconstructed scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraPose {
    /// Camera this pose belongs to.
    pub camera_id: CameraId,
    /// World position.
    pub position: [f64; 3],
    /// Rotation in degrees about X, Y, Z, applied in Y-X-Z order.
    pub rotation: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct PoseWire {
    #[serde(default)]
    camera_id: Option<WireId>,
    position: [f64; 3],
    rotation: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct PosesWire {
    poses: Vec<PoseWire>,
}

/// Decoded inbound event on the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// `status_update`
    StatusUpdate(StatusEvent),
    /// `cameras_initialized_status`
    CamerasInitialized(CamerasInitializedEvent),
    /// `camera_poses_update`, already validated as a complete set.
    CameraPoses(Vec<CameraPose>),
    /// `marker_data`
    MarkerData(MarkerDataEvent),
}

impl ControlEvent {
    /// Event name this value was decoded from.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusUpdate(_) => events::STATUS_UPDATE,
            Self::CamerasInitialized(_) => events::CAMERAS_INITIALIZED_STATUS,
            Self::CameraPoses(_) => events::CAMERA_POSES_UPDATE,
            Self::MarkerData(_) => events::MARKER_DATA,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

/// Validate a pose set. Any bad pose rejects the whole set.
fn decode_poses(data: Value) -> Result<Vec<CameraPose>, ConsoleError> {
    let wire: PosesWire = serde_json::from_value(data)?;
    let mut seen = HashSet::with_capacity(wire.poses.len());
    let mut poses = Vec::with_capacity(wire.poses.len());

    for (index, pose) in wire.poses.into_iter().enumerate() {
        let camera_id = pose
            .camera_id
            .map_or_else(|| CameraId((index + 1).to_string()), CameraId::from);
        if pose
            .position
            .iter()
            .chain(pose.rotation.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ConsoleError::Decode(format!(
                "pose for camera {camera_id} has non-finite values"
            )));
        }
        if !seen.insert(camera_id.clone()) {
            return Err(ConsoleError::Decode(format!(
                "duplicate pose for camera {camera_id}"
            )));
        }
        poses.push(CameraPose {
            camera_id,
            position: pose.position,
            rotation: pose.rotation,
        });
    }

    Ok(poses)
}

/// Decode one text frame from the control endpoint.
pub fn decode_control_message(text: &str) -> Result<Option<ControlEvent>, ConsoleError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let event = match envelope.event.as_str() {
        events::STATUS_UPDATE => ControlEvent::StatusUpdate(serde_json::from_value(envelope.data)?),
        events::CAMERAS_INITIALIZED_STATUS => {
            ControlEvent::CamerasInitialized(serde_json::from_value(envelope.data)?)
        }
        events::CAMERA_POSES_UPDATE => ControlEvent::CameraPoses(decode_poses(envelope.data)?),
        events::MARKER_DATA => ControlEvent::MarkerData(serde_json::from_value(envelope.data)?),
        other => {
            log::debug!("Ignoring control event of unknown type '{}'", other);
            return Ok(None);
        }
    };
    Ok(Some(event))
}

/// Encode a command as a control event envelope.
pub fn encode_control_command(command: &ControlCommand) -> Result<String, ConsoleError> {
    let envelope = Envelope {
        event: command.name().to_string(),
        data: command.payload(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

// =============================================================================
// Codecs
// =============================================================================

/// Text framing for one kind of link.
///
/// Decoding runs inside the link task, off the console loop.
pub trait Codec: Send + Sync + 'static {
    /// Decoded inbound message type.
    type Inbound: Send + std::fmt::Debug + 'static;

    /// Encode an outbound command.
    fn encode(&self, command: &ControlCommand) -> Result<String, ConsoleError>;

    /// Decode an inbound text frame. `Ok(None)` means "unknown, ignore".
    fn decode(&self, text: &str) -> Result<Option<Self::Inbound>, ConsoleError>;
}

/// Codec for `/ws/camera/{cameraId}` links.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraCodec;

impl Codec for CameraCodec {
    type Inbound = CameraMessage;

    fn encode(&self, command: &ControlCommand) -> Result<String, ConsoleError> {
        encode_camera_command(command)
    }

    fn decode(&self, text: &str) -> Result<Option<CameraMessage>, ConsoleError> {
        decode_camera_message(text)
    }
}

/// Codec for the control link.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlCodec;

impl Codec for ControlCodec {
    type Inbound = ControlEvent;

    fn encode(&self, command: &ControlCommand) -> Result<String, ConsoleError> {
        encode_control_command(command)
    }

    fn decode(&self, text: &str) -> Result<Option<ControlEvent>, ConsoleError> {
        decode_control_message(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_clamped_before_transmission() {
        let cmd = ControlCommand::camera_settings(300, -5);
        let encoded = encode_control_command(&cmd).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["event"], "update_camera_settings");
        assert_eq!(value["data"]["exposure"], 255);
        assert_eq!(value["data"]["gain"], 0);
    }

    #[test]
    fn test_gain_upper_bound() {
        let settings = CameraSettings::clamped(128, 64);
        assert_eq!(settings.exposure(), 128);
        assert_eq!(settings.gain(), 63);
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(Threshold::clamped(-1).value(), 0);
        assert_eq!(Threshold::clamped(999).value(), 255);
        assert_eq!(Threshold::clamped(200).value(), 200);
    }

    #[test]
    fn test_move_pattern_non_finite_amount_uses_default() {
        let cmd = ControlCommand::move_pattern(Direction::Up, f64::NAN);
        assert_eq!(
            cmd,
            ControlCommand::MovePattern {
                direction: Direction::Up,
                amount: DEFAULT_MOVE_AMOUNT
            }
        );
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("BACKWARD".parse::<Direction>().unwrap(), Direction::Backward);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_encode_camera_move_pattern() {
        let cmd = ControlCommand::move_pattern(Direction::Left, 10.0);
        let value: Value = serde_json::from_str(&encode_camera_command(&cmd).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "move_pattern", "direction": "left", "amount": 10.0})
        );
    }

    #[test]
    fn test_encode_camera_rejects_control_only_command() {
        let err = encode_camera_command(&ControlCommand::InitializeCameras).unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn test_encode_control_command_without_data_omits_field() {
        let encoded = encode_control_command(&ControlCommand::InitializeCameras).unwrap();
        assert_eq!(encoded, r#"{"event":"initialize_cameras"}"#);
    }

    #[test]
    fn test_decode_frame_strips_base64() {
        let text = r#"{"type":"frame","camera_id":"1","frame":"/9j/AA==","timestamp":null}"#;
        let Some(CameraMessage::Frame(frame)) = decode_camera_message(text).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.data.as_ref(), &[0xff, 0xd8, 0xff, 0x00]);
        assert_eq!(frame.camera_id, Some(CameraId::from("1")));
        assert_eq!(frame.timestamp, None);
    }

    #[test]
    fn test_decode_frame_with_bad_base64_is_decode_error() {
        let err = decode_camera_message(r#"{"type":"frame","frame":"%%%"}"#).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_decode_unknown_camera_type_is_ignored() {
        assert_eq!(
            decode_camera_message(r#"{"type":"telemetry","fps":30}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_decode_camera_message_not_json() {
        assert!(decode_camera_message("not json").is_err());
        assert!(decode_camera_message(r#"{"frame":"AA=="}"#).is_err());
    }

    #[test]
    fn test_decode_marker_detection_status() {
        let msg = decode_camera_message(r#"{"type":"marker_detection_status","enabled":true}"#)
            .unwrap();
        assert_eq!(
            msg,
            Some(CameraMessage::MarkerDetectionStatus { enabled: true })
        );
    }

    #[test]
    fn test_decode_poses_assigns_index_ids() {
        let text = r#"{"event":"camera_poses_update","data":{"poses":[
            {"position":[1,0,0],"rotation":[0,90,0]},
            {"position":[0,2,0],"rotation":[0,0,0]}
        ]}}"#;
        let Some(ControlEvent::CameraPoses(poses)) = decode_control_message(text).unwrap() else {
            panic!("expected poses");
        };
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[0].camera_id, CameraId::from("1"));
        assert_eq!(poses[1].camera_id, CameraId::from("2"));
        assert_eq!(poses[0].rotation, [0.0, 90.0, 0.0]);
    }

    #[test]
    fn test_decode_poses_numeric_ids() {
        let text = r#"{"event":"camera_poses_update","data":{"poses":[
            {"camera_id":7,"position":[1,0,0],"rotation":[0,0,0]}
        ]}}"#;
        let Some(ControlEvent::CameraPoses(poses)) = decode_control_message(text).unwrap() else {
            panic!("expected poses");
        };
        assert_eq!(poses[0].camera_id, CameraId::from("7"));
    }

    #[test]
    fn test_decode_poses_rejects_partial_sets() {
        // Second pose is missing its rotation: whole update is rejected.
        let text = r#"{"event":"camera_poses_update","data":{"poses":[
            {"position":[1,0,0],"rotation":[0,90,0]},
            {"position":[0,2,0]}
        ]}}"#;
        assert!(decode_control_message(text).is_err());

        let short = r#"{"event":"camera_poses_update","data":{"poses":[
            {"position":[1,0],"rotation":[0,90,0]}
        ]}}"#;
        assert!(decode_control_message(short).is_err());
    }

    #[test]
    fn test_decode_poses_rejects_duplicate_ids() {
        let text = r#"{"event":"camera_poses_update","data":{"poses":[
            {"camera_id":"1","position":[1,0,0],"rotation":[0,0,0]},
            {"camera_id":"1","position":[0,2,0],"rotation":[0,0,0]}
        ]}}"#;
        assert!(decode_control_message(text).is_err());
    }

    #[test]
    fn test_decode_cameras_initialized_status() {
        let text = r#"{"event":"cameras_initialized_status","data":{"success":false,"message":"Cameras disconnected"}}"#;
        assert_eq!(
            decode_control_message(text).unwrap(),
            Some(ControlEvent::CamerasInitialized(CamerasInitializedEvent {
                success: false,
                message: "Cameras disconnected".to_string(),
            }))
        );
    }

    #[test]
    fn test_decode_marker_data() {
        let text = r#"{"event":"marker_data","data":{"markers":[[[10,20],[30,40]],[]]}}"#;
        let Some(ControlEvent::MarkerData(data)) = decode_control_message(text).unwrap() else {
            panic!("expected marker data");
        };
        assert_eq!(data.markers.len(), 2);
        assert_eq!(data.markers[0][1], [30.0, 40.0]);
    }

    #[test]
    fn test_decode_unknown_control_event_is_ignored() {
        assert_eq!(
            decode_control_message(r#"{"event":"video_feed","data":{"image":"AA=="}}"#).unwrap(),
            None
        );
    }
}
