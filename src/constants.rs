//! Application-wide constants for the rig console.
//!
//! This module centralizes all magic numbers and configuration constants
//! to improve maintainability and discoverability. Constants are grouped
//! by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Reconnection**: Retry intervals for camera sessions and the control channel
//! - **Queues**: Capacities of the in-process channels
//! - **Settings**: Ranges and defaults of operator-controlled camera settings
//! - **Endpoints**: Default URLs and REST/WebSocket paths

use std::ops::RangeInclusive;
use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for REST fallback and calibration calls.
///
/// Calibration uploads several base64 frames, so this is longer than a
/// typical command round trip.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time a WebSocket handshake may take before the attempt counts
/// as a failed connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period one-shot CLI commands give the control channel to open
/// before falling back to REST.
pub const CONTROL_OPEN_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// Reconnection
// ============================================================================

/// Default delay between a link closing and the next connect attempt.
///
/// Applies to camera sessions and the control channel. Retries are unbounded.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

// ============================================================================
// Queues
// ============================================================================

/// Capacity of each link's outbound command queue.
///
/// Commands that do not fit go straight to the REST fallback.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Frames a session may have queued for the console loop at once.
///
/// Further frames are dropped at the session until the console consumes
/// one. FrameSink keeps only the latest anyway.
pub const FRAME_BACKLOG: usize = 2;

// ============================================================================
// Settings
// ============================================================================

/// Valid exposure values (slider range on the rig).
pub const EXPOSURE_RANGE: RangeInclusive<i64> = 0..=255;

/// Valid gain values.
pub const GAIN_RANGE: RangeInclusive<i64> = 0..=63;

/// Valid dot-detection threshold values.
pub const THRESHOLD_RANGE: RangeInclusive<i64> = 0..=255;

/// Exposure the console assumes before the operator changes it.
pub const DEFAULT_EXPOSURE: u8 = 100;

/// Gain the console assumes before the operator changes it.
pub const DEFAULT_GAIN: u8 = 10;

/// Threshold the console assumes before the operator changes it.
pub const DEFAULT_THRESHOLD: u8 = 200;

/// Pattern movement step used by the direction buttons.
pub const DEFAULT_MOVE_AMOUNT: f64 = 10.0;

// ============================================================================
// Endpoints
// ============================================================================

/// Default base URL of the camera/REST service.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default URL of the control/status service.
pub const DEFAULT_CONTROL_URL: &str = "http://localhost:5000";

/// Per-camera WebSocket endpoint template, relative to the API URL.
pub const CAMERA_ENDPOINT_TEMPLATE: &str = "/ws/camera/{cameraId}";

/// Placeholder substituted with the camera id in endpoint templates.
pub const CAMERA_ID_PLACEHOLDER: &str = "{cameraId}";

/// REST path for pattern movement.
pub const PATTERN_MOVE_PATH: &str = "/api/camera/pattern/move";

/// REST path for marker detection toggling.
pub const MARKER_DETECTION_TOGGLE_PATH: &str = "/api/marker-detection/toggle";

/// REST path for calibration.
pub const CALIBRATE_PATH: &str = "/api/camera-calibration/calibrate";

/// REST path for calibration status.
pub const CALIBRATION_STATUS_PATH: &str = "/api/camera-calibration/status";
