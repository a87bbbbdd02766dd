//! REST client for the rig's HTTP API.
//!
//! This module provides [`RestClient`], which covers pattern movement,
//! marker detection and calibration, and the [`CommandFallback`] seam that
//! links use when a WebSocket is unavailable.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::constants::{
    self, CALIBRATE_PATH, CALIBRATION_STATUS_PATH, MARKER_DETECTION_TOGGLE_PATH,
    PATTERN_MOVE_PATH,
};
use crate::error::ConsoleError;
use crate::protocol::{ControlCommand, Direction};

/// Delivers a command when its WebSocket route is down.
#[async_trait]
pub trait CommandFallback: Send + Sync + std::fmt::Debug {
    /// Deliver one command.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::Transport` if the command has no fallback
    /// route or the request fails, `ConsoleError::Http` on a non-success
    /// response.
    async fn deliver(&self, command: &ControlCommand) -> Result<(), ConsoleError>;
}

/// Fallback that drops every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

#[async_trait]
impl CommandFallback for NoFallback {
    async fn deliver(&self, command: &ControlCommand) -> Result<(), ConsoleError> {
        Err(ConsoleError::Transport(format!(
            "no fallback configured for {}",
            command.name()
        )))
    }
}

/// Rotation and translation of one camera as solved by calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedPose {
    /// 3x3 rotation matrix, row-major.
    #[serde(rename = "R")]
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    #[serde(rename = "t")]
    pub translation: [f64; 3],
}

/// Result of a calibration request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalibrationOutcome {
    /// Whether the server solved the poses.
    pub success: bool,
    /// Server message, verbatim. Set on failure.
    #[serde(default)]
    pub message: Option<String>,
    /// Solved poses, on success.
    #[serde(default)]
    pub camera_poses: Option<Vec<CalibratedPose>>,
}

/// Calibration state held by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalibrationStatus {
    /// Whether a calibration has been solved.
    pub is_calibrated: bool,
    /// Poses from the last calibration.
    #[serde(default)]
    pub camera_poses: Option<Vec<CalibratedPose>>,
}

#[derive(Debug, Serialize)]
struct CalibrateRequest {
    frames: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Client for the rig's REST API.
///
/// Cheap to clone. Clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Creates a client for `base_url` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConsoleError> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a client with a pre-configured HTTP client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Move the calibration pattern.
    pub async fn move_pattern(&self, direction: Direction, amount: f64) -> Result<(), ConsoleError> {
        let response = self
            .client
            .post(self.url(PATTERN_MOVE_PATH))
            .query(&[
                ("direction", direction.as_str().to_string()),
                ("amount", amount.to_string()),
            ])
            .send()
            .await?;
        check_status(response).await?;
        log::debug!("REST move_pattern {} {}", direction, amount);
        Ok(())
    }

    /// Enable or disable marker detection.
    pub async fn toggle_marker_detection(&self, enable: bool) -> Result<(), ConsoleError> {
        let response = self
            .client
            .post(self.url(MARKER_DETECTION_TOGGLE_PATH))
            .query(&[("enable", enable)])
            .send()
            .await?;
        check_status(response).await?;
        log::debug!("REST toggle_marker_detection {}", enable);
        Ok(())
    }

    /// Submit JPEG frames for extrinsic calibration.
    ///
    /// A non-success response is not an error: its message is returned
    /// verbatim with `success == false`.
    pub async fn calibrate(&self, frames: &[Bytes]) -> Result<CalibrationOutcome, ConsoleError> {
        let body = CalibrateRequest {
            frames: frames.iter().map(|f| BASE64.encode(f)).collect(),
        };
        log::info!("Submitting {} frames for calibration", body.frames.len());

        let response = self
            .client
            .post(self.url(CALIBRATE_PATH))
            .json(&body)
            .send()
            .await?;

        match check_status(response).await {
            Ok(response) => Ok(response.json().await?),
            Err(ConsoleError::Http { status, message }) => {
                log::warn!("Calibration rejected ({}): {}", status, message);
                Ok(CalibrationOutcome {
                    success: false,
                    message: Some(message),
                    camera_poses: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the server's calibration state.
    pub async fn calibration_status(&self) -> Result<CalibrationStatus, ConsoleError> {
        let response = self
            .client
            .get(self.url(CALIBRATION_STATUS_PATH))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

/// Pass a success response through, turn anything else into
/// `ConsoleError::Http` carrying the server's `detail` or the raw body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ConsoleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.detail)
        .unwrap_or(text);
    Err(ConsoleError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl CommandFallback for RestClient {
    async fn deliver(&self, command: &ControlCommand) -> Result<(), ConsoleError> {
        match command {
            ControlCommand::MovePattern { direction, amount } => {
                self.move_pattern(*direction, *amount).await
            }
            ControlCommand::ToggleMarkerDetection { enable } => {
                self.toggle_marker_detection(*enable).await
            }
            // Detection is rig-wide, so the marker-detection toggle covers it.
            ControlCommand::ToggleDetection { value } => self.toggle_marker_detection(*value).await,
            other => Err(ConsoleError::Transport(format!(
                "no REST route for {}",
                other.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_move_pattern_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATTERN_MOVE_PATH))
            .and(query_param("direction", "up"))
            .and(query_param("amount", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri()).unwrap();
        client.move_pattern(Direction::Up, 10.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_detection_falls_back_to_marker_toggle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MARKER_DETECTION_TOGGLE_PATH))
            .and(query_param("enable", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri()).unwrap();
        client
            .deliver(&ControlCommand::ToggleDetection { value: true })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_commands_without_route_are_transport_errors() {
        let client = RestClient::new("http://127.0.0.1:1").unwrap();
        let err = client
            .deliver(&ControlCommand::InitializeCameras)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConsoleError::Transport("no REST route for initialize_cameras".to_string())
        );
    }

    #[tokio::test]
    async fn test_calibrate_surfaces_detail_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CALIBRATE_PATH))
            .and(body_json(serde_json::json!({ "frames": ["/9j/", "/9j/"] })))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "detail": "Error calibrating cameras: Not enough matches found"
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri()).unwrap();
        let frames = [
            Bytes::from_static(&[0xff, 0xd8, 0xff]),
            Bytes::from_static(&[0xff, 0xd8, 0xff]),
        ];
        let outcome = client.calibrate(&frames).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Error calibrating cameras: Not enough matches found")
        );
    }

    #[tokio::test]
    async fn test_calibrate_success_parses_poses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CALIBRATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "camera_poses": [
                    {"R": [[1,0,0],[0,1,0],[0,0,1]], "t": [0,0,0]},
                    {"R": [[0,0,1],[0,1,0],[-1,0,0]], "t": [1.5,0,0.2]}
                ]
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri()).unwrap();
        let outcome = client.calibrate(&[Bytes::from_static(b"a")]).await.unwrap();
        assert!(outcome.success);
        let poses = outcome.camera_poses.unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[1].translation, [1.5, 0.0, 0.2]);
    }

    #[tokio::test]
    async fn test_calibration_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CALIBRATION_STATUS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_calibrated": false,
                "camera_poses": null
            })))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri()).unwrap();
        let status = client.calibration_status().await.unwrap();
        assert!(!status.is_calibrated);
        assert_eq!(status.camera_poses, None);
    }

    #[tokio::test]
    async fn test_http_error_without_detail_uses_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATTERN_MOVE_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("pattern offline"))
            .mount(&server)
            .await;

        let client = RestClient::new(server.uri()).unwrap();
        let err = client.move_pattern(Direction::Left, 1.0).await.unwrap_err();
        assert_eq!(
            err,
            ConsoleError::Http {
                status: 503,
                message: "pattern offline".to_string()
            }
        );
    }
}
