//! Integration tests for the REST collaborator as seen through the console.
//!
//! The control channel is left unconnected (or points at a dead port), so
//! commands with a REST route must land on the mock server.

use bytes::Bytes;
use mocap_console::constants::{
    CALIBRATE_PATH, CALIBRATION_STATUS_PATH, MARKER_DETECTION_TOGGLE_PATH, PATTERN_MOVE_PATH,
};
use mocap_console::{CameraId, Config, Console, Delivery, Direction};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    Config {
        api_url: server.uri(),
        control_url: "http://127.0.0.1:1".to_string(),
        cameras: Vec::new(),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_move_pattern_without_session_uses_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATTERN_MOVE_PATH))
        .and(query_param("direction", "up"))
        .and(query_param("amount", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let console = Console::new(config_for(&server)).unwrap();
    assert_eq!(
        console.move_pattern(None, Direction::Up).await.unwrap(),
        Delivery::Fallback
    );
    // Unknown camera also falls through to REST.
    let unknown = CameraId::from("9");
    assert_eq!(
        console
            .move_pattern(Some(&unknown), Direction::Up)
            .await
            .unwrap(),
        Delivery::Fallback
    );
}

#[tokio::test]
async fn test_detection_toggle_falls_back_when_control_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MARKER_DETECTION_TOGGLE_PATH))
        .and(query_param("enable", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut console = Console::new(config_for(&server)).unwrap();
    assert_eq!(
        console.toggle_detection().await.unwrap(),
        Delivery::Fallback
    );
    assert!(console.state().detection_enabled);
}

#[tokio::test]
async fn test_rig_commands_without_rest_route_fail_with_transport() {
    let server = MockServer::start().await;
    let console = Console::new(config_for(&server)).unwrap();

    let err = console.initialize_cameras().await.unwrap_err();
    assert_eq!(err.kind(), "transport");
    assert!(err.to_string().contains("initialize_cameras"));
}

#[tokio::test]
async fn test_rest_error_carries_server_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATTERN_MOVE_PATH))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"detail": "Pattern motor offline"})),
        )
        .mount(&server)
        .await;

    let console = Console::new(config_for(&server)).unwrap();
    let err = console.move_pattern(None, Direction::Left).await.unwrap_err();
    assert_eq!(
        err,
        mocap_console::ConsoleError::Http {
            status: 503,
            message: "Pattern motor offline".to_string(),
        }
    );
}

#[tokio::test]
async fn test_calibration_failure_message_is_verbatim() {
    let server = MockServer::start().await;
    let detail = "Error calibrating cameras: not enough common points between camera 1 and 2";
    Mock::given(method("POST"))
        .and(path(CALIBRATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": detail})))
        .mount(&server)
        .await;

    let console = Console::new(config_for(&server)).unwrap();
    let outcome = console
        .calibrate(&[Bytes::from_static(b"a"), Bytes::from_static(b"b")])
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.message.as_deref(), Some(detail));
    assert!(outcome.camera_poses.is_none());
}

#[tokio::test]
async fn test_calibration_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CALIBRATION_STATUS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_calibrated": true,
            "camera_poses": [
                {"R": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], "t": [0.0, 0.0, 0.0]},
            ],
        })))
        .mount(&server)
        .await;

    let console = Console::new(config_for(&server)).unwrap();
    let status = console.calibration_status().await.unwrap();
    assert!(status.is_calibrated);
    assert_eq!(status.camera_poses.map(|poses| poses.len()), Some(1));
}

#[tokio::test]
async fn test_saved_config_drives_console() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATTERN_MOVE_PATH))
        .and(query_param("direction", "forward"))
        .and(query_param("amount", "2.5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config {
        move_amount: 2.5,
        ..config_for(&server)
    };
    config.save_to(dir.path()).unwrap();

    let loaded = Config::load_from(dir.path()).unwrap();
    assert_eq!(loaded, config);

    let console = Console::new(loaded).unwrap();
    console.move_pattern(None, Direction::Forward).await.unwrap();
}
