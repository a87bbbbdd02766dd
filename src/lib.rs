//! MoCap Console - stream and state-sync core for a motion-capture rig.
//!
//! This crate keeps a live view of a multi-camera rig: per-camera frame
//! streams, the control/status channel, camera pose snapshots and the 3D
//! frustum scene derived from them.
//!
//! # Architecture
//!
//! The crate follows a single-owner event loop:
//!
//! - **Console** - Root orchestrator, owns state, runs the event loop
//! - **Link** - Reconnecting WebSocket task shared by sessions and control
//! - **SessionRegistry** - One [`ConnectionSession`] per camera
//! - **ControlChannel** - Rig-wide commands and status events
//! - **FrameSink** - Latest-wins background JPEG decode per camera
//! - **PoseStore** / **SceneProjector** - Pose snapshots and frustum geometry
//! - **RestClient** - HTTP fallback and calibration endpoints
//!
//! # Modules
//!
//! - [`protocol`] - Wire types and codecs
//! - [`link`] - Connection state and the reconnect loop
//! - [`console`] - Orchestrator and its state reducer
//! - [`config`] - Configuration loading/saving

// Library modules
pub mod console;
pub mod control;
pub mod frame_sink;
pub mod link;
pub mod pose_store;
pub mod protocol;
pub mod registry;
pub mod rest;
pub mod scene;
pub mod session;
pub mod ws;

pub mod config;
pub mod constants;
pub mod error;

// Re-export commonly used types
pub use config::Config;
pub use console::{Console, ConsoleEvent, ConsoleState};
pub use control::{ControlChannel, Subscription};
pub use error::ConsoleError;
pub use frame_sink::{FrameSink, JpegDecoder};
pub use link::{ConnectionState, LinkEvent, ReconnectPolicy};
pub use pose_store::PoseStore;
pub use protocol::{CameraId, CameraPose, ControlCommand, ControlEvent, Direction};
pub use registry::SessionRegistry;
pub use rest::{CommandFallback, RestClient};
pub use scene::{Scene, SceneProjector};
pub use session::{ConnectionSession, Delivery};
