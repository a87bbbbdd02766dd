//! Pose set → renderable frustum geometry.
//!
//! [`SceneProjector::project`] is a pure function. Rotations arrive as
//! degrees about X, Y and Z and are composed in the rig's Y-X-Z order:
//!
//! ```text
//! R = Ry(y) · Rx(x) · Rz(z)
//! ```
//!
//! The camera looks down its local +Z axis. The frustum apex sits at the
//! camera center and the base lies `depth` along +Z.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::protocol::{CameraId, CameraPose};

/// Frustum and body dimensions in scene units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumShape {
    /// Apex to base distance along +Z.
    pub depth: f64,
    /// Half extent of the base along local X.
    pub half_width: f64,
    /// Half extent of the base along local Y.
    pub half_height: f64,
    /// Camera body box (width, height, length).
    pub body: [f64; 3],
}

/// Apex at the camera center with a square base 0.8 ahead of it. Base
/// corners sit 0.4 off each axis, so they are `0.4 * sqrt(2)` from the view
/// axis. This is not the flat 4-segment diamond of radius 0.4 centered on the
/// camera that simpler viewers draw; such a renderer rotates the base 45° and
/// drops the apex offset itself.
impl Default for FrustumShape {
    fn default() -> Self {
        Self {
            depth: 0.8,
            half_width: 0.4,
            half_height: 0.4,
            body: [0.1, 0.1, 0.2],
        }
    }
}

/// One camera's frustum in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Camera this frustum represents.
    pub camera_id: CameraId,
    /// World orientation.
    pub orientation: UnitQuaternion<f64>,
    /// Camera center (apex).
    pub apex: Point3<f64>,
    /// Base corners, counter-clockwise seen from the apex.
    pub corners: [Point3<f64>; 4],
    /// Body box dimensions.
    pub body: [f64; 3],
}

impl Frustum {
    /// Viewing direction (rotated +Z).
    pub fn forward(&self) -> Vector3<f64> {
        self.orientation * Vector3::z()
    }

    /// Four apex-to-corner edges followed by the four base edges.
    pub fn edges(&self) -> [(Point3<f64>, Point3<f64>); 8] {
        let c = &self.corners;
        [
            (self.apex, c[0]),
            (self.apex, c[1]),
            (self.apex, c[2]),
            (self.apex, c[3]),
            (c[0], c[1]),
            (c[1], c[2]),
            (c[2], c[3]),
            (c[3], c[0]),
        ]
    }
}

/// Renderable scene derived from one pose revision.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    /// One frustum per pose, in pose order.
    pub frustums: Vec<Frustum>,
    /// PoseStore revision the scene was derived from.
    pub revision: u64,
}

impl Scene {
    /// Whether the scene has no cameras.
    pub fn is_empty(&self) -> bool {
        self.frustums.is_empty()
    }
}

/// Orientation from rotation degrees about X, Y, Z, composed as Ry·Rx·Rz.
pub fn orientation_from_degrees(rotation: [f64; 3]) -> UnitQuaternion<f64> {
    let [x, y, z] = rotation.map(f64::to_radians);
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), x);
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), y);
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), z);
    qy * qx * qz
}

/// Stateless pose → frustum projector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SceneProjector {
    shape: FrustumShape,
}

impl SceneProjector {
    /// Projector with custom frustum dimensions.
    pub fn new(shape: FrustumShape) -> Self {
        Self { shape }
    }

    /// Frustum dimensions.
    pub fn shape(&self) -> FrustumShape {
        self.shape
    }

    /// Project a pose set.
    pub fn project(&self, poses: &[CameraPose], revision: u64) -> Scene {
        Scene {
            frustums: poses.iter().map(|pose| self.frustum(pose)).collect(),
            revision,
        }
    }

    fn frustum(&self, pose: &CameraPose) -> Frustum {
        let orientation = orientation_from_degrees(pose.rotation);
        let apex = Point3::from(pose.position);
        let FrustumShape {
            depth,
            half_width: w,
            half_height: h,
            ..
        } = self.shape;

        let corners = [(-w, -h), (w, -h), (w, h), (-w, h)]
            .map(|(x, y)| apex + orientation * Vector3::new(x, y, depth));

        Frustum {
            camera_id: pose.camera_id.clone(),
            orientation,
            apex,
            corners,
            body: self.shape.body,
        }
    }
}
