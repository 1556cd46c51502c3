//! Tracked camera conversion
//!
//! Turns the per-stream camera the host tracks into engine camera state: a
//! pose, a lens model and the off-centre projection for the stream's clip
//! region. Angles arrive in degrees, lengths in millimetres.

use crate::frame::CameraData;
use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

/// Lens model of the engine camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Field of view driven by the engine, in radians
    Perspective { vertical_fov: f32 },
    /// Sensor and focal length in millimetres
    Physical { sensor_size: Vec2, focal_length: f32 },
    /// Half the view height in world units
    Orthographic { size: f32 },
}

/// Engine camera state for one stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub rotation: Quat,
    pub near: f32,
    pub far: f32,
    /// Width over height of the stream's render target
    pub aspect: f32,
    pub projection: Projection,
    /// Applied when > 0
    pub aperture: f32,
    /// Applied when > 0
    pub focus_distance: f32,
    /// Clipped projection for the stream's region
    pub projection_matrix: Mat4,
}

impl CameraState {
    pub fn new(aspect: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            near: 0.3,
            far: 1000.0,
            aspect,
            projection: Projection::Perspective {
                vertical_fov: 60f32.to_radians(),
            },
            aperture: 0.0,
            focus_distance: 0.0,
            projection_matrix: Mat4::IDENTITY,
        }
    }

    /// Apply this frame's tracking, or recompute from the current state when
    /// no new camera arrived
    pub fn update(&mut self, tracked: Option<&CameraData>, sub_region: [f32; 4]) {
        let mut lens_shift = Vec2::ZERO;
        let camera_aspect = match tracked {
            Some(camera) => {
                let camera_aspect = camera.sensor_size[0] / camera.sensor_size[1];
                // Without a camera handle only the aspect is tracked
                if camera.has_camera() {
                    self.position = Vec3::from(camera.position);
                    self.rotation = tracked_rotation(camera.rotation);
                    self.near = camera.near_z;
                    self.far = camera.far_z;
                    self.aperture = camera.aperture;
                    self.focus_distance = camera.focus_distance;

                    if camera.is_orthographic() {
                        self.projection = Projection::Orthographic {
                            size: 0.5 * camera.ortho_width / camera_aspect,
                        };
                    } else {
                        self.projection = Projection::Physical {
                            sensor_size: Vec2::from(camera.sensor_size),
                            focal_length: camera.focal_length,
                        };
                        lens_shift = Vec2::new(-camera.lens_shift[0], camera.lens_shift[1]);
                    }
                }
                camera_aspect
            }
            // Undo the region's effect on the resolution aspect to get the whole image aspect
            None => self.aspect * (sub_region[3] / sub_region[2]),
        };

        self.projection_matrix = clipped_projection(
            self.projection,
            camera_aspect,
            self.near,
            self.far,
            sub_region,
            lens_shift,
        );
    }
}

/// Rotation for Euler degrees as the host reports them
pub fn tracked_rotation(rotation: [f32; 3]) -> Quat {
    let [rx, ry, rz] = rotation;
    Quat::from_euler(
        EulerRot::YXZ,
        ry.to_radians(),
        (-rx).to_radians(),
        (-rz).to_radians(),
    )
}

/// Width and height of the full image at unit distance (or in world units
/// for orthographic cameras)
pub fn image_extent(projection: Projection, aspect: f32) -> Vec2 {
    let height = match projection {
        Projection::Perspective { vertical_fov } => 2.0 * (0.5 * vertical_fov).tan(),
        Projection::Physical {
            sensor_size,
            focal_length,
        } => sensor_size.y / focal_length,
        Projection::Orthographic { size } => 2.0 * size,
    };
    Vec2::new(aspect * height, height)
}

/// Projection covering only `sub_region` (x, y, width, height, normalised,
/// y down) of the camera image, shifted by `lens_shift`
pub fn clipped_projection(
    projection: Projection,
    aspect: f32,
    near: f32,
    far: f32,
    sub_region: [f32; 4],
    lens_shift: Vec2,
) -> Mat4 {
    let [x, y, width, height] = sub_region;
    let extent = image_extent(projection, aspect);

    let left = (-0.5 + x) * extent.x;
    let right = (-0.5 + x + width) * extent.x;
    let top = (0.5 - y) * extent.y;
    let bottom = (0.5 - (y + height)) * extent.y;

    let base = match projection {
        Projection::Orthographic { .. } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        _ => perspective_off_center(left * near, right * near, bottom * near, top * near, near, far),
    };

    let shift = Mat4::from_translation(Vec3::new(-lens_shift.x / width, lens_shift.y / height, 0.0));
    shift * base
}

/// OpenGL-style off-centre perspective frustum
pub fn perspective_off_center(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let x = 2.0 * near / (right - left);
    let y = 2.0 * near / (top - bottom);
    let a = (right + left) / (right - left);
    let b = (top + bottom) / (top - bottom);
    let c = -(far + near) / (far - near);
    let d = -(2.0 * far * near) / (far - near);
    Mat4::from_cols_array(&[
        x, 0.0, 0.0, 0.0, //
        0.0, y, 0.0, 0.0, //
        a, b, c, -1.0, //
        0.0, 0.0, d, 0.0,
    ])
}
