//! Per-frame data received from the host

use crate::format::PixelFormat;
use serde::{Deserialize, Serialize};
use void_renderstream_sys::ffi;

/// Frame rate as a rational
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    /// Frames per second, 0 when the denominator is unset
    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

/// Frame flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameFlags(u32);

impl FrameFlags {
    pub const NONE: Self = Self(0);
    /// The host restarted playback; discard temporal state
    pub const RESET: Self = Self(ffi::FRAMEDATA_RESET);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Timing and scene selection for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameData {
    /// Tracking timestamp; echoed back with the rendered frame
    pub t_tracked: f64,
    pub local_time: f64,
    pub local_time_delta: f64,
    pub frame_rate: FrameRate,
    pub flags: FrameFlags,
    /// Index of the active scene in the schema
    pub scene: u32,
}

impl FrameData {
    pub fn is_reset(&self) -> bool {
        self.flags.contains(FrameFlags::RESET)
    }

    pub fn to_ffi(&self) -> ffi::FrameData {
        ffi::FrameData {
            t_tracked: self.t_tracked,
            local_time: self.local_time,
            local_time_delta: self.local_time_delta,
            frame_rate_numerator: self.frame_rate.numerator,
            frame_rate_denominator: self.frame_rate.denominator,
            flags: self.flags.bits(),
            scene: self.scene,
        }
    }
}

impl From<ffi::FrameData> for FrameData {
    fn from(raw: ffi::FrameData) -> Self {
        Self {
            t_tracked: raw.t_tracked,
            local_time: raw.local_time,
            local_time_delta: raw.local_time_delta,
            frame_rate: FrameRate {
                numerator: raw.frame_rate_numerator,
                denominator: raw.frame_rate_denominator,
            },
            flags: FrameFlags::from_bits(raw.flags),
            scene: raw.scene,
        }
    }
}

/// Tracked camera for one stream
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraData {
    pub stream_handle: u64,
    /// Zero when the stream has no tracked camera
    pub camera_handle: u64,
    pub position: [f32; 3],
    /// Euler angles in degrees
    pub rotation: [f32; 3],
    /// Millimetres
    pub focal_length: f32,
    pub sensor_size: [f32; 2],
    pub lens_shift: [f32; 2],
    pub near_z: f32,
    pub far_z: f32,
    /// Orthographic when > 0
    pub ortho_width: f32,
    pub aperture: f32,
    pub focus_distance: f32,
    pub virtual_reprojection_required: bool,
}

impl CameraData {
    pub fn has_camera(&self) -> bool {
        self.camera_handle != 0
    }

    pub fn is_orthographic(&self) -> bool {
        self.ortho_width > 0.0
    }

    pub fn to_ffi(&self) -> ffi::CameraData {
        ffi::CameraData {
            stream_handle: self.stream_handle,
            camera_handle: self.camera_handle,
            x: self.position[0],
            y: self.position[1],
            z: self.position[2],
            rx: self.rotation[0],
            ry: self.rotation[1],
            rz: self.rotation[2],
            focal_length: self.focal_length,
            sensor_x: self.sensor_size[0],
            sensor_y: self.sensor_size[1],
            cx: self.lens_shift[0],
            cy: self.lens_shift[1],
            near_z: self.near_z,
            far_z: self.far_z,
            ortho_width: self.ortho_width,
            aperture: self.aperture,
            focus_distance: self.focus_distance,
            d3_tracking: ffi::D3TrackingData {
                virtual_reprojection_required: self.virtual_reprojection_required as u8,
            },
        }
    }
}

impl From<ffi::CameraData> for CameraData {
    fn from(raw: ffi::CameraData) -> Self {
        Self {
            stream_handle: raw.stream_handle,
            camera_handle: raw.camera_handle,
            position: [raw.x, raw.y, raw.z],
            rotation: [raw.rx, raw.ry, raw.rz],
            focal_length: raw.focal_length,
            sensor_size: [raw.sensor_x, raw.sensor_y],
            lens_shift: [raw.cx, raw.cy],
            near_z: raw.near_z,
            far_z: raw.far_z,
            ortho_width: raw.ortho_width,
            aperture: raw.aperture,
            focus_distance: raw.focus_distance,
            virtual_reprojection_required: raw.d3_tracking.virtual_reprojection_required != 0,
        }
    }
}

/// An incoming image parameter for this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub image_id: i64,
}

impl From<ffi::ImageFrameData> for ImageDescriptor {
    fn from(raw: ffi::ImageFrameData) -> Self {
        Self {
            width: raw.width,
            height: raw.height,
            format: PixelFormat::from_raw(raw.format),
            image_id: raw.image_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_data_from_raw() {
        let raw = ffi::FrameData {
            t_tracked: 12.5,
            local_time: 3.0,
            local_time_delta: 0.02,
            frame_rate_numerator: 50,
            frame_rate_denominator: 1,
            flags: ffi::FRAMEDATA_RESET,
            scene: 2,
        };
        let frame = FrameData::from(raw);
        assert_eq!(frame.t_tracked, 12.5);
        assert_eq!(frame.frame_rate.as_f64(), 50.0);
        assert!(frame.is_reset());
        assert_eq!(frame.scene, 2);
        assert_eq!({ frame.to_ffi().scene }, 2);
    }

    #[test]
    fn test_frame_rate_zero_denominator() {
        assert_eq!(FrameRate::default().as_f64(), 0.0);
    }

    #[test]
    fn test_camera_data_conversion() {
        let camera = CameraData {
            stream_handle: 7,
            camera_handle: 3,
            position: [1.0, 2.0, 3.0],
            rotation: [10.0, 20.0, 30.0],
            focal_length: 35.0,
            sensor_size: [36.0, 24.0],
            lens_shift: [0.1, -0.1],
            near_z: 0.1,
            far_z: 1000.0,
            virtual_reprojection_required: true,
            ..Default::default()
        };
        let raw = camera.to_ffi();
        assert_eq!({ raw.sensor_y }, 24.0);
        assert_eq!(CameraData::from(raw), camera);
        assert!(camera.has_camera());
        assert!(!camera.is_orthographic());
    }
}
