//! Pixel formats on the wire and their engine texture equivalents

use serde::{Deserialize, Serialize};
use void_renderstream_sys::ffi::pixel_format;

/// Pixel format as declared by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Invalid,
    Bgra8,
    Bgrx8,
    Rgba32f,
    Rgba16,
    Rgba8,
    Rgbx8,
}

/// Texture format on the engine side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Bgra32,
    Rgba32,
    RgbaFloat,
    ArgbFloat,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Bgra32 | Self::Rgba32 => 4,
            Self::RgbaFloat | Self::ArgbFloat => 16,
        }
    }
}

impl PixelFormat {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            pixel_format::BGRA8 => Self::Bgra8,
            pixel_format::BGRX8 => Self::Bgrx8,
            pixel_format::RGBA32F => Self::Rgba32f,
            pixel_format::RGBA16 => Self::Rgba16,
            pixel_format::RGBA8 => Self::Rgba8,
            pixel_format::RGBX8 => Self::Rgbx8,
            _ => Self::Invalid,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Invalid => pixel_format::INVALID,
            Self::Bgra8 => pixel_format::BGRA8,
            Self::Bgrx8 => pixel_format::BGRX8,
            Self::Rgba32f => pixel_format::RGBA32F,
            Self::Rgba16 => pixel_format::RGBA16,
            Self::Rgba8 => pixel_format::RGBA8,
            Self::Rgbx8 => pixel_format::RGBX8,
        }
    }

    /// Texture format for images received from the host.
    ///
    /// 8-bit formats map exactly; 16-bit and float widen to RGBA float.
    pub fn texture_format(self) -> TextureFormat {
        match self {
            Self::Bgra8 | Self::Bgrx8 => TextureFormat::Bgra32,
            Self::Rgba8 | Self::Rgbx8 => TextureFormat::Rgba32,
            Self::Rgba32f | Self::Rgba16 => TextureFormat::RgbaFloat,
            Self::Invalid => TextureFormat::Bgra32,
        }
    }

    /// Render targets are always float so any stream format can be converted from them
    pub fn render_texture_format(self) -> TextureFormat {
        TextureFormat::ArgbFloat
    }

    /// Wire size of one pixel
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Invalid => 0,
            Self::Bgra8 | Self::Bgrx8 | Self::Rgba8 | Self::Rgbx8 => 4,
            Self::Rgba16 => 8,
            Self::Rgba32f => 16,
        }
    }
}
