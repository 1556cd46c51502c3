//! ABI types and function signatures for the RenderStream plugin
//!
//! Every struct mirrors the plugin header (version 2.0) with 4-byte packing,
//! so all of them are `#[repr(C, packed(4))]`. Fields of packed structs must
//! be copied out before use; never take a reference to one.

use std::ffi::{c_char, c_void};

/// ABI major version this crate speaks
pub const RENDER_STREAM_VERSION_MAJOR: i32 = 2;
/// ABI minor version this crate speaks
pub const RENDER_STREAM_VERSION_MINOR: i32 = 0;

/// Opaque stream handle issued by the host
pub type StreamHandle = u64;
/// Opaque camera handle; zero means "no tracked camera"
pub type CameraHandle = u64;

/// Logging callback registered with the plugin
pub type LoggerFn = extern "C" fn(message: *const c_char);

/// Implement `Default` as the all-zero value for plain C data
macro_rules! zeroed_default {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    // Safety: the type only holds numbers and raw pointers,
                    // for which all-zero bits are valid.
                    unsafe { std::mem::zeroed() }
                }
            }
        )*
    };
}

// ============================================================================
// Enumerations (passed as u32 on the wire)
// ============================================================================

/// Pixel formats understood by the plugin
pub mod pixel_format {
    pub const INVALID: u32 = 0;
    pub const BGRA8: u32 = 1;
    pub const BGRX8: u32 = 2;
    pub const RGBA32F: u32 = 3;
    pub const RGBA16: u32 = 4;
    pub const RGBA8: u32 = 5;
    pub const RGBX8: u32 = 6;
}

/// Sender frame backing types
pub mod frame_type {
    pub const HOST_MEMORY: u32 = 0;
    pub const DX11_TEXTURE: u32 = 1;
    pub const DX12_TEXTURE: u32 = 2;
    pub const OPENGL_TEXTURE: u32 = 3;
    pub const VULKAN_TEXTURE: u32 = 4;
    pub const UNKNOWN: u32 = 5;
}

/// Remote parameter type tags
pub mod parameter_type {
    pub const NUMBER: u32 = 0;
    pub const IMAGE: u32 = 1;
    /// 4x4 TR matrix
    pub const POSE: u32 = 2;
    /// 4x4 TRS matrix
    pub const TRANSFORM: u32 = 3;
    pub const TEXT: u32 = 4;
    pub const EVENT: u32 = 5;
    pub const SKELETON: u32 = 6;
}

/// DMX encodings
pub mod dmx_type {
    pub const DEFAULT: u32 = 0;
    pub const DMX_8: u32 = 1;
    pub const DMX_16_BE: u32 = 2;
}

/// Frame data flag bits
pub const FRAMEDATA_RESET: u32 = 1;

/// Remote parameter flag bits
pub const REMOTEPARAMETER_NO_SEQUENCE: u32 = 1;
pub const REMOTEPARAMETER_READ_ONLY: u32 = 2;

/// DX12 shared heap flag values
pub const DX12_USE_SHARED_HEAP_FLAG: u32 = 0;
pub const DX12_DO_NOT_USE_SHARED_HEAP_FLAG: u32 = 1;

// ============================================================================
// Frame exchange
// ============================================================================

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct D3TrackingData {
    pub virtual_reprojection_required: u8,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraData {
    pub stream_handle: StreamHandle,
    pub camera_handle: CameraHandle,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
    pub focal_length: f32,
    pub sensor_x: f32,
    pub sensor_y: f32,
    pub cx: f32,
    pub cy: f32,
    pub near_z: f32,
    pub far_z: f32,
    /// Orthographic when > 0
    pub ortho_width: f32,
    /// Applied when > 0
    pub aperture: f32,
    /// Applied when > 0
    pub focus_distance: f32,
    pub d3_tracking: D3TrackingData,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameData {
    pub t_tracked: f64,
    pub local_time: f64,
    pub local_time_delta: f64,
    pub frame_rate_numerator: u32,
    pub frame_rate_denominator: u32,
    pub flags: u32,
    pub scene: u32,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraResponseData {
    pub t_tracked: f64,
    pub camera: CameraData,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct FrameResponseData {
    pub camera_data: *const CameraResponseData,
    pub schema_hash: u64,
    pub parameter_data_size: u64,
    pub parameter_data: *const c_void,
    pub text_data_count: u32,
    pub text_data: *const *const c_char,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct HostMemoryData {
    pub data: *mut u8,
    pub stride: u32,
    pub format: u32,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct Dx11Data {
    pub resource: *mut c_void,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct Dx12Data {
    pub resource: *mut c_void,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct OpenGlData {
    pub texture: u32,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct VulkanData {
    pub memory: *mut c_void,
    pub size: u64,
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub wait_semaphore: *mut c_void,
    pub wait_semaphore_value: u64,
    pub signal_semaphore: *mut c_void,
    pub signal_semaphore_value: u64,
}

#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub union SenderFrameData {
    pub host: HostMemoryData,
    pub dx11: Dx11Data,
    pub dx12: Dx12Data,
    pub gl: OpenGlData,
    pub vk: VulkanData,
}

/// A frame buffer reference, tagged by `frame_type`
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct SenderFrame {
    pub frame_type: u32,
    pub data: SenderFrameData,
}

impl std::fmt::Debug for SenderFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderFrame")
            .field("frame_type", &{ self.frame_type })
            .finish_non_exhaustive()
    }
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameRegion {
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFrameData {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub image_id: i64,
}

// ============================================================================
// Streams
// ============================================================================

/// Normalised clip rectangle of a stream
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionClipping {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct StreamDescription {
    pub handle: StreamHandle,
    pub channel: *const c_char,
    pub mapping_id: u64,
    pub i_viewpoint: i32,
    pub name: *const c_char,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub clipping: ProjectionClipping,
    pub mapping_name: *const c_char,
    pub i_fragment: i32,
}

/// Counted header at the start of a `getStreams` buffer
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct StreamDescriptions {
    pub n_streams: u32,
    pub streams: *const StreamDescription,
}

// ============================================================================
// Schema
// ============================================================================

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericalDefaults {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default_value: f32,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct TextDefaults {
    pub default_value: *const c_char,
}

/// Numeric and text defaults share storage; the parameter type tag selects one
#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub union RemoteParameterTypeDefaults {
    pub number: NumericalDefaults,
    pub text: TextDefaults,
}

#[repr(C, packed(4))]
#[derive(Clone, Copy)]
pub struct RemoteParameter {
    pub group: *const c_char,
    pub display_name: *const c_char,
    pub key: *const c_char,
    pub parameter_type: u32,
    pub defaults: RemoteParameterTypeDefaults,
    pub n_options: u32,
    pub options: *const *const c_char,
    /// DMX channel offset, or -1 for auto
    pub dmx_offset: i32,
    pub dmx_type: u32,
    pub flags: u32,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct RemoteParameters {
    pub name: *const c_char,
    pub n_parameters: u32,
    pub parameters: *const RemoteParameter,
    pub hash: u64,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct Scenes {
    pub n_scenes: u32,
    pub scenes: *mut RemoteParameters,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct Channels {
    pub n_channels: u32,
    pub channels: *const *const c_char,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub engine_name: *const c_char,
    pub engine_version: *const c_char,
    pub plugin_version: *const c_char,
    pub info: *const c_char,
    pub channels: Channels,
    pub scenes: Scenes,
}

#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct ProfilingEntry {
    pub name: *const c_char,
    pub value: f32,
}

zeroed_default!(
    FrameResponseData,
    SenderFrame,
    StreamDescription,
    StreamDescriptions,
    RemoteParameter,
    RemoteParameters,
    Scenes,
    Channels,
    Schema,
);

// ============================================================================
// Entry point signatures
// ============================================================================

pub type RegisterLoggingFn = unsafe extern "C" fn(LoggerFn);
pub type UnregisterLoggingFn = unsafe extern "C" fn();

pub type InitialiseFn = unsafe extern "C" fn(major: i32, minor: i32) -> u32;
pub type InitialiseGpGpuWithoutInteropFn = unsafe extern "C" fn(device: *mut c_void) -> u32;
pub type InitialiseGpGpuWithDx11DeviceFn = unsafe extern "C" fn(device: *mut c_void) -> u32;
pub type InitialiseGpGpuWithDx11ResourceFn = unsafe extern "C" fn(resource: *mut c_void) -> u32;
pub type InitialiseGpGpuWithDx12DeviceAndQueueFn =
    unsafe extern "C" fn(device: *mut c_void, queue: *mut c_void) -> u32;
pub type InitialiseGpGpuWithOpenGlContextsFn =
    unsafe extern "C" fn(gl_context: *mut c_void, device_context: *mut c_void) -> u32;
pub type InitialiseGpGpuWithVulkanDeviceFn = unsafe extern "C" fn(device: *mut c_void) -> u32;
pub type ShutdownFn = unsafe extern "C" fn() -> u32;
pub type UseDx12SharedHeapFlagFn = unsafe extern "C" fn(flag: *mut u32) -> u32;

pub type SaveSchemaFn = unsafe extern "C" fn(asset_path: *const c_char, schema: *mut Schema) -> u32;
pub type LoadSchemaFn =
    unsafe extern "C" fn(asset_path: *const c_char, schema: *mut Schema, n_bytes: *mut u32) -> u32;
pub type SetSchemaFn = unsafe extern "C" fn(schema: *mut Schema) -> u32;
pub type GetStreamsFn =
    unsafe extern "C" fn(streams: *mut StreamDescriptions, n_bytes: *mut u32) -> u32;

pub type AwaitFrameDataFn = unsafe extern "C" fn(timeout_ms: i32, data: *mut FrameData) -> u32;
pub type SetFollowerFn = unsafe extern "C" fn(is_follower: i32) -> u32;
pub type BeginFollowerFrameFn = unsafe extern "C" fn(t_tracked: f64) -> u32;
pub type GetFrameParametersFn =
    unsafe extern "C" fn(schema_hash: u64, out: *mut c_void, out_size: u64) -> u32;
pub type GetFrameImageDataFn =
    unsafe extern "C" fn(schema_hash: u64, out: *mut ImageFrameData, out_count: u64) -> u32;
pub type GetFrameImageFn = unsafe extern "C" fn(image_id: i64, frame: *const SenderFrame) -> u32;
pub type GetFrameTextFn =
    unsafe extern "C" fn(schema_hash: u64, text_index: u32, out: *mut *const c_char) -> u32;
pub type GetFrameCameraFn =
    unsafe extern "C" fn(stream: StreamHandle, out: *mut CameraData) -> u32;
pub type SendFrameFn = unsafe extern "C" fn(
    stream: StreamHandle,
    frame: *const SenderFrame,
    response: *const FrameResponseData,
) -> u32;
pub type ReleaseImageFn = unsafe extern "C" fn(frame: *const SenderFrame) -> u32;

pub type LogToHostFn = unsafe extern "C" fn(message: *const c_char) -> u32;
pub type SendProfilingDataFn = unsafe extern "C" fn(entries: *const ProfilingEntry, count: i32) -> u32;
pub type SetNewStatusMessageFn = unsafe extern "C" fn(message: *const c_char) -> u32;
