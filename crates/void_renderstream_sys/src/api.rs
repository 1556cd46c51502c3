//! Capability interface over the plugin's entry points
//!
//! [`RenderStreamApi`] has one method per protocol operation. The loaded
//! [`FunctionTable`](crate::FunctionTable) forwards to the plugin, a disabled
//! one answers every call with `NotInitialised`, and tests substitute a
//! scripted implementation.

use crate::error::{RenderStreamError, Result, RsErrorCode};
use crate::ffi::{self, StreamHandle};
use std::ffi::{c_char, c_void, CStr};

/// GPU interop backends, tried as alternatives during session start
#[derive(Debug, Clone, Copy)]
pub enum GpuInterop {
    /// No GPU sharing; frames go through host memory
    WithoutInterop,
    Dx11Device {
        device: *mut c_void,
    },
    Dx11Resource {
        resource: *mut c_void,
    },
    Dx12 {
        device: *mut c_void,
        queue: *mut c_void,
    },
    OpenGl {
        gl_context: *mut c_void,
        device_context: *mut c_void,
    },
    Vulkan {
        device: *mut c_void,
    },
}

impl GpuInterop {
    /// Short backend name used in config and log lines
    pub fn name(&self) -> &'static str {
        match self {
            GpuInterop::WithoutInterop => "none",
            GpuInterop::Dx11Device { .. } => "dx11_device",
            GpuInterop::Dx11Resource { .. } => "dx11_resource",
            GpuInterop::Dx12 { .. } => "dx12",
            GpuInterop::OpenGl { .. } => "opengl",
            GpuInterop::Vulkan { .. } => "vulkan",
        }
    }
}

/// One method per plugin operation.
///
/// Buffers passed to counted fetches (`load_schema`, `get_streams`) may be
/// empty, which sends a null pointer and asks the plugin for the required
/// size in `n_bytes`.
pub trait RenderStreamApi: Send + Sync {
    /// Whether the plugin is loaded and version-checked
    fn is_available(&self) -> bool;

    fn initialise_gpgpu(&self, interop: &GpuInterop) -> RsErrorCode;

    fn use_dx12_shared_heap_flag(&self, flag: &mut u32) -> RsErrorCode;

    fn save_schema(&self, asset_path: &CStr, schema: &mut ffi::Schema) -> RsErrorCode;

    fn load_schema(&self, asset_path: &CStr, buffer: &mut [u8], n_bytes: &mut u32) -> RsErrorCode;

    /// Publish the schema; the plugin fills in every scene hash
    fn set_schema(&self, schema: &mut ffi::Schema) -> RsErrorCode;

    fn get_streams(&self, buffer: &mut [u8], n_bytes: &mut u32) -> RsErrorCode;

    fn await_frame_data(&self, timeout_ms: i32, data: &mut ffi::FrameData) -> RsErrorCode;

    fn set_follower(&self, follower: bool) -> RsErrorCode;

    fn begin_follower_frame(&self, t_tracked: f64) -> RsErrorCode;

    fn get_frame_parameters(&self, schema_hash: u64, out: &mut [f32]) -> RsErrorCode;

    fn get_frame_image_data(&self, schema_hash: u64, out: &mut [ffi::ImageFrameData]) -> RsErrorCode;

    /// Copy a remote image into the resource described by `frame`
    fn get_frame_image(&self, image_id: i64, frame: &ffi::SenderFrame) -> RsErrorCode;

    /// The returned pointer is only valid until the next `await_frame_data`
    fn get_frame_text(&self, schema_hash: u64, index: u32, out: &mut *const c_char) -> RsErrorCode;

    fn get_frame_camera(&self, stream: StreamHandle, out: &mut ffi::CameraData) -> RsErrorCode;

    fn send_frame(
        &self,
        stream: StreamHandle,
        frame: &ffi::SenderFrame,
        response: &ffi::FrameResponseData,
    ) -> RsErrorCode;

    fn release_image(&self, frame: &ffi::SenderFrame) -> RsErrorCode;

    fn log_to_host(&self, message: &CStr) -> RsErrorCode;

    fn send_profiling_data(&self, entries: &[ffi::ProfilingEntry]) -> RsErrorCode;

    fn set_new_status_message(&self, message: &CStr) -> RsErrorCode;

    /// Release the plugin; safe to call more than once
    fn shutdown(&self) -> RsErrorCode;

    /// Fetch one text parameter and copy it out before the next frame
    fn frame_text(&self, schema_hash: u64, index: u32) -> Result<String> {
        let mut text: *const c_char = std::ptr::null();
        self.get_frame_text(schema_hash, index, &mut text).into_result()?;
        if text.is_null() {
            return Ok(String::new());
        }
        // Safety: the plugin returned a NUL-terminated string that stays
        // valid until the next await; it is copied here.
        let text = unsafe { CStr::from_ptr(text) };
        Ok(text.to_string_lossy().into_owned())
    }
}

/// Copy a possibly-null C string into an owned `String`
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives
/// the call.
pub unsafe fn string_from_ptr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Convert a Rust string for the boundary, rejecting interior NULs
pub fn to_cstring(value: &str) -> Result<std::ffi::CString> {
    std::ffi::CString::new(value).map_err(|_| RenderStreamError::InvalidString(value.to_string()))
}
