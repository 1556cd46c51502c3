//! Scripted plugin double for unit tests
//!
//! Answers every call from in-memory state, lays counted fetches out in the
//! native format, and records what the engine sent.

use crate::codec::{decode_schema, EncodedSchema, SchemaInfo};
use crate::format::PixelFormat;
use crate::frame::{CameraData, FrameData, ImageDescriptor};
use crate::schema::Schema;
use crate::streams::{Clipping, EncodedStreams, StreamDescription};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_char, CStr, CString};
use std::mem::size_of;
use std::ptr;
use void_renderstream_sys::{ffi, string_from_ptr, GpuInterop, RenderStreamApi, RsErrorCode, StreamHandle};

/// A stream on the `camera` channel with a small host-memory frame
pub fn sample_stream(handle: StreamHandle, name: &str) -> StreamDescription {
    StreamDescription {
        handle,
        channel: "camera".to_string(),
        mapping_id: 1,
        viewpoint: 0,
        name: name.to_string(),
        width: 4,
        height: 4,
        format: PixelFormat::Bgra8,
        clipping: Clipping::default(),
        mapping_name: "Mapping".to_string(),
        fragment: 0,
    }
}

/// One successful `send_frame`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentFrame {
    pub handle: StreamHandle,
    pub frame_type: u32,
    pub t_tracked: f64,
    pub camera_handle: u64,
}

/// What the next `await_frame_data` returns
#[derive(Debug, Clone, Copy)]
pub enum AwaitResult {
    Frame(FrameData),
    Code(RsErrorCode),
}

struct PluginState {
    available: bool,
    calls: HashMap<&'static str, usize>,

    stored_schema: Option<EncodedSchema>,
    saved_schema: Option<Schema>,
    published_schema: Option<Schema>,

    stream_sets: VecDeque<Vec<StreamDescription>>,
    current_streams: Option<EncodedStreams>,
    get_streams_codes: VecDeque<RsErrorCode>,

    awaits: VecDeque<AwaitResult>,
    frame_parameters: Vec<f32>,
    frame_images: Vec<ImageDescriptor>,
    frame_texts: Vec<CString>,
    failing_images: Vec<i64>,
    camera: CameraData,

    send_codes: VecDeque<RsErrorCode>,
    sent: Vec<SentFrame>,
    fetched_images: Vec<i64>,
    released_images: usize,

    gpu_codes: HashMap<&'static str, RsErrorCode>,
    gpu_attempts: Vec<&'static str>,
    follower: Option<bool>,
    follower_frames: Vec<f64>,
    status_messages: Vec<String>,
    profiling: Vec<(String, f32)>,
    host_logs: Vec<String>,
}

/// In-memory [`RenderStreamApi`]
pub struct ScriptedPlugin {
    state: Mutex<PluginState>,
}

impl ScriptedPlugin {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PluginState {
                available: true,
                calls: HashMap::new(),
                stored_schema: None,
                saved_schema: None,
                published_schema: None,
                stream_sets: VecDeque::new(),
                current_streams: None,
                get_streams_codes: VecDeque::new(),
                awaits: VecDeque::new(),
                frame_parameters: Vec::new(),
                frame_images: Vec::new(),
                frame_texts: Vec::new(),
                failing_images: Vec::new(),
                camera: CameraData::default(),
                send_codes: VecDeque::new(),
                sent: Vec::new(),
                fetched_images: Vec::new(),
                released_images: 0,
                gpu_codes: HashMap::new(),
                gpu_attempts: Vec::new(),
                follower: None,
                follower_frames: Vec::new(),
                status_messages: Vec::new(),
                profiling: Vec::new(),
                host_logs: Vec::new(),
            }),
        }
    }

    /// A plugin whose library never loaded
    pub fn unavailable() -> Self {
        let plugin = Self::new();
        plugin.state.lock().available = false;
        plugin
    }

    /// Hash the plugin assigns to scene `index` on publish
    pub fn scene_hash(index: usize) -> u64 {
        0x5eed_0000 + index as u64
    }

    fn call(&self, name: &'static str) -> MutexGuard<'_, PluginState> {
        let mut state = self.state.lock();
        *state.calls.entry(name).or_insert(0) += 1;
        state
    }

    /// How many times an entry point was called
    pub fn calls(&self, name: &str) -> usize {
        self.state.lock().calls.get(name).copied().unwrap_or(0)
    }

    pub fn set_stored_schema(&self, schema: Schema) {
        let encoded = EncodedSchema::encode(&schema, &SchemaInfo::default()).unwrap();
        self.state.lock().stored_schema = Some(encoded);
    }

    pub fn saved_schema(&self) -> Option<Schema> {
        self.state.lock().saved_schema.clone()
    }

    pub fn published_schema(&self) -> Option<Schema> {
        self.state.lock().published_schema.clone()
    }

    /// Queue the set returned by the next stream fetch; the last set stays current
    pub fn push_streams(&self, streams: Vec<StreamDescription>) {
        self.state.lock().stream_sets.push_back(streams);
    }

    /// Codes returned by the next `get_streams` calls, before any layout
    pub fn script_get_streams(&self, codes: Vec<RsErrorCode>) {
        self.state.lock().get_streams_codes.extend(codes);
    }

    pub fn push_frame(&self, frame: FrameData) {
        self.state.lock().awaits.push_back(AwaitResult::Frame(frame));
    }

    pub fn push_await_code(&self, code: RsErrorCode) {
        self.state.lock().awaits.push_back(AwaitResult::Code(code));
    }

    pub fn set_frame_parameters(&self, values: Vec<f32>) {
        self.state.lock().frame_parameters = values;
    }

    pub fn set_frame_images(&self, images: Vec<ImageDescriptor>) {
        self.state.lock().frame_images = images;
    }

    pub fn set_frame_texts(&self, texts: Vec<String>) {
        self.state.lock().frame_texts = texts.into_iter().map(|text| CString::new(text).unwrap()).collect();
    }

    /// Image ids whose copy fails
    pub fn fail_images(&self, ids: Vec<i64>) {
        self.state.lock().failing_images = ids;
    }

    pub fn set_camera(&self, camera: CameraData) {
        self.state.lock().camera = camera;
    }

    pub fn script_send_frame(&self, codes: Vec<RsErrorCode>) {
        self.state.lock().send_codes.extend(codes);
    }

    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.state.lock().sent.clone()
    }

    pub fn fetched_images(&self) -> Vec<i64> {
        self.state.lock().fetched_images.clone()
    }

    pub fn released_images(&self) -> usize {
        self.state.lock().released_images
    }

    /// Result of initialising the named interop backend; others succeed
    pub fn set_gpu_result(&self, backend: &'static str, code: RsErrorCode) {
        self.state.lock().gpu_codes.insert(backend, code);
    }

    pub fn gpu_attempts(&self) -> Vec<&'static str> {
        self.state.lock().gpu_attempts.clone()
    }

    pub fn follower(&self) -> Option<bool> {
        self.state.lock().follower
    }

    pub fn follower_frames(&self) -> Vec<f64> {
        self.state.lock().follower_frames.clone()
    }

    pub fn status_messages(&self) -> Vec<String> {
        self.state.lock().status_messages.clone()
    }

    pub fn profiling(&self) -> Vec<(String, f32)> {
        self.state.lock().profiling.clone()
    }

    pub fn host_logs(&self) -> Vec<String> {
        self.state.lock().host_logs.clone()
    }
}

/// Copy a native header into a fetch buffer, or report the size it needs
fn write_header<T: Copy>(header: &T, buffer: &mut [u8], n_bytes: &mut u32) -> RsErrorCode {
    let needed = size_of::<T>();
    if buffer.len() < needed {
        *n_bytes = needed as u32;
        return RsErrorCode::BufferOverflow;
    }
    // Safety: length checked; the header is plain data
    unsafe { ptr::write_unaligned(buffer.as_mut_ptr() as *mut T, *header) };
    *n_bytes = needed as u32;
    RsErrorCode::Success
}

impl RenderStreamApi for ScriptedPlugin {
    fn is_available(&self) -> bool {
        self.state.lock().available
    }

    fn initialise_gpgpu(&self, interop: &GpuInterop) -> RsErrorCode {
        let mut state = self.call("initialise_gpgpu");
        state.gpu_attempts.push(interop.name());
        state.gpu_codes.get(interop.name()).copied().unwrap_or(RsErrorCode::Success)
    }

    fn use_dx12_shared_heap_flag(&self, flag: &mut u32) -> RsErrorCode {
        let _state = self.call("use_dx12_shared_heap_flag");
        *flag = ffi::DX12_USE_SHARED_HEAP_FLAG;
        RsErrorCode::Success
    }

    fn save_schema(&self, _asset_path: &CStr, schema: &mut ffi::Schema) -> RsErrorCode {
        let mut state = self.call("save_schema");
        // Safety: the engine passes a header it encoded
        match unsafe { decode_schema(schema) } {
            Ok(decoded) => {
                state.stored_schema = EncodedSchema::encode(&decoded, &SchemaInfo::default()).ok();
                state.saved_schema = Some(decoded);
                RsErrorCode::Success
            }
            Err(_) => RsErrorCode::IncorrectSchema,
        }
    }

    fn load_schema(&self, _asset_path: &CStr, buffer: &mut [u8], n_bytes: &mut u32) -> RsErrorCode {
        let state = self.call("load_schema");
        match &state.stored_schema {
            Some(encoded) => write_header(encoded.header(), buffer, n_bytes),
            None => RsErrorCode::NotFound,
        }
    }

    fn set_schema(&self, schema: &mut ffi::Schema) -> RsErrorCode {
        let mut state = self.call("set_schema");
        let scenes = schema.scenes;
        for i in 0..scenes.n_scenes as usize {
            // Safety: `scenes` points at `n_scenes` entries owned by the caller
            unsafe {
                let slot = scenes.scenes.add(i);
                let mut scene = ptr::read_unaligned(slot);
                scene.hash = Self::scene_hash(i);
                ptr::write_unaligned(slot, scene);
            }
        }
        // Safety: as above
        state.published_schema = unsafe { decode_schema(schema) }.ok();
        RsErrorCode::Success
    }

    fn get_streams(&self, buffer: &mut [u8], n_bytes: &mut u32) -> RsErrorCode {
        let mut state = self.call("get_streams");
        if buffer.is_empty() || state.current_streams.is_none() {
            let next = match state.stream_sets.pop_front() {
                Some(streams) => Some(streams),
                None if state.current_streams.is_none() => Some(Vec::new()),
                None => None,
            };
            if let Some(streams) = next {
                state.current_streams = Some(EncodedStreams::encode(&streams).unwrap());
            }
        }
        if let Some(code) = state.get_streams_codes.pop_front() {
            *n_bytes = size_of::<ffi::StreamDescriptions>() as u32;
            return code;
        }
        match &state.current_streams {
            Some(encoded) => write_header(encoded.header(), buffer, n_bytes),
            None => RsErrorCode::Unspecified,
        }
    }

    fn await_frame_data(&self, _timeout_ms: i32, data: &mut ffi::FrameData) -> RsErrorCode {
        let mut state = self.call("await_frame_data");
        match state.awaits.pop_front() {
            Some(AwaitResult::Frame(frame)) => {
                *data = frame.to_ffi();
                RsErrorCode::Success
            }
            Some(AwaitResult::Code(code)) => code,
            None => RsErrorCode::Timeout,
        }
    }

    fn set_follower(&self, follower: bool) -> RsErrorCode {
        self.call("set_follower").follower = Some(follower);
        RsErrorCode::Success
    }

    fn begin_follower_frame(&self, t_tracked: f64) -> RsErrorCode {
        self.call("begin_follower_frame").follower_frames.push(t_tracked);
        RsErrorCode::Success
    }

    fn get_frame_parameters(&self, _schema_hash: u64, out: &mut [f32]) -> RsErrorCode {
        let state = self.call("get_frame_parameters");
        for (slot, value) in out.iter_mut().zip(state.frame_parameters.iter().chain(std::iter::repeat(&0.0))) {
            *slot = *value;
        }
        RsErrorCode::Success
    }

    fn get_frame_image_data(&self, _schema_hash: u64, out: &mut [ffi::ImageFrameData]) -> RsErrorCode {
        let state = self.call("get_frame_image_data");
        for (slot, image) in out.iter_mut().zip(&state.frame_images) {
            *slot = ffi::ImageFrameData {
                width: image.width,
                height: image.height,
                format: image.format.to_raw(),
                image_id: image.image_id,
            };
        }
        RsErrorCode::Success
    }

    fn get_frame_image(&self, image_id: i64, _frame: &ffi::SenderFrame) -> RsErrorCode {
        let mut state = self.call("get_frame_image");
        if state.failing_images.contains(&image_id) {
            return RsErrorCode::InvalidHandle;
        }
        state.fetched_images.push(image_id);
        RsErrorCode::Success
    }

    fn get_frame_text(&self, _schema_hash: u64, index: u32, out: &mut *const c_char) -> RsErrorCode {
        let state = self.call("get_frame_text");
        match state.frame_texts.get(index as usize) {
            // The CString lives in the plugin state until texts are replaced
            Some(text) => {
                *out = text.as_ptr();
                RsErrorCode::Success
            }
            None => RsErrorCode::InvalidParameters,
        }
    }

    fn get_frame_camera(&self, stream: StreamHandle, out: &mut ffi::CameraData) -> RsErrorCode {
        let state = self.call("get_frame_camera");
        let mut camera = state.camera.to_ffi();
        camera.stream_handle = stream;
        *out = camera;
        RsErrorCode::Success
    }

    fn send_frame(
        &self,
        stream: StreamHandle,
        frame: &ffi::SenderFrame,
        response: &ffi::FrameResponseData,
    ) -> RsErrorCode {
        let mut state = self.call("send_frame");
        if let Some(code) = state.send_codes.pop_front() {
            if !code.is_success() {
                return code;
            }
        }
        let camera_data = response.camera_data;
        let (t_tracked, camera_handle) = if camera_data.is_null() {
            (0.0, 0)
        } else {
            // Safety: the sender pins the response for the duration of the call
            let data = unsafe { ptr::read_unaligned(camera_data) };
            let camera = data.camera;
            (data.t_tracked, camera.camera_handle)
        };
        state.sent.push(SentFrame {
            handle: stream,
            frame_type: frame.frame_type,
            t_tracked,
            camera_handle,
        });
        RsErrorCode::Success
    }

    fn release_image(&self, _frame: &ffi::SenderFrame) -> RsErrorCode {
        self.call("release_image").released_images += 1;
        RsErrorCode::Success
    }

    fn log_to_host(&self, message: &CStr) -> RsErrorCode {
        let mut state = self.call("log_to_host");
        state.host_logs.push(message.to_string_lossy().into_owned());
        RsErrorCode::Success
    }

    fn send_profiling_data(&self, entries: &[ffi::ProfilingEntry]) -> RsErrorCode {
        let mut state = self.call("send_profiling_data");
        for entry in entries {
            let name = entry.name;
            // Safety: names are NUL-terminated strings owned by the caller
            let name = unsafe { string_from_ptr(name) };
            state.profiling.push((name, entry.value));
        }
        RsErrorCode::Success
    }

    fn set_new_status_message(&self, message: &CStr) -> RsErrorCode {
        let mut state = self.call("set_new_status_message");
        state.status_messages.push(message.to_string_lossy().into_owned());
        RsErrorCode::Success
    }

    fn shutdown(&self) -> RsErrorCode {
        self.call("shutdown").available = false;
        RsErrorCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata, Record};
    use std::sync::Arc;
    use void_renderstream_sys::{HostLogForwarder, NATIVE_TARGET};

    struct Discard;

    impl Log for Discard {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, _record: &Record) {}

        fn flush(&self) {}
    }

    fn emit(logger: &dyn Log, level: Level, target: &str, message: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("{}", message))
                .build(),
        );
    }

    #[test]
    fn test_forwarder_prefixes_and_skips_native() {
        let plugin = Arc::new(ScriptedPlugin::new());
        let forwarder = HostLogForwarder::new(Discard, plugin.clone());

        emit(&forwarder, Level::Error, "void_renderstream", "lost stream");
        emit(&forwarder, Level::Warn, "void_renderstream", "late frame");
        emit(&forwarder, Level::Info, NATIVE_TARGET, "plugin says hi");

        assert_eq!(
            plugin.host_logs(),
            vec!["!!!!! lost stream".to_string(), "!!! late frame".to_string()]
        );
    }

    #[test]
    fn test_forwarder_quiet_without_plugin() {
        let plugin = Arc::new(ScriptedPlugin::unavailable());
        let forwarder = HostLogForwarder::new(Discard, plugin.clone());

        emit(&forwarder, Level::Error, "void_renderstream", "no library");
        assert!(plugin.host_logs().is_empty());
    }
}
