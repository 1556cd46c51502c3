//! The plugin function table
//!
//! Loading never fails outright: a missing library, unresolved entry points
//! or a version mismatch leave the table [`disabled`](FunctionTable::is_available),
//! and every call then answers `NotInitialised`.

use crate::api::{GpuInterop, RenderStreamApi};
use crate::error::{RenderStreamError, Result, RsErrorCode};
use crate::ffi::{self, *};
use crate::locate::locate_library;
use crate::logging;
use libloading::Library;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::ffi::{c_char, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Declare the entry point table; `resolve` reports every missing symbol at once
macro_rules! function_table {
    ($( $field:ident : $ty:ty = $symbol:literal ),* $(,)?) => {
        #[derive(Clone, Copy)]
        pub(crate) struct EntryPoints {
            $( pub(crate) $field: $ty, )*
        }

        impl EntryPoints {
            /// Every symbol the plugin must export
            pub const SYMBOLS: &'static [&'static str] = &[$($symbol),*];

            fn resolve(library: &Library) -> Result<Self> {
                let mut missing = Vec::new();
                $(
                    // Safety: the signature matches the plugin header
                    let $field: Option<$ty> = unsafe {
                        library
                            .get::<$ty>(concat!($symbol, "\0").as_bytes())
                            .ok()
                            .map(|symbol| *symbol)
                    };
                    if $field.is_none() {
                        log::error!("Failed to load function \"{}\"", $symbol);
                        missing.push($symbol.to_string());
                    }
                )*
                match ($($field,)*) {
                    ($(Some($field),)*) => Ok(Self { $($field,)* }),
                    _ => {
                        log::error!("{} of {} entry points missing", missing.len(), Self::SYMBOLS.len());
                        Err(RenderStreamError::MissingSymbols(missing))
                    }
                }
            }
        }
    };
}

function_table! {
    register_logging: RegisterLoggingFn = "rs_registerLoggingFunc",
    register_error_logging: RegisterLoggingFn = "rs_registerErrorLoggingFunc",
    register_verbose_logging: RegisterLoggingFn = "rs_registerVerboseLoggingFunc",
    unregister_logging: UnregisterLoggingFn = "rs_unregisterLoggingFunc",
    unregister_error_logging: UnregisterLoggingFn = "rs_unregisterErrorLoggingFunc",
    unregister_verbose_logging: UnregisterLoggingFn = "rs_unregisterVerboseLoggingFunc",
    initialise: InitialiseFn = "rs_initialise",
    initialise_gpgpu_without_interop: InitialiseGpGpuWithoutInteropFn = "rs_initialiseGpGpuWithoutInterop",
    initialise_gpgpu_with_dx11_device: InitialiseGpGpuWithDx11DeviceFn = "rs_initialiseGpGpuWithDX11Device",
    initialise_gpgpu_with_dx11_resource: InitialiseGpGpuWithDx11ResourceFn = "rs_initialiseGpGpuWithDX11Resource",
    initialise_gpgpu_with_dx12: InitialiseGpGpuWithDx12DeviceAndQueueFn = "rs_initialiseGpGpuWithDX12DeviceAndQueue",
    initialise_gpgpu_with_opengl: InitialiseGpGpuWithOpenGlContextsFn = "rs_initialiseGpGpuWithOpenGlContexts",
    initialise_gpgpu_with_vulkan: InitialiseGpGpuWithVulkanDeviceFn = "rs_initialiseGpGpuWithVulkanDevice",
    shutdown: ShutdownFn = "rs_shutdown",
    use_dx12_shared_heap_flag: UseDx12SharedHeapFlagFn = "rs_useDX12SharedHeapFlag",
    save_schema: SaveSchemaFn = "rs_saveSchema",
    load_schema: LoadSchemaFn = "rs_loadSchema",
    set_schema: SetSchemaFn = "rs_setSchema",
    get_streams: GetStreamsFn = "rs_getStreams",
    await_frame_data: AwaitFrameDataFn = "rs_awaitFrameData",
    set_follower: SetFollowerFn = "rs_setFollower",
    begin_follower_frame: BeginFollowerFrameFn = "rs_beginFollowerFrame",
    get_frame_parameters: GetFrameParametersFn = "rs_getFrameParameters",
    get_frame_image_data: GetFrameImageDataFn = "rs_getFrameImageData",
    get_frame_image: GetFrameImageFn = "rs_getFrameImage2",
    get_frame_text: GetFrameTextFn = "rs_getFrameText",
    get_frame_camera: GetFrameCameraFn = "rs_getFrameCamera",
    send_frame: SendFrameFn = "rs_sendFrame2",
    release_image: ReleaseImageFn = "rs_releaseImage2",
    log_to_host: LogToHostFn = "rs_logToD3",
    send_profiling_data: SendProfilingDataFn = "rs_sendProfilingData",
    set_new_status_message: SetNewStatusMessageFn = "rs_setNewStatusMessage",
}

/// How to find and bring up the plugin
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Explicit library location; otherwise discovery runs
    pub library_path: Option<PathBuf>,
}

struct LoadedTable {
    entry: EntryPoints,
    path: PathBuf,
    _library: Library,
}

enum TableState {
    Loaded(LoadedTable),
    Disabled(RenderStreamError),
}

/// Process-wide plugin function table
pub struct FunctionTable {
    state: RwLock<TableState>,
}

// Safety: entry points are plain function pointers into a library that stays
// loaded while `state` holds it, and every call goes through the lock.
unsafe impl Send for FunctionTable {}
unsafe impl Sync for FunctionTable {}

static GLOBAL: OnceCell<Arc<FunctionTable>> = OnceCell::new();

impl FunctionTable {
    /// Locate, resolve and version-check the plugin
    pub fn load(options: &LoaderOptions) -> Self {
        match Self::try_load(options.library_path.as_deref()) {
            Ok(table) => {
                log::info!("Loaded RenderStream from {}", table.path.display());
                Self {
                    state: RwLock::new(TableState::Loaded(table)),
                }
            }
            Err(err) => {
                log::error!("RenderStream unavailable: {}", err);
                Self::disabled(err)
            }
        }
    }

    /// A table that answers every call with `NotInitialised`
    pub fn disabled(reason: RenderStreamError) -> Self {
        Self {
            state: RwLock::new(TableState::Disabled(reason)),
        }
    }

    /// The shared table, loading it on first use
    pub fn global_or_load(options: &LoaderOptions) -> Arc<Self> {
        GLOBAL
            .get_or_init(|| Arc::new(Self::load(options)))
            .clone()
    }

    /// The shared table if it has been loaded
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    /// Why the table is disabled, if it is
    pub fn disabled_reason(&self) -> Option<RenderStreamError> {
        match &*self.state.read() {
            TableState::Loaded(_) => None,
            TableState::Disabled(reason) => Some(reason.clone()),
        }
    }

    /// Path of the loaded library
    pub fn library_path(&self) -> Option<PathBuf> {
        match &*self.state.read() {
            TableState::Loaded(table) => Some(table.path.clone()),
            TableState::Disabled(_) => None,
        }
    }

    fn try_load(explicit: Option<&Path>) -> Result<LoadedTable> {
        let path = locate_library(explicit)?;

        // Safety: loading runs the plugin's initialisers; it is the library
        // this table is built for.
        let library = unsafe {
            Library::new(&path).map_err(|e| RenderStreamError::load_failed(&path, e.to_string()))?
        };

        let entry = EntryPoints::resolve(&library)?;

        // Safety: callbacks are `extern "C"` functions with 'static lifetime
        unsafe {
            (entry.register_logging)(logging::log_info);
            (entry.register_error_logging)(logging::log_error);
            (entry.register_verbose_logging)(logging::log_verbose);
        }

        // Safety: resolved entry point with matching signature
        let code = RsErrorCode::from_raw(unsafe {
            (entry.initialise)(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR)
        });
        match code {
            RsErrorCode::Success | RsErrorCode::AlreadyInitialised => {}
            code => {
                if code == RsErrorCode::IncompatibleVersion {
                    log::error!(
                        "Unsupported RenderStream library, expected version {}.{}",
                        RENDER_STREAM_VERSION_MAJOR,
                        RENDER_STREAM_VERSION_MINOR
                    );
                } else {
                    log::error!("Failed to initialise: {}", code);
                }
                // Safety: undo the registration above before unloading
                unsafe { Self::unregister_logging(&entry) };
                return Err(RenderStreamError::from(code));
            }
        }

        Ok(LoadedTable {
            entry,
            path,
            _library: library,
        })
    }

    unsafe fn unregister_logging(entry: &EntryPoints) {
        (entry.unregister_verbose_logging)();
        (entry.unregister_error_logging)();
        (entry.unregister_logging)();
    }

    fn call(&self, f: impl FnOnce(&EntryPoints) -> u32) -> RsErrorCode {
        match &*self.state.read() {
            TableState::Loaded(table) => RsErrorCode::from_raw(f(&table.entry)),
            TableState::Disabled(_) => RsErrorCode::NotInitialised,
        }
    }
}

fn buffer_ptr<T>(buffer: &mut [u8]) -> *mut T {
    if buffer.is_empty() {
        std::ptr::null_mut()
    } else {
        buffer.as_mut_ptr().cast()
    }
}

impl RenderStreamApi for FunctionTable {
    fn is_available(&self) -> bool {
        matches!(&*self.state.read(), TableState::Loaded(_))
    }

    fn initialise_gpgpu(&self, interop: &GpuInterop) -> RsErrorCode {
        let interop = *interop;
        // Safety (all arms): resolved entry points, handles supplied by the engine
        self.call(|entry| unsafe {
            match interop {
                GpuInterop::WithoutInterop => {
                    (entry.initialise_gpgpu_without_interop)(std::ptr::null_mut())
                }
                GpuInterop::Dx11Device { device } => (entry.initialise_gpgpu_with_dx11_device)(device),
                GpuInterop::Dx11Resource { resource } => {
                    (entry.initialise_gpgpu_with_dx11_resource)(resource)
                }
                GpuInterop::Dx12 { device, queue } => (entry.initialise_gpgpu_with_dx12)(device, queue),
                GpuInterop::OpenGl {
                    gl_context,
                    device_context,
                } => (entry.initialise_gpgpu_with_opengl)(gl_context, device_context),
                GpuInterop::Vulkan { device } => (entry.initialise_gpgpu_with_vulkan)(device),
            }
        })
    }

    fn use_dx12_shared_heap_flag(&self, flag: &mut u32) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.use_dx12_shared_heap_flag)(flag) })
    }

    fn save_schema(&self, asset_path: &CStr, schema: &mut ffi::Schema) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.save_schema)(asset_path.as_ptr(), schema) })
    }

    fn load_schema(&self, asset_path: &CStr, buffer: &mut [u8], n_bytes: &mut u32) -> RsErrorCode {
        self.call(|entry| unsafe {
            (entry.load_schema)(asset_path.as_ptr(), buffer_ptr(buffer), n_bytes)
        })
    }

    fn set_schema(&self, schema: &mut ffi::Schema) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.set_schema)(schema) })
    }

    fn get_streams(&self, buffer: &mut [u8], n_bytes: &mut u32) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.get_streams)(buffer_ptr(buffer), n_bytes) })
    }

    fn await_frame_data(&self, timeout_ms: i32, data: &mut ffi::FrameData) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.await_frame_data)(timeout_ms, data) })
    }

    fn set_follower(&self, follower: bool) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.set_follower)(follower as i32) })
    }

    fn begin_follower_frame(&self, t_tracked: f64) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.begin_follower_frame)(t_tracked) })
    }

    fn get_frame_parameters(&self, schema_hash: u64, out: &mut [f32]) -> RsErrorCode {
        let size = std::mem::size_of_val(out) as u64;
        self.call(|entry| unsafe {
            (entry.get_frame_parameters)(schema_hash, out.as_mut_ptr().cast::<c_void>(), size)
        })
    }

    fn get_frame_image_data(&self, schema_hash: u64, out: &mut [ffi::ImageFrameData]) -> RsErrorCode {
        let count = out.len() as u64;
        self.call(|entry| unsafe { (entry.get_frame_image_data)(schema_hash, out.as_mut_ptr(), count) })
    }

    fn get_frame_image(&self, image_id: i64, frame: &ffi::SenderFrame) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.get_frame_image)(image_id, frame) })
    }

    fn get_frame_text(&self, schema_hash: u64, index: u32, out: &mut *const c_char) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.get_frame_text)(schema_hash, index, out) })
    }

    fn get_frame_camera(&self, stream: StreamHandle, out: &mut ffi::CameraData) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.get_frame_camera)(stream, out) })
    }

    fn send_frame(
        &self,
        stream: StreamHandle,
        frame: &ffi::SenderFrame,
        response: &ffi::FrameResponseData,
    ) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.send_frame)(stream, frame, response) })
    }

    fn release_image(&self, frame: &ffi::SenderFrame) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.release_image)(frame) })
    }

    fn log_to_host(&self, message: &CStr) -> RsErrorCode {
        // Never block here: a log record may be emitted while shutdown holds
        // the write lock
        match self.state.try_read().as_deref() {
            Some(TableState::Loaded(table)) => {
                RsErrorCode::from_raw(unsafe { (table.entry.log_to_host)(message.as_ptr()) })
            }
            _ => RsErrorCode::NotInitialised,
        }
    }

    fn send_profiling_data(&self, entries: &[ffi::ProfilingEntry]) -> RsErrorCode {
        let count = entries.len() as i32;
        self.call(|entry| unsafe { (entry.send_profiling_data)(entries.as_ptr(), count) })
    }

    fn set_new_status_message(&self, message: &CStr) -> RsErrorCode {
        self.call(|entry| unsafe { (entry.set_new_status_message)(message.as_ptr()) })
    }

    fn shutdown(&self) -> RsErrorCode {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, TableState::Disabled(RenderStreamError::NotInitialized))
        };

        let TableState::Loaded(table) = previous else {
            return RsErrorCode::NotInitialised;
        };

        // Safety: the table was just taken out of service, so no other call
        // can be in flight; the library unloads when `table` drops below.
        let code = unsafe {
            Self::unregister_logging(&table.entry);
            RsErrorCode::from_raw((table.entry.shutdown)())
        };
        if code != RsErrorCode::Success {
            log::error!("Failed to shutdown: {}", code);
        }
        log::info!("Shut down RenderStream");

        drop(table);
        log::info!("Unloaded RenderStream");
        code
    }
}

impl Drop for FunctionTable {
    fn drop(&mut self) {
        RenderStreamApi::shutdown(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_list_covers_abi() {
        assert_eq!(EntryPoints::SYMBOLS.len(), 32);
        assert!(EntryPoints::SYMBOLS.contains(&"rs_sendFrame2"));
        assert!(EntryPoints::SYMBOLS.contains(&"rs_unregisterVerboseLoggingFunc"));
    }

    #[test]
    fn test_missing_library_disables_table() {
        let table = FunctionTable::load(&LoaderOptions {
            library_path: Some(PathBuf::from("/nonexistent/libd3renderstream.so")),
        });
        assert!(!table.is_available());
        assert!(matches!(
            table.disabled_reason(),
            Some(RenderStreamError::LoadFailed { .. })
        ));

        let mut frame = ffi::FrameData::default();
        assert_eq!(table.await_frame_data(500, &mut frame), RsErrorCode::NotInitialised);
        assert_eq!(table.frame_text(0, 0), Err(RenderStreamError::NotInitialized));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let table = FunctionTable::disabled(RenderStreamError::NotInitialized);
        assert_eq!(table.shutdown(), RsErrorCode::NotInitialised);
        assert_eq!(table.shutdown(), RsErrorCode::NotInitialised);
        assert!(table.library_path().is_none());
    }

    #[test]
    fn test_disabled_table_rejects_logging() {
        let table = FunctionTable::disabled(RenderStreamError::Unspecified);
        let message = std::ffi::CString::new("hello").unwrap();
        assert_eq!(table.log_to_host(&message), RsErrorCode::NotInitialised);
    }
}
