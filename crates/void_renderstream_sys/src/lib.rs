//! # void_renderstream_sys - RenderStream Native Boundary
//!
//! Loads the RenderStream plugin shipped with the d3 production suite and
//! exposes its C ABI (version 2.0) to the rest of the engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  d3renderstream │────▶│   libloading    │
//! │  (plugin DLL)   │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ RenderStreamApi │◀────│  FunctionTable  │
//! │   (capability)  │     │ Loaded/Disabled │
//! └────────┬────────┘     └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   NativeArena   │     │   PinnedSlot    │
//! │ (encode blocks) │     │ (per-call pins) │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use void_renderstream_sys::{FunctionTable, LoaderOptions, RenderStreamApi};
//!
//! let table = FunctionTable::global_or_load(&LoaderOptions::default());
//! if !table.is_available() {
//!     // Feature disabled; the engine keeps running
//! }
//! ```

mod api;
mod error;
pub mod ffi;
mod library;
mod locate;
mod logging;
mod pinned;

pub use api::{string_from_ptr, to_cstring, GpuInterop, RenderStreamApi};
pub use error::{RenderStreamError, Result, RsErrorCode};
pub use ffi::{CameraHandle, StreamHandle, RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR};
pub use library::{FunctionTable, LoaderOptions};
pub use locate::{library_dir_from_exe_path, locate_library, LIBRARY_ENV, LIBRARY_NAME};
pub use logging::{format_for_host, HostLogForwarder, NATIVE_TARGET};
pub use pinned::{NativeArena, PinnedGuard, PinnedSlot};
