//! # void_renderstream - RenderStream Frame Exchange
//!
//! Connects the engine's frame loop to a RenderStream host: negotiates the
//! schema and stream set, applies the host's remote parameters to exposed
//! engine fields every frame, and sends rendered frames back with the camera
//! they were rendered from.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  SchemaBuilder  │────▶│  EncodedSchema  │────▶│ RenderStreamApi │
//! │  (build time)   │     │  (schema codec) │     │  (sys crate)    │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!          ┌───────────────────────────────────────────────┤
//!          ▼                                               ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ StreamRegistry  │◀────│     Session     │────▶│    FrameLoop    │
//! │                 │     │                 │     │  (per tick)     │
//! └─────────────────┘     └────────┬────────┘     └────────┬────────┘
//!                                  │                       │
//!                                  ▼                       ▼
//!                         ┌─────────────────┐     ┌─────────────────┐
//!                         │   FrameSender   │     │  BoundFields    │
//!                         │ (end of frame)  │     │  (binder)       │
//!                         └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use void_renderstream::{FrameLoop, RenderStreamConfig, SchemaInfo, Session};
//! use void_renderstream_sys::FunctionTable;
//!
//! let config = RenderStreamConfig::load();
//! let table = FunctionTable::global_or_load(&config.loader_options());
//! let mut session = Session::start(table, config, "app.exe", SchemaInfo::default())?;
//! session.on_scene_loaded(0)?;
//!
//! let mut frame_loop = FrameLoop::start(&mut session).unwrap();
//! loop {
//!     frame_loop.tick(&mut session, &mut host);
//!     // render, then publish each stream
//! }
//! ```

pub mod binder;
pub mod builder;
pub mod camera;
pub mod codec;
pub mod config;
pub mod error;
pub mod fields;
pub mod format;
pub mod frame;
pub mod frame_loop;
pub mod schema;
pub mod sender;
pub mod session;
pub mod streams;

#[cfg(test)]
mod mock;

pub use binder::{bind, ApplyReport, BoundField, BoundFields, FramePayload};
pub use builder::{SchemaBuilder, DEFAULT_SCENE};
pub use camera::{CameraState, Projection};
pub use codec::{
    counted_fetch, load_schema, save_schema, set_schema, EncodedSchema, SchemaInfo, MAX_FETCH_ATTEMPTS,
    PLUGIN_VERSION,
};
pub use config::{RenderStreamConfig, SceneControl};
pub use error::{BridgeError, Result};
pub use fields::{
    ExposedParameters, FieldKind, FieldValue, HostImage, ImageTarget, TargetRegistry, TransformValue,
};
pub use format::{PixelFormat, TextureFormat};
pub use frame::{CameraData, FrameData, FrameFlags, FrameRate, ImageDescriptor};
pub use frame_loop::{FrameLoop, HostEnvironment, LoopState, TickOutcome};
pub use schema::{
    DmxType, ParameterDefaults, ParameterFlags, ParameterLayout, ParameterType, RemoteParameter, SceneParameters,
    Schema,
};
pub use sender::{FrameBuffer, FrameSender, HostRenderTarget, RenderTarget};
pub use session::Session;
pub use streams::{fetch_streams, Clipping, EncodedStreams, StreamDescription, StreamRegistry};
