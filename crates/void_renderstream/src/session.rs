//! Session context
//!
//! Everything the frame exchange needs between session start and shutdown:
//! the plugin, the published schema, the current stream set, the registered
//! targets and their per-scene bindings, and the latest frame data.

use crate::binder::{bind, ApplyReport, BoundFields, FramePayload};
use crate::camera::CameraState;
use crate::codec::{load_schema, set_schema, SchemaInfo};
use crate::config::{RenderStreamConfig, SceneControl};
use crate::error::{BridgeError, Result};
use crate::fields::TargetRegistry;
use crate::frame::{CameraData, FrameData};
use crate::schema::Schema;
use crate::sender::{FrameBuffer, FrameSender, RenderTarget};
use crate::streams::{StreamDescription, StreamRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use void_renderstream_sys::{ffi, to_cstring, GpuInterop, NativeArena, RenderStreamApi, RenderStreamError, RsErrorCode};

/// One RenderStream session
pub struct Session {
    api: Arc<dyn RenderStreamApi>,
    config: RenderStreamConfig,
    info: SchemaInfo,
    /// Published schema with the plugin's scene hashes
    schema: Schema,
    streams: StreamRegistry,
    targets: TargetRegistry,
    /// Bindings per schema scene, resolved on scene load
    scene_fields: Vec<Option<BoundFields>>,
    /// Schema scene the engine has loaded
    active_scene: Option<u32>,
    /// Latest frame data
    frame: FrameData,
    /// Whether `frame` arrived this tick
    new_frame_data: bool,
    /// Set while a frame loop holds the latch
    awaiting: Arc<AtomicBool>,
}

/// Held by the running frame loop; releases the session latch on drop
#[derive(Debug)]
pub(crate) struct LoopLatch {
    flag: Arc<AtomicBool>,
}

impl Drop for LoopLatch {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Session {
    /// Create a session around an already published schema
    pub fn new(api: Arc<dyn RenderStreamApi>, config: RenderStreamConfig, schema: Schema, info: SchemaInfo) -> Self {
        let streams = StreamRegistry::new(config.stream_poll_interval());
        let scene_fields = vec![None; schema.scenes.len()];
        Self {
            api,
            config,
            info,
            schema,
            streams,
            targets: TargetRegistry::new(),
            scene_fields,
            active_scene: None,
            frame: FrameData::default(),
            new_frame_data: false,
            awaiting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load the schema stored for `asset_path` and publish it.
    ///
    /// A schema that fails to load is replaced by the fallback schema; the
    /// session still starts.
    pub fn start(
        api: Arc<dyn RenderStreamApi>,
        config: RenderStreamConfig,
        asset_path: &str,
        info: SchemaInfo,
    ) -> Result<Self> {
        if !api.is_available() {
            log::error!("RenderStream library not available");
            return Err(RenderStreamError::NotInitialized.into());
        }

        if config.follower {
            api.set_follower(true).into_result()?;
            log::info!("Running as follower");
        }

        let mut schema = match load_schema(api.as_ref(), asset_path) {
            Ok(schema) => schema,
            Err(err) => {
                log::error!("Failed to load schema: {}", err);
                Schema::fallback()
            }
        };
        set_schema(api.as_ref(), &mut schema, &info)?;

        Ok(Self::new(api, config, schema, info))
    }

    pub fn api(&self) -> &dyn RenderStreamApi {
        self.api.as_ref()
    }

    pub fn config(&self) -> &RenderStreamConfig {
        &self.config
    }

    pub fn info(&self) -> &SchemaInfo {
        &self.info
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    /// Register exposed parameters here before the scene loads
    pub fn targets_mut(&mut self) -> &mut TargetRegistry {
        &mut self.targets
    }

    pub fn frame(&self) -> &FrameData {
        &self.frame
    }

    pub fn has_new_frame_data(&self) -> bool {
        self.new_frame_data
    }

    pub fn active_scene(&self) -> Option<u32> {
        self.active_scene
    }

    pub fn scene_fields(&self, scene: u32) -> Option<&BoundFields> {
        self.scene_fields.get(scene as usize)?.as_ref()
    }

    pub fn await_timeout(&self) -> Duration {
        self.config.await_timeout()
    }

    /// Replace the stream set, blocking until the host reports a stream.
    ///
    /// Frame data from before the change is dropped.
    pub fn refresh_streams(&mut self) -> Result<&[StreamDescription]> {
        self.refresh_streams_with(std::thread::sleep)
    }

    /// As [`refresh_streams`](Self::refresh_streams) with an injectable sleep
    pub fn refresh_streams_with(&mut self, sleep: impl FnMut(Duration)) -> Result<&[StreamDescription]> {
        if !self.api.is_available() {
            log::error!("RenderStream library not available");
            return Err(RenderStreamError::NotInitialized.into());
        }
        self.frame = FrameData::default();
        self.new_frame_data = false;
        self.streams.discover_with(self.api.as_ref(), sleep)
    }

    /// The engine finished loading scene `build_index`
    pub fn on_scene_loaded(&mut self, build_index: u32) -> Result<()> {
        self.refresh_streams()?;
        let scene = match self.config.scene_control {
            SceneControl::Selection => build_index,
            SceneControl::Manual => 0,
        };
        self.bind_scene(scene)?;
        Ok(())
    }

    /// Resolve a schema scene against the registered targets
    pub fn bind_scene(&mut self, scene: u32) -> Result<&BoundFields> {
        let count = self.schema.scenes.len();
        let parameters = self
            .schema
            .scene(scene)
            .ok_or(BridgeError::SceneOutOfRange { index: scene, count })?;
        let fields = bind(parameters, &self.targets);
        self.active_scene = Some(scene);

        let slot = &mut self.scene_fields[scene as usize];
        Ok(slot.insert(fields))
    }

    /// Take the frame loop latch; `None` if a loop already holds it
    pub(crate) fn begin_awaiting(&self) -> Option<LoopLatch> {
        self.awaiting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoopLatch {
                flag: self.awaiting.clone(),
            })
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting.load(Ordering::Acquire)
    }

    /// Wait for the next frame.
    ///
    /// Timeout, streams changed and quit come back as errors.
    pub fn await_frame(&mut self) -> Result<FrameData> {
        let mut raw = ffi::FrameData::default();
        let code = self
            .api
            .await_frame_data(self.config.await_timeout_ms_i32(), &mut raw);
        self.new_frame_data = code.is_success();
        code.into_result()?;
        self.frame = FrameData::from(raw);
        Ok(self.frame)
    }

    /// Forget this tick's frame data
    pub fn discard_frame(&mut self) {
        self.new_frame_data = false;
    }

    /// Fetch the parameter payload of `scene` for the current frame
    pub fn fetch_payload(&self, scene: u32) -> Result<FramePayload> {
        let parameters = self.schema.scene(scene).ok_or(BridgeError::SceneOutOfRange {
            index: scene,
            count: self.schema.scenes.len(),
        })?;
        FramePayload::fetch(self.api.as_ref(), parameters)
    }

    /// Apply a payload to the fields bound for `scene`, binding on first use
    pub fn apply_payload(&mut self, scene: u32, payload: &FramePayload) -> Result<ApplyReport> {
        if self.scene_fields(scene).is_none() {
            self.bind_scene(scene)?;
        }
        match self.scene_fields(scene) {
            Some(fields) => fields.apply(payload, self.api.as_ref()),
            None => Err(BridgeError::SceneOutOfRange {
                index: scene,
                count: self.schema.scenes.len(),
            }),
        }
    }

    /// One sender per current stream, with targets from `make_target`
    pub fn create_senders(
        &self,
        mut make_target: impl FnMut(&StreamDescription) -> Box<dyn RenderTarget>,
    ) -> Vec<FrameSender> {
        self.streams
            .streams()
            .iter()
            .map(|stream| FrameSender::new(stream, make_target(stream)))
            .collect()
    }

    /// This frame's tracked camera for `sender`, if a frame arrived
    pub fn camera_for(&self, sender: &mut FrameSender) -> Result<Option<CameraData>> {
        if !self.new_frame_data {
            return Ok(None);
        }
        sender.fetch_camera(self.api.as_ref()).map(Some)
    }

    /// Move `camera` to this frame's tracking for `sender`
    pub fn update_camera(&self, sender: &mut FrameSender, camera: &mut CameraState) -> Result<()> {
        let tracked = self.camera_for(sender)?;
        camera.update(tracked.as_ref(), sender.sub_region());
        Ok(())
    }

    /// Send `sender`'s rendered frame; nothing is sent without new frame data
    pub fn publish(&self, sender: &mut FrameSender, tick: u64) -> Result<bool> {
        if !self.new_frame_data {
            return Ok(false);
        }
        sender.send(self.api.as_ref(), tick, &self.frame)
    }

    /// Publish every sender, logging failures; returns how many were sent
    pub fn publish_all(&self, senders: &mut [FrameSender], tick: u64) -> usize {
        let mut sent = 0;
        for sender in senders.iter_mut() {
            match self.publish(sender, tick) {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(err) => log::warn!("Stream {} not sent: {}", sender.name(), err),
            }
        }
        sent
    }

    /// Initialise GPU interop in configured order; the first success wins
    pub fn initialise_gpu_interop(&self, candidates: &[GpuInterop]) -> Result<&'static str> {
        let mut last = RsErrorCode::FailedToInitialiseGpGpu;
        for name in &self.config.gpu_interop {
            let Some(interop) = candidates.iter().find(|candidate| candidate.name() == name.as_str()) else {
                continue;
            };
            let code = self.api.initialise_gpgpu(interop);
            if code.is_success() {
                log::info!("Initialised GPU interop: {}", interop.name());
                return Ok(interop.name());
            }
            log::warn!("GPU interop {} failed: {}", interop.name(), code);
            last = code;
        }
        log::error!("No GPU interop backend could be initialised");
        Err(RenderStreamError::FailedGpuInterop(last).into())
    }

    /// Whether DX12 textures should be created on a shared heap
    pub fn use_dx12_shared_heap(&self) -> Result<bool> {
        let mut flag = ffi::DX12_DO_NOT_USE_SHARED_HEAP_FLAG;
        self.api.use_dx12_shared_heap_flag(&mut flag).into_result()?;
        Ok(flag == ffi::DX12_USE_SHARED_HEAP_FLAG)
    }

    pub fn set_follower(&mut self, follower: bool) -> Result<()> {
        self.api.set_follower(follower).into_result()?;
        self.config.follower = follower;
        Ok(())
    }

    /// Start a follower frame with the tracking time distributed by the engine
    pub fn begin_follower_frame(&mut self, t_tracked: f64) -> Result<()> {
        self.api.begin_follower_frame(t_tracked).into_result()?;
        self.frame.t_tracked = t_tracked;
        self.new_frame_data = true;
        Ok(())
    }

    /// Show a status line in the host UI
    pub fn set_status(&self, message: &str) -> Result<()> {
        let message = to_cstring(message)?;
        self.api.set_new_status_message(&message).into_result()?;
        Ok(())
    }

    /// Send named timings to the host profiler
    pub fn report_profiling(&self, entries: &[(&str, f32)]) -> Result<()> {
        let mut arena = NativeArena::new();
        let entries = entries
            .iter()
            .map(|(name, value)| {
                Ok(ffi::ProfilingEntry {
                    name: arena.string(name)?,
                    value: *value,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.api.send_profiling_data(&entries).into_result()?;
        Ok(())
    }

    /// Hand an image buffer back to the plugin
    pub fn release_image(&self, buffer: &FrameBuffer) -> Result<()> {
        self.api.release_image(&buffer.to_sender_frame()).into_result()?;
        Ok(())
    }

    /// Release the plugin
    pub fn shutdown(&mut self) {
        self.new_frame_data = false;
        if let Err(err) = self.api.shutdown().into_result() {
            log::warn!("RenderStream shutdown: {}", err);
        }
        log::info!("RenderStream session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("scenes", &self.schema.scenes.len())
            .field("streams", &self.streams.len())
            .field("active_scene", &self.active_scene)
            .field("awaiting", &self.is_awaiting())
            .finish_non_exhaustive()
    }
}
