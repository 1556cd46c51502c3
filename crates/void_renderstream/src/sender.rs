//! Publishing rendered frames back to the host

use crate::error::{BridgeError, Result};
use crate::format::{PixelFormat, TextureFormat};
use crate::frame::{CameraData, FrameData};
use crate::streams::StreamDescription;
use std::ffi::c_void;
use void_renderstream_sys::{ffi, PinnedSlot, RenderStreamApi, RenderStreamError, StreamHandle};

/// A frame buffer the plugin reads from or writes into
#[derive(Debug, Clone, Copy)]
pub enum FrameBuffer {
    HostMemory {
        data: *mut u8,
        stride: u32,
        format: PixelFormat,
    },
    Dx11 {
        resource: *mut c_void,
    },
    Dx12 {
        resource: *mut c_void,
    },
    OpenGl {
        texture: u32,
    },
    Vulkan {
        memory: *mut c_void,
        size: u64,
        format: PixelFormat,
        width: u32,
        height: u32,
        wait_semaphore: *mut c_void,
        wait_semaphore_value: u64,
        signal_semaphore: *mut c_void,
        signal_semaphore_value: u64,
    },
}

impl FrameBuffer {
    /// Tagged native description of this buffer
    pub fn to_sender_frame(&self) -> ffi::SenderFrame {
        match *self {
            FrameBuffer::HostMemory { data, stride, format } => ffi::SenderFrame {
                frame_type: ffi::frame_type::HOST_MEMORY,
                data: ffi::SenderFrameData {
                    host: ffi::HostMemoryData {
                        data,
                        stride,
                        format: format.to_raw(),
                    },
                },
            },
            FrameBuffer::Dx11 { resource } => ffi::SenderFrame {
                frame_type: ffi::frame_type::DX11_TEXTURE,
                data: ffi::SenderFrameData {
                    dx11: ffi::Dx11Data { resource },
                },
            },
            FrameBuffer::Dx12 { resource } => ffi::SenderFrame {
                frame_type: ffi::frame_type::DX12_TEXTURE,
                data: ffi::SenderFrameData {
                    dx12: ffi::Dx12Data { resource },
                },
            },
            FrameBuffer::OpenGl { texture } => ffi::SenderFrame {
                frame_type: ffi::frame_type::OPENGL_TEXTURE,
                data: ffi::SenderFrameData {
                    gl: ffi::OpenGlData { texture },
                },
            },
            FrameBuffer::Vulkan {
                memory,
                size,
                format,
                width,
                height,
                wait_semaphore,
                wait_semaphore_value,
                signal_semaphore,
                signal_semaphore_value,
            } => ffi::SenderFrame {
                frame_type: ffi::frame_type::VULKAN_TEXTURE,
                data: ffi::SenderFrameData {
                    vk: ffi::VulkanData {
                        memory,
                        size,
                        format: format.to_raw(),
                        width,
                        height,
                        wait_semaphore,
                        wait_semaphore_value,
                        signal_semaphore,
                        signal_semaphore_value,
                    },
                },
            },
        }
    }
}

/// Something a stream's frames are rendered into
pub trait RenderTarget: Send {
    /// Get the size of the render target
    fn size(&self) -> (u32, u32);

    fn format(&self) -> TextureFormat;

    /// Buffer holding the finished frame
    fn frame_buffer(&mut self) -> FrameBuffer;
}

/// Render target in host memory, laid out in the stream's pixel format
#[derive(Debug)]
pub struct HostRenderTarget {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl HostRenderTarget {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel() as usize;
        Self {
            pixels: vec![0; len],
            width,
            height,
            format,
        }
    }

    pub fn for_stream(stream: &StreamDescription) -> Self {
        Self::new(stream.width, stream.height, stream.format)
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

impl RenderTarget for HostRenderTarget {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> TextureFormat {
        self.format.texture_format()
    }

    fn frame_buffer(&mut self) -> FrameBuffer {
        FrameBuffer::HostMemory {
            data: self.pixels.as_mut_ptr(),
            stride: self.width * self.format.bytes_per_pixel(),
            format: self.format,
        }
    }
}

/// Sends one stream's rendered frames
pub struct FrameSender {
    /// Stream display name
    name: String,
    /// Zero once destroyed
    handle: StreamHandle,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Normalised (x, y, width, height) of the stream within its camera image
    sub_region: [f32; 4],
    target: Box<dyn RenderTarget>,
    /// Engine tick of the last send
    last_tick: Option<u64>,
    /// Latest tracked camera for this stream
    camera: CameraData,
    /// Response block handed to the plugin during a send
    response: PinnedSlot<ffi::CameraResponseData>,
}

impl FrameSender {
    pub fn new(stream: &StreamDescription, target: Box<dyn RenderTarget>) -> Self {
        if target.size() != (stream.width, stream.height) {
            log::warn!(
                "Render target for '{}' is {:?}, stream expects {}x{}",
                stream.name,
                target.size(),
                stream.width,
                stream.height
            );
        }
        log::info!(
            "Created stream {} with handle {} ({}x{} {:?})",
            stream.name,
            stream.handle,
            stream.width,
            stream.height,
            stream.format
        );
        Self {
            name: stream.name.clone(),
            handle: stream.handle,
            width: stream.width,
            height: stream.height,
            format: stream.format,
            sub_region: stream.clipping.sub_region(),
            target,
            last_tick: None,
            camera: CameraData::default(),
            response: PinnedSlot::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.handle != 0
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Format engines should allocate this stream's render target in
    pub fn render_format(&self) -> TextureFormat {
        self.format.render_texture_format()
    }

    pub fn sub_region(&self) -> [f32; 4] {
        self.sub_region
    }

    pub fn camera(&self) -> &CameraData {
        &self.camera
    }

    pub fn target_mut(&mut self) -> &mut dyn RenderTarget {
        self.target.as_mut()
    }

    /// Fetch this frame's tracked camera
    pub fn fetch_camera(&mut self, api: &dyn RenderStreamApi) -> Result<CameraData> {
        if !self.is_valid() {
            return Err(RenderStreamError::InvalidHandle.into());
        }
        let mut raw = ffi::CameraData::default();
        api.get_frame_camera(self.handle, &mut raw).into_result()?;
        self.camera = CameraData::from(raw);
        Ok(self.camera)
    }

    /// Send the rendered frame with the camera it was rendered from.
    ///
    /// Returns `Ok(false)` when this stream already sent during `tick`.
    pub fn send(&mut self, api: &dyn RenderStreamApi, tick: u64, frame: &FrameData) -> Result<bool> {
        if !self.is_valid() {
            return Err(RenderStreamError::InvalidHandle.into());
        }
        if self.last_tick == Some(tick) {
            return Ok(false);
        }
        self.last_tick = Some(tick);

        let sender_frame = self.target.frame_buffer().to_sender_frame();
        let handle = self.handle;
        let pinned = self.response.pin(ffi::CameraResponseData {
            t_tracked: frame.t_tracked,
            camera: self.camera.to_ffi(),
        });
        let response = ffi::FrameResponseData {
            camera_data: pinned.as_ptr(),
            ..Default::default()
        };

        let code = api.send_frame(handle, &sender_frame, &response);
        drop(pinned);
        if let Err(err) = code.into_result() {
            log::error!("Error sending frame: {}", code);
            return Err(BridgeError::from(err));
        }
        Ok(true)
    }

    /// Invalidate the stream; later sends fail with an invalid handle
    pub fn destroy(&mut self) {
        if self.handle != 0 {
            log::debug!("Destroyed stream {}", self.name);
        }
        self.handle = 0;
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_stream, ScriptedPlugin};
    use void_renderstream_sys::RsErrorCode;

    fn sender() -> FrameSender {
        let stream = sample_stream(5, "Main");
        FrameSender::new(&stream, Box::new(HostRenderTarget::for_stream(&stream)))
    }

    #[test]
    fn test_host_memory_sender_frame() {
        let mut target = HostRenderTarget::new(4, 4, PixelFormat::Bgra8);
        let frame = target.frame_buffer().to_sender_frame();
        assert_eq!({ frame.frame_type }, ffi::frame_type::HOST_MEMORY);
        let host = unsafe { frame.data.host };
        assert_eq!({ host.stride }, 16);
        assert_eq!({ host.format }, ffi::pixel_format::BGRA8);
    }

    #[test]
    fn test_send_once_per_tick() {
        let plugin = ScriptedPlugin::new();
        let mut sender = sender();
        let frame = FrameData {
            t_tracked: 4.5,
            ..Default::default()
        };

        assert!(sender.send(&plugin, 1, &frame).unwrap());
        assert!(!sender.send(&plugin, 1, &frame).unwrap());
        assert!(sender.send(&plugin, 2, &frame).unwrap());

        let sent = plugin.sent_frames();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].handle, 5);
        assert_eq!(sent[0].t_tracked, 4.5);
    }

    #[test]
    fn test_response_is_released_after_send() {
        let plugin = ScriptedPlugin::new();
        plugin.script_send_frame(vec![RsErrorCode::InvalidHandle]);
        let mut sender = sender();

        let result = sender.send(&plugin, 1, &FrameData::default());
        assert!(matches!(
            result,
            Err(BridgeError::Native(RenderStreamError::InvalidHandle))
        ));
        assert!(!sender.response.is_occupied());
    }

    #[test]
    fn test_camera_echoed_in_response() {
        let plugin = ScriptedPlugin::new();
        plugin.set_camera(CameraData {
            stream_handle: 5,
            camera_handle: 9,
            focal_length: 50.0,
            sensor_size: [36.0, 24.0],
            ..Default::default()
        });
        let mut sender = sender();
        let camera = sender.fetch_camera(&plugin).unwrap();
        assert_eq!(camera.camera_handle, 9);

        sender.send(&plugin, 1, &FrameData::default()).unwrap();
        assert_eq!(plugin.sent_frames()[0].camera_handle, 9);
    }

    #[test]
    fn test_destroyed_sender_rejects_send() {
        let plugin = ScriptedPlugin::new();
        let mut sender = sender();
        sender.destroy();
        assert!(!sender.is_valid());
        assert!(sender.send(&plugin, 1, &FrameData::default()).is_err());
        assert!(plugin.sent_frames().is_empty());
    }

    #[test]
    fn test_sub_region_from_clipping() {
        let sender = sender();
        assert_eq!(sender.sub_region(), [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(sender.render_format(), TextureFormat::ArgbFloat);
    }
}
