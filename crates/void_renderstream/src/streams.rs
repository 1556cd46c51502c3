//! Stream registry
//!
//! Streams are the host's video outputs. The set is fetched as a whole and
//! replaced whenever the plugin reports that it changed.

use crate::codec::{counted_fetch, read_header};
use crate::error::Result;
use crate::format::PixelFormat;
use serde::{Deserialize, Serialize};
use std::ptr;
use std::thread;
use std::time::Duration;
use void_renderstream_sys::{ffi, string_from_ptr, NativeArena, RenderStreamApi, StreamHandle};

/// Default backoff between discovery polls
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Normalised clip rectangle of a stream within its camera's image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clipping {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Default for Clipping {
    fn default() -> Self {
        Self {
            left: 0.0,
            right: 1.0,
            top: 0.0,
            bottom: 1.0,
        }
    }
}

impl Clipping {
    /// Region as (x, y, width, height)
    pub fn sub_region(&self) -> [f32; 4] {
        [self.left, self.top, self.right - self.left, self.bottom - self.top]
    }
}

impl From<ffi::ProjectionClipping> for Clipping {
    fn from(raw: ffi::ProjectionClipping) -> Self {
        Self {
            left: raw.left,
            right: raw.right,
            top: raw.top,
            bottom: raw.bottom,
        }
    }
}

impl From<Clipping> for ffi::ProjectionClipping {
    fn from(clipping: Clipping) -> Self {
        Self {
            left: clipping.left,
            right: clipping.right,
            top: clipping.top,
            bottom: clipping.bottom,
        }
    }
}

/// One output stream requested by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescription {
    /// Opaque handle issued by the host
    pub handle: StreamHandle,
    /// Channel (engine camera) the stream renders from
    pub channel: String,
    pub mapping_id: u64,
    pub viewpoint: i32,
    /// Display name, unique per session
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub clipping: Clipping,
    pub mapping_name: String,
    pub fragment: i32,
}

impl StreamDescription {
    /// Decode one native description
    ///
    /// # Safety
    ///
    /// String pointers in `raw` must be null or NUL-terminated.
    pub unsafe fn from_raw(raw: &ffi::StreamDescription) -> Self {
        Self {
            handle: raw.handle,
            channel: string_from_ptr(raw.channel),
            mapping_id: raw.mapping_id,
            viewpoint: raw.i_viewpoint,
            name: string_from_ptr(raw.name),
            width: raw.width,
            height: raw.height,
            format: PixelFormat::from_raw(raw.format),
            clipping: raw.clipping.into(),
            mapping_name: string_from_ptr(raw.mapping_name),
            fragment: raw.i_fragment,
        }
    }
}

/// A stream list laid out the way `getStreams` returns it
pub struct EncodedStreams {
    arena: NativeArena,
    header: ffi::StreamDescriptions,
}

// Safety: every pointer in `header` refers to blocks owned by `arena`
unsafe impl Send for EncodedStreams {}

impl EncodedStreams {
    pub fn encode(streams: &[StreamDescription]) -> Result<Self> {
        let mut arena = NativeArena::new();
        let mut descriptions = Vec::with_capacity(streams.len());
        for stream in streams {
            descriptions.push(ffi::StreamDescription {
                handle: stream.handle,
                channel: arena.string(&stream.channel)?,
                mapping_id: stream.mapping_id,
                i_viewpoint: stream.viewpoint,
                name: arena.string(&stream.name)?,
                width: stream.width,
                height: stream.height,
                format: stream.format.to_raw(),
                clipping: stream.clipping.into(),
                mapping_name: arena.string(&stream.mapping_name)?,
                i_fragment: stream.fragment,
            });
        }
        let header = ffi::StreamDescriptions {
            n_streams: descriptions.len() as u32,
            streams: arena.block(descriptions),
        };
        Ok(Self { arena, header })
    }

    pub fn header(&self) -> &ffi::StreamDescriptions {
        &self.header
    }

    /// Decode back into owned descriptions
    pub fn decode(&self) -> Vec<StreamDescription> {
        // Safety: the header points into the arena
        unsafe { decode_streams(&self.header) }
    }

    pub fn allocations(&self) -> usize {
        self.arena.allocations()
    }
}

/// # Safety
///
/// `header.streams` must point to `n_streams` valid descriptions.
unsafe fn decode_streams(header: &ffi::StreamDescriptions) -> Vec<StreamDescription> {
    let first = header.streams;
    if first.is_null() {
        return Vec::new();
    }
    (0..header.n_streams as usize)
        .map(|i| StreamDescription::from_raw(&ptr::read_unaligned(first.add(i))))
        .collect()
}

/// Fetch the current stream set once
pub fn fetch_streams(api: &dyn RenderStreamApi) -> Result<Vec<StreamDescription>> {
    counted_fetch(
        |buffer, n_bytes| api.get_streams(buffer, n_bytes),
        |buffer| {
            let header: ffi::StreamDescriptions = read_header(buffer, "Stream")?;
            // Safety: written by the plugin on success
            Ok(unsafe { decode_streams(&header) })
        },
    )
}

/// The current stream set
pub struct StreamRegistry {
    /// Latest set, replaced wholesale
    streams: Vec<StreamDescription>,
    /// Backoff between discovery polls
    poll_interval: Duration,
    /// Bumped every time the set is replaced
    generation: u64,
}

impl StreamRegistry {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            streams: Vec::new(),
            poll_interval,
            generation: 0,
        }
    }

    /// Fetch once and replace the set, even when empty
    pub fn fetch(&mut self, api: &dyn RenderStreamApi) -> Result<&[StreamDescription]> {
        let streams = fetch_streams(api)?;
        self.replace(streams);
        Ok(&self.streams)
    }

    /// Poll until the host reports at least one stream
    pub fn discover(&mut self, api: &dyn RenderStreamApi) -> Result<&[StreamDescription]> {
        self.discover_with(api, thread::sleep)
    }

    /// As [`discover`](Self::discover) with an injectable sleep
    pub fn discover_with(
        &mut self,
        api: &dyn RenderStreamApi,
        mut sleep: impl FnMut(Duration),
    ) -> Result<&[StreamDescription]> {
        loop {
            let streams = fetch_streams(api)?;
            if !streams.is_empty() {
                log::info!("Found {} streams", streams.len());
                self.replace(streams);
                return Ok(&self.streams);
            }
            log::info!("Waiting for streams...");
            sleep(self.poll_interval);
        }
    }

    fn replace(&mut self, streams: Vec<StreamDescription>) {
        self.streams = streams;
        self.generation += 1;
    }

    pub fn streams(&self) -> &[StreamDescription] {
        &self.streams
    }

    pub fn find_by_name(&self, name: &str) -> Option<&StreamDescription> {
        self.streams.iter().find(|stream| stream.name == name)
    }

    pub fn find_by_handle(&self, handle: StreamHandle) -> Option<&StreamDescription> {
        self.streams.iter().find(|stream| stream.handle == handle)
    }

    /// Streams rendering from `channel`
    pub fn for_channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a StreamDescription> + 'a {
        self.streams.iter().filter(move |stream| stream.channel == channel)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new(STREAM_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::mock::{sample_stream, ScriptedPlugin};
    use void_renderstream_sys::{RenderStreamError, RsErrorCode};

    #[test]
    fn test_sub_region() {
        let clipping = Clipping {
            left: 0.25,
            right: 0.75,
            top: 0.0,
            bottom: 0.5,
        };
        assert_eq!(clipping.sub_region(), [0.25, 0.0, 0.5, 0.5]);
        assert_eq!(Clipping::default().sub_region(), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_encoded_streams_decode() {
        let streams = vec![sample_stream(1, "Main"), sample_stream(2, "Side")];
        let encoded = EncodedStreams::encode(&streams).unwrap();
        assert_eq!(encoded.decode(), streams);
        assert_eq!({ encoded.header().n_streams }, 2);
    }

    #[test]
    fn test_fetch_replaces_set() {
        let plugin = ScriptedPlugin::new();
        plugin.push_streams(vec![sample_stream(1, "Main")]);
        let mut registry = StreamRegistry::default();

        registry.fetch(&plugin).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.generation(), 1);
        assert_eq!(registry.find_by_name("Main").map(|s| s.handle), Some(1));
        assert!(registry.find_by_handle(9).is_none());
        assert_eq!(registry.for_channel("camera").count(), 1);
    }

    #[test]
    fn test_discover_polls_until_non_empty() {
        let plugin = ScriptedPlugin::new();
        plugin.push_streams(Vec::new());
        plugin.push_streams(Vec::new());
        plugin.push_streams(Vec::new());
        plugin.push_streams(vec![sample_stream(1, "Main"), sample_stream(2, "Side")]);

        let mut registry = StreamRegistry::default();
        let mut sleeps = Vec::new();
        let found = registry
            .discover_with(&plugin, |interval| sleeps.push(interval))
            .unwrap()
            .len();

        assert_eq!(found, 2);
        assert_eq!(sleeps, vec![STREAM_POLL_INTERVAL; 3]);
    }

    #[test]
    fn test_discover_surfaces_errors() {
        let plugin = ScriptedPlugin::new();
        plugin.script_get_streams(vec![RsErrorCode::NotInitialised]);
        let mut registry = StreamRegistry::default();
        let result = registry.discover_with(&plugin, |_| {});
        assert!(matches!(
            result,
            Err(BridgeError::Native(RenderStreamError::NotInitialized))
        ));
    }
}
