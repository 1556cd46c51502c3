//! Binary schema codec
//!
//! Converts between the pointer-based native schema layout and the owned
//! [`Schema`] tree. Encoding builds every variable-length block inside a
//! [`NativeArena`] that frees them together; decoding follows the native
//! pointers once and copies everything out.
//!
//! Fetches whose size the plugin decides (`load_schema`, `get_streams`) go
//! through [`counted_fetch`]: a zero-size probe, then up to
//! [`MAX_FETCH_ATTEMPTS`] sized attempts while the plugin reports overflow.

use crate::error::Result;
use crate::schema::{
    DmxType, ParameterDefaults, ParameterFlags, ParameterType, RemoteParameter, SceneParameters,
    Schema,
};
use std::ffi::c_char;
use std::mem::size_of;
use std::ptr;
use void_renderstream_sys::{
    ffi, string_from_ptr, to_cstring, NativeArena, RenderStreamApi, RenderStreamError, RsErrorCode,
};

/// Sized attempts after the probe before overflow becomes a hard error
pub const MAX_FETCH_ATTEMPTS: usize = 3;

/// Plugin version string written into every schema header
pub const PLUGIN_VERSION: &str = "RS2.0-Void-v0";

/// Identification strings written into the schema header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub engine_name: String,
    pub engine_version: String,
    /// Product name of the application
    pub info: String,
}

impl Default for SchemaInfo {
    fn default() -> Self {
        Self {
            engine_name: "Void Engine".to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            info: String::new(),
        }
    }
}

/// A schema laid out for the plugin, plus every block the layout points into
pub struct EncodedSchema {
    arena: NativeArena,
    header: Box<ffi::Schema>,
}

// Safety: all pointers in `header` refer to blocks owned by `arena`, which
// moves together with it.
unsafe impl Send for EncodedSchema {}

impl EncodedSchema {
    /// Lay out `schema` in native form
    pub fn encode(schema: &Schema, info: &SchemaInfo) -> Result<Self> {
        let mut arena = NativeArena::new();
        let mut header = Box::<ffi::Schema>::default();

        header.engine_name = arena.string(&info.engine_name)?;
        header.engine_version = arena.string(&info.engine_version)?;
        header.plugin_version = arena.string(PLUGIN_VERSION)?;
        header.info = arena.string(&info.info)?;

        header.channels = ffi::Channels {
            n_channels: schema.channels.len() as u32,
            channels: arena.string_array(&schema.channels)?,
        };

        let mut scenes = Vec::with_capacity(schema.scenes.len());
        for scene in &schema.scenes {
            let parameters = scene
                .parameters
                .iter()
                .map(|parameter| encode_parameter(&mut arena, parameter))
                .collect::<Result<Vec<_>>>()?;
            scenes.push(ffi::RemoteParameters {
                name: arena.string(&scene.name)?,
                n_parameters: parameters.len() as u32,
                parameters: arena.block(parameters),
                hash: scene.hash,
            });
        }
        header.scenes = ffi::Scenes {
            n_scenes: scenes.len() as u32,
            scenes: arena.block(scenes),
        };

        Ok(Self { arena, header })
    }

    pub fn header(&self) -> &ffi::Schema {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut ffi::Schema {
        &mut self.header
    }

    /// Live native blocks, header excluded
    pub fn allocations(&self) -> usize {
        self.arena.allocations()
    }

    /// Per-scene hashes as currently stored in the native layout
    pub fn scene_hashes(&self) -> Vec<u64> {
        let scenes = self.header.scenes;
        (0..scenes.n_scenes as usize)
            .map(|i| {
                // Safety: `scenes` points at `n_scenes` entries owned by the arena
                let scene = unsafe { ptr::read_unaligned(scenes.scenes.add(i)) };
                scene.hash
            })
            .collect()
    }

    /// Read the native layout back into an owned schema
    pub fn decode(&self) -> Result<Schema> {
        // Safety: every pointer in the header refers to the arena
        unsafe { decode_schema(&self.header) }
    }
}

fn encode_parameter(arena: &mut NativeArena, parameter: &RemoteParameter) -> Result<ffi::RemoteParameter> {
    if !parameter.defaults.matches(parameter.kind) {
        return Err(RenderStreamError::IncorrectSchema(format!(
            "Parameter '{}' of type {:?} carries {:?} defaults",
            parameter.key, parameter.kind, parameter.defaults
        ))
        .into());
    }

    // The type tag selects which half of the defaults union is written
    let defaults = match parameter.kind {
        ParameterType::Number => {
            let number = match parameter.defaults {
                ParameterDefaults::Number {
                    min,
                    max,
                    step,
                    default,
                } => ffi::NumericalDefaults {
                    min,
                    max,
                    step,
                    default_value: default,
                },
                _ => ffi::NumericalDefaults::default(),
            };
            ffi::RemoteParameterTypeDefaults { number }
        }
        ParameterType::Text => {
            let default = match &parameter.defaults {
                ParameterDefaults::Text { default } => default.as_str(),
                _ => "",
            };
            ffi::RemoteParameterTypeDefaults {
                text: ffi::TextDefaults {
                    default_value: arena.string(default)?,
                },
            }
        }
        _ => ffi::RemoteParameterTypeDefaults {
            number: ffi::NumericalDefaults::default(),
        },
    };

    Ok(ffi::RemoteParameter {
        group: arena.string(&parameter.group)?,
        display_name: arena.string(&parameter.display_name)?,
        key: arena.string(&parameter.key)?,
        parameter_type: parameter.kind.to_raw(),
        defaults,
        n_options: parameter.options.len() as u32,
        options: arena.string_array(&parameter.options)?,
        dmx_offset: parameter.dmx_offset,
        dmx_type: parameter.dmx_type.to_raw(),
        flags: parameter.flags.bits(),
    })
}

/// Decode a native schema into an owned tree
///
/// # Safety
///
/// Every pointer reachable from `header` must be valid for the counts it is
/// paired with and every string must be NUL-terminated.
pub unsafe fn decode_schema(header: &ffi::Schema) -> Result<Schema> {
    let channels = header.channels;
    let scenes = header.scenes;

    let channels = read_strings(channels.channels, channels.n_channels as usize);
    let mut decoded = Vec::with_capacity(scenes.n_scenes as usize);
    for i in 0..scenes.n_scenes as usize {
        let scene = ptr::read_unaligned(scenes.scenes.add(i));
        let mut parameters = Vec::with_capacity(scene.n_parameters as usize);
        for j in 0..scene.n_parameters as usize {
            parameters.push(decode_parameter(ptr::read_unaligned(scene.parameters.add(j)))?);
        }
        decoded.push(SceneParameters {
            name: string_from_ptr(scene.name),
            parameters,
            hash: scene.hash,
        });
    }

    Ok(Schema {
        channels,
        scenes: decoded,
    })
}

unsafe fn decode_parameter(raw: ffi::RemoteParameter) -> Result<RemoteParameter> {
    let key = string_from_ptr(raw.key);
    let tag = raw.parameter_type;
    let kind = ParameterType::from_raw(tag).ok_or_else(|| {
        RenderStreamError::IncorrectSchema(format!("Unknown type tag {} for parameter '{}'", tag, key))
    })?;

    let union = raw.defaults;
    let defaults = match kind {
        ParameterType::Number => {
            let number = union.number;
            ParameterDefaults::Number {
                min: number.min,
                max: number.max,
                step: number.step,
                default: number.default_value,
            }
        }
        ParameterType::Text => ParameterDefaults::Text {
            default: string_from_ptr(union.text.default_value),
        },
        _ => ParameterDefaults::None,
    };

    Ok(RemoteParameter {
        group: string_from_ptr(raw.group),
        display_name: string_from_ptr(raw.display_name),
        key,
        kind,
        defaults,
        options: read_strings(raw.options, raw.n_options as usize),
        dmx_offset: raw.dmx_offset,
        dmx_type: DmxType::from_raw(raw.dmx_type),
        flags: ParameterFlags::from_bits(raw.flags),
    })
}

unsafe fn read_strings(array: *const *const c_char, count: usize) -> Vec<String> {
    if array.is_null() {
        return Vec::new();
    }
    (0..count)
        .map(|i| string_from_ptr(ptr::read_unaligned(array.add(i))))
        .collect()
}

/// Byte buffer with 8-byte alignment for native headers
struct FetchBuffer {
    storage: Vec<u64>,
    len: usize,
}

impl FetchBuffer {
    fn new(len: usize) -> Self {
        Self {
            storage: vec![0; len.div_ceil(size_of::<u64>())],
            len,
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // Safety: `storage` holds at least `len` initialised bytes
        unsafe { std::slice::from_raw_parts_mut(self.storage.as_mut_ptr() as *mut u8, self.len) }
    }

    fn bytes(&self) -> &[u8] {
        // Safety: as above
        unsafe { std::slice::from_raw_parts(self.storage.as_ptr() as *const u8, self.len) }
    }
}

/// Run a fetch whose buffer size the plugin decides.
///
/// `call` receives the buffer and the size in/out parameter; an empty buffer
/// is the probe. `decode` only runs on a successful sized attempt.
pub fn counted_fetch<T>(
    mut call: impl FnMut(&mut [u8], &mut u32) -> RsErrorCode,
    mut decode: impl FnMut(&[u8]) -> Result<T>,
) -> Result<T> {
    let mut n_bytes = 0u32;
    let probe = call(&mut [], &mut n_bytes);
    if !probe.is_success() && !probe.is_retryable() {
        return Err(RenderStreamError::from(probe).into());
    }

    for attempt in 1..=MAX_FETCH_ATTEMPTS {
        let mut buffer = FetchBuffer::new(n_bytes as usize);
        match call(buffer.bytes_mut(), &mut n_bytes) {
            RsErrorCode::Success => return decode(buffer.bytes()),
            RsErrorCode::BufferOverflow => {
                log::debug!("Buffer too small on attempt {}, plugin asks for {} bytes", attempt, n_bytes);
            }
            code => return Err(RenderStreamError::from(code).into()),
        }
    }

    log::error!("Buffer still too small after {} attempts", MAX_FETCH_ATTEMPTS);
    Err(RenderStreamError::BufferOverflow.into())
}

/// Read a counted header of type `T` from the front of a fetch buffer
pub(crate) fn read_header<T: Copy>(buffer: &[u8], what: &str) -> Result<T> {
    if buffer.len() < size_of::<T>() {
        return Err(RenderStreamError::IncorrectSchema(format!(
            "{} buffer holds {} bytes, header needs {}",
            what,
            buffer.len(),
            size_of::<T>()
        ))
        .into());
    }
    // Safety: length checked; native headers are plain data
    Ok(unsafe { ptr::read_unaligned(buffer.as_ptr() as *const T) })
}

/// Write `schema` to `asset_path` through the plugin.
///
/// Returns the schema decoded back from the native header, so callers see
/// whatever the plugin normalised.
pub fn save_schema(
    api: &dyn RenderStreamApi,
    asset_path: &str,
    schema: &Schema,
    info: &SchemaInfo,
) -> Result<Schema> {
    let path = to_cstring(asset_path)?;
    let mut encoded = EncodedSchema::encode(schema, info)?;
    api.save_schema(&path, encoded.header_mut()).into_result()?;
    log::info!("Saved schema with {} scenes to {}", schema.scenes.len(), asset_path);
    encoded.decode()
}

/// Load the schema stored next to `asset_path`
pub fn load_schema(api: &dyn RenderStreamApi, asset_path: &str) -> Result<Schema> {
    let path = to_cstring(asset_path)?;
    let schema = counted_fetch(
        |buffer, n_bytes| api.load_schema(&path, buffer, n_bytes),
        |buffer| {
            let header: ffi::Schema = read_header(buffer, "Schema")?;
            // Safety: the plugin reported success, so the header and
            // everything it points to were written by it
            unsafe { decode_schema(&header) }
        },
    )?;
    log::info!(
        "Loaded schema: {} channels, {} scenes",
        schema.channels.len(),
        schema.scenes.len()
    );
    Ok(schema)
}

/// Publish `schema` and record the scene hashes the plugin assigns
pub fn set_schema(api: &dyn RenderStreamApi, schema: &mut Schema, info: &SchemaInfo) -> Result<()> {
    let mut encoded = EncodedSchema::encode(schema, info)?;
    api.set_schema(encoded.header_mut()).into_result()?;
    for (scene, hash) in schema.scenes.iter_mut().zip(encoded.scene_hashes()) {
        scene.hash = hash;
    }
    log::debug!("Published schema with {} scenes", schema.scenes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::mock::ScriptedPlugin;

    fn sample_schema() -> Schema {
        let mut main = SceneParameters::new("Main");
        main.parameters = vec![
            RemoteParameter::number("Light", "Intensity", "light_intensity", 0.0, 10.0, 0.1, 1.5),
            RemoteParameter::number("Light", "Mode", "light_mode", 0.0, 2.0, 1.0, 0.0)
                .with_options(vec!["Off".into(), "Warm".into(), "Cold".into()]),
            RemoteParameter::text("Screen", "Caption", "screen_caption", "Welcome")
                .with_flags(ParameterFlags::READ_ONLY),
            RemoteParameter::plain("Screen", "Feed", "screen_feed", ParameterType::Image),
            RemoteParameter::plain("Rig", "Rig", "rig_transform", ParameterType::Transform),
        ];
        let mut empty = SceneParameters::new("Empty");
        empty.hash = 0xfeed;

        Schema {
            channels: vec!["left".into(), "right".into()],
            scenes: vec![main, empty],
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let schema = sample_schema();
        let encoded = EncodedSchema::encode(&schema, &SchemaInfo::default()).unwrap();
        assert_eq!(encoded.decode().unwrap(), schema);
    }

    #[test]
    fn test_round_trip_every_parameter_type() {
        let kinds = [
            ParameterType::Number,
            ParameterType::Image,
            ParameterType::Pose,
            ParameterType::Transform,
            ParameterType::Text,
            ParameterType::Event,
            ParameterType::Skeleton,
        ];
        let mut scene = SceneParameters::new("All");
        scene.parameters = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| RemoteParameter::plain("All", "Value", &format!("all_value{}", i), *kind))
            .collect();
        let schema = Schema {
            channels: Vec::new(),
            scenes: vec![scene],
        };

        let encoded = EncodedSchema::encode(&schema, &SchemaInfo::default()).unwrap();
        let decoded = encoded.decode().unwrap();
        assert_eq!(decoded, schema);
        assert_eq!(decoded.scenes[0].parameters[0].defaults, ParameterDefaults::number(0.0, 0.0, 0.0, 0.0));
        assert_eq!(
            decoded.scenes[0].parameters[4].defaults,
            ParameterDefaults::Text { default: String::new() }
        );
    }

    #[test]
    fn test_mismatched_defaults_are_rejected() {
        let mut caption = RemoteParameter::text("Screen", "Caption", "screen_caption", "Hi");
        caption.defaults = ParameterDefaults::None;
        let mut feed = RemoteParameter::plain("Screen", "Feed", "screen_feed", ParameterType::Image);
        feed.defaults = ParameterDefaults::number(0.0, 1.0, 0.1, 0.5);

        for parameter in [caption, feed] {
            let mut scene = SceneParameters::new("Main");
            scene.parameters = vec![parameter];
            let schema = Schema {
                channels: Vec::new(),
                scenes: vec![scene],
            };
            let err = EncodedSchema::encode(&schema, &SchemaInfo::default()).err().unwrap();
            assert!(matches!(
                err,
                BridgeError::Native(RenderStreamError::IncorrectSchema(message)) if message.contains("screen_")
            ));
        }
    }

    #[test]
    fn test_encode_writes_header_strings() {
        let info = SchemaInfo {
            info: "Void Demo".into(),
            ..Default::default()
        };
        let encoded = EncodedSchema::encode(&Schema::fallback(), &info).unwrap();
        let header = *encoded.header();
        unsafe {
            assert_eq!(string_from_ptr(header.engine_name), "Void Engine");
            assert_eq!(string_from_ptr(header.plugin_version), PLUGIN_VERSION);
            assert_eq!(string_from_ptr(header.info), "Void Demo");
        }
        assert!({ header.channels.channels }.is_null());
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        let mut encoded = EncodedSchema::encode(&sample_schema(), &SchemaInfo::default()).unwrap();
        let scenes = encoded.header_mut().scenes;
        unsafe {
            let scene = ptr::read_unaligned(scenes.scenes);
            let first = scene.parameters as *mut ffi::RemoteParameter;
            let mut parameter = ptr::read_unaligned(first);
            parameter.parameter_type = 42;
            ptr::write_unaligned(first, parameter);
        }
        let err = encoded.decode().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Native(RenderStreamError::IncorrectSchema(message)) if message.contains("light_intensity")
        ));
    }

    #[test]
    fn test_counted_fetch_retries_overflow() {
        let mut calls = 0;
        let result = counted_fetch(
            |buffer, n_bytes| {
                calls += 1;
                *n_bytes = 8 * calls;
                if buffer.is_empty() || calls < 4 {
                    RsErrorCode::BufferOverflow
                } else {
                    buffer[0] = 7;
                    RsErrorCode::Success
                }
            },
            |buffer| Ok((buffer.len(), buffer[0])),
        )
        .unwrap();
        // Probe plus three sized attempts, the last sized from the third call
        assert_eq!(calls, 4);
        assert_eq!(result, (24, 7));
    }

    #[test]
    fn test_counted_fetch_gives_up() {
        let mut calls = 0;
        let result: Result<()> = counted_fetch(
            |_, n_bytes| {
                calls += 1;
                *n_bytes = 16;
                RsErrorCode::BufferOverflow
            },
            |_| Ok(()),
        );
        assert_eq!(calls, 1 + MAX_FETCH_ATTEMPTS);
        assert!(matches!(
            result,
            Err(BridgeError::Native(RenderStreamError::BufferOverflow))
        ));
    }

    #[test]
    fn test_counted_fetch_probe_error_stops() {
        let mut calls = 0;
        let result: Result<()> = counted_fetch(
            |_, _| {
                calls += 1;
                RsErrorCode::NotFound
            },
            |_| Ok(()),
        );
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(BridgeError::Native(RenderStreamError::NotFound))));
    }

    #[test]
    fn test_load_schema_through_plugin() {
        let plugin = ScriptedPlugin::new();
        plugin.set_stored_schema(sample_schema());
        let loaded = load_schema(&plugin, "Assets/scene.asset").unwrap();
        assert_eq!(loaded, sample_schema());
    }

    #[test]
    fn test_load_schema_truncated_header() {
        let result = counted_fetch(
            |_, n_bytes| {
                *n_bytes = 4;
                RsErrorCode::Success
            },
            |buffer| read_header::<ffi::Schema>(buffer, "Schema"),
        );
        assert!(matches!(
            result,
            Err(BridgeError::Native(RenderStreamError::IncorrectSchema(_)))
        ));
    }

    #[test]
    fn test_set_schema_records_hashes() {
        let plugin = ScriptedPlugin::new();
        let mut schema = sample_schema();
        set_schema(&plugin, &mut schema, &SchemaInfo::default()).unwrap();
        assert_eq!(schema.scenes[0].hash, ScriptedPlugin::scene_hash(0));
        assert_eq!(schema.scenes[1].hash, ScriptedPlugin::scene_hash(1));
    }

    #[test]
    fn test_save_schema_returns_decoded_copy() {
        let plugin = ScriptedPlugin::new();
        let saved = save_schema(&plugin, "Assets/scene.asset", &sample_schema(), &SchemaInfo::default()).unwrap();
        assert_eq!(saved, sample_schema());
        assert_eq!(plugin.saved_schema(), Some(sample_schema()));
    }
}
