//! Exposed parameter registration
//!
//! Application objects expose their controllable fields through an
//! [`ExposedParameters`] table: one typed setter per field, keyed by
//! `{prefix}_{field}`. Tables are registered in a [`TargetRegistry`], which
//! the binder resolves remote parameter keys against.

use crate::format::TextureFormat;
use crate::frame::ImageDescriptor;
use crate::schema::{ParameterType, RemoteParameter};
use crate::sender::FrameBuffer;
use glam::{IVec2, IVec3, Mat4, Quat, Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Destination type of an exposed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Float,
    Int,
    Bool,
    /// Index into an option list
    Enum,
    Vec2,
    IVec2,
    Vec3,
    IVec3,
    Vec4,
    Color,
    /// 4x4 matrix decomposed into translation, rotation and scale
    Transform,
    Image,
    Text,
    /// Text split on spaces
    TextArray,
}

/// Which payload a field draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Numerical,
    Image,
    Text,
}

const VECTOR_SUFFIXES: [&str; 4] = ["_x", "_y", "_z", "_w"];
const COLOR_SUFFIXES: [&str; 4] = ["_r", "_g", "_b", "_a"];

impl FieldKind {
    /// Flat f32 slots consumed per frame
    pub fn slots(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::Bool | Self::Enum => 1,
            Self::Vec2 | Self::IVec2 => 2,
            Self::Vec3 | Self::IVec3 => 3,
            Self::Vec4 | Self::Color => 4,
            Self::Transform => 16,
            Self::Image | Self::Text | Self::TextArray => 0,
        }
    }

    pub fn class(self) -> FieldClass {
        match self {
            Self::Image => FieldClass::Image,
            Self::Text | Self::TextArray => FieldClass::Text,
            _ => FieldClass::Numerical,
        }
    }

    /// Key suffixes of the per-component parameters; empty for single-key fields
    pub fn component_suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Vec2 | Self::IVec2 => &VECTOR_SUFFIXES[..2],
            Self::Vec3 | Self::IVec3 => &VECTOR_SUFFIXES[..3],
            Self::Vec4 => &VECTOR_SUFFIXES[..],
            Self::Color => &COLOR_SUFFIXES[..],
            _ => &[],
        }
    }

    /// Whether a single remote parameter of type `kind` can drive this field
    pub fn accepts(self, kind: ParameterType) -> bool {
        match kind {
            ParameterType::Number => matches!(self, Self::Float | Self::Int | Self::Bool | Self::Enum),
            ParameterType::Pose | ParameterType::Transform => self == Self::Transform,
            ParameterType::Image => self == Self::Image,
            ParameterType::Text => matches!(self, Self::Text | Self::TextArray),
            ParameterType::Event | ParameterType::Skeleton => false,
        }
    }

    /// Convert this field's flat slots into a value
    pub fn decode(self, slots: &[f32]) -> Option<FieldValue> {
        if slots.len() < self.slots() || self.slots() == 0 {
            return None;
        }
        let value = match self {
            Self::Float => FieldValue::Float(slots[0]),
            Self::Int => FieldValue::Int(slots[0].round_ties_even() as i32),
            Self::Bool => FieldValue::Bool(slots[0] != 0.0),
            Self::Enum => FieldValue::Enum(slots[0].round_ties_even().max(0.0) as u32),
            Self::Vec2 => FieldValue::Vec2(Vec2::new(slots[0], slots[1])),
            Self::IVec2 => FieldValue::IVec2(IVec2::new(slots[0] as i32, slots[1] as i32)),
            Self::Vec3 => FieldValue::Vec3(Vec3::new(slots[0], slots[1], slots[2])),
            Self::IVec3 => FieldValue::IVec3(IVec3::new(slots[0] as i32, slots[1] as i32, slots[2] as i32)),
            Self::Vec4 => FieldValue::Vec4(Vec4::new(slots[0], slots[1], slots[2], slots[3])),
            Self::Color => FieldValue::Color(Vec4::new(slots[0], slots[1], slots[2], slots[3])),
            Self::Transform => FieldValue::Transform(TransformValue::from_slots(&slots[..16])),
            Self::Image | Self::Text | Self::TextArray => return None,
        };
        Some(value)
    }
}

/// Translation, rotation and scale of a received matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformValue {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl TransformValue {
    /// Decompose 16 column-major values
    pub fn from_slots(slots: &[f32]) -> Self {
        let mut columns = [0.0; 16];
        columns.copy_from_slice(&slots[..16]);
        let matrix = Mat4::from_cols_array(&columns);
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A value handed to a field setter
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Enum(u32),
    Vec2(Vec2),
    IVec2(IVec2),
    Vec3(Vec3),
    IVec3(IVec3),
    Vec4(Vec4),
    Color(Vec4),
    Transform(TransformValue),
    Text(String),
    TextArray(Vec<String>),
}

/// Type-erased setter for one field
pub type Setter = Arc<dyn Fn(FieldValue) + Send + Sync>;

/// A texture a remote image parameter is copied into
pub trait ImageTarget: Send {
    /// Current size and format, `None` before the first allocation
    fn size(&self) -> Option<(u32, u32, TextureFormat)>;

    /// Reallocate to match an incoming image
    fn recreate(&mut self, descriptor: &ImageDescriptor);

    /// Backing resource the plugin writes into
    fn frame_buffer(&mut self) -> FrameBuffer;

    /// Called after the plugin filled the buffer
    fn image_updated(&mut self) {}

    /// Whether `descriptor` fits the current allocation
    fn matches(&self, descriptor: &ImageDescriptor) -> bool {
        self.size() == Some((descriptor.width, descriptor.height, descriptor.format.texture_format()))
    }
}

/// CPU-side image target backed by host memory
#[derive(Debug, Default)]
pub struct HostImage {
    pixels: Vec<u8>,
    descriptor: Option<ImageDescriptor>,
    /// Completed copies
    updates: u64,
}

impl HostImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl ImageTarget for HostImage {
    fn size(&self) -> Option<(u32, u32, TextureFormat)> {
        self.descriptor
            .map(|d| (d.width, d.height, d.format.texture_format()))
    }

    fn recreate(&mut self, descriptor: &ImageDescriptor) {
        let len = descriptor.width as usize * descriptor.height as usize * descriptor.format.bytes_per_pixel() as usize;
        self.pixels = vec![0; len];
        self.descriptor = Some(*descriptor);
        log::debug!(
            "Recreated image target {}x{} {:?}",
            descriptor.width,
            descriptor.height,
            descriptor.format
        );
    }

    fn frame_buffer(&mut self) -> FrameBuffer {
        let (width, format) = self
            .descriptor
            .map(|d| (d.width, d.format))
            .unwrap_or_default();
        FrameBuffer::HostMemory {
            data: self.pixels.as_mut_ptr(),
            stride: width * format.bytes_per_pixel(),
            format,
        }
    }

    fn image_updated(&mut self) {
        self.updates += 1;
    }
}

/// How a registered field is written
#[derive(Clone)]
pub enum FieldAccessor {
    Value { kind: FieldKind, setter: Setter },
    Image(Arc<Mutex<dyn ImageTarget>>),
}

impl FieldAccessor {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldAccessor::Value { kind, .. } => *kind,
            FieldAccessor::Image(_) => FieldKind::Image,
        }
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldAccessor").field(&self.kind()).finish()
    }
}

/// Presentation metadata used when describing a field as remote parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMeta {
    pub display_name: String,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    /// Per-component numeric defaults
    pub defaults: [f32; 4],
    pub text_default: String,
    pub options: Vec<String>,
}

impl ParameterMeta {
    fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            min: 0.0,
            max: 1.0,
            step: 0.001,
            defaults: [0.0; 4],
            text_default: String::new(),
            options: Vec::new(),
        }
    }

    fn range(mut self, min: f32, max: f32, step: f32) -> Self {
        self.min = min;
        self.max = max;
        self.step = step;
        self
    }

    fn with_defaults(mut self, defaults: [f32; 4]) -> Self {
        self.defaults = defaults;
        self
    }
}

/// One exposed field
#[derive(Debug, Clone)]
pub struct ExposedField {
    /// Field path inside its target, without the prefix
    pub path: String,
    pub accessor: FieldAccessor,
    pub meta: ParameterMeta,
}

/// The fields one object exposes to the host
#[derive(Debug, Clone)]
pub struct ExposedParameters {
    /// Key namespace, usually the object name
    prefix: String,
    /// Group shown in the host UI
    group: String,
    fields: Vec<ExposedField>,
}

macro_rules! typed_setter {
    ($setter:ident, $variant:ident) => {
        Arc::new(move |value: FieldValue| {
            if let FieldValue::$variant(value) = value {
                $setter(value);
            }
        })
    };
}

impl ExposedParameters {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            group: prefix.clone(),
            prefix,
            fields: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn fields(&self) -> &[ExposedField] {
        &self.fields
    }

    /// Full remote key of a field path
    pub fn key(&self, path: &str) -> String {
        format!("{}_{}", self.prefix, path)
    }

    /// Look up a field by its path inside this target
    pub fn field(&self, path: &str) -> Option<&ExposedField> {
        self.fields.iter().find(|field| field.path == path)
    }

    fn push(&mut self, path: &str, accessor: FieldAccessor, meta: ParameterMeta) -> &mut Self {
        if self.field(path).is_some() {
            log::warn!("Field '{}' already exposed on '{}', replacing", path, self.prefix);
            self.fields.retain(|field| field.path != path);
        }
        self.fields.push(ExposedField {
            path: path.to_string(),
            accessor,
            meta,
        });
        self
    }

    fn push_value(&mut self, path: &str, kind: FieldKind, meta: ParameterMeta, setter: Setter) -> &mut Self {
        self.push(path, FieldAccessor::Value { kind, setter }, meta)
    }

    pub fn float(
        &mut self,
        path: &str,
        display_name: &str,
        min: f32,
        max: f32,
        default: f32,
        setter: impl Fn(f32) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(min, max, 0.001)
            .with_defaults([default, 0.0, 0.0, 0.0]);
        self.push_value(path, FieldKind::Float, meta, typed_setter!(setter, Float))
    }

    pub fn int(
        &mut self,
        path: &str,
        display_name: &str,
        min: i32,
        max: i32,
        default: i32,
        setter: impl Fn(i32) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(min as f32, max as f32, 1.0)
            .with_defaults([default as f32, 0.0, 0.0, 0.0]);
        self.push_value(path, FieldKind::Int, meta, typed_setter!(setter, Int))
    }

    pub fn toggle(
        &mut self,
        path: &str,
        display_name: &str,
        default: bool,
        setter: impl Fn(bool) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(0.0, 1.0, 1.0)
            .with_defaults([default as u8 as f32, 0.0, 0.0, 0.0]);
        self.push_value(path, FieldKind::Bool, meta, typed_setter!(setter, Bool))
    }

    /// An enum field; the host shows `options` and sends the index
    pub fn choice(
        &mut self,
        path: &str,
        display_name: &str,
        options: &[&str],
        default: u32,
        setter: impl Fn(u32) + Send + Sync + 'static,
    ) -> &mut Self {
        let mut meta = ParameterMeta::new(display_name)
            .range(0.0, options.len().saturating_sub(1) as f32, 1.0)
            .with_defaults([default as f32, 0.0, 0.0, 0.0]);
        meta.options = options.iter().map(|option| option.to_string()).collect();
        self.push_value(path, FieldKind::Enum, meta, typed_setter!(setter, Enum))
    }

    pub fn vec2(
        &mut self,
        path: &str,
        display_name: &str,
        default: Vec2,
        setter: impl Fn(Vec2) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(f32::MIN, f32::MAX, 0.001)
            .with_defaults([default.x, default.y, 0.0, 0.0]);
        self.push_value(path, FieldKind::Vec2, meta, typed_setter!(setter, Vec2))
    }

    pub fn ivec2(
        &mut self,
        path: &str,
        display_name: &str,
        default: IVec2,
        setter: impl Fn(IVec2) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(i32::MIN as f32, i32::MAX as f32, 1.0)
            .with_defaults([default.x as f32, default.y as f32, 0.0, 0.0]);
        self.push_value(path, FieldKind::IVec2, meta, typed_setter!(setter, IVec2))
    }

    pub fn vec3(
        &mut self,
        path: &str,
        display_name: &str,
        default: Vec3,
        setter: impl Fn(Vec3) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(f32::MIN, f32::MAX, 0.001)
            .with_defaults(default.extend(0.0).to_array());
        self.push_value(path, FieldKind::Vec3, meta, typed_setter!(setter, Vec3))
    }

    pub fn ivec3(
        &mut self,
        path: &str,
        display_name: &str,
        default: IVec3,
        setter: impl Fn(IVec3) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(i32::MIN as f32, i32::MAX as f32, 1.0)
            .with_defaults(default.as_vec3().extend(0.0).to_array());
        self.push_value(path, FieldKind::IVec3, meta, typed_setter!(setter, IVec3))
    }

    pub fn vec4(
        &mut self,
        path: &str,
        display_name: &str,
        default: Vec4,
        setter: impl Fn(Vec4) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name)
            .range(f32::MIN, f32::MAX, 0.001)
            .with_defaults(default.to_array());
        self.push_value(path, FieldKind::Vec4, meta, typed_setter!(setter, Vec4))
    }

    /// An RGBA colour with components in 0..1
    pub fn color(
        &mut self,
        path: &str,
        display_name: &str,
        default: Vec4,
        setter: impl Fn(Vec4) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name).with_defaults(default.to_array());
        self.push_value(path, FieldKind::Color, meta, typed_setter!(setter, Color))
    }

    pub fn transform(
        &mut self,
        path: &str,
        display_name: &str,
        setter: impl Fn(TransformValue) + Send + Sync + 'static,
    ) -> &mut Self {
        let meta = ParameterMeta::new(display_name);
        self.push_value(path, FieldKind::Transform, meta, typed_setter!(setter, Transform))
    }

    pub fn text(
        &mut self,
        path: &str,
        display_name: &str,
        default: &str,
        setter: impl Fn(String) + Send + Sync + 'static,
    ) -> &mut Self {
        let mut meta = ParameterMeta::new(display_name);
        meta.text_default = default.to_string();
        self.push_value(path, FieldKind::Text, meta, typed_setter!(setter, Text))
    }

    pub fn text_array(
        &mut self,
        path: &str,
        display_name: &str,
        default: &[&str],
        setter: impl Fn(Vec<String>) + Send + Sync + 'static,
    ) -> &mut Self {
        let mut meta = ParameterMeta::new(display_name);
        meta.text_default = default.join(" ");
        self.push_value(path, FieldKind::TextArray, meta, typed_setter!(setter, TextArray))
    }

    pub fn image(&mut self, path: &str, display_name: &str, target: Arc<Mutex<dyn ImageTarget>>) -> &mut Self {
        self.push(path, FieldAccessor::Image(target), ParameterMeta::new(display_name))
    }

    /// Describe every field as remote parameters, splitting vectors and
    /// colours into per-component keys
    pub fn describe(&self) -> Vec<RemoteParameter> {
        let mut parameters = Vec::new();
        for field in &self.fields {
            let key = self.key(&field.path);
            let meta = &field.meta;
            let display = meta.display_name.as_str();
            let group = self.group.as_str();
            let kind = field.accessor.kind();
            match kind {
                FieldKind::Float | FieldKind::Int | FieldKind::Bool | FieldKind::Enum => {
                    parameters.push(
                        RemoteParameter::number(group, display, &key, meta.min, meta.max, meta.step, meta.defaults[0])
                            .with_options(meta.options.clone()),
                    );
                }
                FieldKind::Vec2 | FieldKind::IVec2 | FieldKind::Vec3 | FieldKind::IVec3 | FieldKind::Vec4 | FieldKind::Color => {
                    for (i, suffix) in kind.component_suffixes().iter().enumerate() {
                        parameters.push(RemoteParameter::number(
                            group,
                            &format!("{}{}", display, suffix),
                            &format!("{}{}", key, suffix),
                            meta.min,
                            meta.max,
                            meta.step,
                            meta.defaults[i],
                        ));
                    }
                }
                FieldKind::Transform => {
                    parameters.push(RemoteParameter::plain(group, display, &key, ParameterType::Transform));
                }
                FieldKind::Image => {
                    parameters.push(RemoteParameter::plain(group, display, &key, ParameterType::Image));
                }
                FieldKind::Text | FieldKind::TextArray => {
                    parameters.push(RemoteParameter::text(group, display, &key, &meta.text_default));
                }
            }
        }
        parameters
    }
}

/// Every registered target, resolved by key prefix
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<ExposedParameters>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target; a target with the same prefix is replaced
    pub fn register(&mut self, target: ExposedParameters) {
        if let Some(existing) = self.targets.iter_mut().find(|t| t.prefix == target.prefix) {
            log::warn!("Replacing exposed parameters for '{}'", target.prefix);
            *existing = target;
        } else {
            self.targets.push(target);
        }
    }

    pub fn targets(&self) -> &[ExposedParameters] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Find the target owning `key` by longest prefix; returns it with the
    /// field path that follows `{prefix}_`
    pub fn resolve<'a, 'k>(&'a self, key: &'k str) -> Option<(&'a ExposedParameters, &'k str)> {
        self.targets
            .iter()
            .filter_map(|target| {
                key.strip_prefix(target.prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|path| (target, path))
            })
            .max_by_key(|(target, _)| target.prefix.len())
    }

    /// Look up the field a full key names
    pub fn field(&self, key: &str) -> Option<&ExposedField> {
        let (target, path) = self.resolve(key)?;
        target.field(path)
    }

    /// Describe all targets, in registration order
    pub fn describe_all(&self) -> Vec<RemoteParameter> {
        self.targets.iter().flat_map(|target| target.describe()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use crate::schema::ParameterDefaults;

    #[test]
    fn test_slots_and_classes() {
        assert_eq!(FieldKind::Float.slots(), 1);
        assert_eq!(FieldKind::IVec3.slots(), 3);
        assert_eq!(FieldKind::Color.slots(), 4);
        assert_eq!(FieldKind::Transform.slots(), 16);
        assert_eq!(FieldKind::Image.class(), FieldClass::Image);
        assert_eq!(FieldKind::TextArray.class(), FieldClass::Text);
        assert_eq!(FieldKind::Transform.class(), FieldClass::Numerical);
        assert_eq!(FieldKind::Color.component_suffixes(), &["_r", "_g", "_b", "_a"]);
        assert!(FieldKind::Float.component_suffixes().is_empty());
    }

    #[test]
    fn test_decode_rounding() {
        assert_eq!(FieldKind::Int.decode(&[2.5]), Some(FieldValue::Int(2)));
        assert_eq!(FieldKind::Int.decode(&[3.5]), Some(FieldValue::Int(4)));
        assert_eq!(FieldKind::Enum.decode(&[-1.0]), Some(FieldValue::Enum(0)));
        assert_eq!(FieldKind::Bool.decode(&[0.0]), Some(FieldValue::Bool(false)));
        assert_eq!(FieldKind::IVec2.decode(&[1.9, -1.9]), Some(FieldValue::IVec2(IVec2::new(1, -1))));
        assert_eq!(FieldKind::Vec3.decode(&[1.0, 2.0]), None);
        assert_eq!(FieldKind::Text.decode(&[1.0]), None);
    }

    #[test]
    fn test_transform_decomposition() {
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 2.0, 2.0),
            Quat::from_rotation_y(0.5),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let value = TransformValue::from_slots(&matrix.to_cols_array());
        assert!(value.translation.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
        assert!(value.scale.abs_diff_eq(Vec3::splat(2.0), 1e-5));
        assert!(value.rotation.abs_diff_eq(Quat::from_rotation_y(0.5), 1e-5));
        assert!(value.matrix().abs_diff_eq(matrix, 1e-5));
    }

    #[test]
    fn test_compatibility() {
        assert!(FieldKind::Enum.accepts(ParameterType::Number));
        assert!(FieldKind::Transform.accepts(ParameterType::Pose));
        assert!(FieldKind::TextArray.accepts(ParameterType::Text));
        assert!(!FieldKind::Vec3.accepts(ParameterType::Number));
        assert!(!FieldKind::Float.accepts(ParameterType::Event));
    }

    #[test]
    fn test_describe_decomposes_components() {
        let mut light = ExposedParameters::new("light").with_group("Lighting");
        light
            .vec3("position", "Position", Vec3::new(1.0, 2.0, 3.0), |_| {})
            .color("tint", "Tint", Vec4::ONE, |_| {})
            .choice("mode", "Mode", &["Off", "On"], 1, |_| {})
            .transform("pivot", "Pivot", |_| {})
            .text_array("tags", "Tags", &["a", "b"], |_| {});

        let keys: Vec<_> = light.describe().into_iter().map(|p| p.key).collect();
        assert_eq!(
            keys,
            vec![
                "light_position_x",
                "light_position_y",
                "light_position_z",
                "light_tint_r",
                "light_tint_g",
                "light_tint_b",
                "light_tint_a",
                "light_mode",
                "light_pivot",
                "light_tags",
            ]
        );

        let described = light.describe();
        assert_eq!(
            described[1].defaults,
            ParameterDefaults::number(f32::MIN, f32::MAX, 0.001, 2.0)
        );
        assert_eq!(described[7].options, vec!["Off".to_string(), "On".to_string()]);
        assert_eq!(described[8].kind, ParameterType::Transform);
        assert_eq!(described[0].group, "Lighting");
    }

    #[test]
    fn test_resolve_prefers_longest_prefix() {
        let mut registry = TargetRegistry::new();
        let mut short = ExposedParameters::new("cam");
        short.float("fov", "FOV", 1.0, 179.0, 60.0, |_| {});
        let mut long = ExposedParameters::new("cam_rig");
        long.float("height", "Height", 0.0, 10.0, 1.0, |_| {});
        registry.register(short);
        registry.register(long);

        let (target, path) = registry.resolve("cam_rig_height").unwrap();
        assert_eq!(target.prefix(), "cam_rig");
        assert_eq!(path, "height");
        assert_eq!(registry.resolve("cam_fov").unwrap().0.prefix(), "cam");
        assert!(registry.resolve("camera_fov").is_none());
        assert!(registry.field("cam_rig_height").is_some());
        assert!(registry.field("cam_rig_width").is_none());
    }

    #[test]
    fn test_field_outlives_key() {
        let mut registry = TargetRegistry::new();
        let mut light = ExposedParameters::new("light");
        light.float("gain", "Gain", 0.0, 1.0, 0.5, |_| {});
        registry.register(light);

        let field = {
            let key = format!("light_{}", "gain");
            registry.field(&key)
        };
        assert_eq!(field.map(|field| field.path.as_str()), Some("gain"));
    }

    #[test]
    fn test_host_image_recreates() {
        let mut image = HostImage::new();
        let descriptor = ImageDescriptor {
            width: 4,
            height: 2,
            format: PixelFormat::Rgba8,
            image_id: 11,
        };
        assert!(!image.matches(&descriptor));
        image.recreate(&descriptor);
        assert!(image.matches(&descriptor));
        assert_eq!(image.pixels().len(), 32);
        assert!(!image.matches(&ImageDescriptor {
            format: PixelFormat::Rgba16,
            ..descriptor
        }));

        match image.frame_buffer() {
            FrameBuffer::HostMemory { stride, format, .. } => {
                assert_eq!(stride, 16);
                assert_eq!(format, PixelFormat::Rgba8);
            }
            other => panic!("unexpected buffer {:?}", other),
        }
    }
}
