//! In-process schema model
//!
//! The schema declares the channels the engine can render and, per scene,
//! the remote parameters the host may drive. It is immutable for a session
//! except for the per-scene hashes filled in when it is published.

use serde::{Deserialize, Serialize};
use void_renderstream_sys::ffi;

/// Remote parameter type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Number,
    Image,
    /// 4x4 TR matrix
    Pose,
    /// 4x4 TRS matrix
    Transform,
    Text,
    Event,
    Skeleton,
}

impl ParameterType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            ffi::parameter_type::NUMBER => Some(Self::Number),
            ffi::parameter_type::IMAGE => Some(Self::Image),
            ffi::parameter_type::POSE => Some(Self::Pose),
            ffi::parameter_type::TRANSFORM => Some(Self::Transform),
            ffi::parameter_type::TEXT => Some(Self::Text),
            ffi::parameter_type::EVENT => Some(Self::Event),
            ffi::parameter_type::SKELETON => Some(Self::Skeleton),
            _ => None,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Number => ffi::parameter_type::NUMBER,
            Self::Image => ffi::parameter_type::IMAGE,
            Self::Pose => ffi::parameter_type::POSE,
            Self::Transform => ffi::parameter_type::TRANSFORM,
            Self::Text => ffi::parameter_type::TEXT,
            Self::Event => ffi::parameter_type::EVENT,
            Self::Skeleton => ffi::parameter_type::SKELETON,
        }
    }

    /// Flat f32 slots this parameter occupies in the numeric payload
    pub fn numeric_slots(self) -> usize {
        match self {
            Self::Number => 1,
            Self::Pose | Self::Transform => 16,
            _ => 0,
        }
    }
}

/// DMX channel encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmxType {
    #[default]
    Default,
    Dmx8,
    Dmx16Be,
}

impl DmxType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            ffi::dmx_type::DMX_8 => Self::Dmx8,
            ffi::dmx_type::DMX_16_BE => Self::Dmx16Be,
            _ => Self::Default,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Default => ffi::dmx_type::DEFAULT,
            Self::Dmx8 => ffi::dmx_type::DMX_8,
            Self::Dmx16Be => ffi::dmx_type::DMX_16_BE,
        }
    }
}

/// Remote parameter flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterFlags(u32);

impl ParameterFlags {
    pub const NONE: Self = Self(0);
    pub const NO_SEQUENCE: Self = Self(ffi::REMOTEPARAMETER_NO_SEQUENCE);
    pub const READ_ONLY: Self = Self(ffi::REMOTEPARAMETER_READ_ONLY);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Type-specific defaults; the type tag decides which applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParameterDefaults {
    Number {
        min: f32,
        max: f32,
        step: f32,
        default: f32,
    },
    Text {
        default: String,
    },
    None,
}

impl ParameterDefaults {
    pub fn number(min: f32, max: f32, step: f32, default: f32) -> Self {
        Self::Number {
            min,
            max,
            step,
            default,
        }
    }

    /// Empty defaults of the variant `kind` carries
    pub fn for_kind(kind: ParameterType) -> Self {
        match kind {
            ParameterType::Number => Self::number(0.0, 0.0, 0.0, 0.0),
            ParameterType::Text => Self::Text { default: String::new() },
            _ => Self::None,
        }
    }

    /// Whether this variant is the one `kind` carries
    pub fn matches(&self, kind: ParameterType) -> bool {
        matches!(
            (self, kind),
            (Self::Number { .. }, ParameterType::Number) | (Self::Text { .. }, ParameterType::Text)
        ) || (matches!(self, Self::None) && !matches!(kind, ParameterType::Number | ParameterType::Text))
    }
}

/// One host-controllable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteParameter {
    pub group: String,
    pub display_name: String,
    /// Unique within a scene
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub defaults: ParameterDefaults,
    #[serde(default)]
    pub options: Vec<String>,
    /// DMX channel offset, -1 for auto
    pub dmx_offset: i32,
    pub dmx_type: DmxType,
    #[serde(default)]
    pub flags: ParameterFlags,
}

impl RemoteParameter {
    /// A number parameter with auto DMX addressing
    pub fn number(group: &str, display_name: &str, key: &str, min: f32, max: f32, step: f32, default: f32) -> Self {
        Self {
            group: group.to_string(),
            display_name: display_name.to_string(),
            key: key.to_string(),
            kind: ParameterType::Number,
            defaults: ParameterDefaults::number(min, max, step, default),
            options: Vec::new(),
            dmx_offset: -1,
            dmx_type: DmxType::Dmx16Be,
            flags: ParameterFlags::NONE,
        }
    }

    /// A text parameter
    pub fn text(group: &str, display_name: &str, key: &str, default: &str) -> Self {
        Self {
            group: group.to_string(),
            display_name: display_name.to_string(),
            key: key.to_string(),
            kind: ParameterType::Text,
            defaults: ParameterDefaults::Text {
                default: default.to_string(),
            },
            options: Vec::new(),
            dmx_offset: -1,
            dmx_type: DmxType::Default,
            flags: ParameterFlags::NONE,
        }
    }

    /// A parameter with empty defaults for its kind
    pub fn plain(group: &str, display_name: &str, key: &str, kind: ParameterType) -> Self {
        Self {
            group: group.to_string(),
            display_name: display_name.to_string(),
            key: key.to_string(),
            kind,
            defaults: ParameterDefaults::for_kind(kind),
            options: Vec::new(),
            dmx_offset: -1,
            dmx_type: DmxType::Default,
            flags: ParameterFlags::NONE,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_flags(mut self, flags: ParameterFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Parameters of one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneParameters {
    pub name: String,
    pub parameters: Vec<RemoteParameter>,
    /// Filled in by the plugin when the schema is published
    #[serde(default)]
    pub hash: u64,
}

impl SceneParameters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            hash: 0,
        }
    }

    /// Flat payload sizes for a frame of this scene
    pub fn layout(&self) -> ParameterLayout {
        let mut layout = ParameterLayout::default();
        for parameter in &self.parameters {
            match parameter.kind {
                ParameterType::Number | ParameterType::Pose | ParameterType::Transform => {
                    layout.numeric += parameter.kind.numeric_slots();
                }
                ParameterType::Image => layout.images += 1,
                ParameterType::Text => layout.texts += 1,
                ParameterType::Event | ParameterType::Skeleton => {}
            }
        }
        layout
    }
}

/// Expected payload sizes for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterLayout {
    /// f32 slots
    pub numeric: usize,
    pub images: usize,
    pub texts: usize,
}

/// Channels and scenes exchanged with the host
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Set semantics; order carries no meaning
    pub channels: Vec<String>,
    pub scenes: Vec<SceneParameters>,
}

impl Schema {
    /// The schema used when none could be loaded: no channels, one empty scene
    pub fn fallback() -> Self {
        Self {
            channels: Vec::new(),
            scenes: vec![SceneParameters::new("Default")],
        }
    }

    pub fn scene(&self, index: u32) -> Option<&SceneParameters> {
        self.scenes.get(index as usize)
    }

    /// Add a channel unless already present
    pub fn add_channel(&mut self, channel: impl Into<String>) {
        let channel = channel.into();
        if !self.channels.contains(&channel) {
            self.channels.push(channel);
        }
    }

    /// Compare ignoring channel order
    pub fn same_contract(&self, other: &Schema) -> bool {
        let mut mine = self.channels.clone();
        let mut theirs = other.channels.clone();
        mine.sort();
        theirs.sort();
        mine == theirs && self.scenes == other.scenes
    }
}
