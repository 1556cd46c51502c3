//! Typed parameter binder
//!
//! [`bind`] walks a scene's ordered parameter list once and pairs every
//! remote parameter with a registered field, regrouping `_x/_y/_z/_w` and
//! `_r/_g/_b/_a` component keys into vector and colour fields. The result is
//! resolved once per scene load. [`BoundFields::apply`] then distributes a
//! frame's flat payload over those fields.
//!
//! Grouping only looks at the keys immediately following a component key.
//! Components out of order are not regrouped; each falls back to single-key
//! binding and, failing that, stays unbound.

use crate::error::{BridgeError, Result};
use crate::fields::{FieldAccessor, FieldClass, FieldKind, FieldValue, ImageTarget, Setter, TargetRegistry};
use crate::frame::ImageDescriptor;
use crate::schema::{ParameterType, RemoteParameter, SceneParameters};
use parking_lot::Mutex;
use std::sync::Arc;
use void_renderstream_sys::{ffi, RenderStreamApi};

/// One entry of a bound payload list
#[derive(Clone)]
pub enum BoundField {
    /// A numeric or text field
    Value {
        key: String,
        kind: FieldKind,
        setter: Setter,
    },
    Image {
        key: String,
        target: Arc<Mutex<dyn ImageTarget>>,
    },
    /// A parameter with no destination; keeps its payload position
    Unbound { key: String, slots: usize },
}

impl BoundField {
    pub fn key(&self) -> &str {
        match self {
            BoundField::Value { key, .. } | BoundField::Image { key, .. } | BoundField::Unbound { key, .. } => key,
        }
    }

    /// Numeric slots consumed
    pub fn slots(&self) -> usize {
        match self {
            BoundField::Value { kind, .. } => kind.slots(),
            BoundField::Image { .. } => 0,
            BoundField::Unbound { slots, .. } => *slots,
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self, BoundField::Unbound { .. })
    }
}

impl std::fmt::Debug for BoundField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundField::Value { key, kind, .. } => f.debug_struct("Value").field("key", key).field("kind", kind).finish(),
            BoundField::Image { key, .. } => f.debug_struct("Image").field("key", key).finish(),
            BoundField::Unbound { key, slots } => f.debug_struct("Unbound").field("key", key).field("slots", slots).finish(),
        }
    }
}

/// A scene's parameters resolved to fields, split by payload
#[derive(Debug, Clone, Default)]
pub struct BoundFields {
    pub numerical: Vec<BoundField>,
    pub images: Vec<BoundField>,
    pub texts: Vec<BoundField>,
    /// Keys that resolved to no field
    pub unbound: Vec<String>,
}

/// How far each payload cursor advanced during an apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyReport {
    pub numeric_slots: usize,
    pub images: usize,
    pub texts: usize,
    /// Images the plugin failed to copy
    pub failed_images: usize,
}

/// One frame's parameter payload for a scene
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramePayload {
    pub numeric: Vec<f32>,
    pub images: Vec<ImageDescriptor>,
    pub texts: Vec<String>,
}

impl FramePayload {
    /// Fetch everything the scene's layout declares.
    ///
    /// Fails as a whole if any of the fetches fails.
    pub fn fetch(api: &dyn RenderStreamApi, scene: &SceneParameters) -> Result<Self> {
        let layout = scene.layout();

        let mut numeric = vec![0.0f32; layout.numeric];
        if !numeric.is_empty() {
            api.get_frame_parameters(scene.hash, &mut numeric).into_result()?;
        }

        let mut raw_images = vec![ffi::ImageFrameData::default(); layout.images];
        if !raw_images.is_empty() {
            api.get_frame_image_data(scene.hash, &mut raw_images).into_result()?;
        }

        let texts = (0..layout.texts as u32)
            .map(|index| api.frame_text(scene.hash, index))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            numeric,
            images: raw_images.into_iter().map(ImageDescriptor::from).collect(),
            texts,
        })
    }
}

/// Resolve every parameter of `scene` against the registered targets
pub fn bind(scene: &SceneParameters, targets: &TargetRegistry) -> BoundFields {
    let parameters = &scene.parameters;
    let mut fields = BoundFields::default();
    let mut index = 0;

    while index < parameters.len() {
        let parameter = &parameters[index];

        if let Some((field, consumed)) = bind_group(parameters, index, targets) {
            fields.numerical.push(field);
            index += consumed;
            continue;
        }

        match bind_single(parameter, targets) {
            Some(field) => match field {
                BoundField::Image { .. } => fields.images.push(field),
                BoundField::Value { kind, .. } if kind.class() == FieldClass::Text => fields.texts.push(field),
                _ => fields.numerical.push(field),
            },
            None => {
                log::error!("Unhandled remote parameter: {}", parameter.key);
                fields.unbound.push(parameter.key.clone());
                let placeholder = BoundField::Unbound {
                    key: parameter.key.clone(),
                    slots: parameter.kind.numeric_slots(),
                };
                match parameter.kind {
                    ParameterType::Number | ParameterType::Pose | ParameterType::Transform => {
                        fields.numerical.push(placeholder)
                    }
                    ParameterType::Image => fields.images.push(placeholder),
                    ParameterType::Text => fields.texts.push(placeholder),
                    ParameterType::Event | ParameterType::Skeleton => {}
                }
            }
        }
        index += 1;
    }

    log::debug!(
        "Bound scene '{}': {} numerical, {} images, {} texts, {} unbound",
        scene.name,
        fields.numerical.len(),
        fields.images.len(),
        fields.texts.len(),
        fields.unbound.len()
    );
    fields
}

/// Try to regroup component keys starting at `index` into one vector or
/// colour field; returns the field and how many parameters it consumed
fn bind_group(parameters: &[RemoteParameter], index: usize, targets: &TargetRegistry) -> Option<(BoundField, usize)> {
    let key = parameters[index].key.as_str();
    let base = key.strip_suffix("_x").or_else(|| key.strip_suffix("_r"))?;
    let field = targets.field(base)?;

    let FieldAccessor::Value { kind, setter } = &field.accessor else {
        return None;
    };
    let suffixes = kind.component_suffixes();
    // `_x` never starts a colour and `_r` never starts a vector
    if suffixes.is_empty() || !key.ends_with(suffixes[0]) {
        return None;
    }

    let components = parameters.get(index..index + suffixes.len())?;
    let grouped = components.iter().zip(suffixes).all(|(parameter, suffix)| {
        parameter.kind == ParameterType::Number
            && parameter.key.strip_prefix(base) == Some(*suffix)
    });
    if !grouped {
        return None;
    }

    Some((
        BoundField::Value {
            key: base.to_string(),
            kind: *kind,
            setter: setter.clone(),
        },
        suffixes.len(),
    ))
}

fn bind_single(parameter: &RemoteParameter, targets: &TargetRegistry) -> Option<BoundField> {
    let field = targets.field(&parameter.key)?;
    let kind = field.accessor.kind();
    if !kind.accepts(parameter.kind) {
        log::warn!(
            "Parameter '{}' of type {:?} cannot drive a {:?} field",
            parameter.key,
            parameter.kind,
            kind
        );
        return None;
    }

    Some(match &field.accessor {
        FieldAccessor::Value { kind, setter } => BoundField::Value {
            key: parameter.key.clone(),
            kind: *kind,
            setter: setter.clone(),
        },
        FieldAccessor::Image(target) => BoundField::Image {
            key: parameter.key.clone(),
            target: target.clone(),
        },
    })
}

impl BoundFields {
    /// Total numeric slots the bound list consumes
    pub fn numeric_slots(&self) -> usize {
        self.numerical.iter().map(BoundField::slots).sum()
    }

    /// Check the numeric payload covers every field before anything is set
    fn check_numeric(&self, available: usize) -> Result<()> {
        let mut offset = 0;
        for field in &self.numerical {
            let needed = field.slots();
            if offset + needed > available {
                return Err(BridgeError::OutOfRange {
                    key: field.key().to_string(),
                    offset,
                    needed,
                    available: available - offset.min(available),
                });
            }
            offset += needed;
        }
        Ok(())
    }

    /// Distribute one frame's payload: numeric first, then images, then texts
    pub fn apply(&self, payload: &FramePayload, api: &dyn RenderStreamApi) -> Result<ApplyReport> {
        self.check_numeric(payload.numeric.len())?;
        let mut report = ApplyReport::default();

        for field in &self.numerical {
            let slots = &payload.numeric[report.numeric_slots..report.numeric_slots + field.slots()];
            if let BoundField::Value { kind, setter, .. } = field {
                if let Some(value) = kind.decode(slots) {
                    setter(value);
                }
            }
            report.numeric_slots += field.slots();
        }

        for (field, descriptor) in self.images.iter().zip(&payload.images) {
            if let BoundField::Image { key, target } = field {
                let mut target = target.lock();
                if !target.matches(descriptor) {
                    target.recreate(descriptor);
                }
                let frame = target.frame_buffer().to_sender_frame();
                let code = api.get_frame_image(descriptor.image_id, &frame);
                if code.is_success() {
                    target.image_updated();
                } else {
                    log::warn!("Failed to fetch image '{}': {}", key, code);
                    report.failed_images += 1;
                }
            }
            report.images += 1;
        }

        for (field, text) in self.texts.iter().zip(&payload.texts) {
            if let BoundField::Value { kind, setter, .. } = field {
                let value = match kind {
                    FieldKind::TextArray => FieldValue::TextArray(text.split(' ').map(str::to_string).collect()),
                    _ => FieldValue::Text(text.clone()),
                };
                setter(value);
            }
            report.texts += 1;
        }

        Ok(report)
    }
}
