//! Runtime tunables and the closed attribute table exposed to tools and
//! scene persistence.

use glam::Vec3;
use nebula_config::ScalarValue;

/// Per-instance state mutable after initialization.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeState {
    pub is_render_atmosphere: bool,
    pub atmosphere_exposure: f32,
    /// Follows the main light; zero until the first `update`. Not a
    /// persisted attribute.
    pub sun_direction: Vec3,
    pub cloud_altitude: f32,
    pub cloud_height: f32,
    pub cloud_speed: f32,
    pub cloud_absorption: f32,
    pub cloud_contrast: f32,
    pub cloud_coverage: f32,
    pub cloud_tiling: f32,
    pub noise_contrast: f32,
    pub noise_coverage: f32,
    pub noise_tiling: f32,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            is_render_atmosphere: true,
            atmosphere_exposure: 0.0001,
            sun_direction: Vec3::ZERO,
            cloud_altitude: 100.0,
            cloud_height: 500.0,
            cloud_speed: 0.01,
            cloud_absorption: 0.15,
            cloud_contrast: 2.0,
            cloud_coverage: 0.9,
            cloud_tiling: 0.0004,
            noise_contrast: 1.0,
            noise_coverage: 1.0,
            noise_tiling: 0.0003,
        }
    }
}

/// One whitelisted attribute.
pub struct Attribute {
    pub name: &'static str,
    get: fn(&RuntimeState) -> ScalarValue,
    set: fn(&mut RuntimeState, ScalarValue) -> bool,
}

fn assign_f32(slot: &mut f32, value: ScalarValue) -> bool {
    match value.as_f32() {
        Some(v) if v.is_finite() => {
            *slot = v;
            true
        }
        _ => false,
    }
}

macro_rules! float_attribute {
    ($field:ident) => {
        Attribute {
            name: stringify!($field),
            get: |state| ScalarValue::from(state.$field),
            set: |state, value| assign_f32(&mut state.$field, value),
        }
    };
}

/// The closed set of attributes, in presentation order.
pub const ATTRIBUTES: [Attribute; 12] = [
    Attribute {
        name: "is_render_atmosphere",
        get: |state| ScalarValue::Bool(state.is_render_atmosphere),
        set: |state, value| match value.as_bool() {
            Some(v) => {
                state.is_render_atmosphere = v;
                true
            }
            None => false,
        },
    },
    float_attribute!(atmosphere_exposure),
    float_attribute!(cloud_altitude),
    float_attribute!(cloud_height),
    float_attribute!(cloud_tiling),
    float_attribute!(cloud_speed),
    float_attribute!(cloud_contrast),
    float_attribute!(cloud_coverage),
    float_attribute!(cloud_absorption),
    float_attribute!(noise_tiling),
    float_attribute!(noise_contrast),
    float_attribute!(noise_coverage),
];

/// Outcome of writing an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeWrite {
    Applied,
    UnknownName,
    /// The name is known but the value has the wrong type or an index was
    /// given for a scalar.
    Rejected,
}

pub fn find(name: &str) -> Option<&'static Attribute> {
    ATTRIBUTES.iter().find(|attribute| attribute.name == name)
}

impl RuntimeState {
    pub fn get(&self, name: &str) -> Option<ScalarValue> {
        find(name).map(|attribute| (attribute.get)(self))
    }

    /// Write one attribute. Every whitelisted attribute is a scalar, so only
    /// `index` `None` or `Some(0)` addresses it.
    pub fn set(&mut self, name: &str, value: ScalarValue, index: Option<usize>) -> AttributeWrite {
        let Some(attribute) = find(name) else {
            return AttributeWrite::UnknownName;
        };
        if index.is_some_and(|i| i != 0) {
            return AttributeWrite::Rejected;
        }
        if (attribute.set)(self, value) {
            AttributeWrite::Applied
        } else {
            AttributeWrite::Rejected
        }
    }

    /// `(name, value)` of every attribute, in presentation order.
    pub fn attributes(&self) -> Vec<(&'static str, ScalarValue)> {
        ATTRIBUTES
            .iter()
            .map(|attribute| (attribute.name, (attribute.get)(self)))
            .collect()
    }
}
