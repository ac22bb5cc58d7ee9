//! Atmosphere error types.

use std::fmt;

/// Kind of external resource an atmosphere resolves by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Texture,
    Material,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Texture => "texture",
            ResourceKind::Material => "material instance",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of an [`Atmosphere`](crate::Atmosphere).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtmosphereState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

impl fmt::Display for AtmosphereState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors raised while building or initializing an atmosphere.
#[derive(Debug, thiserror::Error)]
pub enum AtmosphereError {
    /// A required handle could not be resolved from the resource store.
    #[error("could not resolve {kind} '{name}'")]
    ResourceResolution { kind: ResourceKind, name: String },

    /// Table storage could not be allocated during precomputation.
    #[error("failed to allocate {bytes} bytes for table '{table}': {reason}")]
    PrecomputationAllocation {
        table: String,
        bytes: u64,
        reason: String,
    },

    /// The render device could not create the quad geometry.
    #[error("failed to create geometry: {0}")]
    GeometryCreation(String),

    /// An operation was attempted in the wrong lifecycle state.
    #[error("atmosphere is {actual}, expected {expected}")]
    InvalidState {
        expected: AtmosphereState,
        actual: AtmosphereState,
    },

    /// Physical parameters or overlay values are inconsistent.
    #[error("invalid atmosphere parameters: {0}")]
    InvalidParameters(String),
}

impl AtmosphereError {
    pub(crate) fn missing(kind: ResourceKind, name: impl Into<String>) -> Self {
        AtmosphereError::ResourceResolution {
            kind,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_resource() {
        let err = AtmosphereError::missing(ResourceKind::Material, "precomputed_atmosphere.atmosphere");
        assert_eq!(
            err.to_string(),
            "could not resolve material instance 'precomputed_atmosphere.atmosphere'"
        );

        let err = AtmosphereError::InvalidState {
            expected: AtmosphereState::Uninitialized,
            actual: AtmosphereState::Ready,
        };
        assert_eq!(err.to_string(), "atmosphere is Ready, expected Uninitialized");
    }
}
