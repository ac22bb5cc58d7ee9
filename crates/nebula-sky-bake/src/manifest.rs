//! RON manifest describing a baked table set.

use serde::{Deserialize, Serialize};

/// One baked table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Table kind, e.g. `scattering`.
    pub kind: String,
    /// Canonical resource name.
    pub resource: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub bytes: u64,
    /// Preview file name, relative to the manifest.
    pub preview: String,
}

/// Everything written by one bake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub variant: String,
    pub luminance: String,
    pub wavelengths: usize,
    pub tables: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);
        ron::ser::to_string_pretty(self, pretty)
    }

    pub fn total_bytes(&self) -> u64 {
        self.tables.iter().map(|t| t.bytes).sum()
    }
}
