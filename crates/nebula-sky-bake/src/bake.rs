//! Table generation, previews and optional GPU upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use nebula_atmosphere::gpu::GpuTableSet;
use nebula_atmosphere::{
    AtmosphereError, AtmosphereParameters, MemoryResourceStore, ModelOptions, PrecomputeEngine,
    ResourceKind, SpectralTable, TableCache, TableHandles, sample_spectrum,
};
use nebula_config::{AtmosphereConfig, ConfigError};
use tracing::{info, warn};

use crate::manifest::{Manifest, ManifestEntry};
use crate::platform::PlatformError;
use crate::preview::{preview_slice, write_png};

/// File name of the manifest inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.ron";

#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Atmosphere(#[from] AtmosphereError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode preview {path}: {source}")]
    Png {
        path: PathBuf,
        source: png::EncodingError,
    },

    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] ron::Error),

    #[error("no GPU adapter available for table upload")]
    NoGpu,
}

/// Result of a successful bake.
#[derive(Debug)]
pub struct BakeOutcome {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    /// Whether the tables were generated by this run.
    pub generated: bool,
    /// Number of tables uploaded to the GPU, if an upload was requested.
    pub uploaded: Option<usize>,
}

/// Generate the tables described by `config` and write previews plus a
/// manifest into `output_dir`.
pub fn bake(config: &AtmosphereConfig, output_dir: &Path, upload: bool) -> Result<BakeOutcome, BakeError> {
    let start = Instant::now();
    let mut options = ModelOptions::from_overlay(&config.overlay)?;
    options.resolution = config.table_resolution;
    let params = AtmosphereParameters::earth(options);
    params.validate()?;
    let spectrum = SpectralTable::from_samples(&sample_spectrum(params.spectrum_options()));

    let store = Arc::new(MemoryResourceStore::new());
    let engine = PrecomputeEngine::new().with_memory_budget(config.table_memory_budget_bytes());
    info!(
        workers = engine.workers(),
        resolution = ?config.table_resolution,
        luminance = options.luminance.as_str(),
        "baking atmosphere tables"
    );
    let cache = TableCache::new(store.clone(), Arc::new(engine));
    let resolved = cache.resolve(&params, &spectrum)?;

    std::fs::create_dir_all(output_dir).map_err(|source| BakeError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut tables = Vec::new();
    for (kind, handle) in resolved.handles.iter() {
        let data = store
            .texture_data(handle.name())
            .ok_or_else(|| AtmosphereError::ResourceResolution {
                kind: ResourceKind::Texture,
                name: handle.name().to_string(),
            })?;
        let preview = format!("{}.png", handle.name());
        write_png(&output_dir.join(&preview), &preview_slice(&data))?;

        let extent = data.extent();
        tables.push(ManifestEntry {
            kind: kind.as_str().to_string(),
            resource: handle.name().to_string(),
            width: extent.width,
            height: extent.height,
            depth: extent.depth,
            bytes: extent.byte_size(),
            preview,
        });
    }

    let manifest = Manifest {
        variant: resolved.key.variant().to_string(),
        luminance: options.luminance.as_str().to_string(),
        wavelengths: params.num_precomputed_wavelengths(),
        tables,
    };
    let manifest_path = output_dir.join(MANIFEST_FILE);
    std::fs::write(&manifest_path, manifest.to_ron()?).map_err(|source| BakeError::Io {
        path: manifest_path.clone(),
        source,
    })?;

    let uploaded = if upload {
        Some(upload_tables(&store, &resolved.handles)?)
    } else {
        None
    };

    info!(
        tables = manifest.tables.len(),
        bytes = manifest.total_bytes(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        output = %output_dir.display(),
        "bake finished"
    );
    Ok(BakeOutcome {
        manifest,
        manifest_path,
        generated: resolved.generated,
        uploaded,
    })
}

fn request_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("sky-bake-device"),
                ..Default::default()
            })
            .await
            .ok()
    })
}

/// Upload the resolved tables to a headless device and wait for the copies.
fn upload_tables(store: &MemoryResourceStore, handles: &TableHandles) -> Result<usize, BakeError> {
    let Some((device, queue)) = request_device() else {
        warn!("no GPU adapter found, skipping upload");
        return Err(BakeError::NoGpu);
    };
    let set = GpuTableSet::upload(&device, &queue, store, handles)?;
    queue.submit([]);
    let _ = device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    });
    Ok(set.tables.len())
}
