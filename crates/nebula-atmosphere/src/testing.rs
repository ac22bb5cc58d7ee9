//! Collaborator doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glam::Vec3;

use crate::error::AtmosphereError;
use crate::params::AtmosphereParameters;
use crate::precompute::{MemoryBudget, PrecomputedTables, Table, TableExtent, TableGenerator};
use crate::render::{GeometryBuffer, LightSource, MaterialInstance, RenderDevice, UniformValue};
use crate::spectrum::SpectralTable;

/// One call observed on a recording double.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    UseProgram,
    BindMaterialInstance,
    Uniform(String, UniformValue),
    BindVertexBuffer,
    DrawElements { index_count: u32 },
}

/// Material instance that records every call in order.
pub struct RecordingMaterial {
    name: String,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingMaterial {
    pub fn new(name: &str) -> Self {
        Self::with_log(name, Arc::default())
    }

    pub fn with_log(name: &str, calls: Arc<Mutex<Vec<Call>>>) -> Self {
        Self {
            name: name.to_string(),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Last value bound to `uniform`.
    pub fn uniform(&self, uniform: &str) -> Option<UniformValue> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Call::Uniform(name, value) if name == uniform => Some(value),
            _ => None,
        })
    }
}

impl MaterialInstance for RecordingMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn use_program(&self) {
        self.calls.lock().unwrap().push(Call::UseProgram);
    }

    fn bind_material_instance(&self) {
        self.calls.lock().unwrap().push(Call::BindMaterialInstance);
    }

    fn bind_uniform(&self, name: &str, value: UniformValue) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Uniform(name.to_string(), value));
    }
}

/// Geometry that appends its calls to a shared log.
pub struct RecordingGeometry {
    vertex_count: u32,
    index_count: u32,
    calls: Arc<Mutex<Vec<Call>>>,
    alive: Arc<AtomicUsize>,
}

impl GeometryBuffer for RecordingGeometry {
    fn bind_vertex_buffer(&self) {
        self.calls.lock().unwrap().push(Call::BindVertexBuffer);
    }

    fn draw_elements(&self) {
        self.calls.lock().unwrap().push(Call::DrawElements {
            index_count: self.index_count,
        });
    }

    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Drop for RecordingGeometry {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Render device producing [`RecordingGeometry`].
#[derive(Default)]
pub struct RecordingDevice {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub alive: Arc<AtomicUsize>,
    pub created: Mutex<Vec<(String, Vec<[f32; 4]>, Vec<u32>)>>,
    pub fail: bool,
}

impl RecordingDevice {
    pub fn with_log(calls: Arc<Mutex<Vec<Call>>>) -> Self {
        Self {
            calls,
            ..Default::default()
        }
    }

    pub fn live_geometry(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }
}

impl RenderDevice for RecordingDevice {
    fn create_geometry(
        &self,
        label: &str,
        positions: &[[f32; 4]],
        indices: &[u32],
    ) -> Result<Box<dyn GeometryBuffer>, AtmosphereError> {
        if self.fail {
            return Err(AtmosphereError::GeometryCreation(format!(
                "{label}: device lost"
            )));
        }
        self.created
            .lock()
            .unwrap()
            .push((label.to_string(), positions.to_vec(), indices.to_vec()));
        self.alive.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingGeometry {
            vertex_count: positions.len() as u32,
            index_count: indices.len() as u32,
            calls: Arc::clone(&self.calls),
            alive: Arc::clone(&self.alive),
        }))
    }
}

pub struct FixedLight(pub Vec3);

impl LightSource for FixedLight {
    fn forward(&self) -> Vec3 {
        self.0
    }
}

/// Generator producing tiny constant tables and counting its invocations.
#[derive(Default)]
pub struct CountingGenerator {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl CountingGenerator {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TableGenerator for CountingGenerator {
    fn generate(
        &self,
        params: &AtmosphereParameters,
        _spectrum: &SpectralTable,
    ) -> Result<PrecomputedTables, AtmosphereError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(AtmosphereError::PrecomputationAllocation {
                table: "scattering".to_string(),
                bytes: 1 << 40,
                reason: "budget exceeded".to_string(),
            });
        }
        let mut budget = MemoryBudget::default();
        let d2 = TableExtent::d2(2, 2);
        let d3 = TableExtent::d3(2, 2, 2);
        Ok(PrecomputedTables {
            transmittance: Table::allocate("transmittance", d2, &mut budget)?,
            scattering: Table::allocate("scattering", d3, &mut budget)?,
            irradiance: Table::allocate("irradiance", d2, &mut budget)?,
            single_mie_scattering: if params.options.use_combined_textures {
                None
            } else {
                Some(Table::allocate("single_mie_scattering", d3, &mut budget)?)
            },
        })
    }
}
