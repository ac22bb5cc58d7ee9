//! GPU residency: table upload to `Rgba32Float` textures and the wgpu-backed
//! render device that draws the sky quad.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::cache::TableHandles;
use crate::error::{AtmosphereError, ResourceKind};
use crate::precompute::{Table, TableExtent, TableKind};
use crate::render::{GeometryBuffer, RenderDevice};
use crate::store::MemoryResourceStore;

/// Texel format of every precomputed table.
pub const TABLE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

const TEXEL_BYTES: u32 = 16;

/// Vertex of the full-screen quad: a clip-space position.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 4],
}

static_assertions::assert_eq_size!(QuadVertex, [f32; 4]);

impl QuadVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x4,
            }],
        }
    }
}

fn texture_size(extent: TableExtent) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: extent.width,
        height: extent.height,
        depth_or_array_layers: extent.depth,
    }
}

/// Descriptor of the texture holding a table of `extent`.
pub fn table_texture_descriptor(label: &str, extent: TableExtent) -> wgpu::TextureDescriptor<'_> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: texture_size(extent),
        mip_level_count: 1,
        sample_count: 1,
        dimension: if extent.is_3d() {
            wgpu::TextureDimension::D3
        } else {
            wgpu::TextureDimension::D2
        },
        format: TABLE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

/// A table resident on the GPU.
pub struct GpuTable {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub extent: TableExtent,
}

/// Upload one table. All depth slices of a 3D table go in a single copy.
pub fn upload_table(device: &wgpu::Device, queue: &wgpu::Queue, table: &Table) -> GpuTable {
    let extent = table.extent();
    let texture = device.create_texture(&table_texture_descriptor(table.label(), extent));

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        table.as_bytes(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(extent.width * TEXEL_BYTES),
            rows_per_image: Some(extent.height),
        },
        texture_size(extent),
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    tracing::debug!(
        table = table.label(),
        width = extent.width,
        height = extent.height,
        depth = extent.depth,
        "uploaded atmosphere table"
    );
    GpuTable {
        texture,
        view,
        extent,
    }
}

/// The tables of one resolved set, uploaded, plus the sampler they are read
/// with.
pub struct GpuTableSet {
    pub tables: BTreeMap<TableKind, GpuTable>,
    pub sampler: wgpu::Sampler,
}

impl GpuTableSet {
    /// Upload every table of `handles` from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AtmosphereError::ResourceResolution`] if a handle has no
    /// table data in the store.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        store: &MemoryResourceStore,
        handles: &TableHandles,
    ) -> Result<Self, AtmosphereError> {
        let mut tables = BTreeMap::new();
        for (kind, handle) in handles.iter() {
            let data = store
                .texture_data(handle.name())
                .ok_or_else(|| AtmosphereError::missing(ResourceKind::Texture, handle.name()))?;
            tables.insert(kind, upload_table(device, queue, &data));
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atmosphere-table-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        tracing::info!(tables = tables.len(), "atmosphere tables resident on GPU");
        Ok(Self { tables, sampler })
    }

    pub fn get(&self, kind: TableKind) -> Option<&GpuTable> {
        self.tables.get(&kind)
    }
}

/// Check that `indices` form whole triangles over `positions`.
pub fn validate_geometry(positions: &[[f32; 4]], indices: &[u32]) -> Result<(), AtmosphereError> {
    if positions.is_empty() || indices.is_empty() {
        return Err(AtmosphereError::GeometryCreation(
            "geometry needs at least one vertex and one index".to_string(),
        ));
    }
    if indices.len() % 3 != 0 {
        return Err(AtmosphereError::GeometryCreation(format!(
            "{} indices do not form whole triangles",
            indices.len()
        )));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
        return Err(AtmosphereError::GeometryCreation(format!(
            "index {bad} out of range for {} vertices",
            positions.len()
        )));
    }
    Ok(())
}

struct GeometryBuffers {
    label: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    vertex_count: u32,
    index_count: u32,
}

/// Bind and draw state shared by a [`WgpuRenderDevice`] and its geometry.
#[derive(Default)]
struct DrawState {
    bound: Option<Arc<GeometryBuffers>>,
    queued: Vec<Arc<GeometryBuffers>>,
}

/// Geometry created by [`WgpuRenderDevice`]. Draws are recorded against the
/// geometry bound at the time and encoded by [`WgpuRenderDevice::encode`].
pub struct WgpuGeometry {
    buffers: Arc<GeometryBuffers>,
    state: Arc<Mutex<DrawState>>,
}

impl GeometryBuffer for WgpuGeometry {
    fn bind_vertex_buffer(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).bound =
            Some(Arc::clone(&self.buffers));
    }

    fn draw_elements(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.bound.clone() {
            Some(bound) => state.queued.push(bound),
            None => tracing::warn!(
                geometry = %self.buffers.label,
                "draw_elements without a bound vertex buffer, skipped"
            ),
        }
    }

    fn vertex_count(&self) -> u32 {
        self.buffers.vertex_count
    }

    fn index_count(&self) -> u32 {
        self.buffers.index_count
    }
}

impl Drop for WgpuGeometry {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state
            .bound
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, &self.buffers))
        {
            state.bound = None;
        }
    }
}

/// Pipeline drawing [`QuadVertex`] geometry into a single color target.
pub fn quad_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    layout: Option<&wgpu::PipelineLayout>,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout,
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[QuadVertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

/// [`RenderDevice`] backed by a wgpu device.
///
/// The component's render path binds and draws through [`GeometryBuffer`];
/// the frame owner then calls [`WgpuRenderDevice::encode`] inside its render
/// pass, or [`WgpuRenderDevice::submit`] to draw into a target on its own.
pub struct WgpuRenderDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    state: Arc<Mutex<DrawState>>,
}

impl WgpuRenderDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            state: Arc::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Draws recorded and not yet encoded.
    pub fn pending_draws(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queued
            .len()
    }

    /// Encode every recorded draw into `pass`, in recording order, with the
    /// pipeline and bind groups already set by the caller. Returns the number
    /// of draws encoded.
    pub fn encode(&self, pass: &mut wgpu::RenderPass<'_>) -> usize {
        let queued = std::mem::take(
            &mut self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .queued,
        );
        let mut current: Option<&Arc<GeometryBuffers>> = None;
        for buffers in &queued {
            if !current.is_some_and(|c| Arc::ptr_eq(c, buffers)) {
                pass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
                pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                current = Some(buffers);
            }
            pass.draw_indexed(0..buffers.index_count, 0, 0..1);
        }
        queued.len()
    }

    /// Draw every recorded draw into `target` with `pipeline` in one render
    /// pass, keeping the target's contents, and submit it. Returns the number
    /// of draws submitted.
    pub fn submit(
        &self,
        pipeline: &wgpu::RenderPipeline,
        bind_groups: &[&wgpu::BindGroup],
        target: &wgpu::TextureView,
    ) -> usize {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("atmosphere-encoder"),
            });
        let draws = {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("atmosphere-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
            pass.set_pipeline(pipeline);
            for (index, bind_group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(index as u32, *bind_group, &[]);
            }
            self.encode(&mut pass)
        };
        self.queue.submit(std::iter::once(encoder.finish()));
        tracing::trace!(draws, "atmosphere draws submitted");
        draws
    }
}

impl RenderDevice for WgpuRenderDevice {
    fn create_geometry(
        &self,
        label: &str,
        positions: &[[f32; 4]],
        indices: &[u32],
    ) -> Result<Box<dyn GeometryBuffer>, AtmosphereError> {
        validate_geometry(positions, indices)?;
        let vertices: Vec<QuadVertex> = positions
            .iter()
            .map(|&position| QuadVertex { position })
            .collect();

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-vertices")),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Ok(Box::new(WgpuGeometry {
            buffers: Arc::new(GeometryBuffers {
                label: label.to_string(),
                vertex_buffer,
                index_buffer,
                vertex_count: positions.len() as u32,
                index_count: indices.len() as u32,
            }),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Create a test GPU device and queue. Returns `None` if no GPU is available.
#[cfg(test)]
pub(crate) fn create_test_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;

        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("atmosphere-test-device"),
                ..Default::default()
            })
            .await
            .ok()
    })
}
