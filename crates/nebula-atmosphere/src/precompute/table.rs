//! CPU-side RGBA float lookup tables with GPU-style filtering.

use std::sync::{Mutex, PoisonError};

use glam::{DVec2, DVec3, DVec4, UVec3};

use crate::error::AtmosphereError;

/// Size of a table. 2D tables have `depth == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableExtent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl TableExtent {
    pub const fn d2(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    pub const fn d3(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub fn is_3d(&self) -> bool {
        self.depth > 1
    }

    pub fn texel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.depth)
    }

    /// Bytes needed for RGBA32F storage.
    pub fn byte_size(&self) -> u64 {
        self.texel_count() * std::mem::size_of::<[f32; 4]>() as u64
    }
}

/// Running total of table memory checked against an optional limit.
#[derive(Debug, Default)]
pub struct MemoryBudget {
    limit: Option<u64>,
    used: u64,
}

impl MemoryBudget {
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, used: 0 }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    fn claim(&mut self, table: &str, bytes: u64) -> Result<(), AtmosphereError> {
        let total = self.used.saturating_add(bytes);
        if let Some(limit) = self.limit
            && total > limit
        {
            return Err(AtmosphereError::PrecomputationAllocation {
                table: table.to_string(),
                bytes,
                reason: format!("budget of {limit} bytes exceeded ({} already in use)", self.used),
            });
        }
        self.used = total;
        Ok(())
    }
}

/// An RGBA32F table, laid out x-fastest then y then z.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    label: String,
    extent: TableExtent,
    texels: Vec<[f32; 4]>,
}

impl Table {
    /// Allocate a zero-filled table, charging it to `budget`.
    ///
    /// # Errors
    ///
    /// Returns [`AtmosphereError::PrecomputationAllocation`] if the budget is
    /// exceeded or the allocator refuses the request.
    pub fn allocate(
        label: &str,
        extent: TableExtent,
        budget: &mut MemoryBudget,
    ) -> Result<Self, AtmosphereError> {
        let bytes = extent.byte_size();
        budget.claim(label, bytes)?;

        let len = usize::try_from(extent.texel_count()).map_err(|_| {
            AtmosphereError::PrecomputationAllocation {
                table: label.to_string(),
                bytes,
                reason: "size exceeds address space".to_string(),
            }
        })?;
        let mut texels = Vec::new();
        texels
            .try_reserve_exact(len)
            .map_err(|err| AtmosphereError::PrecomputationAllocation {
                table: label.to_string(),
                bytes,
                reason: err.to_string(),
            })?;
        texels.resize(len, [0.0; 4]);

        Ok(Self {
            label: label.to_string(),
            extent,
            texels,
        })
    }

    /// Wrap existing texels.
    ///
    /// # Panics
    ///
    /// Panics if `texels.len()` does not match `extent`.
    pub fn from_texels(label: &str, extent: TableExtent, texels: Vec<[f32; 4]>) -> Self {
        assert_eq!(
            texels.len() as u64,
            extent.texel_count(),
            "texel count does not match extent"
        );
        Self {
            label: label.to_string(),
            extent,
            texels,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn extent(&self) -> TableExtent {
        self.extent
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    /// Raw bytes for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let e = self.extent;
        (z as usize * e.height as usize + y as usize) * e.width as usize + x as usize
    }

    pub fn texel(&self, x: u32, y: u32, z: u32) -> DVec4 {
        let [r, g, b, a] = self.texels[self.index(x, y, z)];
        DVec4::new(f64::from(r), f64::from(g), f64::from(b), f64::from(a))
    }

    /// Bilinear sample at normalized `uv` with clamp-to-edge addressing.
    pub fn sample_2d(&self, uv: DVec2) -> DVec4 {
        let (x0, x1, fx) = filter_taps(uv.x, self.extent.width);
        let (y0, y1, fy) = filter_taps(uv.y, self.extent.height);
        let row0 = self.texel(x0, y0, 0).lerp(self.texel(x1, y0, 0), fx);
        let row1 = self.texel(x0, y1, 0).lerp(self.texel(x1, y1, 0), fx);
        row0.lerp(row1, fy)
    }

    /// Trilinear sample at normalized `uvw` with clamp-to-edge addressing.
    pub fn sample_3d(&self, uvw: DVec3) -> DVec4 {
        let (x0, x1, fx) = filter_taps(uvw.x, self.extent.width);
        let (y0, y1, fy) = filter_taps(uvw.y, self.extent.height);
        let (z0, z1, fz) = filter_taps(uvw.z, self.extent.depth);
        let plane = |z| {
            let row0 = self.texel(x0, y0, z).lerp(self.texel(x1, y0, z), fx);
            let row1 = self.texel(x0, y1, z).lerp(self.texel(x1, y1, z), fx);
            row0.lerp(row1, fy)
        };
        plane(z0).lerp(plane(z1), fz)
    }

    /// Replace every texel with `f(coord, current)`, spreading rows over
    /// `workers` threads. Each texel depends only on its coordinate and
    /// current value, so the result does not depend on `workers`.
    pub fn update<F>(&mut self, workers: usize, f: F)
    where
        F: Fn(UVec3, DVec4) -> DVec4 + Sync,
    {
        let Some(layout) = ChunkLayout::new(self.extent, workers) else {
            return;
        };
        let chunks: Vec<_> = self.texels.chunks_mut(layout.chunk_len).collect();
        run_chunks(chunks, &|chunk_index: usize, chunk: &mut [[f32; 4]]| {
            for (offset, texel) in chunk.iter_mut().enumerate() {
                let coord = layout.coord(chunk_index, offset);
                *texel = to_texel(f(coord, from_texel(*texel)));
            }
        });
    }

    /// Replace every texel with `f(coord)`.
    pub fn fill<F>(&mut self, workers: usize, f: F)
    where
        F: Fn(UVec3) -> DVec4 + Sync,
    {
        self.update(workers, |coord, _| f(coord));
    }

    /// Fill two tables of the same extent from one evaluation per texel.
    ///
    /// # Panics
    ///
    /// Panics if the extents differ.
    pub fn fill_pair<F>(first: &mut Table, second: &mut Table, workers: usize, f: F)
    where
        F: Fn(UVec3) -> (DVec4, DVec4) + Sync,
    {
        assert_eq!(first.extent, second.extent, "paired tables must match");
        let Some(layout) = ChunkLayout::new(first.extent, workers) else {
            return;
        };
        let chunks: Vec<_> = first
            .texels
            .chunks_mut(layout.chunk_len)
            .zip(second.texels.chunks_mut(layout.chunk_len))
            .collect();
        run_chunks(
            chunks,
            &|chunk_index: usize, (a, b): (&mut [[f32; 4]], &mut [[f32; 4]])| {
                for (offset, (ta, tb)) in a.iter_mut().zip(b.iter_mut()).enumerate() {
                    let (va, vb) = f(layout.coord(chunk_index, offset));
                    *ta = to_texel(va);
                    *tb = to_texel(vb);
                }
            },
        );
    }
}

fn from_texel([r, g, b, a]: [f32; 4]) -> DVec4 {
    DVec4::new(f64::from(r), f64::from(g), f64::from(b), f64::from(a))
}

fn to_texel(v: DVec4) -> [f32; 4] {
    v.as_vec4().to_array()
}

/// Split of a table into contiguous runs of whole rows.
#[derive(Clone, Copy)]
struct ChunkLayout {
    width: usize,
    height: usize,
    chunk_len: usize,
}

impl ChunkLayout {
    fn new(extent: TableExtent, workers: usize) -> Option<Self> {
        let width = extent.width as usize;
        let height = extent.height as usize;
        let rows = height * extent.depth as usize;
        if rows == 0 || width == 0 {
            return None;
        }
        let rows_per_chunk = rows.div_ceil(workers.clamp(1, rows));
        Some(Self {
            width,
            height,
            chunk_len: rows_per_chunk * width,
        })
    }

    fn coord(&self, chunk_index: usize, offset: usize) -> UVec3 {
        let linear = chunk_index * self.chunk_len + offset;
        let row = linear / self.width;
        UVec3::new(
            (linear % self.width) as u32,
            (row % self.height) as u32,
            (row / self.height) as u32,
        )
    }
}

/// Run `work` on every chunk, one named worker thread per chunk. A chunk
/// whose worker cannot be spawned runs on the calling thread.
fn run_chunks<S, W>(chunks: Vec<S>, work: &W)
where
    S: Send,
    W: Fn(usize, S) + Sync,
{
    let slots: Vec<Mutex<Option<S>>> = chunks.into_iter().map(|c| Mutex::new(Some(c))).collect();
    let take = |slot: &Mutex<Option<S>>| slot.lock().unwrap_or_else(PoisonError::into_inner).take();

    std::thread::scope(|scope| {
        for (chunk_index, slot) in slots.iter().enumerate() {
            let spawned = std::thread::Builder::new()
                .name(format!("precompute-{chunk_index}"))
                .spawn_scoped(scope, move || {
                    if let Some(chunk) = take(slot) {
                        work(chunk_index, chunk);
                    }
                });
            if let Err(err) = spawned {
                tracing::warn!(error = %err, chunk_index, "worker spawn failed, running inline");
                if let Some(chunk) = take(slot) {
                    work(chunk_index, chunk);
                }
            }
        }
    });
}

/// Texel indices and blend weight for linear filtering of `u` over `size`
/// texels whose centers sit at `(i + 0.5) / size`.
fn filter_taps(u: f64, size: u32) -> (u32, u32, f64) {
    let max = size.saturating_sub(1);
    let x = (u * f64::from(size) - 0.5).clamp(0.0, f64::from(max));
    let x0 = x.floor() as u32;
    let x1 = (x0 + 1).min(max);
    (x0, x1, x - f64::from(x0))
}
