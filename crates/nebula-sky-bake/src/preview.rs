//! 8-bit PNG previews of the lookup tables.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use nebula_atmosphere::Table;

use crate::bake::BakeError;

/// RGBA8 image of one table slice.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Tone-map the middle depth slice of `table` (the only slice of a 2D
/// table). Values are normalised by the slice maximum and gamma encoded.
pub fn preview_slice(table: &Table) -> PreviewImage {
    let extent = table.extent();
    let slice_len = (extent.width * extent.height) as usize;
    let z = (extent.depth / 2) as usize;
    let slice = &table.texels()[z * slice_len..(z + 1) * slice_len];

    let max = slice
        .iter()
        .flat_map(|texel| texel[..3].iter().copied())
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    let scale = if max > 0.0 { 1.0 / max } else { 0.0 };

    let encode = |v: f32| {
        let v = if v.is_finite() { (v * scale).clamp(0.0, 1.0) } else { 0.0 };
        (v.powf(1.0 / 2.2) * 255.0).round() as u8
    };
    let pixels = slice
        .iter()
        .flat_map(|texel| [encode(texel[0]), encode(texel[1]), encode(texel[2]), 255])
        .collect();

    PreviewImage {
        width: extent.width,
        height: extent.height,
        pixels,
    }
}

/// Encode `image` as PNG at `path`.
pub fn write_png(path: &Path, image: &PreviewImage) -> Result<(), BakeError> {
    let png_error = |source| BakeError::Png {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|source| BakeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width, image.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(png_error)?;
    writer.write_image_data(&image.pixels).map_err(png_error)?;
    writer.finish().map_err(png_error)
}
