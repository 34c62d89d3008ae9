use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use color_quant::NeuQuant;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder};

use crate::error::Result;

/// Sample factor for the NeuQuant palette training pass. 1 trains on
/// every pixel; 10 is the documented speed/quality tradeoff and plenty
/// for 256x256 tiles.
const QUANT_SAMPLE_FACTOR: i32 = 10;
const QUANT_COLORS: usize = 256;

/// Decodes tile bytes, flattening any alpha channel to opaque RGB.
///
/// Providers return translucent edge tiles at the border of their
/// coverage; those must not end up transparent in the cache.
pub fn load(bytes: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(bytes)?;
    if img.color().has_alpha() {
        Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
    } else {
        Ok(img)
    }
}

/// Remaps the image onto a 256-entry NeuQuant palette.
///
/// The output stays RGB; the reduced colour count is what makes the
/// encoded PNG materially smaller.
pub fn reduce(img: &DynamicImage) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    let quantizer = NeuQuant::new(QUANT_SAMPLE_FACTOR, QUANT_COLORS, rgba.as_raw());

    for pixel in rgba.pixels_mut() {
        quantizer.map_pixel(&mut pixel.0);
    }

    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
}

/// Writes the image as an optimized PNG, whatever the source format was.
pub fn save_png(img: &DynamicImage, path: &Path) -> Result<()> {
    let rgb = img.to_rgb8();
    let writer = BufWriter::new(File::create(path)?);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(())
}
