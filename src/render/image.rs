use ndarray::Array2;

use super::colormap::Colormap;
use crate::error::{Error, Result};

/// RGBA8 raster, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderedImage {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

/// Colour a `frequency × time` array in `[0, 1]`.
///
/// Width is the number of frames and height the number of bins. The image
/// is flipped vertically: row 0 holds the highest frequency bin, so low
/// frequencies sit at the bottom.
pub fn rasterize(data: &Array2<f32>, cmap: &Colormap) -> Result<RenderedImage> {
    let (bins, frames) = data.dim();
    if bins == 0 || frames == 0 {
        return Err(Error::Render(format!(
            "cannot render an empty {bins}x{frames} spectrogram"
        )));
    }

    let mut pixels = Vec::with_capacity(bins * frames * 4);
    for bin in (0..bins).rev() {
        for &v in data.row(bin).iter() {
            pixels.extend_from_slice(&cmap.lookup(v));
        }
    }

    Ok(RenderedImage {
        width: frames as u32,
        height: bins as u32,
        pixels,
    })
}

pub fn encode_png(image: &RenderedImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width, image.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| Error::Render(format!("PNG header: {e}")))?;
        writer
            .write_image_data(&image.pixels)
            .map_err(|e| Error::Render(format!("PNG data: {e}")))?;
    }
    Ok(out)
}

/// Colour `data` with the named colormap and encode it as PNG.
pub fn render(data: &Array2<f32>, cmap: &str) -> Result<Vec<u8>> {
    let cmap = Colormap::from_name(cmap)?;
    let image = rasterize(data, &cmap)?;
    log::debug!(
        "Rendering {}x{} image with {}",
        image.width,
        image.height,
        cmap.name()
    );
    encode_png(&image)
}
