//! Image preprocessing for the vision encoder.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use tracing::debug;

use crate::error::ExtractionError;
use crate::models::config::ImageConfig;

/// Turns a receipt image into the encoder's `pixel_values` tensor.
///
/// The image is resized so its shortest edge matches the shorter input
/// side, shrunk further if it still overflows the input, centred on a
/// zero canvas of the input size and normalized per channel.
#[derive(Debug, Clone)]
pub struct DonutPreprocessor {
    /// Target height for the encoder.
    height: u32,
    /// Target width for the encoder.
    width: u32,
    align_long_axis: bool,
    mean: [f32; 3],
    std: [f32; 3],
}

impl DonutPreprocessor {
    /// Create a preprocessor with default CORD geometry.
    pub fn new() -> Self {
        Self::from_config(&ImageConfig::default())
    }

    pub fn from_config(config: &ImageConfig) -> Self {
        Self {
            height: config.input_height,
            width: config.input_width,
            align_long_axis: config.align_long_axis,
            mean: config.mean,
            std: config.std,
        }
    }

    /// Preprocess an image into an NCHW tensor.
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Array4<f32>, ExtractionError> {
        if self.width == 0 || self.height == 0 {
            return Err(ExtractionError::Preprocessing(format!(
                "invalid encoder input size {}x{}",
                self.width, self.height
            )));
        }

        let (orig_width, orig_height) = image.dimensions();
        if orig_width == 0 || orig_height == 0 {
            return Err(ExtractionError::Preprocessing("image has no pixels".to_string()));
        }
        debug!("Original image size: {}x{}", orig_width, orig_height);

        let image = if self.needs_rotation(orig_width, orig_height) {
            debug!("Rotating image to match the input orientation");
            image.rotate90()
        } else {
            image.clone()
        };

        let (src_width, src_height) = image.dimensions();
        let (new_width, new_height) = self.resize_dimensions(src_width, src_height);
        let resized = image.resize_exact(new_width, new_height, FilterType::Triangle);
        let rgb = resized.to_rgb8();

        let pad_left = (self.width - new_width) / 2;
        let pad_top = (self.height - new_height) / 2;

        let mut tensor =
            Array4::<f32>::zeros((1, 3, self.height as usize, self.width as usize));

        // Padding is black before normalization.
        for c in 0..3 {
            let fill = (0.0 - self.mean[c]) / self.std[c];
            tensor.index_axis_mut(ndarray::Axis(1), c).fill(fill);
        }

        for y in 0..new_height {
            for x in 0..new_width {
                let pixel = rgb.get_pixel(x, y);
                for c in 0..3 {
                    let value = pixel[c] as f32 / 255.0;
                    tensor[[0, c, (y + pad_top) as usize, (x + pad_left) as usize]] =
                        (value - self.mean[c]) / self.std[c];
                }
            }
        }

        debug!(
            "Resized to {}x{}, padded to {}x{}",
            new_width, new_height, self.width, self.height
        );

        Ok(tensor)
    }

    fn needs_rotation(&self, width: u32, height: u32) -> bool {
        self.align_long_axis
            && ((self.width < self.height && width > height)
                || (self.width > self.height && width < height))
    }

    /// Size of the resized image before padding.
    fn resize_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        // Shortest edge to the shorter input side.
        let shortest = self.width.min(self.height) as f64;
        let (short, long) = if width <= height {
            (width as f64, height as f64)
        } else {
            (height as f64, width as f64)
        };
        let scaled_long = (shortest * long / short) as u32;
        let (mut w, mut h) = if width <= height {
            (shortest as u32, scaled_long)
        } else {
            (scaled_long, shortest as u32)
        };

        // Thumbnail into the input box.
        let fit_w = w.min(self.width);
        let fit_h = h.min(self.height);
        if fit_w != w || fit_h != h {
            if h > w {
                w = (w as f64 * fit_h as f64 / h as f64) as u32;
                h = fit_h;
            } else if w > h {
                h = (h as f64 * fit_w as f64 / w as f64) as u32;
                w = fit_w;
            } else {
                w = fit_w;
                h = fit_h;
            }
        }

        (w.clamp(1, self.width), h.clamp(1, self.height))
    }
}

impl Default for DonutPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}
