use image::{imageops::FilterType, DynamicImage};
use pilah_types::{vision::StillFrame, Result};

use crate::{still_surface, vision_error};

const CHANNELS: usize = 3;

/// Dense f32 input in NHWC layout (`[1, size, size, 3]`).
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn value(&self, y: usize, x: usize, channel: usize) -> Option<f32> {
        let [_, height, width, channels] = self.shape;
        if y >= height || x >= width || channel >= channels {
            return None;
        }
        self.data.get((y * width + x) * channels + channel).copied()
    }
}

/// Resize a still to `size`×`size` (nearest neighbour), drop alpha, scale
/// pixel values into [0, 1], and add the batch dimension.
pub fn preprocess(still: &StillFrame, size: u32) -> Result<InputTensor> {
    if size == 0 {
        return Err(vision_error("model input size must be greater than zero"));
    }
    let resized = DynamicImage::ImageRgba8(still_surface(still)?)
        .resize_exact(size, size, FilterType::Nearest)
        .to_rgb8();
    let data: Vec<f32> = resized
        .as_raw()
        .iter()
        .map(|&v| f32::from(v) / 255.0)
        .collect();
    Ok(InputTensor {
        shape: [1, size as usize, size as usize, CHANNELS],
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 4]) -> StillFrame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        StillFrame::from_rgba(width, height, data, false).expect("still")
    }

    #[test]
    fn produces_batched_nhwc_shape() {
        let still = still_from_fn(640, 480, |_, _| [255, 0, 0, 255]);
        let tensor = preprocess(&still, 224).expect("tensor");
        assert_eq!(tensor.shape, [1, 224, 224, 3]);
        assert_eq!(tensor.data.len(), 224 * 224 * 3);
        assert_eq!(tensor.value(0, 0, 0), Some(1.0));
        assert_eq!(tensor.value(0, 0, 1), Some(0.0));
        assert_eq!(tensor.value(223, 223, 2), Some(0.0));
    }

    #[test]
    fn values_are_normalized_and_alpha_dropped() {
        let still = still_from_fn(4, 4, |_, _| [128, 64, 255, 7]);
        let tensor = preprocess(&still, 2).expect("tensor");
        assert_eq!(tensor.shape, [1, 2, 2, 3]);
        assert!((tensor.data[0] - 128.0 / 255.0).abs() < 1e-6);
        assert!((tensor.data[1] - 64.0 / 255.0).abs() < 1e-6);
        assert!((tensor.data[2] - 1.0).abs() < 1e-6);
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn nearest_neighbour_keeps_halves_distinct() {
        let still = still_from_fn(8, 8, |x, _| if x < 4 { [0, 0, 0, 255] } else { [255, 255, 255, 255] });
        let tensor = preprocess(&still, 4).expect("tensor");
        assert_eq!(tensor.value(0, 0, 0), Some(0.0));
        assert_eq!(tensor.value(0, 3, 0), Some(1.0));
    }

    #[test]
    fn zero_size_is_rejected() {
        let still = still_from_fn(2, 2, |_, _| [0, 0, 0, 255]);
        assert!(preprocess(&still, 0).is_err());
    }
}
