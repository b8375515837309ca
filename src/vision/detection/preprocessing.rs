// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for YOLO detection models

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// Default square input size of YOLO exports
pub const DETECTION_INPUT_SIZE: u32 = 640;

/// Gray value used for letterbox padding
pub const PAD_VALUE: u8 = 114;

/// Preprocess an image for detection
///
/// Steps:
/// 1. Letterbox to `input_size` x `input_size` (aspect ratio kept, gray padding)
/// 2. Scale pixels to [0, 1]
/// 3. Convert to NCHW tensor format [1, 3, H, W]
pub fn preprocess_for_detection(image: &DynamicImage, input_size: u32) -> (Array4<f32>, LetterboxInfo) {
    let info = LetterboxInfo::new(image, input_size);
    let letterboxed = letterbox(image, &info, input_size);

    let size = input_size as usize;
    let mut tensor = Array4::zeros((1, 3, size, size));

    for (x, y, pixel) in letterboxed.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    (tensor, info)
}

fn letterbox(image: &DynamicImage, info: &LetterboxInfo, input_size: u32) -> RgbImage {
    let mut output = RgbImage::from_pixel(input_size, input_size, Rgb([PAD_VALUE; 3]));

    if info.original_width == 0 || info.original_height == 0 {
        return output;
    }

    let resized = image
        .resize_exact(info.resized_width, info.resized_height, FilterType::Triangle)
        .to_rgb8();

    image::imageops::replace(
        &mut output,
        &resized,
        info.offset_x as i64,
        info.offset_y as i64,
    );

    output
}

/// Scaling and padding applied by the letterbox step, used to map
/// boxes back to original image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct LetterboxInfo {
    /// Scale factor applied
    pub scale: f32,
    /// X offset from padding
    pub offset_x: u32,
    /// Y offset from padding
    pub offset_y: u32,
    pub resized_width: u32,
    pub resized_height: u32,
    /// Original image width
    pub original_width: u32,
    /// Original image height
    pub original_height: u32,
}

impl LetterboxInfo {
    pub fn new(image: &DynamicImage, input_size: u32) -> Self {
        let (orig_w, orig_h) = image.dimensions();

        if orig_w == 0 || orig_h == 0 {
            return Self {
                scale: 1.0,
                offset_x: 0,
                offset_y: 0,
                resized_width: 0,
                resized_height: 0,
                original_width: orig_w,
                original_height: orig_h,
            };
        }

        let scale = (input_size as f32 / orig_w as f32).min(input_size as f32 / orig_h as f32);
        let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, input_size);
        let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, input_size);

        Self {
            scale,
            offset_x: (input_size - new_w) / 2,
            offset_y: (input_size - new_h) / 2,
            resized_width: new_w,
            resized_height: new_h,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    /// Map a coordinate from model input space back to the original image,
    /// clamped to the image bounds
    pub fn map_to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let orig_x = (x - self.offset_x as f32) / self.scale;
        let orig_y = (y - self.offset_y as f32) / self.scale;
        (
            orig_x.clamp(0.0, self.original_width as f32),
            orig_y.clamp(0.0, self.original_height as f32),
        )
    }
}
