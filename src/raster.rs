use image::{DynamicImage, GrayImage, RgbImage};
use log::warn;
use palette::{FromColor, Lab, LinSrgb, Srgb};

use crate::config::ColorSpace;
use crate::error::{ConfigError, Result};

/// Row-major mapping between grid coordinates and linear pixel indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelIndex {
    width: usize,
    height: usize,
}

impl PixelIndex {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }
    pub fn len(&self) -> usize { self.width * self.height }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }
}

/// Immutable multi-channel image with channel values normalized to roughly [0, 1].
#[derive(Clone, Debug)]
pub struct ColorImage {
    grid: PixelIndex,
    channels: usize,
    data: Vec<f64>,
}

impl ColorImage {
    /// `data` is interleaved, row-major, `channels` values per pixel.
    pub fn from_raw(width: usize, height: usize, channels: usize, data: Vec<f64>) -> Result<Self> {
        if channels == 0 || data.len() != width * height * channels {
            return Err(ConfigError::ChannelMismatch { len: data.len(), width, height, channels }.into());
        }
        Ok(Self { grid: PixelIndex::new(width, height), channels, data })
    }

    pub fn from_fn(width: usize, height: usize, channels: usize, mut f: impl FnMut(usize, usize) -> Vec<f64>) -> Result<Self> {
        let mut data = Vec::with_capacity(width * height * channels);
        for y in 0..height {
            for x in 0..width {
                data.extend(f(x, y));
            }
        }
        Self::from_raw(width, height, channels, data)
    }

    pub fn from_gray8(img: &GrayImage) -> Self {
        let data = img.pixels().map(|p| p[0] as f64 / 255.0).collect();
        Self { grid: PixelIndex::new(img.width() as usize, img.height() as usize), channels: 1, data }
    }

    pub fn from_rgb8(img: &RgbImage, color_space: ColorSpace) -> Self {
        let mut data = Vec::with_capacity(img.width() as usize * img.height() as usize * 3);
        for p in img.pixels() {
            match color_space {
                ColorSpace::Rgb => data.extend(p.0.iter().map(|&v| v as f64 / 255.0)),
                ColorSpace::Lab => data.extend(rgb_to_scaled_lab(p[0], p[1], p[2])),
            }
        }
        Self { grid: PixelIndex::new(img.width() as usize, img.height() as usize), channels: 3, data }
    }

    /// Images without color become single-channel; everything else is RGB with alpha dropped.
    pub fn from_dynamic(img: &DynamicImage, color_space: ColorSpace) -> Self {
        if img.color().has_color() {
            Self::from_rgb8(&img.to_rgb8(), color_space)
        } else {
            if color_space == ColorSpace::Lab {
                warn!("grayscale image: Lab color space ignored, using intensity");
            }
            Self::from_gray8(&img.to_luma8())
        }
    }

    pub fn grid(&self) -> PixelIndex { self.grid }
    pub fn width(&self) -> usize { self.grid.width }
    pub fn height(&self) -> usize { self.grid.height }
    pub fn channels(&self) -> usize { self.channels }

    #[inline]
    pub fn pixel(&self, index: usize) -> &[f64] {
        &self.data[index * self.channels..(index + 1) * self.channels]
    }
}

// Lab scaled by 1/100 so all channels share roughly the same range as RGB.
fn rgb_to_scaled_lab(r: u8, g: u8, b: u8) -> [f64; 3] {
    let srgb: Srgb<f32> = Srgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let lin: LinSrgb<f32> = srgb.into_linear();
    let lab: Lab = Lab::from_color(lin);
    [lab.l as f64 / 100.0, lab.a as f64 / 100.0, lab.b as f64 / 100.0]
}
