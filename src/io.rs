use std::path::{Path, PathBuf};

use image::{io::Reader as ImageReader, DynamicImage, GenericImageView, ImageBuffer, Luma};
use log::{debug, info};

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::labels::SegmentationMap;
use crate::raster::ColorImage;
use crate::scribbles::{ClassMask, ScribbleSet};

fn open(path: &Path) -> Result<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Keeps every `step`-th pixel on both axes.
fn subsample(img: DynamicImage, step: usize) -> DynamicImage {
    if step <= 1 {
        return img;
    }
    let step = step as u32;
    let (w, h) = img.dimensions();
    let (w_out, h_out) = ((w + step - 1) / step, (h + step - 1) / step);
    if img.color().has_color() {
        let rgb = img.to_rgb8();
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(w_out, h_out, |x, y| *rgb.get_pixel(x * step, y * step)))
    } else {
        let luma = img.to_luma8();
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(w_out, h_out, |x, y| *luma.get_pixel(x * step, y * step)))
    }
}

pub fn load_image(path: &Path, cfg: &Config) -> Result<ColorImage> {
    let img = subsample(open(path)?, cfg.down_scaling);
    let img = ColorImage::from_dynamic(&img, cfg.color_space);
    info!("Loaded {} ({}x{}, {} channel(s))", path.display(), img.width(), img.height(), img.channels());
    Ok(img)
}

/// Sums the color channels (alpha excluded) and keeps pixels at or above 1/20 of the brightest one.
pub fn mask_from_image(img: &DynamicImage) -> ClassMask {
    let rgb = img.to_rgb8();
    let sums: Vec<u32> = rgb.pixels().map(|p| p.0.iter().map(|&v| v as u32).sum()).collect();
    let max = sums.iter().copied().max().unwrap_or(0);
    let threshold = max as f64 / 20.0;
    let w = rgb.width() as usize;
    ClassMask::from_fn(w, rgb.height() as usize, |x, y| max > 0 && sums[y * w + x] as f64 >= threshold)
}

pub fn load_annotation_mask(path: &Path, down_scaling: usize) -> Result<ClassMask> {
    let img = subsample(open(path)?, down_scaling);
    let mask = mask_from_image(&img);
    debug!("{}: {} scribbled pixels", path.display(), mask.count());
    Ok(mask)
}

/// Loads the base image and one mask per annotation path; path order is class order.
pub fn load_image_with_annotations<P: AsRef<Path>>(image_path: &Path, annotation_paths: &[P], cfg: &Config) -> Result<(ColorImage, ScribbleSet)> {
    let img = load_image(image_path, cfg)?;
    let mut scribbles = ScribbleSet::default();
    for path in annotation_paths {
        let path = path.as_ref();
        let mask = load_annotation_mask(path, cfg.down_scaling)?;
        if (mask.width(), mask.height()) != (img.width(), img.height()) {
            return Err(ConfigError::DimensionMismatch {
                what: format!("annotation {}", path.display()),
                expected: (img.width(), img.height()),
                found: (mask.width(), mask.height()),
            }
            .into());
        }
        scribbles.push(mask);
    }
    Ok((img, scribbles))
}

/// `dir/name.png` -> `dir/name_expanded.png`
pub fn expanded_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("annotation");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_expanded.{ext}"),
        None => format!("{stem}_expanded"),
    };
    path.with_file_name(name)
}

/// Writes one 0/255 mask per class to `out_paths`.
pub fn save_annotations<P: AsRef<Path>>(out_paths: &[P], map: &SegmentationMap) -> Result<()> {
    if out_paths.len() != map.num_classes() {
        return Err(ConfigError::ClassCountMismatch { expected: map.num_classes(), found: out_paths.len() }.into());
    }
    for (path, mask) in out_paths.iter().zip(map.class_masks()) {
        let img: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_fn(mask.width() as u32, mask.height() as u32, |x, y| Luma([if mask.get(x as usize, y as usize) { 255 } else { 0 }]));
        img.save(path.as_ref())?;
        info!("Expanded annotation saved: {}", path.as_ref().display());
    }
    Ok(())
}

/// Saves the expanded masks next to the annotations they came from.
pub fn save_adjacent<P: AsRef<Path>>(annotation_paths: &[P], map: &SegmentationMap) -> Result<Vec<PathBuf>> {
    let out_paths: Vec<PathBuf> = annotation_paths.iter().map(|p| expanded_path(p.as_ref())).collect();
    save_annotations(&out_paths, map)?;
    Ok(out_paths)
}

pub fn save_label_image(path: &Path, map: &SegmentationMap) -> Result<()> {
    map.to_gray_image().save(path)?;
    info!("Label image saved: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn expanded_path_keeps_directory_and_extension() {
        assert_eq!(expanded_path(Path::new("a/b/cat.png")), PathBuf::from("a/b/cat_expanded.png"));
        assert_eq!(expanded_path(Path::new("dog")), PathBuf::from("dog_expanded"));
    }

    #[test]
    fn faint_pixels_are_dropped_from_masks() {
        let img = ImageBuffer::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255u8, 0, 0]),
            1 => Rgb([3, 3, 3]),
            _ => Rgb([0, 0, 0]),
        });
        let mask = mask_from_image(&DynamicImage::ImageRgb8(img));
        assert!(mask.get(0, 0));
        assert!(!mask.get(1, 0));
        assert!(!mask.get(2, 0));
    }

    #[test]
    fn threshold_is_inclusive() {
        // brightest sum 600, threshold 30
        let img = ImageBuffer::from_fn(3, 1, |x, _| match x {
            0 => Rgb([200u8, 200, 200]),
            1 => Rgb([10, 10, 10]),
            _ => Rgb([10, 10, 9]),
        });
        let mask = mask_from_image(&DynamicImage::ImageRgb8(img));
        assert!(mask.get(0, 0));
        assert!(mask.get(1, 0));
        assert!(!mask.get(2, 0));
    }

    #[test]
    fn alpha_does_not_count_as_a_scribble() {
        let img = ImageBuffer::from_fn(2, 1, |x, _| if x == 0 { Rgba([0u8, 200, 0, 255]) } else { Rgba([0, 0, 0, 255]) });
        let mask = mask_from_image(&DynamicImage::ImageRgba8(img));
        assert_eq!(mask.count(), 1);
    }

    #[test]
    fn black_mask_is_empty() {
        let img = ImageBuffer::from_fn(2, 2, |_, _| Rgb([0u8, 0, 0]));
        assert_eq!(mask_from_image(&DynamicImage::ImageRgb8(img)).count(), 0);
    }

    #[test]
    fn subsample_keeps_every_nth_pixel() {
        let img = ImageBuffer::from_fn(5, 3, |x, y| Luma([(x + 10 * y) as u8]));
        let out = subsample(DynamicImage::ImageLuma8(img), 2);
        assert_eq!(out.dimensions(), (3, 2));
        assert_eq!(out.to_luma8().get_pixel(2, 1).0, [24]);
    }
}
