use image::{GrayImage, ImageBuffer, Luma};

use crate::raster::PixelIndex;
use crate::scribbles::ClassMask;

/// Solved continuous score per class and pixel. Values are not clamped.
#[derive(Clone, Debug)]
pub struct PropagatedScores {
    grid: PixelIndex,
    scores: Vec<Vec<f64>>,
}

impl PropagatedScores {
    pub fn new(grid: PixelIndex, scores: Vec<Vec<f64>>) -> Self {
        debug_assert!(scores.iter().all(|s| s.len() == grid.len()));
        Self { grid, scores }
    }

    pub fn grid(&self) -> PixelIndex { self.grid }
    pub fn num_classes(&self) -> usize { self.scores.len() }

    pub fn class(&self, class: usize) -> &[f64] {
        &self.scores[class]
    }

    pub fn at(&self, class: usize, x: usize, y: usize) -> f64 {
        self.scores[class][self.grid.index(x, y)]
    }
}

/// One class index per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentationMap {
    grid: PixelIndex,
    num_classes: usize,
    labels: Vec<usize>,
}

impl SegmentationMap {
    pub fn width(&self) -> usize { self.grid.width() }
    pub fn height(&self) -> usize { self.grid.height() }
    pub fn num_classes(&self) -> usize { self.num_classes }
    pub fn labels(&self) -> &[usize] { &self.labels }

    pub fn get(&self, x: usize, y: usize) -> usize {
        self.labels[self.grid.index(x, y)]
    }

    /// Row `y` of the map, left to right.
    pub fn row(&self, y: usize) -> &[usize] {
        let w = self.grid.width();
        &self.labels[y * w..(y + 1) * w]
    }

    /// One binary mask per class, true where that class won.
    pub fn class_masks(&self) -> Vec<ClassMask> {
        (0..self.num_classes)
            .map(|class| ClassMask::from_fn(self.width(), self.height(), |x, y| self.get(x, y) == class))
            .collect()
    }

    /// Grayscale rendering with classes spread evenly over 0..=255.
    pub fn to_gray_image(&self) -> GrayImage {
        let step = if self.num_classes > 1 { 255.0 / (self.num_classes - 1) as f64 } else { 0.0 };
        ImageBuffer::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            Luma([(self.get(x as usize, y as usize) as f64 * step).round() as u8])
        })
    }
}

pub struct LabelAssigner;

impl LabelAssigner {
    /// Argmax over classes per pixel. Ties go to the lowest class index.
    pub fn assign(scores: &PropagatedScores) -> SegmentationMap {
        let grid = scores.grid();
        let labels = (0..grid.len())
            .map(|p| {
                let mut best = 0usize;
                let mut best_score = f64::NEG_INFINITY;
                for (class, s) in scores.scores.iter().enumerate() {
                    if s[p] > best_score {
                        best = class;
                        best_score = s[p];
                    }
                }
                best
            })
            .collect();
        SegmentationMap { grid, num_classes: scores.num_classes(), labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_go_to_lowest_class() {
        let scores = PropagatedScores::new(PixelIndex::new(3, 1), vec![vec![0.5, 0.2, 0.0], vec![0.5, 0.7, 0.0]]);
        let map = LabelAssigner::assign(&scores);
        assert_eq!(map.labels(), &[0, 1, 0]);
    }

    #[test]
    fn masks_partition_the_map() {
        let scores = PropagatedScores::new(PixelIndex::new(2, 2), vec![vec![1.0, 0.0, 0.3, 0.0], vec![0.0, 1.0, 0.1, 0.2], vec![0.0, 0.0, 0.0, 0.9]]);
        let map = LabelAssigner::assign(&scores);
        assert_eq!(map.labels(), &[0, 1, 0, 2]);
        let masks = map.class_masks();
        assert_eq!(masks.len(), 3);
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(masks.iter().filter(|m| m.get(x, y)).count(), 1);
            }
        }
        let gray = map.to_gray_image();
        assert_eq!(gray.get_pixel(1, 1).0, [255]);
        assert_eq!(gray.get_pixel(1, 0).0, [128]);
    }
}
