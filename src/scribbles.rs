use log::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::raster::PixelIndex;

/// Boolean mask per class, true where the user scribbled that class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassMask {
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl ClassMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, bits: vec![false; width * height] }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self { width, height, bits }
    }

    pub fn from_points(width: usize, height: usize, points: &[(usize, usize)]) -> Self {
        let mut mask = Self::new(width, height);
        for &(x, y) in points {
            mask.set(x, y, true);
        }
        mask
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.bits[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.bits[y * self.width + x] = value;
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }
}

/// Masks in class order: mask `k` holds the scribbles of class `k`.
#[derive(Clone, Debug, Default)]
pub struct ScribbleSet {
    masks: Vec<ClassMask>,
}

impl ScribbleSet {
    pub fn new(masks: Vec<ClassMask>) -> Self {
        Self { masks }
    }

    pub fn push(&mut self, mask: ClassMask) {
        self.masks.push(mask);
    }

    pub fn num_classes(&self) -> usize {
        self.masks.len()
    }

    pub fn masks(&self) -> &[ClassMask] {
        &self.masks
    }

    /// Checks the masks against the image grid and flattens them into one label per pixel.
    pub fn validate(&self, width: usize, height: usize) -> Result<ScribbleLabels> {
        if self.masks.is_empty() {
            return Err(ConfigError::NoClasses.into());
        }
        for (class, mask) in self.masks.iter().enumerate() {
            if mask.width != width || mask.height != height {
                return Err(ConfigError::DimensionMismatch {
                    what: format!("scribble mask for class {class}"),
                    expected: (width, height),
                    found: (mask.width, mask.height),
                }
                .into());
            }
        }

        let grid = PixelIndex::new(width, height);
        let mut labels: Vec<Option<usize>> = vec![None; grid.len()];
        let mut per_class = vec![0usize; self.masks.len()];
        for (class, mask) in self.masks.iter().enumerate() {
            for (i, _) in mask.bits.iter().enumerate().filter(|(_, b)| **b) {
                if let Some(first) = labels[i] {
                    let (x, y) = grid.coords(i);
                    return Err(ConfigError::Overlap { x, y, first, second: class }.into());
                }
                labels[i] = Some(class);
                per_class[class] += 1;
            }
        }

        let total: usize = per_class.iter().sum();
        if total == 0 {
            return Err(ConfigError::NoScribbles.into());
        }
        for (class, &n) in per_class.iter().enumerate() {
            if n == 0 {
                warn!("class {} has no scribbled pixels; its score will be zero everywhere", class);
            } else {
                debug!("class {}: {} scribbled pixels", class, n);
            }
        }
        Ok(ScribbleLabels { grid, num_classes: self.masks.len(), labels, per_class })
    }
}

/// Validated scribbles: at most one class per pixel, at least one scribbled pixel.
#[derive(Clone, Debug)]
pub struct ScribbleLabels {
    grid: PixelIndex,
    num_classes: usize,
    labels: Vec<Option<usize>>,
    per_class: Vec<usize>,
}

impl ScribbleLabels {
    pub fn grid(&self) -> PixelIndex { self.grid }
    pub fn num_classes(&self) -> usize { self.num_classes }

    #[inline]
    pub fn label(&self, index: usize) -> Option<usize> {
        self.labels[index]
    }

    pub fn is_scribbled(&self, index: usize) -> bool {
        self.labels[index].is_some()
    }

    pub fn count(&self, class: usize) -> usize {
        self.per_class[class]
    }

    pub fn total(&self) -> usize {
        self.per_class.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.labels.iter().enumerate().filter_map(|(i, l)| l.map(|c| (i, c)))
    }
}
