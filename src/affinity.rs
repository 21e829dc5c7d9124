use log::{debug, info};

use crate::config::{AffinityKernel, Config};
use crate::error::{NumericalError, Result};
use crate::neighborhood::{NeighborSite, NeighborhoodBuilder};
use crate::raster::{ColorImage, PixelIndex};

// Neighborhoods whose covariance trace is below this are treated as flat.
const FLAT_TRACE: f64 = 1e-12;

/// Row-compressed, row-stochastic neighbor weights, one row per pixel.
///
/// Weight that a row puts on zero-padding sites is kept separately in
/// `padding`; those sites carry score 0 and never enter the linear system.
#[derive(Clone, Debug)]
pub struct AffinityWeights {
    grid: PixelIndex,
    offsets: Vec<usize>,
    entries: Vec<(usize, f64)>,
    padding: Vec<f64>,
}

impl AffinityWeights {
    pub fn grid(&self) -> PixelIndex { self.grid }
    pub fn len(&self) -> usize { self.padding.len() }
    pub fn is_empty(&self) -> bool { self.padding.is_empty() }
    pub fn nnz(&self) -> usize { self.entries.len() }

    /// `(neighbor, weight)` pairs of pixel `index`.
    pub fn row(&self, index: usize) -> &[(usize, f64)] {
        &self.entries[self.offsets[index]..self.offsets[index + 1]]
    }

    pub fn padding_mass(&self, index: usize) -> f64 {
        self.padding[index]
    }

    /// Total weight of the row, padding included. 1 for every pixel that has neighbors.
    pub fn row_sum(&self, index: usize) -> f64 {
        self.row(index).iter().map(|&(_, w)| w).sum::<f64>() + self.padding[index]
    }
}

/// Turns local color statistics into neighbor weights.
#[derive(Clone, Copy, Debug)]
pub struct AffinityEstimator {
    kernel: AffinityKernel,
    epsilon: f64,
    floor: f64,
}

impl AffinityEstimator {
    pub fn new(kernel: AffinityKernel, epsilon: f64, floor: f64) -> Self {
        Self { kernel, epsilon, floor }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.kernel, cfg.epsilon, cfg.affinity_floor)
    }

    pub fn estimate(&self, image: &ColorImage, neighborhoods: &NeighborhoodBuilder) -> Result<AffinityWeights> {
        let grid = image.grid();
        let n = grid.len();
        let channels = image.channels();
        info!("Estimating {} affinities for {} pixels (radius {}, border {})", self.kernel, n, neighborhoods.radius(), neighborhoods.border());

        let mut offsets = Vec::with_capacity(n + 1);
        let mut entries = Vec::with_capacity(n * neighborhoods.full_size());
        let mut padding = Vec::with_capacity(n);
        offsets.push(0);

        let mut sites = Vec::with_capacity(neighborhoods.full_size());
        let mut colors: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        let mut scratch = Scratch::new(channels);
        let mut flat = 0usize;

        for p in 0..n {
            neighborhoods.neighbors_into(p, &mut sites);
            colors.clear();
            colors.extend_from_slice(image.pixel(p));
            for site in &sites {
                match site {
                    NeighborSite::Pixel(q) => colors.extend_from_slice(image.pixel(*q)),
                    NeighborSite::Padding => colors.extend(std::iter::repeat(0.0).take(channels)),
                }
            }

            weights.clear();
            if !sites.is_empty() {
                let uniform = match self.kernel {
                    AffinityKernel::Covariance => self.covariance_weights(p, &colors, channels, &mut scratch, &mut weights)?,
                    AffinityKernel::Gaussian => gaussian_weights(&colors, channels, &mut scratch, &mut weights),
                };
                if uniform {
                    flat += 1;
                }
                normalize(&mut weights);
            }

            let mut pad = 0.0;
            for (site, &w) in sites.iter().zip(&weights) {
                match site {
                    NeighborSite::Pixel(q) => entries.push((*q, w)),
                    NeighborSite::Padding => pad += w,
                }
            }
            padding.push(pad);
            offsets.push(entries.len());
        }

        debug!("affinities: {} entries, {} flat or degenerate neighborhoods", entries.len(), flat);
        Ok(AffinityWeights { grid, offsets, entries, padding })
    }

    /// Fills `out` with raw weights; returns true when it fell back to uniform weights.
    fn covariance_weights(&self, pixel: usize, colors: &[f64], c: usize, s: &mut Scratch, out: &mut Vec<f64>) -> Result<bool> {
        let count = colors.len() / c;
        let sites = count - 1;
        mean_and_covariance(colors, c, s);

        let trace: f64 = (0..c).map(|i| s.cov[i * c + i]).sum();
        if trace <= FLAT_TRACE {
            out.extend(std::iter::repeat(1.0).take(sites));
            return Ok(true);
        }

        for i in 0..c {
            s.cov[i * c + i] += self.epsilon;
            s.rhs[i] = colors[i] - s.mean[i];
        }
        if !cholesky_in_place(&mut s.cov, c) {
            return Err(NumericalError::CovarianceNotPositiveDefinite { pixel }.into());
        }
        cholesky_solve(&s.cov, c, &mut s.rhs);

        let mut sum = 0.0;
        for q in 1..count {
            let color = &colors[q * c..(q + 1) * c];
            let dot: f64 = (0..c).map(|i| (color[i] - s.mean[i]) * s.rhs[i]).sum();
            let w = (1.0 + dot).max(self.floor);
            sum += w;
            out.push(w);
        }
        if !(sum > 0.0 && sum.is_finite()) {
            out.clear();
            out.extend(std::iter::repeat(1.0).take(sites));
            return Ok(true);
        }
        Ok(false)
    }
}

struct Scratch {
    mean: Vec<f64>,
    cov: Vec<f64>,
    rhs: Vec<f64>,
}

impl Scratch {
    fn new(channels: usize) -> Self {
        Self { mean: vec![0.0; channels], cov: vec![0.0; channels * channels], rhs: vec![0.0; channels] }
    }
}

// Population mean and covariance of interleaved colors.
fn mean_and_covariance(colors: &[f64], c: usize, s: &mut Scratch) {
    let count = (colors.len() / c) as f64;
    s.mean.iter_mut().for_each(|m| *m = 0.0);
    s.cov.iter_mut().for_each(|v| *v = 0.0);
    for color in colors.chunks_exact(c) {
        for i in 0..c {
            s.mean[i] += color[i];
        }
    }
    s.mean.iter_mut().for_each(|m| *m /= count);
    for color in colors.chunks_exact(c) {
        for i in 0..c {
            let di = color[i] - s.mean[i];
            for j in 0..=i {
                s.cov[i * c + j] += di * (color[j] - s.mean[j]);
            }
        }
    }
    for i in 0..c {
        for j in 0..=i {
            let v = s.cov[i * c + j] / count;
            s.cov[i * c + j] = v;
            s.cov[j * c + i] = v;
        }
    }
}

fn gaussian_weights(colors: &[f64], c: usize, s: &mut Scratch, out: &mut Vec<f64>) -> bool {
    mean_and_covariance(colors, c, s);
    let center = &colors[..c];
    let mut sum = 0.0;
    for color in colors[c..].chunks_exact(c) {
        let mut w = 0.0;
        for i in 0..c {
            let d2 = (center[i] - color[i]).powi(2);
            let var = s.cov[i * c + i];
            // a flat channel has no spread to compare against
            let exponent = if var > 0.0 { -d2 / (2.0 * var) } else { 0.0 };
            w += exponent.exp();
        }
        w /= c as f64;
        sum += w;
        out.push(w);
    }
    if !(sum > 0.0 && sum.is_finite()) {
        let sites = out.len();
        out.clear();
        out.extend(std::iter::repeat(1.0).take(sites));
        return true;
    }
    false
}

fn normalize(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        weights.iter_mut().for_each(|w| *w /= sum);
    }
}

/// Lower Cholesky factor written over the lower triangle of `a`. False if `a` is not SPD.
fn cholesky_in_place(a: &mut [f64], n: usize) -> bool {
    for j in 0..n {
        let mut d = a[j * n + j];
        for k in 0..j {
            d -= a[j * n + k] * a[j * n + k];
        }
        if !(d > 0.0) {
            return false;
        }
        let d = d.sqrt();
        a[j * n + j] = d;
        for i in j + 1..n {
            let mut v = a[i * n + j];
            for k in 0..j {
                v -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = v / d;
        }
    }
    true
}

/// Solves `L L^T x = b` in place given the factor from `cholesky_in_place`.
fn cholesky_solve(l: &[f64], n: usize, b: &mut [f64]) {
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= l[i * n + k] * b[k];
        }
        b[i] = v / l[i * n + i];
    }
    for i in (0..n).rev() {
        let mut v = b[i];
        for k in i + 1..n {
            v -= l[k * n + i] * b[k];
        }
        b[i] = v / l[i * n + i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cholesky_solves_spd_system() {
        // [[4, 2], [2, 3]] x = [2, 1] -> x = [0.5, 0]
        let mut a = vec![4.0, 2.0, 2.0, 3.0];
        assert!(cholesky_in_place(&mut a, 2));
        let mut b = vec![2.0, 1.0];
        cholesky_solve(&a, 2, &mut b);
        assert!((b[0] - 0.5).abs() < 1e-12);
        assert!(b[1].abs() < 1e-12);
    }

    #[test]
    fn cholesky_rejects_indefinite() {
        let mut a = vec![1.0, 2.0, 2.0, 1.0];
        assert!(!cholesky_in_place(&mut a, 2));
    }

    #[test]
    fn covariance_is_population_normalized() {
        let colors = [0.0, 2.0];
        let mut s = Scratch::new(1);
        mean_and_covariance(&colors, 1, &mut s);
        assert_eq!(s.mean[0], 1.0);
        assert_eq!(s.cov[0], 1.0);
    }

    #[test]
    fn two_tone_window_cuts_cross_edges() {
        // center and two neighbors at 0.0, three neighbors at 1.0
        let colors = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let est = AffinityEstimator::new(AffinityKernel::Covariance, 1e-5, 1e-6);
        let mut s = Scratch::new(1);
        let mut w = Vec::new();
        assert!(!est.covariance_weights(0, &colors, 1, &mut s, &mut w).unwrap());
        assert!(w[0] > 1.9 && w[1] > 1.9);
        assert!(w[2] < 1e-3 && w[3] < 1e-3 && w[4] < 1e-3);
    }

    #[test]
    fn flat_window_is_uniform() {
        let colors = [0.3; 9];
        let est = AffinityEstimator::new(AffinityKernel::Covariance, 1e-5, 1e-6);
        let mut s = Scratch::new(3);
        let mut w = Vec::new();
        assert!(est.covariance_weights(0, &colors, 3, &mut s, &mut w).unwrap());
        assert_eq!(w, vec![1.0, 1.0]);
    }
}
