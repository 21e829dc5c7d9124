//! Expands sparse class scribbles over an image into a dense segmentation.
//!
//! Every pixel's value is pulled towards a color-affinity weighted average of its
//! neighbors while scribbled pixels stay pinned; one sparse linear system is solved
//! per class and each pixel takes the class with the highest score.

use std::path::PathBuf;
use std::time::Instant;

use log::info;

pub mod affinity;
pub mod config;
pub mod error;
pub mod io;
pub mod labels;
pub mod neighborhood;
pub mod preconditioner;
pub mod raster;
pub mod scribbles;
pub mod solver;
pub mod system;

pub use affinity::{AffinityEstimator, AffinityWeights};
pub use config::{default_config, AffinityKernel, BorderPolicy, ColorSpace, Config, Preconditioner, SolverKind};
pub use error::{ConfigError, NumericalError, Result, SegmentError};
pub use labels::{LabelAssigner, PropagatedScores, SegmentationMap};
pub use neighborhood::{NeighborSite, NeighborhoodBuilder};
pub use preconditioner::Ilu0;
pub use raster::{ColorImage, PixelIndex};
pub use scribbles::{ClassMask, ScribbleLabels, ScribbleSet};
pub use solver::{LinearSolver, SolveStats};
pub use system::{ClassSystem, PropagationSystem, SparseSystemBuilder};

/// Continuous per-class scores and the argmax map derived from them.
#[derive(Clone, Debug)]
pub struct Expansion {
    pub scores: PropagatedScores,
    pub map: SegmentationMap,
}

/// Neighborhood weights and the assembled system, before any class is solved.
pub fn build_system(image: &ColorImage, scribbles: &ScribbleSet, cfg: &Config) -> Result<PropagationSystem> {
    cfg.validate()?;
    let labels = scribbles.validate(image.width(), image.height())?;
    let neighborhoods = NeighborhoodBuilder::new(image.grid(), cfg.radius, cfg.border);
    let weights = AffinityEstimator::from_config(cfg).estimate(image, &neighborhoods)?;
    Ok(SparseSystemBuilder::build(&weights, &labels))
}

/// Core algorithm on in-memory inputs.
pub fn expand_annotations(image: &ColorImage, scribbles: &ScribbleSet, cfg: &Config) -> Result<Expansion> {
    info!("Expanding {} class(es) over {}x{} image (window {})", scribbles.num_classes(), image.width(), image.height(), cfg.window_size());
    let system = build_system(image, scribbles, cfg)?;
    let scores = LinearSolver::from_config(cfg).solve_all(&system, cfg.num_threads)?;
    let map = LabelAssigner::assign(&scores);
    Ok(Expansion { scores, map })
}

#[derive(Debug, Clone)]
pub struct Params {
    pub image_path: PathBuf,
    pub annotation_paths: Vec<PathBuf>,
    /// Optional grayscale rendering of the label map.
    pub labels_path: Option<PathBuf>,
    pub config: Config,
}

/// Loads image and annotations, expands them and writes `<stem>_expanded<ext>` next to each annotation.
pub fn process(params: Params) -> Result<Vec<PathBuf>> {
    let Params { image_path, annotation_paths, labels_path, config } = params;
    config.validate()?;
    info!("Input image: {}", image_path.display());
    info!("Annotations: {}", annotation_paths.len());
    let start = Instant::now();

    let (img, scribbles) = io::load_image_with_annotations(&image_path, &annotation_paths, &config)?;
    let expansion = expand_annotations(&img, &scribbles, &config)?;
    let written = io::save_adjacent(&annotation_paths, &expansion.map)?;
    if let Some(path) = labels_path {
        io::save_label_image(&path, &expansion.map)?;
    }
    info!("Done in {} ms", start.elapsed().as_millis());
    Ok(written)
}
