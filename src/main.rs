// CLI entry for scribble_expand
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use scribble_expand::{default_config, process, AffinityKernel, BorderPolicy, ColorSpace, Config, Params, Preconditioner, SolverKind};

#[derive(Parser, Debug)]
#[command(name = "scribble_expand", version, about = "Expand rough class annotations to fill similar-colored regions")]
struct Cli {
    /// Fast preset (looser solver tolerance)
    #[arg(short = 'f', long = "fast", action = ArgAction::SetTrue)]
    fast: bool,

    /// Size of the window of nearby pixels; must be odd and >= 3
    #[arg(long = "window-size", default_value_t = 3)]
    window_size: usize,
    /// Covariance regularization
    #[arg(long = "epsilon")]
    epsilon: Option<f64>,
    /// Affinity kernel: covariance or gaussian
    #[arg(long = "kernel")]
    kernel: Option<AffinityKernel>,
    /// Border handling: truncate, mirror or zero-pad
    #[arg(long = "border")]
    border: Option<BorderPolicy>,
    /// Color space used for affinities: rgb or lab
    #[arg(long = "color-space")]
    color_space: Option<ColorSpace>,
    /// Linear solver: bicgstab or gauss-seidel
    #[arg(long = "solver")]
    solver: Option<SolverKind>,
    /// BiCGSTAB preconditioner: ilu0 or none
    #[arg(long = "preconditioner")]
    preconditioner: Option<Preconditioner>,
    /// Relative residual tolerance
    #[arg(long = "tolerance")]
    tolerance: Option<f64>,
    /// Iteration limit per class
    #[arg(long = "max-iterations")]
    max_iterations: Option<usize>,
    /// Extra iterations allowed per grid side on large images
    #[arg(long = "iterations-per-side")]
    iterations_per_side: Option<usize>,
    /// Keep every n-th pixel on both axes
    #[arg(long = "down-scaling")]
    down_scaling: Option<usize>,
    /// Number of threads for the per-class solves
    #[arg(long = "threads")]
    threads: Option<usize>,

    /// Also write a grayscale label image here
    #[arg(long = "labels", value_hint = ValueHint::FilePath)]
    labels: Option<PathBuf>,

    /// Path to the image being segmented
    #[arg(value_hint = ValueHint::FilePath)]
    image: PathBuf,
    /// One annotation image per class; order defines the class index
    #[arg(value_hint = ValueHint::FilePath, required = true, num_args = 1..)]
    annotations: Vec<PathBuf>,
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut cfg = default_config(cli.fast);
    cfg.set_window_size(cli.window_size).context("invalid --window-size")?;
    if let Some(v) = cli.epsilon { cfg.epsilon = v; }
    if let Some(v) = cli.kernel { cfg.kernel = v; }
    if let Some(v) = cli.border { cfg.border = v; }
    if let Some(v) = cli.color_space { cfg.color_space = v; }
    if let Some(v) = cli.solver { cfg.solver = v; }
    if let Some(v) = cli.preconditioner { cfg.preconditioner = v; }
    if let Some(v) = cli.tolerance { cfg.tolerance = v; }
    if let Some(v) = cli.max_iterations { cfg.max_iterations = v; }
    if let Some(v) = cli.iterations_per_side { cfg.iterations_per_side = v; }
    if let Some(v) = cli.down_scaling { cfg.down_scaling = v; }
    if let Some(v) = cli.threads { cfg.num_threads = v.max(1); }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let params = Params {
        image_path: cli.image,
        annotation_paths: cli.annotations,
        labels_path: cli.labels,
        config,
    };
    let written = process(params).context("annotation expansion failed")?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
