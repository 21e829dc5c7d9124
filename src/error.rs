use thiserror::Error;

pub type Result<T, E = SegmentError> = std::result::Result<T, E>;

/// Any failure of a segmentation request. There is no partial result.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("numerical error: {0}")]
    Numerical(#[from] NumericalError),

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SegmentError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }
}

/// Rejected inputs. Raised before any computation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no annotation classes were given")]
    NoClasses,

    #[error("no pixel is scribbled for any class")]
    NoScribbles,

    #[error("pixel ({x}, {y}) is scribbled for both class {first} and class {second}")]
    Overlap { x: usize, y: usize, first: usize, second: usize },

    #[error("{what} has dimensions {}x{}, expected {}x{}", .found.0, .found.1, .expected.0, .expected.1)]
    DimensionMismatch {
        what: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("{found} output path(s) given for {expected} class(es)")]
    ClassCountMismatch { expected: usize, found: usize },

    #[error("invalid window size {0}: must be odd and >= 3")]
    InvalidWindow(usize),

    #[error("invalid value {value} for {name}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("pixel buffer of length {len} does not hold {channels} channel(s) for {width}x{height}")]
    ChannelMismatch {
        len: usize,
        width: usize,
        height: usize,
        channels: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    #[error("regularized color covariance at pixel {pixel} is not positive definite")]
    CovarianceNotPositiveDefinite { pixel: usize },

    #[error(
        "class {class}: solver did not converge on {rows} rows after {iterations} iterations \
         (residual {residual:.3e}, worst row {worst_row})"
    )]
    NotConverged {
        class: usize,
        rows: usize,
        iterations: usize,
        residual: f64,
        worst_row: usize,
    },

    #[error("class {class}: solver broke down on {rows} rows at iteration {iteration}")]
    Breakdown { class: usize, rows: usize, iteration: usize },

    #[error("class {class}: zero diagonal entry at row {row}")]
    ZeroDiagonal { class: usize, row: usize },

    #[error("incomplete factorization hit a zero pivot at row {row}")]
    ZeroPivot { row: usize },
}
