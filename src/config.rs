use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, Result};

/// What the neighborhood window does where it runs past the image edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BorderPolicy {
    /// Out-of-range sites are dropped; border pixels get fewer neighbors.
    #[default]
    Truncate,
    /// Out-of-range sites are reflected back into the image (edge not repeated).
    Mirror,
    /// Out-of-range sites are virtual pixels of color 0 and score 0.
    ZeroPad,
}

/// How neighbor colors are turned into affinity weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AffinityKernel {
    /// Local linear color model: `1 + (c_q - mu)^T (Sigma + eps I)^-1 (c_p - mu)`.
    #[default]
    Covariance,
    /// Per-channel Gaussian of the color difference scaled by the window deviation.
    Gaussian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Rgb,
    Lab,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    BiCgStab,
    GaussSeidel,
}

/// Preconditioner applied inside BiCGSTAB; Gauss-Seidel ignores it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Preconditioner {
    #[default]
    Ilu0,
    None,
}

macro_rules! keyword_enum {
    ($ty:ty, $what:literal, { $($($key:literal)|+ => $variant:expr),+ $(,)? }, { $($show:pat => $name:literal),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($($key)|+ => Ok($variant),)+
                    other => Err(format!("unknown {} '{}'", $what, other)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self { $($show => $name),+ })
            }
        }
    };
}

keyword_enum!(BorderPolicy, "border policy", {
    "truncate" | "none" => BorderPolicy::Truncate,
    "mirror" | "reflect" => BorderPolicy::Mirror,
    "zero-pad" | "zero_pad" | "zero" => BorderPolicy::ZeroPad,
}, {
    BorderPolicy::Truncate => "truncate",
    BorderPolicy::Mirror => "mirror",
    BorderPolicy::ZeroPad => "zero-pad",
});

keyword_enum!(AffinityKernel, "affinity kernel", {
    "covariance" | "cov" | "linear" => AffinityKernel::Covariance,
    "gaussian" | "gauss" => AffinityKernel::Gaussian,
}, {
    AffinityKernel::Covariance => "covariance",
    AffinityKernel::Gaussian => "gaussian",
});

keyword_enum!(ColorSpace, "color space", {
    "rgb" | "srgb" => ColorSpace::Rgb,
    "lab" | "cielab" => ColorSpace::Lab,
}, {
    ColorSpace::Rgb => "rgb",
    ColorSpace::Lab => "lab",
});

keyword_enum!(SolverKind, "solver", {
    "bicgstab" | "bicg" => SolverKind::BiCgStab,
    "gauss-seidel" | "gauss_seidel" | "gs" => SolverKind::GaussSeidel,
}, {
    SolverKind::BiCgStab => "bicgstab",
    SolverKind::GaussSeidel => "gauss-seidel",
});

keyword_enum!(Preconditioner, "preconditioner", {
    "ilu0" | "ilu" => Preconditioner::Ilu0,
    "none" | "off" => Preconditioner::None,
}, {
    Preconditioner::Ilu0 => "ilu0",
    Preconditioner::None => "none",
});

#[derive(Debug, Clone)]
pub struct Config {
    /// Window radius; the window is `2 * radius + 1` pixels wide.
    pub radius: usize,
    /// Covariance regularization.
    pub epsilon: f64,
    /// Lower bound for raw covariance-kernel weights before normalization. Must be positive
    /// so every pixel stays connected to its window.
    pub affinity_floor: f64,
    pub kernel: AffinityKernel,
    pub border: BorderPolicy,
    pub color_space: ColorSpace,
    pub solver: SolverKind,
    pub preconditioner: Preconditioner,
    pub tolerance: f64,
    /// Iteration cap for small images.
    pub max_iterations: usize,
    /// The cap is `max(max_iterations, iterations_per_side * ceil(sqrt(rows)))`.
    pub iterations_per_side: usize,
    /// Keep every n-th pixel on both axes when loading from disk.
    pub down_scaling: usize,
    pub num_threads: usize,
}

pub fn default_config(fast: bool) -> Config {
    if fast {
        Config { radius: 1, epsilon: 1e-5, affinity_floor: 1e-6, kernel: AffinityKernel::Covariance, border: BorderPolicy::Truncate, color_space: ColorSpace::Rgb, solver: SolverKind::BiCgStab, preconditioner: Preconditioner::Ilu0, tolerance: 1e-6, max_iterations: 2_000, iterations_per_side: 10, down_scaling: 1, num_threads: num_cpus::get().max(1) }
    } else {
        Config { radius: 1, epsilon: 1e-5, affinity_floor: 1e-6, kernel: AffinityKernel::Covariance, border: BorderPolicy::Truncate, color_space: ColorSpace::Rgb, solver: SolverKind::BiCgStab, preconditioner: Preconditioner::Ilu0, tolerance: 1e-10, max_iterations: 10_000, iterations_per_side: 20, down_scaling: 1, num_threads: num_cpus::get().max(1) }
    }
}

impl Default for Config {
    fn default() -> Self {
        default_config(false)
    }
}

impl Config {
    pub fn window_size(&self) -> usize {
        2 * self.radius + 1
    }

    /// Sets the radius from an odd window size of at least 3.
    pub fn set_window_size(&mut self, window_size: usize) -> Result<()> {
        self.radius = radius_for_window(window_size)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.radius == 0 {
            return Err(ConfigError::InvalidWindow(self.window_size()).into());
        }
        check_positive("epsilon", self.epsilon)?;
        check_positive("tolerance", self.tolerance)?;
        check_positive("affinity_floor", self.affinity_floor)?;
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter { name: "max_iterations", value: 0.0 }.into());
        }
        if self.down_scaling == 0 {
            return Err(ConfigError::InvalidParameter { name: "down_scaling", value: 0.0 }.into());
        }
        Ok(())
    }
}

pub fn radius_for_window(window_size: usize) -> Result<usize> {
    if window_size % 2 != 1 || window_size < 3 {
        return Err(ConfigError::InvalidWindow(window_size).into());
    }
    Ok(window_size / 2)
}

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_size_must_be_odd_and_at_least_three() {
        assert_eq!(radius_for_window(3).unwrap(), 1);
        assert_eq!(radius_for_window(7).unwrap(), 3);
        assert!(radius_for_window(1).is_err());
        assert!(radius_for_window(4).is_err());
    }

    #[test]
    fn keywords_parse_case_insensitively() {
        assert_eq!("Mirror".parse::<BorderPolicy>().unwrap(), BorderPolicy::Mirror);
        assert_eq!("zero-pad".parse::<BorderPolicy>().unwrap(), BorderPolicy::ZeroPad);
        assert_eq!("GS".parse::<SolverKind>().unwrap(), SolverKind::GaussSeidel);
        assert!("median".parse::<AffinityKernel>().is_err());
        assert_eq!(BorderPolicy::ZeroPad.to_string(), "zero-pad");
    }

    #[test]
    fn default_config_is_valid() {
        assert!(default_config(false).validate().is_ok());
        assert!(default_config(true).validate().is_ok());
        let mut cfg = default_config(false);
        cfg.epsilon = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn affinity_floor_must_be_positive() {
        let mut cfg = default_config(false);
        cfg.affinity_floor = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, crate::SegmentError::Configuration(ConfigError::InvalidParameter { name: "affinity_floor", .. })));
        cfg.affinity_floor = 1e-9;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn preconditioner_keywords() {
        assert_eq!("ILU0".parse::<Preconditioner>().unwrap(), Preconditioner::Ilu0);
        assert_eq!("none".parse::<Preconditioner>().unwrap(), Preconditioner::None);
        assert_eq!(Preconditioner::default().to_string(), "ilu0");
    }
}
