use std::thread;
use std::time::Instant;

use log::{debug, info};
use sprs::CsMat;

use crate::config::{Config, Preconditioner, SolverKind};
use crate::error::{NumericalError, Result, SegmentError};
use crate::labels::PropagatedScores;
use crate::preconditioner::Ilu0;
use crate::system::{spmv, ClassSystem, PropagationSystem};

#[derive(Clone, Copy, Debug)]
pub struct LinearSolver {
    kind: SolverKind,
    preconditioner: Preconditioner,
    tolerance: f64,
    max_iterations: usize,
    iterations_per_side: usize,
}

/// Iteration count and final residual of a successful solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    pub residual: f64,
}

impl LinearSolver {
    /// A solver with a fixed iteration cap and the default preconditioner.
    pub fn new(kind: SolverKind, tolerance: f64, max_iterations: usize) -> Self {
        Self { kind, preconditioner: Preconditioner::default(), tolerance, max_iterations, iterations_per_side: 0 }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.solver, cfg.tolerance, cfg.max_iterations)
            .with_preconditioner(cfg.preconditioner)
            .with_iterations_per_side(cfg.iterations_per_side)
    }

    pub fn with_preconditioner(mut self, preconditioner: Preconditioner) -> Self {
        self.preconditioner = preconditioner;
        self
    }

    pub fn with_iterations_per_side(mut self, iterations_per_side: usize) -> Self {
        self.iterations_per_side = iterations_per_side;
        self
    }

    /// Iteration cap for a system of `rows` unknowns laid out on a roughly square grid.
    pub fn iteration_cap(&self, rows: usize) -> usize {
        let side = (rows as f64).sqrt().ceil() as usize;
        self.max_iterations.max(self.iterations_per_side.saturating_mul(side))
    }

    /// The factor shared by every class solve on `matrix`, if this solver uses one.
    pub fn factor(&self, matrix: &CsMat<f64>) -> Result<Option<Ilu0>> {
        match (self.kind, self.preconditioner) {
            (SolverKind::BiCgStab, Preconditioner::Ilu0) => Ilu0::factor(matrix).map(Some),
            _ => Ok(None),
        }
    }

    pub fn solve(&self, system: &ClassSystem<'_>) -> Result<(Vec<f64>, SolveStats)> {
        if norm(&system.rhs) == 0.0 {
            return Ok((vec![0.0; system.rhs.len()], SolveStats { iterations: 0, residual: 0.0 }));
        }
        let factor = self.factor(system.matrix)?;
        self.solve_with(system, factor.as_ref())
    }

    /// Solves with a factor already computed by [`LinearSolver::factor`].
    pub fn solve_with(&self, system: &ClassSystem<'_>, factor: Option<&Ilu0>) -> Result<(Vec<f64>, SolveStats)> {
        let b = &system.rhs;
        let b_norm = norm(b);
        if b_norm == 0.0 {
            return Ok((vec![0.0; b.len()], SolveStats { iterations: 0, residual: 0.0 }));
        }
        let threshold = self.tolerance * b_norm.max(1.0);
        match self.kind {
            SolverKind::BiCgStab => self.bicgstab(system, factor, threshold),
            SolverKind::GaussSeidel => self.gauss_seidel(system, threshold),
        }
    }

    /// Solves every class, spreading classes over up to `num_threads` scoped workers.
    pub fn solve_all(&self, system: &PropagationSystem, num_threads: usize) -> Result<PropagatedScores> {
        let k = system.num_classes();
        let grid = system.labels().grid();
        let num_threads = num_threads.clamp(1, k.max(1));
        info!("Solving {} classes on {} rows with {} ({} thread(s))", k, system.rows(), self.kind, num_threads);
        let start = Instant::now();
        let factor = self.factor(system.matrix())?;
        let factor = factor.as_ref();

        let per_class: Vec<Result<Vec<f64>>> = if num_threads == 1 {
            (0..k).map(|class| self.solve_class(system, class, factor)).collect()
        } else {
            let chunk = (k + num_threads - 1) / num_threads;
            thread::scope(|scope| {
                let handles: Vec<_> = (0..num_threads)
                    .map(|t| {
                        let range = (t * chunk).min(k)..((t + 1) * chunk).min(k);
                        scope.spawn(move || range.map(|class| self.solve_class(system, class, factor)).collect::<Vec<_>>())
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| match h.join() {
                        Ok(results) => results,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            })
        };

        let scores = per_class.into_iter().collect::<Result<Vec<_>, SegmentError>>()?;
        info!("Solved {} classes in {} ms", k, start.elapsed().as_millis());
        Ok(PropagatedScores::new(grid, scores))
    }

    fn solve_class(&self, system: &PropagationSystem, class: usize, factor: Option<&Ilu0>) -> Result<Vec<f64>> {
        let (x, stats) = self.solve_with(&system.for_class(class), factor)?;
        debug!("class {}: {} iterations, residual {:.3e}", class, stats.iterations, stats.residual);
        Ok(x)
    }

    // Right-preconditioned BiCGSTAB: the tracked residual is the true `b - A x`.
    fn bicgstab(&self, system: &ClassSystem<'_>, factor: Option<&Ilu0>, threshold: f64) -> Result<(Vec<f64>, SolveStats)> {
        let a = system.matrix;
        let b = &system.rhs;
        let n = b.len();
        let cap = self.iteration_cap(n);
        let breakdown = |iteration| -> SegmentError { NumericalError::Breakdown { class: system.class, rows: n, iteration }.into() };

        let mut x = b.clone();
        let mut r = vec![0.0; n];
        spmv(a, &x, &mut r);
        r.iter_mut().zip(b).for_each(|(ri, bi)| *ri = bi - *ri);
        let mut r_norm = norm(&r);
        if r_norm <= threshold {
            return Ok((x, SolveStats { iterations: 0, residual: r_norm }));
        }

        let r_hat = r.clone();
        let mut p = vec![0.0; n];
        let mut p_hat = vec![0.0; n];
        let mut v = vec![0.0; n];
        let mut s = vec![0.0; n];
        let mut s_hat = vec![0.0; n];
        let mut t = vec![0.0; n];
        let (mut rho, mut alpha, mut omega) = (1.0f64, 1.0f64, 1.0f64);

        for it in 1..=cap {
            let rho_next = dot(&r_hat, &r);
            if rho_next == 0.0 || !rho_next.is_finite() {
                return Err(breakdown(it));
            }
            if it == 1 {
                p.copy_from_slice(&r);
            } else {
                let beta = (rho_next / rho) * (alpha / omega);
                for i in 0..n {
                    p[i] = r[i] + beta * (p[i] - omega * v[i]);
                }
            }
            precondition(factor, &p, &mut p_hat);
            spmv(a, &p_hat, &mut v);
            let denom = dot(&r_hat, &v);
            if denom == 0.0 || !denom.is_finite() {
                return Err(breakdown(it));
            }
            alpha = rho_next / denom;
            for i in 0..n {
                s[i] = r[i] - alpha * v[i];
            }
            let s_norm = norm(&s);
            if s_norm <= threshold {
                axpy(alpha, &p_hat, &mut x);
                return Ok((x, SolveStats { iterations: it, residual: s_norm }));
            }
            precondition(factor, &s, &mut s_hat);
            spmv(a, &s_hat, &mut t);
            let tt = dot(&t, &t);
            if tt == 0.0 {
                return Err(breakdown(it));
            }
            omega = dot(&t, &s) / tt;
            for i in 0..n {
                x[i] += alpha * p_hat[i] + omega * s_hat[i];
                r[i] = s[i] - omega * t[i];
            }
            r_norm = norm(&r);
            if r_norm <= threshold {
                return Ok((x, SolveStats { iterations: it, residual: r_norm }));
            }
            if omega == 0.0 || !omega.is_finite() {
                return Err(breakdown(it));
            }
            rho = rho_next;
        }
        Err(self.not_converged(system, &x, cap))
    }

    fn gauss_seidel(&self, system: &ClassSystem<'_>, threshold: f64) -> Result<(Vec<f64>, SolveStats)> {
        let a = system.matrix;
        let b = &system.rhs;
        let n = b.len();
        let cap = self.iteration_cap(n);

        let mut diag = vec![0.0; n];
        for (i, row) in a.outer_iterator().enumerate() {
            diag[i] = row.iter().filter(|&(j, _)| j == i).map(|(_, &v)| v).sum();
            if diag[i] == 0.0 {
                return Err(NumericalError::ZeroDiagonal { class: system.class, row: i }.into());
            }
        }

        let mut x = b.clone();
        let mut ax = vec![0.0; n];
        for sweep in 1..=cap {
            for (i, row) in a.outer_iterator().enumerate() {
                let off: f64 = row.iter().filter(|&(j, _)| j != i).map(|(j, &v)| v * x[j]).sum();
                x[i] = (b[i] - off) / diag[i];
            }
            spmv(a, &x, &mut ax);
            let residual = residual_norm(&ax, b);
            if residual <= threshold {
                return Ok((x, SolveStats { iterations: sweep, residual }));
            }
        }
        Err(self.not_converged(system, &x, cap))
    }

    fn not_converged(&self, system: &ClassSystem<'_>, x: &[f64], iterations: usize) -> SegmentError {
        let b = &system.rhs;
        let mut ax = vec![0.0; b.len()];
        spmv(system.matrix, x, &mut ax);
        let worst_row = ax
            .iter()
            .zip(b)
            .map(|(l, r)| (l - r).abs())
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        NumericalError::NotConverged {
            class: system.class,
            rows: b.len(),
            iterations,
            residual: residual_norm(&ax, b),
            worst_row,
        }
        .into()
    }
}

/// Residual `|| b - A x ||` of a candidate solution.
pub fn residual(matrix: &CsMat<f64>, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; b.len()];
    spmv(matrix, x, &mut ax);
    residual_norm(&ax, b)
}

fn residual_norm(ax: &[f64], b: &[f64]) -> f64 {
    ax.iter().zip(b).map(|(l, r)| (r - l) * (r - l)).sum::<f64>().sqrt()
}

fn precondition(factor: Option<&Ilu0>, src: &[f64], dst: &mut [f64]) {
    match factor {
        Some(ilu) => ilu.apply(src, dst),
        None => dst.copy_from_slice(src),
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    y.iter_mut().zip(x).for_each(|(yi, xi)| *yi += alpha * xi);
}
