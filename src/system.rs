use log::debug;
use sprs::{CsMat, TriMat};

use crate::affinity::AffinityWeights;
use crate::scribbles::ScribbleLabels;

/// The shared propagation matrix plus the scribbles that define each class's right-hand side.
///
/// Row `p` of the matrix is `x(p) - sum_q w(p,q) x(q)` for an unscribbled pixel and
/// the identity row for a scribbled one. Only the right-hand side depends on the class,
/// so the matrix is assembled once.
#[derive(Clone, Debug)]
pub struct PropagationSystem {
    matrix: CsMat<f64>,
    labels: ScribbleLabels,
}

/// The system for one class: `L x = b` with `b(p) = 1` on that class's scribbles.
#[derive(Debug)]
pub struct ClassSystem<'a> {
    pub class: usize,
    pub matrix: &'a CsMat<f64>,
    pub rhs: Vec<f64>,
}

pub struct SparseSystemBuilder;

impl SparseSystemBuilder {
    pub fn build(weights: &AffinityWeights, labels: &ScribbleLabels) -> PropagationSystem {
        let n = weights.len();
        let mut tri = TriMat::with_capacity((n, n), weights.nnz() + n);
        for p in 0..n {
            tri.add_triplet(p, p, 1.0);
            if labels.is_scribbled(p) {
                continue;
            }
            for &(q, w) in weights.row(p) {
                tri.add_triplet(p, q, -w);
            }
        }
        let matrix: CsMat<f64> = tri.to_csr();
        debug!("propagation system: {} rows, {} constrained, {} non-zeros", n, labels.total(), matrix.nnz());
        PropagationSystem { matrix, labels: labels.clone() }
    }
}

impl PropagationSystem {
    pub fn matrix(&self) -> &CsMat<f64> {
        &self.matrix
    }

    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.num_classes()
    }

    pub fn labels(&self) -> &ScribbleLabels {
        &self.labels
    }

    pub fn rhs(&self, class: usize) -> Vec<f64> {
        let mut b = vec![0.0; self.rows()];
        for (p, c) in self.labels.iter() {
            if c == class {
                b[p] = 1.0;
            }
        }
        b
    }

    pub fn for_class(&self, class: usize) -> ClassSystem<'_> {
        ClassSystem { class, matrix: &self.matrix, rhs: self.rhs(class) }
    }
}

/// `y = A x` for a CSR matrix.
pub fn spmv(matrix: &CsMat<f64>, x: &[f64], y: &mut [f64]) {
    for (i, row) in matrix.outer_iterator().enumerate() {
        y[i] = row.iter().map(|(j, &v)| v * x[j]).sum();
    }
}
