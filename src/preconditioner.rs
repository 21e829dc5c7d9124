use log::debug;
use sprs::CsMat;

use crate::error::{NumericalError, Result};

/// Incomplete LU factorization with the sparsity pattern of the matrix itself.
///
/// `L` (unit lower) and `U` share one CSR layout, so applying the factor is a
/// forward and a backward sweep over the matrix non-zeros. The factor depends
/// on the matrix only and is shared by every class solve.
#[derive(Clone, Debug)]
pub struct Ilu0 {
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
    diag: Vec<usize>,
}

impl Ilu0 {
    pub fn factor(matrix: &CsMat<f64>) -> Result<Self> {
        let n = matrix.rows();
        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = Vec::with_capacity(matrix.nnz());
        let mut values = Vec::with_capacity(matrix.nnz());
        let mut diag = vec![usize::MAX; n];
        indptr.push(0);
        for (i, row) in matrix.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                if j == i {
                    diag[i] = indices.len();
                }
                indices.push(j);
                values.push(v);
            }
            indptr.push(indices.len());
        }

        // column -> slot in the row being eliminated
        let mut slot = vec![usize::MAX; n];
        for i in 0..n {
            if diag[i] == usize::MAX {
                return Err(NumericalError::ZeroPivot { row: i }.into());
            }
            let (start, end) = (indptr[i], indptr[i + 1]);
            for kk in start..end {
                slot[indices[kk]] = kk;
            }
            for kk in start..diag[i] {
                let k = indices[kk];
                let l_ik = values[kk] / values[diag[k]];
                values[kk] = l_ik;
                for jj in diag[k] + 1..indptr[k + 1] {
                    let pos = slot[indices[jj]];
                    if pos != usize::MAX {
                        let update = l_ik * values[jj];
                        values[pos] -= update;
                    }
                }
            }
            for kk in start..end {
                slot[indices[kk]] = usize::MAX;
            }
            let pivot = values[diag[i]];
            if pivot == 0.0 || !pivot.is_finite() {
                return Err(NumericalError::ZeroPivot { row: i }.into());
            }
        }
        debug!("ILU(0) factor: {} rows, {} non-zeros", n, values.len());
        Ok(Self { indptr, indices, values, diag })
    }

    pub fn rows(&self) -> usize {
        self.diag.len()
    }

    /// `z = (L U)^-1 r`
    pub fn apply(&self, r: &[f64], z: &mut [f64]) {
        let n = self.rows();
        for i in 0..n {
            let mut acc = r[i];
            for kk in self.indptr[i]..self.diag[i] {
                acc -= self.values[kk] * z[self.indices[kk]];
            }
            z[i] = acc;
        }
        for i in (0..n).rev() {
            let mut acc = z[i];
            for kk in self.diag[i] + 1..self.indptr[i + 1] {
                acc -= self.values[kk] * z[self.indices[kk]];
            }
            z[i] = acc / self.values[self.diag[i]];
        }
    }
}
