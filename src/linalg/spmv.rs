//! Sparse matrix-vector products, sequential and distributed.

use num_traits::Float;

use crate::comm::Transport;
use crate::error::Result;
use crate::matrix::{CscMatrix, CsrMatrix, ParCsrMatrix};

fn is_value<T: Float>(x: T, target: T) -> bool {
    (x - target).abs() < T::epsilon()
}

/// `y = beta * y`, overwriting `y` when `beta == 0`.
fn scale<T: Float>(y: &mut [T], beta: T) {
    if is_value(beta, T::zero()) {
        y.fill(T::zero());
    } else if !is_value(beta, T::one()) {
        y.iter_mut().for_each(|yi| *yi = *yi * beta);
    }
}

/// `y[k] = alpha * dot(k) + beta * y[k]`, with one dot product per output slot.
fn apply_dots<T: Float>(y: &mut [T], alpha: T, beta: T, dot: impl Fn(usize) -> T) {
    let zero = T::zero();
    let one = T::one();

    if is_value(alpha, zero) {
        scale(y, beta);
        return;
    }

    if is_value(beta, zero) {
        if is_value(alpha, one) {
            for (k, yk) in y.iter_mut().enumerate() {
                *yk = dot(k);
            }
        } else if is_value(alpha, -one) {
            for (k, yk) in y.iter_mut().enumerate() {
                *yk = -dot(k);
            }
        } else {
            for (k, yk) in y.iter_mut().enumerate() {
                *yk = alpha * dot(k);
            }
        }
    } else if is_value(beta, one) {
        if is_value(alpha, one) {
            for (k, yk) in y.iter_mut().enumerate() {
                *yk = *yk + dot(k);
            }
        } else if is_value(alpha, -one) {
            for (k, yk) in y.iter_mut().enumerate() {
                *yk = *yk - dot(k);
            }
        } else {
            for (k, yk) in y.iter_mut().enumerate() {
                *yk = *yk + alpha * dot(k);
            }
        }
    } else {
        for (k, yk) in y.iter_mut().enumerate() {
            *yk = alpha * dot(k) + beta * *yk;
        }
    }
}

/// `y = alpha * sum_k x[k] * line(k) + beta * y`, where `line(k)` is a
/// compressed row or column scattered into `y`.
fn apply_scatter<'a, T: Float + 'a, L>(y: &mut [T], alpha: T, beta: T, x: &[T], line: L)
where
    L: Fn(usize) -> (&'a [usize], &'a [T]),
{
    scale(y, beta);
    if is_value(alpha, T::zero()) {
        return;
    }

    let factor = |xk: T| {
        if is_value(alpha, T::one()) {
            xk
        } else if is_value(alpha, -T::one()) {
            -xk
        } else {
            alpha * xk
        }
    };

    for (k, &xk) in x.iter().enumerate() {
        let scaled = factor(xk);
        let (idx, vals) = line(k);
        for (&i, &v) in idx.iter().zip(vals) {
            y[i] = y[i] + v * scaled;
        }
    }
}

/// `y = alpha * A * x + beta * y`
///
/// The common cases `alpha` in {0, 1, -1} and `beta` in {0, 1} skip the
/// corresponding multiplications. With `beta == 0`, `y` is overwritten and its
/// old contents never read.
pub fn seq_spmv<T: Float>(a: &CsrMatrix<T>, x: &[T], y: &mut [T], alpha: T, beta: T) {
    debug_assert_eq!(x.len(), a.n_cols);
    debug_assert_eq!(y.len(), a.n_rows);

    apply_dots(y, alpha, beta, |i| {
        a.row_iter(i).fold(T::zero(), |acc, (j, &v)| acc + v * x[j])
    });
}

/// `y = alpha * A^T * x + beta * y`
pub fn seq_spmv_t<T: Float>(a: &CsrMatrix<T>, x: &[T], y: &mut [T], alpha: T, beta: T) {
    debug_assert_eq!(x.len(), a.n_rows);
    debug_assert_eq!(y.len(), a.n_cols);

    apply_scatter(y, alpha, beta, x, |i| (a.row_cols(i), a.row_values(i)));
}

/// `y = alpha * A * x + beta * y` for a column-compressed block
///
/// Every column is scattered into `y`, scaled by its entry of `x`.
pub fn seq_spmv_csc<T: Float>(a: &CscMatrix<T>, x: &[T], y: &mut [T], alpha: T, beta: T) {
    debug_assert_eq!(x.len(), a.n_cols);
    debug_assert_eq!(y.len(), a.n_rows);

    apply_scatter(y, alpha, beta, x, |j| (a.col_rows(j), a.col_values(j)));
}

/// `y = alpha * A[:, cols] * x + beta * y`
///
/// Only the listed columns take part: `x[k]` multiplies column `cols[k]`.
/// Pairs with the column list returned by
/// [`to_csc_compressed`](CsrMatrix::to_csc_compressed).
pub fn seq_spmv_csc_cols<T: Float>(
    a: &CscMatrix<T>,
    x: &[T],
    y: &mut [T],
    alpha: T,
    beta: T,
    cols: &[usize],
) {
    debug_assert_eq!(x.len(), cols.len());
    debug_assert_eq!(y.len(), a.n_rows);

    apply_scatter(y, alpha, beta, x, |k| (a.col_rows(cols[k]), a.col_values(cols[k])));
}

/// `y = alpha * A^T * x + beta * y` for a column-compressed block
pub fn seq_spmv_t_csc<T: Float>(a: &CscMatrix<T>, x: &[T], y: &mut [T], alpha: T, beta: T) {
    debug_assert_eq!(x.len(), a.n_rows);
    debug_assert_eq!(y.len(), a.n_cols);

    apply_dots(y, alpha, beta, |j| {
        a.col_iter(j).fold(T::zero(), |acc, (i, &v)| acc + v * x[i])
    });
}

/// `y = alpha * A[:, cols]^T * x + beta * y`, one output slot per listed column.
pub fn seq_spmv_t_csc_cols<T: Float>(
    a: &CscMatrix<T>,
    x: &[T],
    y: &mut [T],
    alpha: T,
    beta: T,
    cols: &[usize],
) {
    debug_assert_eq!(x.len(), a.n_rows);
    debug_assert_eq!(y.len(), cols.len());

    apply_dots(y, alpha, beta, |k| {
        a.col_iter(cols[k]).fold(T::zero(), |acc, (i, &v)| acc + v * x[i])
    });
}

/// Local products dispatched on the storage format of a block.
pub trait BlockSpmv<T> {
    /// `y = alpha * A * x + beta * y`
    fn spmv(&self, x: &[T], y: &mut [T], alpha: T, beta: T);

    /// `y = alpha * A^T * x + beta * y`
    fn spmv_t(&self, x: &[T], y: &mut [T], alpha: T, beta: T);
}

impl<T: Float> BlockSpmv<T> for CsrMatrix<T> {
    fn spmv(&self, x: &[T], y: &mut [T], alpha: T, beta: T) {
        seq_spmv(self, x, y, alpha, beta);
    }

    fn spmv_t(&self, x: &[T], y: &mut [T], alpha: T, beta: T) {
        seq_spmv_t(self, x, y, alpha, beta);
    }
}

impl<T: Float> BlockSpmv<T> for CscMatrix<T> {
    fn spmv(&self, x: &[T], y: &mut [T], alpha: T, beta: T) {
        seq_spmv_csc(self, x, y, alpha, beta);
    }

    fn spmv_t(&self, x: &[T], y: &mut [T], alpha: T, beta: T) {
        seq_spmv_t_csc(self, x, y, alpha, beta);
    }
}

impl ParCsrMatrix {
    /// `y = alpha * A * x + beta * y` over the flat communicator.
    ///
    /// `x` holds the locally owned columns, `y` the locally owned rows.
    /// Collective over `comm`.
    pub fn spmv(
        &self,
        comm: &dyn Transport,
        alpha: f64,
        x: &[f64],
        beta: f64,
        y: &mut [f64],
    ) -> Result<()> {
        let halo = self.comm()?.communicate(comm, x)?;
        self.apply_blocks(alpha, x, &halo, beta, y);
        Ok(())
    }

    /// `y = A * x` over the flat communicator.
    pub fn mult(&self, comm: &dyn Transport, x: &[f64], y: &mut [f64]) -> Result<()> {
        self.spmv(comm, 1.0, x, 0.0, y)
    }

    /// `y = alpha * A * x + beta * y` over the topology-aware communicator.
    ///
    /// Requires [`init_tap_comm`](ParCsrMatrix::init_tap_comm).
    pub fn tap_spmv(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) -> Result<()> {
        let halo = self.tap_comm()?.communicate(x)?;
        self.apply_blocks(alpha, x, &halo, beta, y);
        Ok(())
    }

    /// `y = A * x` over the topology-aware communicator.
    pub fn tap_mult(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        self.tap_spmv(1.0, x, 0.0, y)
    }

    /// `y = A^T * x` over the flat communicator.
    ///
    /// `x` holds the locally owned rows, `y` the locally owned columns.
    pub fn mult_t(&self, comm: &dyn Transport, x: &[f64], y: &mut [f64]) -> Result<()> {
        let pattern = self.comm()?;
        let off = self.off_block_t(x);
        let returned = pattern.communicate_t(comm, &off)?;
        self.finish_t(x, &returned, y);
        Ok(())
    }

    /// `y = A^T * x` over the topology-aware communicator.
    pub fn tap_mult_t(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        let pattern = self.tap_comm()?;
        let off = self.off_block_t(x);
        let returned = pattern.communicate_t(&off)?;
        self.finish_t(x, &returned, y);
        Ok(())
    }

    /// `r = b - A * x` over the flat communicator.
    pub fn residual(
        &self,
        comm: &dyn Transport,
        x: &[f64],
        b: &[f64],
        r: &mut [f64],
    ) -> Result<()> {
        r.copy_from_slice(b);
        self.spmv(comm, -1.0, x, 1.0, r)
    }

    /// `r = b - A * x` over the topology-aware communicator.
    pub fn tap_residual(&self, x: &[f64], b: &[f64], r: &mut [f64]) -> Result<()> {
        r.copy_from_slice(b);
        self.tap_spmv(-1.0, x, 1.0, r)
    }

    fn apply_blocks(&self, alpha: f64, x: &[f64], halo: &[f64], beta: f64, y: &mut [f64]) {
        seq_spmv(self.on_proc(), x, y, alpha, beta);
        if self.off_proc_num_cols() > 0 {
            seq_spmv(self.off_proc(), halo, y, alpha, 1.0);
        }
    }

    /// Off-process block contribution to `A^T x`, one value per column map entry.
    fn off_block_t(&self, x: &[f64]) -> Vec<f64> {
        let mut off = vec![0.0; self.off_proc_num_cols()];
        seq_spmv_t(self.off_proc(), x, &mut off, 1.0, 0.0);
        off
    }

    fn finish_t(&self, x: &[f64], returned: &[f64], y: &mut [f64]) {
        seq_spmv_t(self.on_proc(), x, y, 1.0, 0.0);
        for (yj, r) in y.iter_mut().zip(returned) {
            *yj += r;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CsrMatrix<f64> {
        //    [2 0 1]
        //    [0 3 0]
        //    [4 0 5]
        CsrMatrix::new(
            3,
            3,
            vec![0, 2, 3, 5],
            vec![0, 2, 1, 0, 2],
            vec![2.0, 1.0, 3.0, 4.0, 5.0],
        )
    }

    fn general(a: &CsrMatrix<f64>, x: &[f64], y: &[f64], alpha: f64, beta: f64) -> Vec<f64> {
        (0..a.n_rows)
            .map(|i| {
                let dot: f64 = a.row_iter(i).map(|(j, &v)| v * x[j]).sum();
                alpha * dot + beta * y[i]
            })
            .collect()
    }

    #[test]
    fn test_special_cases_match_general_form() {
        let a = sample();
        let x = [1.0, -2.0, 0.5];
        let y0 = [0.25, 1.0, -3.0];

        for &alpha in &[0.0, 1.0, -1.0, 2.5] {
            for &beta in &[0.0, 1.0, -0.5] {
                let mut y = y0;
                seq_spmv(&a, &x, &mut y, alpha, beta);
                let expected = general(&a, &x, &y0, alpha, beta);
                for (got, want) in y.iter().zip(&expected) {
                    assert!((got - want).abs() < 1e-12, "alpha={} beta={}", alpha, beta);
                }
            }
        }
    }

    #[test]
    fn test_beta_zero_ignores_garbage() {
        let a = sample();
        let mut y = [f64::NAN; 3];
        seq_spmv(&a, &[1.0, 1.0, 1.0], &mut y, 1.0, 0.0);
        assert_eq!(y, [3.0, 3.0, 9.0]);
    }

    #[test]
    fn test_transpose_product() {
        let a = sample();
        let mut y = [1.0, 1.0, 1.0];
        seq_spmv_t(&a, &[1.0, 2.0, 3.0], &mut y, 1.0, 1.0);
        // A^T x = [2 + 12, 6, 1 + 15]
        assert_eq!(y, [15.0, 7.0, 17.0]);

        let t = a.transpose();
        let mut z = [0.0; 3];
        seq_spmv(&t, &[1.0, 2.0, 3.0], &mut z, 2.0, 0.0);
        let mut w = [0.0; 3];
        seq_spmv_t(&a, &[1.0, 2.0, 3.0], &mut w, 2.0, 0.0);
        assert_eq!(z, w);
    }

    fn assert_close(got: &[f64], want: &[f64], what: &str) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-12, "{}: {:?} vs {:?}", what, got, want);
        }
    }

    /// Products over an alpha/beta grid, through the format-dispatching trait.
    fn alpha_beta_grid<B: BlockSpmv<f64>>(
        block: &B,
        x: &[f64],
        y0: &[f64],
        transpose: bool,
    ) -> Vec<Vec<f64>> {
        let mut out = Vec::new();
        for &alpha in &[0.0, 1.0, -1.0, 2.5] {
            for &beta in &[0.0, 1.0, -0.5] {
                let mut y = y0.to_vec();
                if transpose {
                    block.spmv_t(x, &mut y, alpha, beta);
                } else {
                    block.spmv(x, &mut y, alpha, beta);
                }
                out.push(y);
            }
        }
        out
    }

    #[test]
    fn test_csc_kernels_match_csr() {
        let csr = CsrMatrix::new(
            3,
            4,
            vec![0, 2, 3, 6],
            vec![0, 3, 1, 0, 2, 3],
            vec![2.0, 1.0, 3.0, 4.0, -1.0, 5.0],
        );
        let csc = csr.to_csc();
        let x = [1.0, -2.0, 0.5, 3.0];
        let y0 = [0.25, 1.0, -3.0];
        let csc_products = alpha_beta_grid(&csc, &x, &y0, false);
        for (got, want) in csc_products.iter().zip(alpha_beta_grid(&csr, &x, &y0, false)) {
            assert_close(got, &want, "A x");
        }

        let xt = [1.0, 2.0, -1.0];
        let yt0 = [0.5, -1.0, 2.0, 1.0];
        let csc_products = alpha_beta_grid(&csc, &xt, &yt0, true);
        for (got, want) in csc_products.iter().zip(alpha_beta_grid(&csr, &xt, &yt0, true)) {
            assert_close(got, &want, "A^T x");
        }
    }

    #[test]
    fn test_csc_beta_zero_ignores_garbage() {
        let csc = sample().to_csc();
        let mut y = [f64::NAN; 3];
        seq_spmv_csc(&csc, &[1.0, 1.0, 1.0], &mut y, 1.0, 0.0);
        assert_eq!(y, [3.0, 3.0, 9.0]);

        let mut z = [f64::NAN; 3];
        seq_spmv_t_csc(&csc, &[1.0, 1.0, 1.0], &mut z, -1.0, 0.0);
        assert_eq!(z, [-6.0, -3.0, -6.0]);
    }

    #[test]
    fn test_csc_column_list_products() {
        //    [2 0 1]
        //    [0 3 0]
        //    [4 0 5]
        let csc = sample().to_csc();
        let cols = [2, 0];

        // Only columns 2 and 0 take part: y = 2 * ([1, 0, 5] * 3 + [2, 0, 4] * -1) + y
        let mut y = [1.0, 1.0, 1.0];
        seq_spmv_csc_cols(&csc, &[3.0, -1.0], &mut y, 2.0, 1.0, &cols);
        assert_eq!(y, [3.0, 1.0, 23.0]);

        // Dot products of x with columns 2 and 0, in list order
        let mut z = [10.0, 10.0];
        seq_spmv_t_csc_cols(&csc, &[1.0, 2.0, 3.0], &mut z, 1.0, 0.0, &cols);
        assert_eq!(z, [16.0, 14.0]);

        // The full column list reproduces the plain product
        let x = [1.0, -2.0, 0.5];
        let mut full = [0.0; 3];
        let mut listed = [0.0; 3];
        seq_spmv_csc(&csc, &x, &mut full, -1.0, 0.0);
        seq_spmv_csc_cols(&csc, &x, &mut listed, -1.0, 0.0, &[0, 1, 2]);
        assert_eq!(full, listed);
    }

    #[test]
    fn test_compressed_block_with_column_list() {
        // Columns 1 and 4 of a 2 x 6 block are the only nonempty ones.
        let csr = CsrMatrix::new(2, 6, vec![0, 2, 3], vec![1, 4, 4], vec![1.0, 2.0, 3.0]);
        let (compressed, cols) = csr.to_csc_compressed();
        assert_eq!(compressed.n_cols, cols.len());

        let x_full = [0.0, 5.0, 0.0, 0.0, -1.0, 0.0];
        let x_listed: Vec<f64> = cols.iter().map(|&g| x_full[g]).collect();
        let positions: Vec<usize> = (0..cols.len()).collect();

        let mut y = [0.0; 2];
        seq_spmv_csc_cols(&compressed, &x_listed, &mut y, 1.0, 0.0, &positions);
        let mut want = [0.0; 2];
        seq_spmv(&csr, &x_full, &mut want, 1.0, 0.0);
        assert_eq!(y, want);
    }
}
