//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::time::Duration;

use parsparse::{CsrMatrix, LocalWorld, ParCsrMatrix, Partition, Transport};

/// Receives that hang longer than this fail the test instead of blocking it.
pub const TIMEOUT: Duration = Duration::from_secs(20);

pub fn world(num_procs: usize) -> LocalWorld {
    LocalWorld::new(num_procs).with_timeout(TIMEOUT)
}

/// Bilinear finite-element stencil for the rotated anisotropic diffusion
/// operator `-div(Q diag(1, eps) Q^T grad u)`, `Q` a rotation by `theta`.
pub fn diffusion_stencil_2d(eps: f64, theta: f64) -> [[f64; 3]; 3] {
    let (s, c) = theta.sin_cos();
    let (cc, ss, cs) = (c * c, s * s, c * s);

    let a = (-eps - 1.0) * cc + (-eps - 1.0) * ss + (3.0 * eps - 3.0) * cs;
    let b = (2.0 * eps - 4.0) * cc + (-4.0 * eps + 2.0) * ss;
    let c = (-eps - 1.0) * cc + (-eps - 1.0) * ss + (-3.0 * eps + 3.0) * cs;
    let d = (-4.0 * eps + 2.0) * cc + (2.0 * eps - 4.0) * ss;
    let e = (8.0 * eps + 8.0) * cc + (8.0 * eps + 8.0) * ss;

    [[a, b, c], [d, e, d], [c, b, a]].map(|row| row.map(|v| v / 6.0))
}

/// Applies a 3x3 stencil on an `nx x ny` grid with Dirichlet boundaries.
///
/// Grid point `(i, j)` is unknown `i * ny + j`.
pub fn stencil_grid(stencil: &[[f64; 3]; 3], nx: usize, ny: usize) -> CsrMatrix<f64> {
    let mut triplets = Vec::new();
    for i in 0..nx {
        for j in 0..ny {
            for (si, row) in stencil.iter().enumerate() {
                for (sj, &value) in row.iter().enumerate() {
                    let (ii, jj) = ((i + si).wrapping_sub(1), (j + sj).wrapping_sub(1));
                    if ii < nx && jj < ny && value != 0.0 {
                        triplets.push((i * ny + j, ii * ny + jj, value));
                    }
                }
            }
        }
    }
    CsrMatrix::from_triplets(nx * ny, nx * ny, triplets)
}

/// Loads the rows of `global` this rank owns and finalizes.
pub fn distribute(
    comm: &dyn Transport,
    global: &CsrMatrix<f64>,
    partition: Partition,
) -> ParCsrMatrix {
    let mut a = ParCsrMatrix::new(partition);
    let first = a.partition().first_local_row;
    for local in 0..a.partition().local_num_rows {
        for (col, &value) in global.row_iter(first + local) {
            a.add_value(local, col, value).unwrap();
        }
    }
    a.finalize(comm).unwrap();
    a
}

/// Deterministic rectangular matrix: row `i` touches `width` columns spread
/// across the whole column range.
pub fn scattered(n_rows: usize, n_cols: usize, width: usize) -> CsrMatrix<f64> {
    let mut triplets = Vec::new();
    for i in 0..n_rows {
        for k in 0..width {
            let j = (i * 7 + k * (n_cols / width.max(1) + 1)) % n_cols;
            triplets.push((i, j, 1.0 + ((i + 3 * k) % 5) as f64 * 0.25));
        }
    }
    CsrMatrix::from_triplets(n_rows, n_cols, triplets)
}

/// Value of the test vector at global index `g`.
pub fn vector_entry(g: usize) -> f64 {
    ((g * 37) % 11) as f64 * 0.5 - 2.0
}

pub fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len(), "length mismatch");
    for (k, (g, w)) in got.iter().zip(want).enumerate() {
        assert!((g - w).abs() <= tol, "entry {}: got {}, want {}", k, g, w);
    }
}

/// Row and column starts of the 16 x 6 matrix split over 8 ranks.
pub const P_ROW_STARTS: [usize; 9] = [0, 2, 5, 8, 9, 11, 12, 14, 16];
pub const P_COL_STARTS: [usize; 9] = [0, 0, 1, 2, 2, 3, 4, 5, 6];

/// Explicit split blocks of the 16 x 6 matrix (all values 1) held by `rank`:
/// on-process block, off-process block and off-process column map.
pub fn p_blocks(rank: usize) -> (CsrMatrix<f64>, CsrMatrix<f64>, Vec<usize>) {
    let block = |rows: usize, cols: usize, row_ptr: &[usize], col_idx: &[usize]| {
        CsrMatrix::new(rows, cols, row_ptr.to_vec(), col_idx.to_vec(), vec![1.0; col_idx.len()])
    };
    match rank {
        0 => (block(2, 0, &[0, 0, 0], &[]), block(2, 2, &[0, 2, 3], &[0, 1, 1]), vec![4, 5]),
        1 => (
            block(3, 1, &[0, 0, 1, 1], &[0]),
            block(3, 3, &[0, 1, 2, 3], &[0, 1, 2]),
            vec![2, 3, 5],
        ),
        2 => (
            block(3, 1, &[0, 1, 2, 2], &[0, 0]),
            block(3, 3, &[0, 1, 2, 3], &[2, 1, 0]),
            vec![0, 3, 5],
        ),
        3 => (block(1, 0, &[0, 0], &[]), block(1, 1, &[0, 1], &[0]), vec![4]),
        4 => (block(2, 1, &[0, 1, 1], &[0]), block(2, 2, &[0, 1, 2], &[1, 0]), vec![0, 5]),
        5 => (block(1, 1, &[0, 1], &[0]), block(1, 1, &[0, 1], &[0]), vec![2]),
        6 => (block(2, 1, &[0, 1, 2], &[0, 0]), block(2, 2, &[0, 1, 2], &[0, 1]), vec![1, 2]),
        7 => (block(2, 1, &[0, 0, 1], &[0]), block(2, 3, &[0, 2, 4], &[1, 2, 0, 2]), vec![0, 1, 3]),
        _ => panic!("the 16 x 6 matrix is split over 8 ranks"),
    }
}

/// The 16 x 6 matrix on `rank`, finalized over `comm`.
pub fn p_matrix(comm: &dyn Transport) -> ParCsrMatrix {
    let rank = comm.rank();
    let partition = Partition::new(rank, P_ROW_STARTS.to_vec(), P_COL_STARTS.to_vec()).unwrap();
    let (on, off, map) = p_blocks(rank);
    let mut p = ParCsrMatrix::from_blocks(partition, on, off, map).unwrap();
    p.finalize(comm).unwrap();
    p
}
