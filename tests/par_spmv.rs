//! Distributed SpMV against the gathered sequential product, over both
//! communicators

mod common;

use std::f64::consts::PI;

use common::{assert_close, diffusion_stencil_2d, distribute, stencil_grid, vector_entry, world};
use parsparse::{
    reference_spmv, reference_spmv_t, CsrMatrix, Partition, TopologyConfig, Transport,
};

fn stencil(n: usize) -> CsrMatrix<f64> {
    stencil_grid(&diffusion_stencil_2d(0.001, PI / 8.0), n, n)
}

/// Runs `y = A x` on `num_procs` ranks over both communicators and returns
/// the per-rank (flat, topology-aware) results.
fn par_products(
    global: &CsrMatrix<f64>,
    num_procs: usize,
    ppn: usize,
) -> Vec<(Vec<f64>, Vec<f64>)> {
    world(num_procs).run(|comm| {
        let partition =
            Partition::uniform(comm.rank(), comm.size(), global.n_rows, global.n_cols).unwrap();
        let mut a = distribute(&comm, global, partition);
        a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(ppn))
            .unwrap();

        let x: Vec<f64> = a.on_proc_column_map().iter().map(|&g| vector_entry(g)).collect();
        let mut flat = vec![0.0; a.partition().local_num_rows];
        let mut tap = vec![0.0; a.partition().local_num_rows];
        a.mult(&comm, &x, &mut flat).unwrap();
        a.tap_mult(&x, &mut tap).unwrap();
        (flat, tap)
    })
}

#[test]
fn test_spmv_matches_sequential() {
    let global = stencil(10);
    let x: Vec<f64> = (0..global.n_cols).map(vector_entry).collect();
    let expected = reference_spmv(&global, &x);

    for num_procs in [1, 2, 3, 5, 8] {
        let results = par_products(&global, num_procs, 2);
        let flat: Vec<f64> = results.iter().flat_map(|(f, _)| f.iter().copied()).collect();
        assert_close(&flat, &expected, 1e-6);
    }
}

#[test]
fn test_tap_matches_flat_for_every_layout() {
    let global = common::scattered(40, 40, 5);
    for num_procs in [1, 2, 4, 7, 9] {
        for ppn in [1, 2, 3, 4, 16] {
            for (rank, (flat, tap)) in par_products(&global, num_procs, ppn).iter().enumerate() {
                assert_eq!(flat, tap, "procs={} ppn={} rank={}", num_procs, ppn, rank);
            }
        }
    }
}

#[test]
fn test_communicate_is_repeatable() {
    let global = common::scattered(24, 24, 3);
    let results = world(4).run(|comm| {
        let partition = Partition::uniform(comm.rank(), comm.size(), 24, 24).unwrap();
        let mut a = distribute(&comm, &global, partition);
        a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(2))
            .unwrap();
        let x: Vec<f64> = a.on_proc_column_map().iter().map(|&g| g as f64).collect();

        let flat = a.comm().unwrap();
        let first = flat.communicate(&comm, &x).unwrap();
        let second = flat.communicate(&comm, &x).unwrap();
        let tap = a.tap_comm().unwrap();
        let tap_first = tap.communicate(&x).unwrap();
        let tap_second = tap.communicate(&x).unwrap();
        (a.off_proc_column_map().to_vec(), first, second, tap_first, tap_second)
    });

    for (map, first, second, tap_first, tap_second) in results {
        // Halo slot i carries the value of global column map[i].
        let expected: Vec<f64> = map.iter().map(|&g| g as f64).collect();
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(tap_first, expected);
        assert_eq!(tap_second, expected);
    }
}

#[test]
fn test_alpha_beta_spmv_and_residual() {
    let global = stencil(6);
    let n = global.n_rows;
    let x: Vec<f64> = (0..n).map(vector_entry).collect();
    let b: Vec<f64> = (0..n).map(|g| g as f64 * 0.1).collect();
    let ax = reference_spmv(&global, &x);

    let results = world(3).run(|comm| {
        let partition = Partition::uniform(comm.rank(), comm.size(), n, n).unwrap();
        let mut a = distribute(&comm, &global, partition);
        a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(2))
            .unwrap();
        let rows: Vec<usize> = a.local_row_map().to_vec();
        let x_local: Vec<f64> = a.on_proc_column_map().iter().map(|&g| x[g]).collect();
        let b_local: Vec<f64> = rows.iter().map(|&g| b[g]).collect();

        let mut y = b_local.clone();
        a.spmv(&comm, 2.0, &x_local, -0.5, &mut y).unwrap();

        let mut r = vec![0.0; rows.len()];
        a.residual(&comm, &x_local, &b_local, &mut r).unwrap();
        let mut r_tap = vec![0.0; rows.len()];
        a.tap_residual(&x_local, &b_local, &mut r_tap).unwrap();
        (rows, y, r, r_tap)
    });

    for (rows, y, r, r_tap) in results {
        let want_y: Vec<f64> = rows.iter().map(|&g| 2.0 * ax[g] - 0.5 * b[g]).collect();
        let want_r: Vec<f64> = rows.iter().map(|&g| b[g] - ax[g]).collect();
        assert_close(&y, &want_y, 1e-10);
        assert_close(&r, &want_r, 1e-10);
        assert_eq!(r, r_tap);
    }
}

#[test]
fn test_transpose_products() {
    // Rectangular, so the transpose runs over a different column split.
    let global = common::scattered(30, 18, 4);
    let x: Vec<f64> = (0..global.n_rows).map(vector_entry).collect();
    let expected = reference_spmv_t(&global, &x);

    for num_procs in [1, 3, 4, 6] {
        let results = world(num_procs).run(|comm| {
            let partition = Partition::uniform(comm.rank(), comm.size(), 30, 18).unwrap();
            let mut a = distribute(&comm, &global, partition);
            a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(2))
                .unwrap();
            let x_local: Vec<f64> = a.local_row_map().iter().map(|&g| x[g]).collect();

            let mut y = vec![0.0; a.partition().local_num_cols];
            a.mult_t(&comm, &x_local, &mut y).unwrap();
            let mut y_tap = vec![0.0; a.partition().local_num_cols];
            a.tap_mult_t(&x_local, &mut y_tap).unwrap();
            (y, y_tap)
        });

        let flat: Vec<f64> = results.iter().flat_map(|(y, _)| y.iter().copied()).collect();
        let tap: Vec<f64> = results.iter().flat_map(|(_, y)| y.iter().copied()).collect();
        assert_close(&flat, &expected, 1e-10);
        assert_close(&tap, &expected, 1e-10);
    }
}

#[test]
fn test_rank_without_rows() {
    // Rank 1 owns neither rows nor columns.
    let global = stencil(3);
    let x: Vec<f64> = (0..9).map(vector_entry).collect();
    let expected = reference_spmv(&global, &x);

    let results = world(3).run(|comm| {
        let starts = vec![0, 4, 4, 9];
        let partition = Partition::new(comm.rank(), starts.clone(), starts).unwrap();
        let mut a = distribute(&comm, &global, partition);
        a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(2))
            .unwrap();
        let x_local: Vec<f64> = a.on_proc_column_map().iter().map(|&g| x[g]).collect();
        let mut y = vec![0.0; a.partition().local_num_rows];
        a.tap_mult(&x_local, &mut y).unwrap();
        y
    });

    assert!(results[1].is_empty());
    let gathered: Vec<f64> = results.concat();
    assert_close(&gathered, &expected, 1e-10);
}
