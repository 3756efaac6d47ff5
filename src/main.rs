use std::time::{Duration, Instant};

use parsparse::{
    gather_global, gather_vector, reference_spgemm, LocalWorld, ParCsrMatrix, Partition, Result,
    TopologyConfig, Transport,
};

/// 2D five-point Laplacian on an `n x n` grid, rows split evenly.
fn laplacian(comm: &dyn Transport, n: usize) -> Result<ParCsrMatrix> {
    let size = n * n;
    let partition = Partition::uniform(comm.rank(), comm.size(), size, size)?;
    let mut a = ParCsrMatrix::new(partition);

    for local in 0..a.partition().local_num_rows {
        let g = a.local_row_map()[local];
        let (i, j) = (g / n, g % n);
        a.add_value(local, g, 4.0)?;
        if i > 0 {
            a.add_value(local, g - n, -1.0)?;
        }
        if i + 1 < n {
            a.add_value(local, g + n, -1.0)?;
        }
        if j > 0 {
            a.add_value(local, g - 1, -1.0)?;
        }
        if j + 1 < n {
            a.add_value(local, g + 1, -1.0)?;
        }
    }
    a.finalize(comm)?;
    Ok(a)
}

fn run_rank(comm: &dyn Transport, n: usize, config: &TopologyConfig) -> Result<String> {
    let mut a = laplacian(comm, n)?;
    a.init_tap_comm(comm, config)?;

    let x: Vec<f64> = a.on_proc_column_map().iter().map(|&g| (g % 7) as f64).collect();
    let mut y_flat = vec![0.0; a.partition().local_num_rows];
    let mut y_tap = vec![0.0; a.partition().local_num_rows];

    let start = Instant::now();
    a.mult(comm, &x, &mut y_flat)?;
    let flat_time = start.elapsed();

    let start = Instant::now();
    a.tap_mult(&x, &mut y_tap)?;
    let tap_time = start.elapsed();

    let global = gather_global(comm, &a)?;
    let flat = gather_vector(comm, &y_flat)?;
    let tap = gather_vector(comm, &y_tap)?;
    let max_diff = flat
        .iter()
        .zip(&tap)
        .map(|(f, t)| (f - t).abs())
        .fold(0.0, f64::max);

    let a2 = a.mult_matrix(comm, &a)?;
    let a2_global = gather_global(comm, &a2)?;
    let reference = reference_spgemm(&global, &global);

    let flat_comm = a.comm()?;
    let tap_comm = a.tap_comm()?;
    Ok(format!(
        "rank {:>2} node {:>2}{}: flat sends {:>2} ({:>4} values, {:?}), \
         tap inter-node sends {:>2} intra-node {:>2} ({:?}), max |flat - tap| = {:.1e}, \
         A^2 nnz {} (reference {})",
        comm.rank(),
        tap_comm.node(),
        if tap_comm.is_representative() { "*" } else { " " },
        flat_comm.num_sends(),
        flat_comm.send_size(),
        flat_time,
        tap_comm.inter_node_sends(),
        tap_comm.intra_node_sends(),
        tap_time,
        max_diff,
        a2_global.nnz(),
        reference.nnz(),
    ))
}

fn main() {
    let num_procs = 8;
    let grid = 24;
    let config = TopologyConfig::from_env();

    println!("parsparse {}: distributed 2D Laplacian SpMV", parsparse::VERSION);
    println!(
        "  {} ranks, {} processes per node, {}x{} grid",
        num_procs, config.procs_per_node, grid, grid
    );
    println!("  (set PPN to change the node layout; * marks representatives)\n");

    let world = LocalWorld::new(num_procs).with_timeout(Duration::from_secs(30));
    let reports = world.run(|comm| run_rank(&comm, grid, &config));

    for report in reports {
        match report {
            Ok(line) => println!("{}", line),
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
