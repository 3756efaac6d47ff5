//! Contiguous ownership ranges of global rows and columns across ranks.

use std::ops::Range;

use crate::comm::Transport;
use crate::error::{ParError, Result};

/// Row and column ownership of one rank, plus the start tables of every rank.
///
/// Rank `p` owns global rows `row_starts[p]..row_starts[p + 1]` and global
/// columns `col_starts[p]..col_starts[p + 1]`. Ranges may be empty. The start
/// tables begin at 0, never decrease and end at the global size, so the ranges
/// tile the index space without gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Total rows over all ranks
    pub global_num_rows: usize,
    /// Total columns over all ranks
    pub global_num_cols: usize,
    /// Rows owned by this rank
    pub local_num_rows: usize,
    /// Columns owned by this rank
    pub local_num_cols: usize,
    /// First global row owned by this rank
    pub first_local_row: usize,
    /// First global column owned by this rank
    pub first_local_col: usize,

    rank: usize,
    row_starts: Vec<usize>,
    col_starts: Vec<usize>,
}

impl Partition {
    /// Builds the partition seen by `rank` from explicit start tables.
    ///
    /// Both tables hold one entry per rank plus the trailing global size.
    pub fn new(rank: usize, row_starts: Vec<usize>, col_starts: Vec<usize>) -> Result<Self> {
        validate_starts(&row_starts, "row")?;
        validate_starts(&col_starts, "column")?;
        if row_starts.len() != col_starts.len() {
            return Err(ParError::Construction(format!(
                "row table covers {} ranks but column table covers {}",
                row_starts.len() - 1,
                col_starts.len() - 1
            )));
        }
        if rank + 1 >= row_starts.len() {
            return Err(ParError::Construction(format!(
                "rank {} outside a partition of {} ranks",
                rank,
                row_starts.len() - 1
            )));
        }

        Ok(Self {
            global_num_rows: row_starts[row_starts.len() - 1],
            global_num_cols: col_starts[col_starts.len() - 1],
            local_num_rows: row_starts[rank + 1] - row_starts[rank],
            local_num_cols: col_starts[rank + 1] - col_starts[rank],
            first_local_row: row_starts[rank],
            first_local_col: col_starts[rank],
            rank,
            row_starts,
            col_starts,
        })
    }

    /// Even split: every rank gets `n / num_procs` rows (columns), the first
    /// `n % num_procs` ranks one more.
    pub fn uniform(
        rank: usize,
        num_procs: usize,
        global_num_rows: usize,
        global_num_cols: usize,
    ) -> Result<Self> {
        if num_procs == 0 {
            return Err(ParError::Construction("partition over zero ranks".into()));
        }
        Self::new(
            rank,
            even_starts(global_num_rows, num_procs),
            even_starts(global_num_cols, num_procs),
        )
    }

    /// Assembles a partition from each rank's own range.
    ///
    /// Collective over `comm`. Fails if the gathered ranges leave gaps,
    /// overlap, or do not cover the stated global sizes.
    pub fn gather(
        comm: &dyn Transport,
        global_num_rows: usize,
        global_num_cols: usize,
        local_num_rows: usize,
        local_num_cols: usize,
        first_local_row: usize,
        first_local_col: usize,
    ) -> Result<Self> {
        let first_rows = comm.allgather_counts(first_local_row)?;
        let row_sizes = comm.allgather_counts(local_num_rows)?;
        let first_cols = comm.allgather_counts(first_local_col)?;
        let col_sizes = comm.allgather_counts(local_num_cols)?;

        let row_starts = tiled_starts(&first_rows, &row_sizes, global_num_rows, "row")?;
        let col_starts = tiled_starts(&first_cols, &col_sizes, global_num_cols, "column")?;
        Self::new(comm.rank(), row_starts, col_starts)
    }

    /// Partition of a product `A * B`: rows as in `rows_of`, columns as the
    /// columns of `cols_of`.
    pub fn from_parts(rows_of: &Partition, cols_of: &Partition) -> Result<Self> {
        Self::new(
            rows_of.rank,
            rows_of.row_starts.clone(),
            cols_of.col_starts.clone(),
        )
    }

    /// Whether the columns of `self` are split like the rows of `rhs`, as a
    /// product `self * rhs` requires.
    pub fn transpose_compatible(&self, rhs: &Partition) -> bool {
        self.col_starts == rhs.row_starts
    }

    /// Rank this partition describes.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the partition.
    pub fn num_procs(&self) -> usize {
        self.row_starts.len() - 1
    }

    /// Row start table, one entry per rank plus the global row count.
    pub fn row_starts(&self) -> &[usize] {
        &self.row_starts
    }

    /// Column start table, one entry per rank plus the global column count.
    pub fn col_starts(&self) -> &[usize] {
        &self.col_starts
    }

    /// Global rows owned by `proc`.
    pub fn rank_row_range(&self, proc: usize) -> Range<usize> {
        self.row_starts[proc]..self.row_starts[proc + 1]
    }

    /// Global columns owned by `proc`.
    pub fn rank_col_range(&self, proc: usize) -> Range<usize> {
        self.col_starts[proc]..self.col_starts[proc + 1]
    }

    /// Local index of global row `g`, if this rank owns it.
    pub fn global_to_local_row(&self, g: usize) -> Option<usize> {
        (g >= self.first_local_row && g < self.first_local_row + self.local_num_rows)
            .then(|| g - self.first_local_row)
    }

    /// Local index of global column `g`, if this rank owns it.
    pub fn global_to_local_col(&self, g: usize) -> Option<usize> {
        (g >= self.first_local_col && g < self.first_local_col + self.local_num_cols)
            .then(|| g - self.first_local_col)
    }

    /// Rank owning global row `g`.
    pub fn row_owner(&self, g: usize) -> Option<usize> {
        owner(&self.row_starts, g)
    }

    /// Rank owning global column `g`.
    pub fn col_owner(&self, g: usize) -> Option<usize> {
        owner(&self.col_starts, g)
    }
}

fn owner(starts: &[usize], g: usize) -> Option<usize> {
    if g >= starts[starts.len() - 1] {
        return None;
    }
    // Last rank whose range starts at or before g; empty ranks share their
    // start with the next rank and are skipped.
    Some(starts.partition_point(|&s| s <= g) - 1)
}

fn even_starts(n: usize, num_procs: usize) -> Vec<usize> {
    let base = n / num_procs;
    let extra = n % num_procs;
    let mut starts = Vec::with_capacity(num_procs + 1);
    let mut next = 0;
    starts.push(0);
    for p in 0..num_procs {
        next += base + usize::from(p < extra);
        starts.push(next);
    }
    starts
}

fn validate_starts(starts: &[usize], what: &str) -> Result<()> {
    if starts.len() < 2 {
        return Err(ParError::Construction(format!(
            "{} start table needs at least one rank",
            what
        )));
    }
    if starts[0] != 0 {
        return Err(ParError::Construction(format!(
            "{} ranges must start at 0, found {}",
            what, starts[0]
        )));
    }
    if let Some(p) = starts.windows(2).position(|w| w[1] < w[0]) {
        return Err(ParError::Construction(format!(
            "{} ranges overlap at rank {}",
            what,
            p + 1
        )));
    }
    Ok(())
}

fn tiled_starts(
    firsts: &[usize],
    sizes: &[usize],
    global: usize,
    what: &str,
) -> Result<Vec<usize>> {
    let mut starts = Vec::with_capacity(firsts.len() + 1);
    let mut next = 0;
    for (proc, (&first, &size)) in firsts.iter().zip(sizes).enumerate() {
        // Empty ranges carry no ownership, so their stated start is ignored.
        if size > 0 && first != next {
            let problem = if first > next { "gap" } else { "overlap" };
            return Err(ParError::Construction(format!(
                "{} {} before rank {}: expected start {}, found {}",
                what, problem, proc, next, first
            )));
        }
        starts.push(next);
        next += size;
    }
    if next != global {
        return Err(ParError::Construction(format!(
            "{} ranges cover {} of {} global indices",
            what, next, global
        )));
    }
    starts.push(next);
    Ok(starts)
}
