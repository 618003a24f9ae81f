//! MPI-IO module schema.  Read and write operations come in independent, collective, split and
//! non-blocking variants; offsets are meaningless at this layer, so there are no MAX_BYTE
//! counters.  Version 2 is current; version 1 predates RW_SWITCHES.

use crate::module::{AggOp, ModuleRecord, ModuleSchema};
use std::io::{self, Write};

pub const MPIIO_INDEP_READS: usize = 2;
pub const MPIIO_INDEP_WRITES: usize = 3;
pub const MPIIO_COLL_READS: usize = 4;
pub const MPIIO_COLL_WRITES: usize = 5;
pub const MPIIO_SPLIT_READS: usize = 6;
pub const MPIIO_SPLIT_WRITES: usize = 7;
pub const MPIIO_NB_READS: usize = 8;
pub const MPIIO_NB_WRITES: usize = 9;
pub const MPIIO_BYTES_READ: usize = 13;
pub const MPIIO_BYTES_WRITTEN: usize = 14;

pub const MPIIO_F_READ_TIME: usize = 2;
pub const MPIIO_F_WRITE_TIME: usize = 3;
pub const MPIIO_F_META_TIME: usize = 4;
pub const MPIIO_F_SLOWEST_RANK_TIME: usize = 7;

pub(crate) const MPIIO_NUM_INDICES: usize = 16;
pub(crate) const MPIIO_F_NUM_INDICES: usize = 8;

static COUNTER_NAMES: [&str; MPIIO_NUM_INDICES] = [
    "MPIIO_INDEP_OPENS",
    "MPIIO_COLL_OPENS",
    "MPIIO_INDEP_READS",
    "MPIIO_INDEP_WRITES",
    "MPIIO_COLL_READS",
    "MPIIO_COLL_WRITES",
    "MPIIO_SPLIT_READS",
    "MPIIO_SPLIT_WRITES",
    "MPIIO_NB_READS",
    "MPIIO_NB_WRITES",
    "MPIIO_SYNCS",
    "MPIIO_HINTS",
    "MPIIO_VIEWS",
    "MPIIO_BYTES_READ",
    "MPIIO_BYTES_WRITTEN",
    "MPIIO_RW_SWITCHES",
];

static COUNTER_OPS: [AggOp; MPIIO_NUM_INDICES] = [AggOp::Sum; MPIIO_NUM_INDICES];

static FCOUNTER_NAMES: [&str; MPIIO_F_NUM_INDICES] = [
    "MPIIO_F_OPEN_TIMESTAMP",
    "MPIIO_F_CLOSE_TIMESTAMP",
    "MPIIO_F_READ_TIME",
    "MPIIO_F_WRITE_TIME",
    "MPIIO_F_META_TIME",
    "MPIIO_F_MAX_READ_TIME",
    "MPIIO_F_MAX_WRITE_TIME",
    "MPIIO_F_SLOWEST_RANK_TIME",
];

static FCOUNTER_OPS: [AggOp; MPIIO_F_NUM_INDICES] = [
    AggOp::MinNonZero,
    AggOp::Max,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Max,
    AggOp::Max,
    AggOp::Max,
];

pub struct MpiioSchema;

impl ModuleSchema for MpiioSchema {
    fn name(&self) -> &'static str {
        "MPI-IO"
    }

    fn counter_names(&self) -> &'static [&'static str] {
        &COUNTER_NAMES
    }

    fn fcounter_names(&self) -> &'static [&'static str] {
        &FCOUNTER_NAMES
    }

    fn counter_ops(&self) -> &'static [AggOp] {
        &COUNTER_OPS
    }

    fn fcounter_ops(&self) -> &'static [AggOp] {
        &FCOUNTER_OPS
    }

    fn wire_counters(&self, version: u32) -> Option<usize> {
        match version {
            1 => Some(MPIIO_NUM_INDICES - 1),
            2 => Some(MPIIO_NUM_INDICES),
            _ => None,
        }
    }

    fn write_description(&self, w: &mut dyn Write, version: u32) -> io::Result<()> {
        writeln!(w)?;
        writeln!(w, "# description of MPI-IO counters:")?;
        writeln!(
            w,
            "#   MPIIO_INDEP_*: counts of independent opens, reads, and writes."
        )?;
        writeln!(
            w,
            "#   MPIIO_COLL_*: counts of collective opens, reads, and writes."
        )?;
        writeln!(
            w,
            "#   MPIIO_SPLIT_*: counts of split collective reads and writes."
        )?;
        writeln!(
            w,
            "#   MPIIO_NB_*: counts of non-blocking reads and writes."
        )?;
        writeln!(
            w,
            "#   MPIIO_SYNCS, MPIIO_HINTS, MPIIO_VIEWS: counts of syncs, hints, and file views."
        )?;
        writeln!(w, "#   MPIIO_BYTES_*: total bytes read and written.")?;
        writeln!(
            w,
            "#   MPIIO_RW_SWITCHES: number of alternations between read and write."
        )?;
        writeln!(
            w,
            "#   MPIIO_F_*_TIME: cumulative seconds spent reading, writing, and in metadata operations."
        )?;
        writeln!(
            w,
            "#   MPIIO_F_*_TIMESTAMP: timestamp of first open and last close."
        )?;
        writeln!(
            w,
            "#   MPIIO_F_MAX_*_TIME: duration of the slowest single read and write."
        )?;
        writeln!(
            w,
            "#   MPIIO_F_SLOWEST_RANK_TIME: I/O time of the slowest rank, set on aggregated records."
        )?;
        if version == 1 {
            writeln!(
                w,
                "#   (version 1 logs predate MPIIO_RW_SWITCHES; it prints as -1.)"
            )?;
        }
        Ok(())
    }

    fn io_time_split(&self, rec: &ModuleRecord) -> (f64, f64, f64) {
        (
            rec.fcounters[MPIIO_F_META_TIME],
            rec.fcounters[MPIIO_F_READ_TIME],
            rec.fcounters[MPIIO_F_WRITE_TIME],
        )
    }

    fn slowest_rank_time(&self, rec: &ModuleRecord) -> f64 {
        rec.fcounters[MPIIO_F_SLOWEST_RANK_TIME]
    }

    fn bytes_moved(&self, rec: &ModuleRecord) -> (i64, i64) {
        (
            rec.counters[MPIIO_BYTES_READ],
            rec.counters[MPIIO_BYTES_WRITTEN],
        )
    }

    fn rw_op_counts(&self, rec: &ModuleRecord) -> (i64, i64) {
        let r = rec.counters[MPIIO_INDEP_READS]
            + rec.counters[MPIIO_COLL_READS]
            + rec.counters[MPIIO_SPLIT_READS]
            + rec.counters[MPIIO_NB_READS];
        let w = rec.counters[MPIIO_INDEP_WRITES]
            + rec.counters[MPIIO_COLL_WRITES]
            + rec.counters[MPIIO_SPLIT_WRITES]
            + rec.counters[MPIIO_NB_WRITES];
        (r, w)
    }
}
