//! STDIO module schema.  The stream API is thinner than POSIX, so the counter set is small and
//! there is a single schema version.

use crate::module::{AggOp, ModuleRecord, ModuleSchema};
use std::io::{self, Write};

pub const STDIO_READS: usize = 2;
pub const STDIO_WRITES: usize = 3;
pub const STDIO_BYTES_WRITTEN: usize = 6;
pub const STDIO_BYTES_READ: usize = 7;

pub const STDIO_F_META_TIME: usize = 0;
pub const STDIO_F_WRITE_TIME: usize = 1;
pub const STDIO_F_READ_TIME: usize = 2;
pub const STDIO_F_SLOWEST_RANK_TIME: usize = 7;

pub(crate) const STDIO_NUM_INDICES: usize = 10;
pub(crate) const STDIO_F_NUM_INDICES: usize = 8;

static COUNTER_NAMES: [&str; STDIO_NUM_INDICES] = [
    "STDIO_OPENS",
    "STDIO_FDOPENS",
    "STDIO_READS",
    "STDIO_WRITES",
    "STDIO_SEEKS",
    "STDIO_FLUSHES",
    "STDIO_BYTES_WRITTEN",
    "STDIO_BYTES_READ",
    "STDIO_MAX_BYTE_READ",
    "STDIO_MAX_BYTE_WRITTEN",
];

static COUNTER_OPS: [AggOp; STDIO_NUM_INDICES] = [
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Max,
    AggOp::Max,
];

static FCOUNTER_NAMES: [&str; STDIO_F_NUM_INDICES] = [
    "STDIO_F_META_TIME",
    "STDIO_F_WRITE_TIME",
    "STDIO_F_READ_TIME",
    "STDIO_F_OPEN_START_TIMESTAMP",
    "STDIO_F_CLOSE_END_TIMESTAMP",
    "STDIO_F_MAX_READ_TIME",
    "STDIO_F_MAX_WRITE_TIME",
    "STDIO_F_SLOWEST_RANK_TIME",
];

static FCOUNTER_OPS: [AggOp; STDIO_F_NUM_INDICES] = [
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::MinNonZero,
    AggOp::Max,
    AggOp::Max,
    AggOp::Max,
    AggOp::Max,
];

pub struct StdioSchema;

impl ModuleSchema for StdioSchema {
    fn name(&self) -> &'static str {
        "STDIO"
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
            1 => Some(STDIO_NUM_INDICES),
            _ => None,
        }
    }

    fn write_description(&self, w: &mut dyn Write, _version: u32) -> io::Result<()> {
        writeln!(w)?;
        writeln!(w, "# description of STDIO counters:")?;
        writeln!(
            w,
            "#   STDIO_*: counts of stream opens, fdopens, reads, writes, seeks, and flushes."
        )?;
        writeln!(w, "#   STDIO_BYTES_*: total bytes read and written.")?;
        writeln!(
            w,
            "#   STDIO_MAX_BYTE_*: highest offset byte read and written."
        )?;
        writeln!(
            w,
            "#   STDIO_F_*_TIME: cumulative seconds spent reading, writing, and in metadata operations."
        )?;
        writeln!(
            w,
            "#   STDIO_F_*_TIMESTAMP: timestamp of first open and last close."
        )?;
        writeln!(
            w,
            "#   STDIO_F_SLOWEST_RANK_TIME: I/O time of the slowest rank, set on aggregated records."
        )?;
        Ok(())
    }

    fn io_time_split(&self, rec: &ModuleRecord) -> (f64, f64, f64) {
        (
            rec.fcounters[STDIO_F_META_TIME],
            rec.fcounters[STDIO_F_READ_TIME],
            rec.fcounters[STDIO_F_WRITE_TIME],
        )
    }

    fn slowest_rank_time(&self, rec: &ModuleRecord) -> f64 {
        rec.fcounters[STDIO_F_SLOWEST_RANK_TIME]
    }

    fn bytes_moved(&self, rec: &ModuleRecord) -> (i64, i64) {
        (
            rec.counters[STDIO_BYTES_READ],
            rec.counters[STDIO_BYTES_WRITTEN],
        )
    }

    fn rw_op_counts(&self, rec: &ModuleRecord) -> (i64, i64) {
        (rec.counters[STDIO_READS], rec.counters[STDIO_WRITES])
    }
}
