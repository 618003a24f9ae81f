//! POSIX module schema.  Version 2 is current; version 1 predates the RW_SWITCHES and MODE
//! counters, which decode as -1.

use crate::module::{AggOp, ModuleRecord, ModuleSchema};
use std::io::{self, Write};

pub const POSIX_READS: usize = 1;
pub const POSIX_WRITES: usize = 2;
pub const POSIX_BYTES_READ: usize = 6;
pub const POSIX_BYTES_WRITTEN: usize = 7;

pub const POSIX_F_READ_TIME: usize = 2;
pub const POSIX_F_WRITE_TIME: usize = 3;
pub const POSIX_F_META_TIME: usize = 4;
pub const POSIX_F_SLOWEST_RANK_TIME: usize = 7;

pub(crate) const POSIX_NUM_INDICES: usize = 16;
pub(crate) const POSIX_F_NUM_INDICES: usize = 8;

static COUNTER_NAMES: [&str; POSIX_NUM_INDICES] = [
    "POSIX_OPENS",
    "POSIX_READS",
    "POSIX_WRITES",
    "POSIX_SEEKS",
    "POSIX_STATS",
    "POSIX_FSYNCS",
    "POSIX_BYTES_READ",
    "POSIX_BYTES_WRITTEN",
    "POSIX_MAX_BYTE_READ",
    "POSIX_MAX_BYTE_WRITTEN",
    "POSIX_CONSEC_READS",
    "POSIX_CONSEC_WRITES",
    "POSIX_SEQ_READS",
    "POSIX_SEQ_WRITES",
    "POSIX_RW_SWITCHES",
    "POSIX_MODE",
];

static COUNTER_OPS: [AggOp; POSIX_NUM_INDICES] = [
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
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::KeepFirst,
];

static FCOUNTER_NAMES: [&str; POSIX_F_NUM_INDICES] = [
    "POSIX_F_OPEN_START_TIMESTAMP",
    "POSIX_F_CLOSE_END_TIMESTAMP",
    "POSIX_F_READ_TIME",
    "POSIX_F_WRITE_TIME",
    "POSIX_F_META_TIME",
    "POSIX_F_MAX_READ_TIME",
    "POSIX_F_MAX_WRITE_TIME",
    "POSIX_F_SLOWEST_RANK_TIME",
];

static FCOUNTER_OPS: [AggOp; POSIX_F_NUM_INDICES] = [
    AggOp::MinNonZero,
    AggOp::Max,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Sum,
    AggOp::Max,
    AggOp::Max,
    AggOp::Max,
];

pub struct PosixSchema;

impl ModuleSchema for PosixSchema {
    fn name(&self) -> &'static str {
        "POSIX"
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
            1 => Some(POSIX_NUM_INDICES - 2),
            2 => Some(POSIX_NUM_INDICES),
            _ => None,
        }
    }

    fn write_description(&self, w: &mut dyn Write, version: u32) -> io::Result<()> {
        writeln!(w)?;
        writeln!(w, "# description of POSIX counters:")?;
        writeln!(
            w,
            "#   POSIX_*: counts of opens, reads, writes, seeks, stats, and fsyncs."
        )?;
        writeln!(w, "#   POSIX_BYTES_*: total bytes read and written.")?;
        writeln!(
            w,
            "#   POSIX_MAX_BYTE_*: highest offset byte read and written."
        )?;
        writeln!(
            w,
            "#   POSIX_CONSEC_*: number of exactly adjacent accesses."
        )?;
        writeln!(
            w,
            "#   POSIX_SEQ_*: number of accesses at increasing offsets."
        )?;
        writeln!(
            w,
            "#   POSIX_RW_SWITCHES: number of alternations between read and write."
        )?;
        writeln!(w, "#   POSIX_MODE: mode that the file was last opened in.")?;
        writeln!(
            w,
            "#   POSIX_F_*_TIME: cumulative seconds spent reading, writing, and in metadata operations."
        )?;
        writeln!(
            w,
            "#   POSIX_F_*_TIMESTAMP: timestamp of first open and last close."
        )?;
        writeln!(
            w,
            "#   POSIX_F_MAX_*_TIME: duration of the slowest single read and write."
        )?;
        writeln!(
            w,
            "#   POSIX_F_SLOWEST_RANK_TIME: I/O time of the slowest rank, set on aggregated records."
        )?;
        if version == 1 {
            writeln!(
                w,
                "#   (version 1 logs predate POSIX_RW_SWITCHES and POSIX_MODE; both print as -1.)"
            )?;
        }
        Ok(())
    }

    fn io_time_split(&self, rec: &ModuleRecord) -> (f64, f64, f64) {
        (
            rec.fcounters[POSIX_F_META_TIME],
            rec.fcounters[POSIX_F_READ_TIME],
            rec.fcounters[POSIX_F_WRITE_TIME],
        )
    }

    fn slowest_rank_time(&self, rec: &ModuleRecord) -> f64 {
        rec.fcounters[POSIX_F_SLOWEST_RANK_TIME]
    }

    fn bytes_moved(&self, rec: &ModuleRecord) -> (i64, i64) {
        (
            rec.counters[POSIX_BYTES_READ],
            rec.counters[POSIX_BYTES_WRITTEN],
        )
    }

    fn rw_op_counts(&self, rec: &ModuleRecord) -> (i64, i64) {
        (rec.counters[POSIX_READS], rec.counters[POSIX_WRITES])
    }
}
