//! BG/Q module schema.  One record per job describing the machine partition, not a file; it is
//! pretty-printed only and never aggregated, and since there is no file path behind it the
//! record prints under a synthetic name.

use crate::module::{AggOp, ModuleRecord, ModuleSchema};
use std::io::{self, Write};

const BGQ_NUM_INDICES: usize = 5;
const BGQ_F_NUM_INDICES: usize = 1;

static COUNTER_NAMES: [&str; BGQ_NUM_INDICES] = [
    "BGQ_CSJOBID",
    "BGQ_NNODES",
    "BGQ_RANKSPERNODE",
    "BGQ_DDRPERNODE",
    "BGQ_INODES",
];

static COUNTER_OPS: [AggOp; BGQ_NUM_INDICES] = [AggOp::KeepFirst; BGQ_NUM_INDICES];

static FCOUNTER_NAMES: [&str; BGQ_F_NUM_INDICES] = ["BGQ_F_TIMESTAMP"];

static FCOUNTER_OPS: [AggOp; BGQ_F_NUM_INDICES] = [AggOp::Max];

pub struct BgqSchema;

impl ModuleSchema for BgqSchema {
    fn name(&self) -> &'static str {
        "BG/Q"
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
            1 => Some(BGQ_NUM_INDICES),
            _ => None,
        }
    }

    fn placeholder_name(&self) -> Option<&'static str> {
        Some("bgq-virtual-record")
    }

    fn write_description(&self, w: &mut dyn Write, _version: u32) -> io::Result<()> {
        writeln!(w)?;
        writeln!(w, "# description of BG/Q counters:")?;
        writeln!(
            w,
            "#   BGQ_CSJOBID: the control system job id of this run."
        )?;
        writeln!(
            w,
            "#   BGQ_NNODES, BGQ_RANKSPERNODE: shape of the compute partition."
        )?;
        writeln!(
            w,
            "#   BGQ_DDRPERNODE, BGQ_INODES: memory per node (MiB) and I/O node count."
        )?;
        writeln!(
            w,
            "#   BGQ_F_TIMESTAMP: time these values were sampled."
        )?;
        Ok(())
    }
}
