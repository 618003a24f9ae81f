//! All report formatting.  Consumers parse this output, so every line shape here is stable.
//! Everything takes the output writer so tests can capture the bytes.

use crate::accum::{FileTally, PerfResult, TallyBucket};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use sporlog::{
    module_name, Job, LogFile, ModuleRecord, ModuleSchema, MountEntry, HEADER_SIZE,
    KNOWN_MODULE_COUNT, MAX_MODS,
};
use std::io::Write;

// ctime-style rendering of epoch seconds, e.g. "Thu Sep 13 12:26:40 2020".
fn asci_time(epoch: u64) -> String {
    match Utc.timestamp_opt(epoch as i64, 0) {
        chrono::LocalResult::Single(t) => t.format("%a %b %e %H:%M:%S %Y").to_string(),
        _ => "?".to_string(),
    }
}

pub fn job_header(out: &mut dyn Write, log: &LogFile, job: &Job) -> Result<()> {
    writeln!(out, "# spor log version: {}", log.version())?;
    writeln!(out, "# compression method: {}", log.compression().name())?;
    writeln!(out, "# exe: {}", job.exe)?;
    writeln!(out, "# uid: {}", job.uid)?;
    writeln!(out, "# jobid: {}", job.jobid)?;
    writeln!(out, "# start_time: {}", job.start_time)?;
    writeln!(out, "# start_time_asci: {}", asci_time(job.start_time))?;
    writeln!(out, "# end_time: {}", job.end_time)?;
    writeln!(out, "# end_time_asci: {}", asci_time(job.end_time))?;
    writeln!(out, "# nprocs: {}", job.nprocs)?;
    writeln!(out, "# run time: {}", job.run_time())?;
    for line in job.metadata.lines() {
        // Split on the first = only; values may contain = themselves (MPI-IO hints do).
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        writeln!(out, "# metadata: {} = {}", key, value)?;
    }
    Ok(())
}

pub fn log_regions(out: &mut dyn Write, log: &LogFile) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# log file regions")?;
    writeln!(out, "# -------------------------------------------------------")?;
    writeln!(out, "# header: {} bytes (uncompressed)", HEADER_SIZE)?;
    writeln!(out, "# job data: {} bytes (compressed)", log.job_region_len())?;
    writeln!(
        out,
        "# record table: {} bytes (compressed)",
        log.name_region_len()
    )?;
    for m in 0..KNOWN_MODULE_COUNT {
        if log.module_len(m) != 0 || log.is_partial(m) {
            writeln!(
                out,
                "# {} module: {} bytes (compressed), ver={}",
                module_name(m).unwrap_or("?"),
                log.module_len(m),
                log.module_version(m)
            )?;
        }
    }
    for m in KNOWN_MODULE_COUNT..MAX_MODS {
        if log.module_len(m) != 0 || log.is_partial(m) {
            writeln!(
                out,
                "# <UNKNOWN> module (id {}): {} bytes (compressed), ver={}",
                m,
                log.module_len(m),
                log.module_version(m)
            )?;
        }
    }
    Ok(())
}

pub fn mount_table(out: &mut dyn Write, entries: &[MountEntry]) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# mounted file systems (mount point and fs type)")?;
    writeln!(out, "# -------------------------------------------------------")?;
    for e in entries {
        writeln!(out, "# mount entry:\t{}\t{}", e.path, e.fs_type)?;
    }
    Ok(())
}

pub fn column_descriptions(out: &mut dyn Write) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# description of columns:")?;
    writeln!(out, "#   <module>: module responsible for this I/O record.")?;
    writeln!(out, "#   <rank>: MPI rank.  -1 indicates that the file is shared")?;
    writeln!(out, "#      across all processes and statistics are aggregated.")?;
    writeln!(out, "#   <record id>: hash of the record's file path")?;
    writeln!(out, "#   <counter name> and <counter value>: statistical counters.")?;
    writeln!(out, "#      A value of -1 indicates that the runtime could not monitor")?;
    writeln!(out, "#      that counter, and its value should be ignored.")?;
    writeln!(out, "#   <file name>: full file path for the record.")?;
    writeln!(out, "#   <mount pt>: mount point that the file resides on.")?;
    writeln!(out, "#   <fs type>: type of file system that the file resides on.")?;
    Ok(())
}

pub fn module_banner(out: &mut dyn Write, name: &str) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# *******************************************************")?;
    writeln!(out, "# {} module data", name)?;
    writeln!(out, "# *******************************************************")?;
    Ok(())
}

pub fn record_header(out: &mut dyn Write) -> Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "#<module>\t<rank>\t<record id>\t<counter>\t<value>\t<file name>\t<mount pt>\t<fs type>"
    )?;
    Ok(())
}

pub fn partial_warning(out: &mut dyn Write, name: &str) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# *WARNING*: The {} module contains incomplete data!", name)?;
    writeln!(out, "#            This happens when a module runs out of")?;
    writeln!(out, "#            memory to store new record data.")?;
    writeln!(out)?;
    writeln!(out, "# To avoid this error, consult the spor runtime documentation")?;
    writeln!(out, "# and consider setting the SPOR_EXCLUDE_DIRS environment")?;
    writeln!(out, "# variable to prevent instrumentation of unnecessary files.")?;
    Ok(())
}

pub fn partial_error(name: &str) {
    eprintln!();
    eprintln!("# *ERROR*: The {} module contains incomplete data!", name);
    eprintln!("#            This happens when a module runs out of");
    eprintln!("#            memory to store new record data.");
    eprintln!();
    eprintln!("# To avoid this error, consult the spor runtime documentation");
    eprintln!("# and consider setting the SPOR_EXCLUDE_DIRS environment");
    eprintln!("# variable to prevent instrumentation of unnecessary files.");
    eprintln!();
    eprintln!("# You can display the (incomplete) data that is present in");
    eprintln!("# this log using the --show-incomplete option.");
}

/// The `total_<counter>` block.  A module region can decode to zero records; the block still
/// prints, all zeros.
pub fn module_totals(
    out: &mut dyn Write,
    schema: &dyn ModuleSchema,
    total: Option<&ModuleRecord>,
    version: u32,
) -> Result<()> {
    schema.write_description(out, version)?;
    writeln!(out)?;
    for (i, name) in schema.counter_names().iter().enumerate() {
        let val = total.map_or(0, |t| t.counters[i]);
        writeln!(out, "total_{}: {}", name, val)?;
    }
    for (i, name) in schema.fcounter_names().iter().enumerate() {
        let val = total.map_or(0.0, |t| t.fcounters[i]);
        writeln!(out, "total_{}: {:.6}", name, val)?;
    }
    Ok(())
}

pub fn file_tally(out: &mut dyn Write, tally: &FileTally) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# Total file counts")?;
    writeln!(out, "# -----")?;
    writeln!(out, "# <file_type>: type of file access:")?;
    writeln!(out, "#    *read_only: file was only read")?;
    writeln!(out, "#    *write_only: file was only written")?;
    writeln!(out, "#    *read_write: file was read and written")?;
    writeln!(out, "#    *unique: file was opened by a single process only")?;
    writeln!(
        out,
        "#    *shared: file was accessed by a group of processes (maybe all processes)"
    )?;
    writeln!(out, "# <file_count> total number of files of this type")?;
    writeln!(
        out,
        "# <total_bytes> total number of bytes moved to/from files of this type"
    )?;
    writeln!(
        out,
        "# <max_byte_offset> maximum byte offset accessed for a file of this type"
    )?;
    writeln!(out)?;
    writeln!(out, "# <file_type> <file_count> <total_bytes> <max_byte_offset>")?;
    let line = |out: &mut dyn Write, label: &str, b: &TallyBucket| -> Result<()> {
        writeln!(out, "# {}: {} {} {}", label, b.count, b.bytes, b.max_bytes)?;
        Ok(())
    };
    line(out, "total", &tally.total)?;
    line(out, "read_only", &tally.read_only)?;
    line(out, "write_only", &tally.write_only)?;
    line(out, "read_write", &tally.read_write)?;
    line(out, "unique", &tally.unique)?;
    line(out, "shared", &tally.shared)?;
    Ok(())
}

pub fn perf_report(out: &mut dyn Write, perf: &PerfResult) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "# performance")?;
    writeln!(out, "# -----------")?;
    writeln!(out, "# total_bytes: {}", perf.total_bytes)?;
    writeln!(out, "#")?;
    writeln!(out, "# I/O timing for unique files (seconds):")?;
    writeln!(out, "# ...........................")?;
    writeln!(
        out,
        "# unique files: slowest_rank_io_time: {:.6}",
        perf.slowest_rank_io_total_time
    )?;
    writeln!(
        out,
        "# unique files: slowest_rank_meta_only_time: {:.6}",
        perf.slowest_rank_meta_only_time
    )?;
    writeln!(
        out,
        "# unique files: slowest_rank_rw_only_time: {:.6}",
        perf.slowest_rank_rw_only_time
    )?;
    writeln!(out, "# unique files: slowest_rank: {}", perf.slowest_rank)?;
    writeln!(out, "#")?;
    writeln!(out, "# I/O timing for shared files (seconds):")?;
    writeln!(out, "# ...........................")?;
    writeln!(
        out,
        "# shared files: time_by_slowest: {:.6}",
        perf.shared_io_total_time_by_slowest
    )?;
    writeln!(out, "#")?;
    writeln!(
        out,
        "# Aggregate performance, including both shared and unique files:"
    )?;
    writeln!(out, "# ...........................")?;
    writeln!(
        out,
        "# agg_time_by_slowest: {:.6} # seconds",
        perf.agg_time_by_slowest
    )?;
    writeln!(
        out,
        "# agg_perf_by_slowest: {:.6} # MiB/s",
        perf.agg_perf_by_slowest
    )?;
    Ok(())
}
