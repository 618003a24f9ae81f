/// `sporparse` -- dump and summarize spor I/O characterization logs
///
/// One log in, a textual report out.  The default output is the per-record counter dump; the
/// --total, --file and --perf options add per-module counter aggregates, file-type tallies,
/// and derived bandwidth figures.  Consumers parse this output, so its shape is stable.
///
/// Quirks
///
/// A log whose runtime ran out of record memory carries a partial-data flag for the affected
/// module.  By default that is a hard error, because silently summarizing half a job misleads;
/// --show-incomplete downgrades it to a warning and parses what is there.
///
/// Aggregation always runs for the POSIX, MPI-IO and STDIO modules even when only --base is
/// requested; the options only select what gets printed.  This keeps a single decoding path
/// for all option combinations.
mod accum;
mod print;

use crate::accum::Aggregates;

use anyhow::Result;
use clap::Parser;
use sporlog::{
    is_aggregating, module_name, print_version_warnings, schema_for, LogError, LogFile,
    KNOWN_MODULE_COUNT, MAX_MODS, XT_MPIIO_MOD, XT_POSIX_MOD,
};
use std::io::{self, Write};
use std::process;

#[derive(Parser, Debug)]
#[command(about = "Parse and summarize a spor log file")]
pub struct Cli {
    /// All sub-options are enabled
    #[arg(long)]
    all: bool,

    /// Log field data [default]
    #[arg(long)]
    base: bool,

    /// Total file counts
    #[arg(long)]
    file: bool,

    /// Derived perf data
    #[arg(long)]
    perf: bool,

    /// Aggregated log field data
    #[arg(long)]
    total: bool,

    /// Display results even if log is incomplete
    #[arg(long)]
    show_incomplete: bool,

    /// Log file to parse
    filename: String,
}

#[derive(Debug, Clone, Copy)]
pub struct OptionMask {
    base: bool,
    total: bool,
    file: bool,
    perf: bool,
    show_incomplete: bool,
}

impl OptionMask {
    fn from_cli(cli: &Cli) -> OptionMask {
        let mut mask = OptionMask {
            base: cli.base || cli.all,
            total: cli.total || cli.all,
            file: cli.file || cli.all,
            perf: cli.perf || cli.all,
            show_incomplete: cli.show_incomplete || cli.all,
        };
        // No output selection means --base; --show-incomplete alone does too.
        if !mask.base && !mask.total && !mask.file && !mask.perf {
            mask.base = true;
        }
        mask
    }
}

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    });
    let mask = OptionMask::from_cli(&cli);
    match parse_log(&mut io::stdout(), &cli.filename, mask) {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn parse_log(out: &mut dyn Write, filename: &str, mask: OptionMask) -> Result<()> {
    let log = LogFile::open(filename)?;
    print_version_warnings(log.version());

    let (job, mounts) = log.job()?;
    let names = log.name_table()?;

    print::job_header(out, &log, &job)?;
    print::log_regions(out, &log)?;
    print::mount_table(out, mounts.entries())?;
    if mask.base {
        print::column_descriptions(out)?;
    }

    let mut agg = Aggregates::new(job.nprocs);
    let mut empty_mods = 0;

    for m in 0..MAX_MODS {
        if log.module_len(m) == 0 {
            empty_mods += 1;
            if !log.is_partial(m) {
                continue;
            }
        } else if m >= KNOWN_MODULE_COUNT {
            eprintln!(
                "# Warning: module id {} is unknown. You may need a newer version \
                 of the spor utilities to parse it.",
                m
            );
            continue;
        } else if m == XT_POSIX_MOD || m == XT_MPIIO_MOD {
            // Extended traces have a standalone viewer.
            continue;
        } else if schema_for(m).is_none() {
            eprintln!(
                "# Warning: no decoder for module {}, SKIPPING.",
                module_name(m).unwrap_or("?")
            );
            continue;
        } else if !is_aggregating(m) && !mask.base {
            // Modules outside the aggregation set are only ever pretty-printed.
            continue;
        }

        let name = module_name(m).unwrap_or("<UNKNOWN>");
        print::module_banner(out, name)?;

        if log.is_partial(m) {
            if mask.show_incomplete {
                print::partial_warning(out, name)?;
                if log.module_len(m) == 0 {
                    continue; // flagged but nothing to parse
                }
            } else {
                print::partial_error(name);
                return Err(LogError::PartialModuleData(name.to_string()).into());
            }
        }

        let Some(schema) = schema_for(m) else {
            continue;
        };
        let version = log.module_version(m);

        if mask.base {
            schema.write_description(out, version)?;
            print::record_header(out)?;
        }

        let data = log.module_data(m)?;
        let mut cursor = 0;
        let mut decode_failed = false;
        loop {
            let rec = match schema.decode_one(&data, &mut cursor, version) {
                Ok(Some(rec)) => rec,
                Ok(None) => break,
                Err(e) => {
                    eprintln!("Error: failed to parse {} module record: {}", name, e);
                    decode_failed = true;
                    break;
                }
            };

            let rec_name = names.lookup(rec.base.id).or_else(|| schema.placeholder_name());
            let (mnt, fs) = match rec_name {
                Some(n) => mounts.resolve(n),
                None => ("UNKNOWN", "UNKNOWN"),
            };
            if mask.base {
                schema.write_record(out, &rec, rec_name.unwrap_or(""), mnt, fs)?;
            }

            if !is_aggregating(m) {
                continue;
            }
            if let Err(e) = agg.fold(schema, &rec) {
                eprintln!("# Warning: {}; skipping record.", e);
                continue;
            }
            if let Err(e) = agg.fold_perf(schema, &rec) {
                eprintln!("# Warning: {}; skipping record.", e);
            }
        }

        if !is_aggregating(m) {
            continue;
        }

        // A decode error aborts this module's aggregation output but not the parse.
        if !decode_failed {
            if mask.total {
                print::module_totals(out, schema, agg.total_record(), version)?;
            }
            if mask.file {
                print::file_tally(out, &agg.finalize_files(schema))?;
            }
            if mask.perf {
                print::perf_report(out, &agg.finalize_perf())?;
            }
        }

        agg.reset();
    }

    if empty_mods == MAX_MODS {
        writeln!(out, "\n# no module data available.")?;
    }
    Ok(())
}

// Black-box tests: build a container byte for byte per the on-disk framing, write it to a temp
// file, and parse it through the same entry point main uses.

#[cfg(test)]
mod tests {
    use super::*;
    use sporlog::{Region, HEADER_SIZE, LOG_MAGIC, MPIIO_MOD, POSIX_MOD};
    use std::io::Write as _;

    const MASK_ALL: OptionMask = OptionMask {
        base: true,
        total: true,
        file: true,
        perf: true,
        show_incomplete: true,
    };
    const MASK_STRICT: OptionMask = OptionMask {
        base: true,
        total: false,
        file: false,
        perf: false,
        show_incomplete: false,
    };

    struct TestLog {
        nprocs: u64,
        metadata: String,
        mounts: Vec<(&'static str, &'static str)>,
        names: Vec<(u64, &'static str)>,
        modules: Vec<(usize, u32, Vec<u8>)>,
        partial: u64,
    }

    impl TestLog {
        fn new() -> TestLog {
            TestLog {
                nprocs: 1,
                metadata: String::new(),
                mounts: vec![("/", "ext4")],
                names: vec![],
                modules: vec![],
                partial: 0,
            }
        }

        fn build(&self) -> Vec<u8> {
            fn zlib(blob: &[u8]) -> Vec<u8> {
                let mut enc =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(blob).unwrap();
                enc.finish().unwrap()
            }
            fn put_str(out: &mut Vec<u8>, s: &str) {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }

            let mut job = Vec::new();
            for v in [1000u64, 42, 1_600_000_000, 1_600_000_099, self.nprocs] {
                job.extend_from_slice(&v.to_le_bytes());
            }
            put_str(&mut job, &self.metadata);
            put_str(&mut job, "/usr/bin/app");
            job.extend_from_slice(&(self.mounts.len() as u32).to_le_bytes());
            for (path, fs) in &self.mounts {
                put_str(&mut job, path);
                put_str(&mut job, fs);
            }

            let mut namebuf = Vec::new();
            for (id, path) in &self.names {
                namebuf.extend_from_slice(&id.to_le_bytes());
                put_str(&mut namebuf, path);
            }

            // Header per the container framing, then the compressed payload.
            let mut header = vec![0u8; HEADER_SIZE];
            header[..3].copy_from_slice(b"1.2");
            header[8..12].copy_from_slice(&LOG_MAGIC.to_le_bytes());
            header[12] = 1; // ZLIB
            header[16..24].copy_from_slice(&self.partial.to_le_bytes());

            let mut payload = Vec::new();
            let place = |payload: &mut Vec<u8>, blob: Vec<u8>| -> Region {
                let r = Region {
                    offset: (HEADER_SIZE + payload.len()) as u64,
                    len: blob.len() as u64,
                };
                payload.extend_from_slice(&blob);
                r
            };
            let put_region = |header: &mut Vec<u8>, at: usize, r: Region| {
                header[at..at + 8].copy_from_slice(&r.offset.to_le_bytes());
                header[at + 8..at + 16].copy_from_slice(&r.len.to_le_bytes());
            };
            let r = place(&mut payload, zlib(&job));
            put_region(&mut header, 24, r);
            let r = place(&mut payload, zlib(&namebuf));
            put_region(&mut header, 40, r);
            for (m, ver, blob) in &self.modules {
                let r = place(&mut payload, zlib(blob));
                put_region(&mut header, 56 + m * 16, r);
                header[312 + m * 4..312 + m * 4 + 4].copy_from_slice(&ver.to_le_bytes());
            }

            header.extend_from_slice(&payload);
            header
        }

        fn parse(&self, mask: OptionMask) -> Result<String> {
            let f = tempfile::NamedTempFile::new().unwrap();
            std::fs::write(f.path(), self.build()).unwrap();
            let mut out = Vec::new();
            parse_log(&mut out, f.path().to_str().unwrap(), mask)?;
            Ok(String::from_utf8(out).unwrap())
        }
    }

    fn encode_record(id: u64, rank: i64, counters: &[i64], fcounters: &[f64]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&rank.to_le_bytes());
        for c in counters {
            out.extend_from_slice(&c.to_le_bytes());
        }
        for f in fcounters {
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        out
    }

    // One rank-0 POSIX record: 4 reads, 1024 bytes read, 0.1s meta + 0.4s read.
    fn posix_read_record(id: u64) -> Vec<u8> {
        let mut counters = [0i64; 16];
        counters[1] = 4; // POSIX_READS
        counters[6] = 1024; // POSIX_BYTES_READ
        let mut fcounters = [0f64; 8];
        fcounters[2] = 0.4; // POSIX_F_READ_TIME
        fcounters[4] = 0.1; // POSIX_F_META_TIME
        encode_record(id, 0, &counters, &fcounters)
    }

    #[test]
    fn test_single_rank_end_to_end() {
        let mut t = TestLog::new();
        t.metadata = "lib_ver=3.4.1\nh=romio_no_indep_rw=true;cb_nodes=4\nnoise\n".to_string();
        t.mounts = vec![("/", "ext4"), ("/scratch", "lustre")];
        t.names = vec![(11, "/scratch/out.dat")];
        t.modules = vec![(POSIX_MOD, 2, posix_read_record(11))];

        let text = t.parse(MASK_ALL).unwrap();
        assert!(text.contains("# spor log version: 1.2\n"));
        assert!(text.contains("# compression method: ZLIB\n"));
        assert!(text.contains("# nprocs: 1\n"));
        assert!(text.contains("# run time: 100\n"));
        // Metadata splits on the first = only; the un-keyed line is dropped.
        assert!(text.contains("# metadata: lib_ver = 3.4.1\n"));
        assert!(text.contains("# metadata: h = romio_no_indep_rw=true;cb_nodes=4\n"));
        assert!(!text.contains("noise"));
        assert!(text.contains("# mount entry:\t/scratch\tlustre\n"));
        assert!(text.contains("# POSIX module: "));
        // Per-record dump resolves the path and mount by longest prefix.
        assert!(text
            .contains("POSIX\t0\t11\tPOSIX_BYTES_READ\t1024\t/scratch/out.dat\t/scratch\tlustre\n"));
        // Totals, tallies, and perf for the same record.
        assert!(text.contains("total_POSIX_READS: 4\n"));
        assert!(text.contains("# read_only: 1 1024 1024\n"));
        assert!(text.contains("# unique: 1 1024 1024\n"));
        assert!(text.contains("# shared: 0 0 0\n"));
        assert!(text.contains("# unique files: slowest_rank: 0\n"));
        assert!(text.contains("# unique files: slowest_rank_io_time: 0.500000\n"));
        assert!(text.contains("# agg_perf_by_slowest: 0.001953 # MiB/s\n"));
    }

    #[test]
    fn test_shared_mpiio_end_to_end() {
        let mut counters = [0i64; 16];
        counters[5] = 2; // MPIIO_COLL_WRITES
        counters[14] = 2_000_000; // MPIIO_BYTES_WRITTEN
        let mut fcounters = [0f64; 8];
        fcounters[7] = 2.0; // MPIIO_F_SLOWEST_RANK_TIME

        let mut t = TestLog::new();
        t.nprocs = 2;
        t.names = vec![(9, "/shared.dat")];
        t.modules = vec![(MPIIO_MOD, 2, encode_record(9, -1, &counters, &fcounters))];

        let text = t.parse(MASK_ALL).unwrap();
        assert!(text.contains("MPI-IO\t-1\t9\tMPIIO_COLL_WRITES\t2\t/shared.dat\t/\text4\n"));
        assert!(text.contains("# write_only: 1 2000000 2000000\n"));
        assert!(text.contains("# shared: 1 2000000 2000000\n"));
        assert!(text.contains("# unique: 0 0 0\n"));
        assert!(text.contains("# shared files: time_by_slowest: 2.000000\n"));
        assert!(text.contains("# agg_time_by_slowest: 2.000000 # seconds\n"));
        assert!(text.contains(&format!(
            "# agg_perf_by_slowest: {:.6} # MiB/s\n",
            (2_000_000.0 / 1048576.0) / 2.0
        )));
    }

    #[test]
    fn test_partial_module_policy() {
        let mut strict = TestLog::new();
        strict.partial = 1 << POSIX_MOD;
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), strict.build()).unwrap();
        let mut out = Vec::new();
        let err = parse_log(&mut out, f.path().to_str().unwrap(), MASK_STRICT).unwrap_err();
        assert!(err.to_string().contains("incomplete data"));

        // With --show-incomplete the empty partial module is warned about and skipped, and a
        // later module still parses.
        let mut lenient = TestLog::new();
        lenient.partial = 1 << POSIX_MOD;
        lenient.names = vec![(9, "/shared.dat")];
        let mut counters = [0i64; 16];
        counters[2] = 1; // MPIIO_INDEP_READS
        lenient.modules = vec![(MPIIO_MOD, 2, encode_record(9, 0, &counters, &[0.0; 8]))];
        let text = lenient.parse(MASK_ALL).unwrap();
        assert!(text.contains("# *WARNING*: The POSIX module contains incomplete data!\n"));
        assert!(text.contains("MPI-IO\t0\t9\tMPIIO_INDEP_READS\t1\t/shared.dat"));
    }

    #[test]
    fn test_empty_log_sentinel() {
        let text = TestLog::new().parse(MASK_STRICT).unwrap();
        assert!(text.contains("\n# no module data available.\n"));
        assert!(!text.contains("module data\n"));
    }

    #[test]
    fn test_unknown_module_reported_and_skipped() {
        let mut t = TestLog::new();
        t.modules = vec![(9, 1, vec![0u8; 24])];
        let text = t.parse(MASK_STRICT).unwrap();
        assert!(text.contains("# <UNKNOWN> module (id 9): "));
        assert!(!text.contains("\n# no module data available.\n"));
    }

    #[test]
    fn test_malformed_rank_skips_record() {
        let mut t = TestLog::new();
        t.nprocs = 2;
        t.names = vec![(11, "/a"), (12, "/b")];
        let mut blob = posix_read_record(11);
        // Rank 7 in a 2-process job: the record is reported and skipped, the rest parse.
        let mut counters = [0i64; 16];
        counters[1] = 1;
        blob.extend(encode_record(12, 7, &counters, &[0.0; 8]));
        t.modules = vec![(POSIX_MOD, 2, blob)];

        let text = t.parse(MASK_ALL).unwrap();
        // The malformed record still prints in the base dump but joins no tally.
        assert!(text.contains("POSIX\t7\t12\t"));
        assert!(text.contains("# total: 1 1024 1024\n"));
    }

    #[test]
    fn test_decode_error_aborts_module_only() {
        let mut t = TestLog::new();
        t.names = vec![(11, "/a"), (9, "/shared.dat")];
        let mut blob = posix_read_record(11);
        blob.extend_from_slice(&[1, 2, 3]); // trailing fragment
        let mut counters = [0i64; 16];
        counters[2] = 1; // MPIIO_INDEP_READS
        t.modules = vec![
            (POSIX_MOD, 2, blob),
            (MPIIO_MOD, 2, encode_record(9, 0, &counters, &[0.0; 8])),
        ];

        let text = t.parse(MASK_ALL).unwrap();
        // POSIX aggregation output is suppressed, MPI-IO still parses and tallies.
        assert!(!text.contains("total_POSIX_READS"));
        assert!(text.contains("total_MPIIO_INDEP_READS: 1\n"));
    }

    #[test]
    fn test_same_log_parses_identically() {
        let mut t = TestLog::new();
        t.names = vec![(11, "/a")];
        t.modules = vec![(POSIX_MOD, 2, posix_read_record(11))];
        let a = t.parse(MASK_ALL).unwrap();
        let b = t.parse(MASK_ALL).unwrap();
        assert_eq!(a, b);
    }
}
