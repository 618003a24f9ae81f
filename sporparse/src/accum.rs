//! Per-file and job-wide aggregation for the modules that support it.
//!
//! Records arrive one at a time from a module's decoder.  Each one is folded into three
//! places: the per-file accumulator for its record id, the module-wide total record, and the
//! per-rank performance vectors.  Finalization is then a single pass over the per-file map
//! (file-type tallies) or the rank vectors (slowest-rank election).  Everything is zeroed
//! between modules; one `Aggregates` lives for the whole parse.

use sporlog::{LogError, ModuleRecord, ModuleSchema, Rank, RecordId};
use std::collections::HashMap;

/// Bit values for FileAccum::type_bits.
pub const FILETYPE_SHARED: u32 = 1 << 0; // aggregated rank -1 record seen
pub const FILETYPE_UNIQUE: u32 = 1 << 1; // exactly one per-rank record so far
pub const FILETYPE_PARTSHARED: u32 = 1 << 2; // several per-rank records, no aggregated one

/// Derived metrics for one file (or for a whole module, in the totals role), accumulated
/// record by record.
#[derive(Debug, Default)]
pub struct FileAccum {
    pub type_bits: u32,
    pub procs: u64,
    /// Counters combined across records via the module's pairwise aggregator.
    pub rec_dat: Option<ModuleRecord>,
    /// Cumulative metadata and rw time over all folded records.
    pub cumul_io_total_time: f64,
    /// Slowest rank metadata and rw time; authoritative when an aggregated record supplies it.
    pub slowest_io_total_time: f64,
}

impl FileAccum {
    fn fold(&mut self, schema: &dyn ModuleSchema, rec: &ModuleRecord, nprocs: u64) {
        let (meta, read, write) = schema.io_time_split(rec);
        let io_total = meta + read + write;

        self.procs += 1;
        match rec.base.rank {
            Rank::Shared => {
                // The runtime's reduction already found the slowest rank for this file; its
                // value overrides anything derived from per-rank records.
                self.slowest_io_total_time = schema.slowest_rank_time(rec);
                self.procs = nprocs;
                self.type_bits &= !FILETYPE_UNIQUE;
                self.type_bits |= FILETYPE_SHARED;
            }
            Rank::PerRank(_) => {
                self.slowest_io_total_time = self.slowest_io_total_time.max(io_total);
                if self.procs > 1 {
                    self.type_bits &= !FILETYPE_UNIQUE;
                    self.type_bits |= FILETYPE_PARTSHARED;
                } else {
                    self.type_bits |= FILETYPE_UNIQUE;
                }
            }
        }

        // NOTE: an aggregated record's own times land here even when per-rank records for the
        // same file arrived before it.  The on-disk format works this way and consumers rely
        // on it.
        self.cumul_io_total_time += io_total;

        let first = self.rec_dat.is_none();
        let dst = self.rec_dat.get_or_insert_with(|| ModuleRecord {
            base: rec.base,
            counters: vec![0; rec.counters.len()],
            fcounters: vec![0.0; rec.fcounters.len()],
        });
        schema.aggregate_into(rec, dst, first);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TallyBucket {
    pub count: i64,
    pub bytes: i64,
    pub max_bytes: i64,
}

impl TallyBucket {
    fn add(&mut self, bytes: i64) {
        self.count += 1;
        self.bytes += bytes;
        self.max_bytes = self.max_bytes.max(bytes);
    }
}

/// File counts bucketed by access direction and by sharing.
#[derive(Debug, Default)]
pub struct FileTally {
    pub total: TallyBucket,
    pub read_only: TallyBucket,
    pub write_only: TallyBucket,
    pub read_write: TallyBucket,
    pub unique: TallyBucket,
    pub shared: TallyBucket,
}

/// Finalized performance figures for one module.
#[derive(Debug, Default)]
pub struct PerfResult {
    pub total_bytes: i64,
    pub slowest_rank_io_total_time: f64,
    pub slowest_rank_meta_only_time: f64,
    pub slowest_rank_rw_only_time: f64,
    pub slowest_rank: usize,
    pub shared_io_total_time_by_slowest: f64,
    pub agg_time_by_slowest: f64,
    pub agg_perf_by_slowest: f64,
}

/// All mutable aggregation state for the module currently being parsed.
pub struct Aggregates {
    nprocs: u64,
    files: HashMap<RecordId, FileAccum>,
    total: FileAccum,
    total_bytes: i64,
    shared_io_total_time_by_slowest: f64,
    rank_cumul_io_total_time: Vec<f64>,
    rank_cumul_rw_only_time: Vec<f64>,
    rank_cumul_md_only_time: Vec<f64>,
}

impl Aggregates {
    pub fn new(nprocs: u64) -> Aggregates {
        Aggregates {
            nprocs,
            files: HashMap::new(),
            total: FileAccum::default(),
            total_bytes: 0,
            shared_io_total_time_by_slowest: 0.0,
            rank_cumul_io_total_time: vec![0.0; nprocs as usize],
            rank_cumul_rw_only_time: vec![0.0; nprocs as usize],
            rank_cumul_md_only_time: vec![0.0; nprocs as usize],
        }
    }

    // A per-rank record with a rank at or past nprocs would index outside the rank vectors;
    // such a record comes from a malformed log and is refused.
    fn check_rank(&self, rec: &ModuleRecord) -> Result<(), LogError> {
        if let Rank::PerRank(r) = rec.base.rank {
            if u64::from(r) >= self.nprocs {
                return Err(LogError::MalformedRank {
                    rank: i64::from(r),
                    nprocs: self.nprocs,
                });
            }
        }
        Ok(())
    }

    /// Fold one record into its per-file accumulator and the module total.
    pub fn fold(&mut self, schema: &dyn ModuleSchema, rec: &ModuleRecord) -> Result<(), LogError> {
        self.check_rank(rec)?;
        self.total.fold(schema, rec, self.nprocs);
        self.files
            .entry(rec.base.id)
            .or_default()
            .fold(schema, rec, self.nprocs);
        Ok(())
    }

    /// Fold one record into the performance accumulator.
    pub fn fold_perf(
        &mut self,
        schema: &dyn ModuleSchema,
        rec: &ModuleRecord,
    ) -> Result<(), LogError> {
        self.check_rank(rec)?;
        let (bytes_read, bytes_written) = schema.bytes_moved(rec);
        self.total_bytes += bytes_read + bytes_written;

        let (meta, read, write) = schema.io_time_split(rec);
        match rec.base.rank {
            Rank::Shared => {
                self.shared_io_total_time_by_slowest += schema.slowest_rank_time(rec);
            }
            Rank::PerRank(r) => {
                let r = r as usize;
                self.rank_cumul_io_total_time[r] += meta + read + write;
                self.rank_cumul_md_only_time[r] += meta;
                self.rank_cumul_rw_only_time[r] += read + write;
            }
        }
        Ok(())
    }

    /// The module-wide aggregate record, if any record was folded.
    pub fn total_record(&self) -> Option<&ModuleRecord> {
        self.total.rec_dat.as_ref()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// One pass over the per-file accumulators, bucketing by access direction and sharing.
    pub fn finalize_files(&self, schema: &dyn ModuleSchema) -> FileTally {
        let mut tally = FileTally::default();
        for acc in self.files.values() {
            let Some(rec) = &acc.rec_dat else { continue };
            let (bytes_read, bytes_written) = schema.bytes_moved(rec);
            let bytes = bytes_read + bytes_written;
            let (r, w) = schema.rw_op_counts(rec);

            tally.total.add(bytes);
            if r != 0 && w == 0 {
                tally.read_only.add(bytes);
            }
            if r == 0 && w != 0 {
                tally.write_only.add(bytes);
            }
            if r != 0 && w != 0 {
                tally.read_write.add(bytes);
            }
            if acc.type_bits & (FILETYPE_SHARED | FILETYPE_PARTSHARED) != 0 {
                tally.shared.add(bytes);
            }
            if acc.type_bits & FILETYPE_UNIQUE != 0 {
                tally.unique.add(bytes);
            }
        }
        tally
    }

    /// Elect the slowest rank (strict comparison, so the lowest index wins a tie) and derive
    /// the aggregate time and bandwidth.
    pub fn finalize_perf(&self) -> PerfResult {
        let mut res = PerfResult {
            total_bytes: self.total_bytes,
            shared_io_total_time_by_slowest: self.shared_io_total_time_by_slowest,
            ..Default::default()
        };
        for r in 0..self.nprocs as usize {
            if self.rank_cumul_io_total_time[r] > res.slowest_rank_io_total_time {
                res.slowest_rank_io_total_time = self.rank_cumul_io_total_time[r];
                res.slowest_rank_meta_only_time = self.rank_cumul_md_only_time[r];
                res.slowest_rank_rw_only_time = self.rank_cumul_rw_only_time[r];
                res.slowest_rank = r;
            }
        }
        res.agg_time_by_slowest =
            res.slowest_rank_io_total_time + self.shared_io_total_time_by_slowest;
        if res.agg_time_by_slowest != 0.0 {
            res.agg_perf_by_slowest =
                (res.total_bytes as f64 / 1048576.0) / res.agg_time_by_slowest;
        }
        res
    }

    /// Zero everything for the next module.  The rank vectors keep their allocation; the
    /// per-file map is dropped wholesale.
    pub fn reset(&mut self) {
        self.files.clear();
        self.total = FileAccum::default();
        self.total_bytes = 0;
        self.shared_io_total_time_by_slowest = 0.0;
        self.rank_cumul_io_total_time.fill(0.0);
        self.rank_cumul_rw_only_time.fill(0.0);
        self.rank_cumul_md_only_time.fill(0.0);
    }
}
