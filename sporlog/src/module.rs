//! Module ids and the decoder registry.
//!
//! A module id is an index into the header's module map.  The registry hands out a schema for
//! the ids this library can decode; unknown ids and known-but-undecodable ids stay
//! representable so that callers can report their size and skip them.

use crate::error::{LogError, Result};
use crate::header::KNOWN_MODULE_COUNT;
use crate::{BaseRecord, Rank};
use std::io::{self, Write};

pub type ModuleId = usize;

pub const POSIX_MOD: ModuleId = 0;
pub const MPIIO_MOD: ModuleId = 1;
pub const STDIO_MOD: ModuleId = 2;
pub const XT_POSIX_MOD: ModuleId = 3;
pub const XT_MPIIO_MOD: ModuleId = 4;
pub const BGQ_MOD: ModuleId = 5;
pub const LUSTRE_MOD: ModuleId = 6;

const MODULE_NAMES: [&str; KNOWN_MODULE_COUNT] = [
    "POSIX", "MPI-IO", "STDIO", "XT-POSIX", "XT-MPIIO", "BG/Q", "LUSTRE",
];

pub fn module_name(module: ModuleId) -> Option<&'static str> {
    MODULE_NAMES.get(module).copied()
}

/// Only these modules feed the per-file and performance aggregation; everything else is at
/// most pretty-printed.
pub fn is_aggregating(module: ModuleId) -> bool {
    matches!(module, POSIX_MOD | MPIIO_MOD | STDIO_MOD)
}

pub fn schema_for(module: ModuleId) -> Option<&'static dyn ModuleSchema> {
    match module {
        POSIX_MOD => Some(&crate::posix::PosixSchema),
        MPIIO_MOD => Some(&crate::mpiio::MpiioSchema),
        STDIO_MOD => Some(&crate::stdio::StdioSchema),
        BGQ_MOD => Some(&crate::bgq::BgqSchema),
        _ => None,
    }
}

/// How the pairwise record aggregator folds one counter.
#[derive(Debug, Clone, Copy)]
pub enum AggOp {
    /// Accumulate across records.
    Sum,
    /// Running maximum.
    Max,
    /// Earliest nonzero value; zero means the event never happened.
    MinNonZero,
    /// The first record's value stands.
    KeepFirst,
}

/// A decoded record: fixed-width integer and floating counter vectors behind a base record.
/// What each slot means is owned by the module's schema.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub base: BaseRecord,
    pub counters: Vec<i64>,
    pub fcounters: Vec<f64>,
}

/// Everything the offline tools need from one module: wire decoding, counter naming and
/// description, pairwise aggregation, and the handful of derived quantities the aggregation
/// engine asks for.  The decode and fold loops live here as default methods; schemas supply
/// tables and accessors.
pub trait ModuleSchema: Sync {
    fn name(&self) -> &'static str;
    fn counter_names(&self) -> &'static [&'static str];
    fn fcounter_names(&self) -> &'static [&'static str];
    fn counter_ops(&self) -> &'static [AggOp];
    fn fcounter_ops(&self) -> &'static [AggOp];

    /// Number of integer counters on the wire for `version`, or None if this schema cannot
    /// decode that version.  Decoded vectors are padded to the current layout with -1, the
    /// "not monitored" value.
    fn wire_counters(&self, version: u32) -> Option<usize>;

    /// Synthetic record name for records with no name-table entry, if the module has one.
    fn placeholder_name(&self) -> Option<&'static str> {
        None
    }

    /// Header block describing the counter layout, emitted once before the records.
    fn write_description(&self, w: &mut dyn Write, version: u32) -> io::Result<()>;

    /// (metadata, read, write) seconds for one record.
    fn io_time_split(&self, _rec: &ModuleRecord) -> (f64, f64, f64) {
        (0.0, 0.0, 0.0)
    }

    /// The authoritative slowest-rank time carried by aggregated records.
    fn slowest_rank_time(&self, _rec: &ModuleRecord) -> f64 {
        0.0
    }

    /// (bytes read, bytes written).
    fn bytes_moved(&self, _rec: &ModuleRecord) -> (i64, i64) {
        (0, 0)
    }

    /// (read ops, write ops), the basis for read-only/write-only/read-write classification.
    fn rw_op_counts(&self, _rec: &ModuleRecord) -> (i64, i64) {
        (0, 0)
    }

    /// Pull the next record off the decompressed module stream.  End of stream is None; a
    /// trailing fragment or an undecodable schema version is an error.
    fn decode_one(
        &self,
        data: &[u8],
        cursor: &mut usize,
        version: u32,
    ) -> Result<Option<ModuleRecord>> {
        let decode_err = || LogError::Decode {
            module: self.name(),
            version,
        };
        let n = self.wire_counters(version).ok_or_else(decode_err)?;
        let m = self.fcounter_names().len();
        if *cursor >= data.len() {
            return Ok(None);
        }
        let size = 16 + 8 * (n + m);
        if data.len() - *cursor < size {
            return Err(decode_err());
        }

        let id = get_u64(data, cursor);
        let raw_rank = get_i64(data, cursor);
        let rank = Rank::from_raw(raw_rank).ok_or_else(decode_err)?;

        let mut counters = vec![-1i64; self.counter_names().len()];
        for slot in counters.iter_mut().take(n) {
            *slot = get_i64(data, cursor);
        }
        let mut fcounters = vec![0f64; m];
        for slot in fcounters.iter_mut() {
            *slot = get_f64(data, cursor);
        }

        Ok(Some(ModuleRecord {
            base: BaseRecord { id, rank },
            counters,
            fcounters,
        }))
    }

    /// Fold `src` into `dst` per the op tables.  The first call initializes `dst` from `src`.
    fn aggregate_into(&self, src: &ModuleRecord, dst: &mut ModuleRecord, first: bool) {
        if first {
            *dst = src.clone();
            return;
        }
        if dst.base.rank != src.base.rank {
            dst.base.rank = Rank::Shared;
        }
        for ((d, s), op) in dst
            .counters
            .iter_mut()
            .zip(&src.counters)
            .zip(self.counter_ops())
        {
            match op {
                AggOp::Sum => *d += *s,
                AggOp::Max => *d = (*d).max(*s),
                AggOp::MinNonZero => {
                    if *s != 0 && (*d == 0 || *s < *d) {
                        *d = *s;
                    }
                }
                AggOp::KeepFirst => {}
            }
        }
        for ((d, s), op) in dst
            .fcounters
            .iter_mut()
            .zip(&src.fcounters)
            .zip(self.fcounter_ops())
        {
            match op {
                AggOp::Sum => *d += *s,
                AggOp::Max => *d = d.max(*s),
                AggOp::MinNonZero => {
                    if *s != 0.0 && (*d == 0.0 || *s < *d) {
                        *d = *s;
                    }
                }
                AggOp::KeepFirst => {}
            }
        }
    }

    /// One tab-separated line per counter: module, rank, record id, counter name, value, file
    /// name, mount point, fs type.  Consumers parse this, so the shape is stable.
    fn write_record(
        &self,
        w: &mut dyn Write,
        rec: &ModuleRecord,
        name: &str,
        mnt: &str,
        fs: &str,
    ) -> io::Result<()> {
        let rank = rec.base.rank.as_raw();
        for (cname, val) in self.counter_names().iter().zip(&rec.counters) {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                self.name(),
                rank,
                rec.base.id,
                cname,
                val,
                name,
                mnt,
                fs
            )?;
        }
        for (cname, val) in self.fcounter_names().iter().zip(&rec.fcounters) {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{:.6}\t{}\t{}\t{}",
                self.name(),
                rank,
                rec.base.id,
                cname,
                val,
                name,
                mnt,
                fs
            )?;
        }
        Ok(())
    }
}

fn get_u64(buf: &[u8], off: &mut usize) -> u64 {
    let v = u64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    v
}

fn get_i64(buf: &[u8], off: &mut usize) -> i64 {
    get_u64(buf, off) as i64
}

fn get_f64(buf: &[u8], off: &mut usize) -> f64 {
    f64::from_bits(get_u64(buf, off))
}

/// Test helper: the inverse of `decode_one` for building synthetic module regions.
#[cfg(test)]
pub(crate) fn encode_record(id: u64, rank: i64, counters: &[i64], fcounters: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + 8 * (counters.len() + fcounters.len()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posix::{POSIX_F_NUM_INDICES, POSIX_NUM_INDICES};

    fn posix() -> &'static dyn ModuleSchema {
        schema_for(POSIX_MOD).unwrap()
    }

    #[test]
    fn test_rank_from_raw() {
        assert_eq!(Rank::from_raw(-1), Some(Rank::Shared));
        assert_eq!(Rank::from_raw(0), Some(Rank::PerRank(0)));
        assert_eq!(Rank::from_raw(17), Some(Rank::PerRank(17)));
        assert_eq!(Rank::from_raw(-2), None);
        assert_eq!(Rank::from_raw(i64::MAX), None);
        assert_eq!(Rank::PerRank(3).as_raw(), 3);
        assert_eq!(Rank::Shared.as_raw(), -1);
    }

    #[test]
    fn test_decode_stream() {
        let schema = posix();
        let mut data = encode_record(7, 0, &[1i64; POSIX_NUM_INDICES], &[0.5; POSIX_F_NUM_INDICES]);
        data.extend(encode_record(
            8,
            -1,
            &[2i64; POSIX_NUM_INDICES],
            &[1.5; POSIX_F_NUM_INDICES],
        ));

        let mut cursor = 0;
        let r1 = schema.decode_one(&data, &mut cursor, 2).unwrap().unwrap();
        assert_eq!(r1.base.id, 7);
        assert_eq!(r1.base.rank, Rank::PerRank(0));
        assert_eq!(r1.counters, vec![1i64; POSIX_NUM_INDICES]);
        let r2 = schema.decode_one(&data, &mut cursor, 2).unwrap().unwrap();
        assert_eq!(r2.base.rank, Rank::Shared);
        assert!(schema.decode_one(&data, &mut cursor, 2).unwrap().is_none());
    }

    #[test]
    fn test_decode_trailing_fragment() {
        let schema = posix();
        let data = encode_record(7, 0, &[0i64; POSIX_NUM_INDICES], &[0.0; POSIX_F_NUM_INDICES]);
        let mut cursor = 0;
        assert!(matches!(
            schema.decode_one(&data[..data.len() - 1], &mut cursor, 2),
            Err(LogError::Decode { module: "POSIX", .. })
        ));
    }

    #[test]
    fn test_decode_malformed_rank() {
        let schema = posix();
        let data = encode_record(7, -5, &[0i64; POSIX_NUM_INDICES], &[0.0; POSIX_F_NUM_INDICES]);
        let mut cursor = 0;
        assert!(schema.decode_one(&data, &mut cursor, 2).is_err());
    }

    #[test]
    fn test_decode_old_version_pads() {
        let schema = posix();
        // Version 1 carries two fewer integer counters; the missing slots decode as -1.
        let data = encode_record(9, 1, &[5i64; 14], &[0.0; POSIX_F_NUM_INDICES]);
        let mut cursor = 0;
        let rec = schema.decode_one(&data, &mut cursor, 1).unwrap().unwrap();
        assert_eq!(rec.counters.len(), POSIX_NUM_INDICES);
        assert_eq!(rec.counters[13], 5);
        assert_eq!(rec.counters[14], -1);
        assert_eq!(rec.counters[15], -1);
        assert_eq!(cursor, data.len());
    }

    #[test]
    fn test_decode_unknown_version() {
        let schema = posix();
        let data = encode_record(9, 1, &[0i64; POSIX_NUM_INDICES], &[0.0; POSIX_F_NUM_INDICES]);
        let mut cursor = 0;
        assert!(schema.decode_one(&data, &mut cursor, 99).is_err());
    }

    #[test]
    fn test_aggregate_ops() {
        use crate::posix::{POSIX_BYTES_READ, POSIX_F_READ_TIME, POSIX_READS};
        let schema = posix();
        let mut a = ModuleRecord {
            base: BaseRecord {
                id: 1,
                rank: Rank::PerRank(0),
            },
            counters: vec![0; POSIX_NUM_INDICES],
            fcounters: vec![0.0; POSIX_F_NUM_INDICES],
        };
        let mut src = a.clone();
        src.base.rank = Rank::PerRank(1);
        src.counters[POSIX_READS] = 4;
        src.counters[POSIX_BYTES_READ] = 100;
        src.counters[8] = 10; // POSIX_MAX_BYTE_READ
        src.counters[15] = 0o644; // POSIX_MODE
        src.fcounters[0] = 3.0; // POSIX_F_OPEN_START_TIMESTAMP
        src.fcounters[POSIX_F_READ_TIME] = 0.25;

        schema.aggregate_into(&src, &mut a, true);
        assert_eq!(a.base.rank, Rank::PerRank(1));
        assert_eq!(a.counters[POSIX_READS], 4);

        let mut src2 = src.clone();
        src2.base.rank = Rank::PerRank(2);
        src2.counters[8] = 5;
        src2.counters[15] = 0o600;
        src2.fcounters[0] = 1.0;
        schema.aggregate_into(&src2, &mut a, false);

        assert_eq!(a.base.rank, Rank::Shared); // ranks differed
        assert_eq!(a.counters[POSIX_READS], 8); // sum
        assert_eq!(a.counters[8], 10); // max
        assert_eq!(a.counters[15], 0o644); // keep-first
        assert_eq!(a.fcounters[0], 1.0); // min-nonzero
        assert_eq!(a.fcounters[POSIX_F_READ_TIME], 0.5); // sum
    }
}
