/// A spor log is a compressed binary container written once at job shutdown: an uncompressed
/// header addresses a set of independently compressed regions, one for the job information, one
/// for the record name table, and one per instrumentation module.  Modules evolve independently,
/// so every module region carries its own schema version; the log as a whole carries a format
/// version and a compression method.
///
/// This library's task is to get from that container to typed records:
///
/// - Validate the header and expose every region as a decompressed byte stream.
///
/// - Decode the per-module record streams through a uniform schema interface, tolerating older
///   schema versions, modules with no registered decoder, and unknown module ids.
///
/// - Materialize the record-id-to-path table and resolve paths to their mount point and file
///   system type.
///
/// Analysis of the records (per-file aggregation, derived metrics, presentation) is deliberately
/// left to the consumer; see the sporparse crate.  The wire types for extended tracing live in
/// the `xt` module because the runtime manager (sporxt) and the offline tools must agree on them
/// byte for byte.
mod bgq;
mod error;
mod header;
mod module;
mod mpiio;
mod namehash;
mod posix;
mod reader;
mod stdio;

pub mod xt;

// Typed failures for everything in this crate.

pub use error::{LogError, Result};

// Container header: region map, compression method, per-module schema versions.

pub use header::{CompressionKind, Header, Region};
pub use header::{HEADER_SIZE, KNOWN_MODULE_COUNT, LOG_MAGIC, MAX_MODS};

// Advisory stderr diagnostics for log versions with known quirks.  Never fatal.

pub use header::print_version_warnings;

// Open a log file and expose its regions as decompressed byte streams.

pub use reader::{Job, LogFile};

// Module ids, display names, and the decoder registry.

pub use module::{is_aggregating, module_name, schema_for};
pub use module::{AggOp, ModuleId, ModuleRecord, ModuleSchema};
pub use module::{BGQ_MOD, LUSTRE_MOD, MPIIO_MOD, POSIX_MOD, STDIO_MOD, XT_MPIIO_MOD, XT_POSIX_MOD};

// Record-id-to-path table and mount point resolution.

pub use namehash::{MountEntry, MountTable, PathTable};

// Counter indices that consumers address by name.

pub use mpiio::{
    MPIIO_BYTES_READ, MPIIO_BYTES_WRITTEN, MPIIO_COLL_READS, MPIIO_COLL_WRITES, MPIIO_F_META_TIME,
    MPIIO_F_READ_TIME, MPIIO_F_SLOWEST_RANK_TIME, MPIIO_F_WRITE_TIME, MPIIO_INDEP_READS,
    MPIIO_INDEP_WRITES, MPIIO_NB_READS, MPIIO_NB_WRITES, MPIIO_SPLIT_READS, MPIIO_SPLIT_WRITES,
};
pub use posix::{
    POSIX_BYTES_READ, POSIX_BYTES_WRITTEN, POSIX_F_META_TIME, POSIX_F_READ_TIME,
    POSIX_F_SLOWEST_RANK_TIME, POSIX_F_WRITE_TIME, POSIX_READS, POSIX_WRITES,
};
pub use stdio::{
    STDIO_BYTES_READ, STDIO_BYTES_WRITTEN, STDIO_F_META_TIME, STDIO_F_READ_TIME,
    STDIO_F_SLOWEST_RANK_TIME, STDIO_F_WRITE_TIME, STDIO_READS, STDIO_WRITES,
};

/// Opaque 64-bit hash of a canonicalized file path.  Stable across the ranks of one job.
pub type RecordId = u64;

/// The rank field of a record.  The runtime's shared-file reduction emits one aggregated record
/// per shared file in place of per-rank records; on the wire that record carries the sentinel
/// rank -1, which decodes to `Shared` so consumers match exhaustively instead of comparing
/// against the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    /// Aggregated record representing all ranks of the job.
    Shared,
    /// Record from a single rank.
    PerRank(u32),
}

impl Rank {
    /// Map a wire rank to the typed form.  Negative values other than the shared sentinel are
    /// malformed and have no typed form.
    pub fn from_raw(raw: i64) -> Option<Rank> {
        if raw == -1 {
            Some(Rank::Shared)
        } else if (0..=i64::from(i32::MAX)).contains(&raw) {
            Some(Rank::PerRank(raw as u32))
        } else {
            None
        }
    }

    pub fn as_raw(self) -> i64 {
        match self {
            Rank::Shared => -1,
            Rank::PerRank(r) => i64::from(r),
        }
    }
}

/// The part every module record has in common.
#[derive(Debug, Clone, Copy)]
pub struct BaseRecord {
    pub id: RecordId,
    pub rank: Rank,
}
