//! Runtime buffer manager for extended tracing: every instrumented read and write appends one
//! {offset, length, start, end} segment to a per-file record, and the records are serialized
//! for the log writer once at job shutdown.
//!
//! An application can touch any number of files with any number of operations, so all buffer
//! growth happens under a fixed global memory budget shared by the POSIX and MPI-IO managers.
//! When the budget runs dry the managers degrade instead of failing the traced application:
//! growth requests are clamped to whatever remains, further segments for a full buffer are
//! silently dropped, and new file records are refused outright.
//!
//! Locking covers only the budget.  A file record is mutated by the thread that owns the file
//! (one open descriptor per thread of execution in practice), so the trace entry points take
//! `&mut self` and the shared budget is the single synchronized object.  Shutdown must happen
//! after all instrumented threads have quiesced.

use sporlog::xt::{SegmentInfo, XtRecordHeader, FILE_RECORD_HEADER_SIZE, SEGMENT_SIZE};
use sporlog::RecordId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Maximum memory for trace records, across both managers.
pub const XT_TRACE_MEM_MAX: usize = 4 * 1024 * 1024;

/// Initial per-direction segment capacity; doubled when exceeded.
pub const TRACE_BUF_SIZE: usize = 64;

/// Which instrumentation layer a manager traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XtModule {
    Posix,
    Mpiio,
}

/// The memory budget shared by the per-module managers.  This is a high-water mark: memory
/// taken for file records and segment buffers is never credited back.
pub struct XtBudget {
    remaining: Mutex<usize>,
}

impl XtBudget {
    pub fn new() -> Arc<XtBudget> {
        Arc::new(XtBudget {
            remaining: Mutex::new(XT_TRACE_MEM_MAX),
        })
    }

    #[cfg(test)]
    fn with_limit(limit: usize) -> Arc<XtBudget> {
        Arc::new(XtBudget {
            remaining: Mutex::new(limit),
        })
    }

    pub fn remaining(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        self.remaining.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Clamp a requested segment-count increment to what remains and debit the grant.
    fn take_segments(&self, want: usize) -> usize {
        let mut remaining = self.lock();
        let granted = want.min(*remaining / SEGMENT_SIZE);
        *remaining -= granted * SEGMENT_SIZE;
        granted
    }

    // One file record's worth of memory, all or nothing.
    fn take_record(&self) -> bool {
        let mut remaining = self.lock();
        if *remaining < FILE_RECORD_HEADER_SIZE {
            return false;
        }
        *remaining -= FILE_RECORD_HEADER_SIZE;
        true
    }
}

struct FileRecord {
    id: RecordId,
    rank: i64,
    write_traces: Vec<SegmentInfo>,
    read_traces: Vec<SegmentInfo>,
    // Granted capacity in segments.  Vec may round its own capacity up; the budget math uses
    // these fields, never Vec::capacity.
    write_avail: usize,
    read_avail: usize,
}

/// One per traced module.  Created at instrumentation init and handed to every trace call.
pub struct XtManager {
    module: XtModule,
    rank: i64,
    budget: Arc<XtBudget>,
    disabled: AtomicBool,
    records: HashMap<RecordId, FileRecord>,
    // Shutdown serializes in creation order.
    order: Vec<RecordId>,
}

impl XtManager {
    pub fn new(module: XtModule, rank: i64, budget: Arc<XtBudget>) -> XtManager {
        XtManager {
            module,
            rank,
            budget,
            disabled: AtomicBool::new(false),
            records: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn module(&self) -> XtModule {
        self.module
    }

    /// Record one write.  MPI-IO callers pass no offset.  Drops the segment when the budget
    /// cannot cover buffer growth; a no-op after shutdown.
    pub fn trace_write(
        &mut self,
        id: RecordId,
        offset: Option<i64>,
        length: i64,
        start_time: f64,
        end_time: f64,
    ) {
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        let budget = Arc::clone(&self.budget);
        let Some(rec) = self.resolve(id) else {
            return;
        };
        if rec.write_traces.len() >= rec.write_avail {
            grow(&budget, &mut rec.write_traces, &mut rec.write_avail);
        }
        if rec.write_traces.len() == rec.write_avail {
            return; // no more memory for segments, drop this one
        }
        rec.write_traces.push(SegmentInfo {
            offset: offset.unwrap_or(0),
            length,
            start_time,
            end_time,
        });
    }

    /// Record one read; see `trace_write`.
    pub fn trace_read(
        &mut self,
        id: RecordId,
        offset: Option<i64>,
        length: i64,
        start_time: f64,
        end_time: f64,
    ) {
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        let budget = Arc::clone(&self.budget);
        let Some(rec) = self.resolve(id) else {
            return;
        };
        if rec.read_traces.len() >= rec.read_avail {
            grow(&budget, &mut rec.read_traces, &mut rec.read_avail);
        }
        if rec.read_traces.len() == rec.read_avail {
            return;
        }
        rec.read_traces.push(SegmentInfo {
            offset: offset.unwrap_or(0),
            length,
            start_time,
            end_time,
        });
    }

    /// Serialize every non-empty file record as header + write segments + read segments, free
    /// the trace buffers, and disable further tracing.
    pub fn shutdown(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        for id in &self.order {
            let Some(rec) = self.records.get(id) else {
                continue;
            };
            if rec.write_traces.is_empty() && rec.read_traces.is_empty() {
                continue;
            }
            XtRecordHeader {
                id: rec.id,
                rank: rec.rank,
                write_count: rec.write_traces.len() as i64,
                read_count: rec.read_traces.len() as i64,
            }
            .encode_into(&mut out);
            for s in &rec.write_traces {
                s.encode_into(&mut out);
            }
            for s in &rec.read_traces {
                s.encode_into(&mut out);
            }
        }
        self.records.clear();
        self.order.clear();
        self.disabled.store(true, Ordering::Relaxed);
        out
    }

    // Look up the file record for id, creating it if the budget allows.  None means there is
    // no room for another record and the caller backs out.
    fn resolve(&mut self, id: RecordId) -> Option<&mut FileRecord> {
        if !self.records.contains_key(&id) {
            if !self.budget.take_record() {
                return None;
            }
            self.records.insert(
                id,
                FileRecord {
                    id,
                    rank: self.rank,
                    write_traces: Vec::new(),
                    read_traces: Vec::new(),
                    write_avail: 0,
                    read_avail: 0,
                },
            );
            self.order.push(id);
        }
        self.records.get_mut(&id)
    }
}

// Grow one direction's buffer: start at TRACE_BUF_SIZE segments, then double, with the
// increment clamped under the lock to what the budget still covers.  A partial or zero grant
// is normal near exhaustion.
fn grow(budget: &XtBudget, traces: &mut Vec<SegmentInfo>, avail: &mut usize) {
    let want = if *avail == 0 { TRACE_BUF_SIZE } else { *avail };
    let granted = budget.take_segments(want);
    if granted > 0 {
        *avail += granted;
        traces.reserve_exact(*avail - traces.len());
    }
}
