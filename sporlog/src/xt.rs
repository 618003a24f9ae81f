//! Wire types for extended tracing (XT).
//!
//! Where the counter modules summarize a file's access history, XT records every individual
//! operation as a segment.  The runtime manager (sporxt) appends segments to per-file records
//! and serializes them at shutdown; the standalone trace viewer decodes the same layout.  The
//! serialized stream is, per non-empty file record: the record header, then `write_count`
//! segments, then `read_count` segments, with nothing in between.
//!
//! All integers little-endian, floats as IEEE-754 bit patterns.

use crate::RecordId;

/// Serialized size of one segment.
pub const SEGMENT_SIZE: usize = 32;

/// Serialized size of one file record header.
pub const FILE_RECORD_HEADER_SIZE: usize = 32;

/// One traced I/O operation.  The offset is unused for MPI-IO traces and serializes as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SegmentInfo {
    pub offset: i64,
    pub length: i64,
    pub start_time: f64,
    pub end_time: f64,
}

impl SegmentInfo {
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.start_time.to_bits().to_le_bytes());
        out.extend_from_slice(&self.end_time.to_bits().to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Option<SegmentInfo> {
        if buf.len() < SEGMENT_SIZE {
            return None;
        }
        Some(SegmentInfo {
            offset: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
            length: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            start_time: f64::from_bits(u64::from_le_bytes(buf[16..24].try_into().unwrap())),
            end_time: f64::from_bits(u64::from_le_bytes(buf[24..32].try_into().unwrap())),
        })
    }
}

/// Fixed-width header preceding a file record's segments in the serialized stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XtRecordHeader {
    pub id: RecordId,
    pub rank: i64,
    pub write_count: i64,
    pub read_count: i64,
}

impl XtRecordHeader {
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.rank.to_le_bytes());
        out.extend_from_slice(&self.write_count.to_le_bytes());
        out.extend_from_slice(&self.read_count.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Option<XtRecordHeader> {
        if buf.len() < FILE_RECORD_HEADER_SIZE {
            return None;
        }
        Some(XtRecordHeader {
            id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            rank: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            write_count: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
            read_count: i64::from_le_bytes(buf[24..32].try_into().unwrap()),
        })
    }
}

#[test]
fn test_segment_roundtrip() {
    let s = SegmentInfo {
        offset: 4096,
        length: 1024,
        start_time: 0.125,
        end_time: 0.25,
    };
    let mut buf = Vec::new();
    s.encode_into(&mut buf);
    assert_eq!(buf.len(), SEGMENT_SIZE);
    assert_eq!(SegmentInfo::decode(&buf), Some(s));
    assert_eq!(SegmentInfo::decode(&buf[..31]), None);
}

#[test]
fn test_record_header_roundtrip() {
    let h = XtRecordHeader {
        id: 0xdead_beef,
        rank: 3,
        write_count: 100,
        read_count: 2,
    };
    let mut buf = Vec::new();
    h.encode_into(&mut buf);
    assert_eq!(buf.len(), FILE_RECORD_HEADER_SIZE);
    assert_eq!(XtRecordHeader::decode(&buf), Some(h));
}
