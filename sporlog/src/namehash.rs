//! The record name table and mount point resolution.
//!
//! The name region maps record ids to the paths they hash; the job region carries the mounted
//! file systems.  Paths and mount strings repeat each other's prefixes constantly, so they are
//! interned with Ustr rather than allocated per record.

use crate::error::{LogError, Result};
use crate::RecordId;
use std::collections::HashMap;
use ustr::Ustr;

#[derive(Debug, Clone)]
pub struct MountEntry {
    pub path: Ustr,
    pub fs_type: Ustr,
}

/// Mount entries in log order, plus an index sorted by descending path length so that lookup
/// tries the most specific mount first.
#[derive(Debug)]
pub struct MountTable {
    entries: Vec<MountEntry>,
    by_length: Vec<usize>,
}

impl MountTable {
    pub fn new(entries: Vec<MountEntry>) -> MountTable {
        let mut by_length: Vec<usize> = (0..entries.len()).collect();
        by_length.sort_by(|&a, &b| entries[b].path.len().cmp(&entries[a].path.len()));
        MountTable { entries, by_length }
    }

    /// The entries in the order the log recorded them.
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Longest-prefix match of `path` against the mount points.
    pub fn resolve(&self, path: &str) -> (&str, &str) {
        for &ix in &self.by_length {
            let e = &self.entries[ix];
            if path.starts_with(e.path.as_str()) {
                return (e.path.as_str(), e.fs_type.as_str());
            }
        }
        ("UNKNOWN", "UNKNOWN")
    }
}

/// The record-id-to-path table from the log's name region.
#[derive(Debug, Default)]
pub struct PathTable {
    map: HashMap<RecordId, Ustr>,
}

impl PathTable {
    /// Decode the decompressed name region: repeated {u64 id, u32 len, path bytes}.
    pub fn decode(buf: &[u8]) -> Result<PathTable> {
        let mut map = HashMap::new();
        let mut off = 0;
        while off < buf.len() {
            if buf.len() - off < 12 {
                return Err(LogError::Format("truncated name record".to_string()));
            }
            let id = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
            off += 8;
            let len = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            if buf.len() - off < len {
                return Err(LogError::Format("truncated name record".to_string()));
            }
            let path = std::str::from_utf8(&buf[off..off + len])
                .map_err(|_| LogError::Format("name record is not UTF-8".to_string()))?;
            off += len;
            map.insert(id, Ustr::from(path));
        }
        Ok(PathTable { map })
    }

    pub fn lookup(&self, id: RecordId) -> Option<&str> {
        self.map.get(&id).map(|u| u.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
fn mounts(entries: &[(&str, &str)]) -> MountTable {
    MountTable::new(
        entries
            .iter()
            .map(|(p, t)| MountEntry {
                path: Ustr::from(p),
                fs_type: Ustr::from(t),
            })
            .collect(),
    )
}

#[test]
fn test_mount_longest_prefix() {
    let t = mounts(&[("/", "ext4"), ("/scratch", "lustre"), ("/scratch/fast", "ssdfs")]);
    assert_eq!(t.resolve("/scratch/fast/a.dat"), ("/scratch/fast", "ssdfs"));
    assert_eq!(t.resolve("/scratch/slow/a.dat"), ("/scratch", "lustre"));
    assert_eq!(t.resolve("/home/me/a.dat"), ("/", "ext4"));
    // Entries print in log order regardless of lookup order.
    assert_eq!(t.entries()[0].path.as_str(), "/");
}

#[test]
fn test_mount_no_match() {
    let t = mounts(&[("/scratch", "lustre")]);
    assert_eq!(t.resolve("relative/path"), ("UNKNOWN", "UNKNOWN"));
    let empty = mounts(&[]);
    assert_eq!(empty.resolve("/anything"), ("UNKNOWN", "UNKNOWN"));
}

#[cfg(test)]
pub(crate) fn encode_names(names: &[(RecordId, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (id, path) in names {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(path.len() as u32).to_le_bytes());
        out.extend_from_slice(path.as_bytes());
    }
    out
}

#[test]
fn test_path_table_roundtrip() {
    let buf = encode_names(&[(1, "/scratch/a"), (2, "/scratch/b")]);
    let t = PathTable::decode(&buf).unwrap();
    assert_eq!(t.len(), 2);
    assert_eq!(t.lookup(1), Some("/scratch/a"));
    assert_eq!(t.lookup(3), None);
}

#[test]
fn test_path_table_truncated() {
    let mut buf = encode_names(&[(1, "/scratch/a")]);
    buf.pop();
    assert!(PathTable::decode(&buf).is_err());
    assert!(PathTable::decode(&buf[..10]).is_err());
}
