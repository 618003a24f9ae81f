//! The container header.  Fixed size and uncompressed so a reader can locate every region
//! without touching a codec.  All integers little-endian.
//!
//! Layout: 8-byte NUL-padded version string, u32 magic, u8 compression code, 3 pad bytes,
//! u64 partial-flag bitmask, job region, name region, MAX_MODS module regions, MAX_MODS
//! u32 schema versions.  A region is {u64 offset, u64 len}.

use crate::error::{LogError, Result};

pub const HEADER_SIZE: usize = 376;
pub const LOG_MAGIC: u32 = 0x5350_4F52;

/// Number of module slots in the header's module map.
pub const MAX_MODS: usize = 16;

/// Ids below this are modules this library knows by name; the rest are reserved and reported
/// by size only.
pub const KNOWN_MODULE_COUNT: usize = 7;

const VERSION_LEN: usize = 8;
const SUPPORTED_VERSIONS: [&str; 3] = ["1.0", "1.1", "1.2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    Zlib,
    Bzip2,
    None,
    Unknown,
}

impl CompressionKind {
    fn from_code(code: u8) -> CompressionKind {
        match code {
            1 => CompressionKind::Zlib,
            2 => CompressionKind::Bzip2,
            3 => CompressionKind::None,
            _ => CompressionKind::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionKind::Zlib => "ZLIB",
            CompressionKind::Bzip2 => "BZIP2",
            CompressionKind::None => "NONE",
            CompressionKind::Unknown => "UNKNOWN",
        }
    }

    #[cfg(test)]
    pub(crate) fn code(self) -> u8 {
        match self {
            CompressionKind::Zlib => 1,
            CompressionKind::Bzip2 => 2,
            CompressionKind::None => 3,
            CompressionKind::Unknown => 0,
        }
    }
}

/// Byte extent of one compressed region within the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug)]
pub struct Header {
    pub version: String,
    pub compression: CompressionKind,
    partial_flags: u64,
    pub job: Region,
    pub name: Region,
    pub mod_map: [Region; MAX_MODS],
    pub mod_ver: [u32; MAX_MODS],
}

impl Header {
    pub fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE {
            return Err(LogError::Format(format!(
                "header truncated ({} of {} bytes)",
                buf.len(),
                HEADER_SIZE
            )));
        }

        let raw_version = &buf[..VERSION_LEN];
        let end = raw_version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(VERSION_LEN);
        let version = std::str::from_utf8(&raw_version[..end])
            .map_err(|_| LogError::Format("version string is not UTF-8".to_string()))?
            .to_string();

        let mut off = VERSION_LEN;
        let magic = get_u32(buf, &mut off);
        if magic != LOG_MAGIC {
            return Err(LogError::Format(format!("bad magic number {:#010x}", magic)));
        }
        let compression = CompressionKind::from_code(buf[off]);
        off += 4; // code byte plus padding
        let partial_flags = get_u64(buf, &mut off);
        let job = get_region(buf, &mut off);
        let name = get_region(buf, &mut off);
        let mut mod_map = [Region::default(); MAX_MODS];
        for slot in mod_map.iter_mut() {
            *slot = get_region(buf, &mut off);
        }
        let mut mod_ver = [0u32; MAX_MODS];
        for slot in mod_ver.iter_mut() {
            *slot = get_u32(buf, &mut off);
        }

        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(LogError::UnsupportedVersion(version));
        }

        Ok(Header {
            version,
            compression,
            partial_flags,
            job,
            name,
            mod_map,
            mod_ver,
        })
    }

    /// True if the runtime ran out of record memory and truncated this module's region.
    pub fn is_partial(&self, module: usize) -> bool {
        module < MAX_MODS && (self.partial_flags >> module) & 1 == 1
    }

    #[cfg(test)]
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        let vbytes = self.version.as_bytes();
        out[..vbytes.len()].copy_from_slice(vbytes);
        out[8..12].copy_from_slice(&LOG_MAGIC.to_le_bytes());
        out[12] = self.compression.code();
        out[16..24].copy_from_slice(&self.partial_flags.to_le_bytes());
        let mut off = 24;
        for r in [self.job, self.name].iter().chain(self.mod_map.iter()) {
            out[off..off + 8].copy_from_slice(&r.offset.to_le_bytes());
            out[off + 8..off + 16].copy_from_slice(&r.len.to_le_bytes());
            off += 16;
        }
        for v in self.mod_ver.iter() {
            out[off..off + 4].copy_from_slice(&v.to_le_bytes());
            off += 4;
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn with_partial(mut self, module: usize) -> Header {
        self.partial_flags |= 1 << module;
        self
    }
}

pub fn print_version_warnings(version: &str) {
    if version == "1.0" {
        eprintln!(
            "# Warning: log version 1.0 counts paired fopen/fclose metadata twice; \
             STDIO_F_META_TIME may be inflated."
        );
    }
}

fn get_u32(buf: &[u8], off: &mut usize) -> u32 {
    let v = u32::from_le_bytes(buf[*off..*off + 4].try_into().unwrap());
    *off += 4;
    v
}

fn get_u64(buf: &[u8], off: &mut usize) -> u64 {
    let v = u64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    v
}

fn get_region(buf: &[u8], off: &mut usize) -> Region {
    let offset = get_u64(buf, off);
    let len = get_u64(buf, off);
    Region { offset, len }
}

#[cfg(test)]
pub(crate) fn empty_header() -> Header {
    Header {
        version: "1.2".to_string(),
        compression: CompressionKind::Zlib,
        partial_flags: 0,
        job: Region::default(),
        name: Region::default(),
        mod_map: [Region::default(); MAX_MODS],
        mod_ver: [0u32; MAX_MODS],
    }
}

#[test]
fn test_header_roundtrip() {
    let mut h = empty_header();
    h.job = Region {
        offset: 376,
        len: 100,
    };
    h.name = Region {
        offset: 476,
        len: 50,
    };
    h.mod_map[2] = Region {
        offset: 526,
        len: 64,
    };
    h.mod_ver[2] = 1;
    let h = h.with_partial(0);

    let decoded = Header::decode(&h.encode()).unwrap();
    assert_eq!(decoded.version, "1.2");
    assert_eq!(decoded.compression, CompressionKind::Zlib);
    assert!(decoded.is_partial(0));
    assert!(!decoded.is_partial(2));
    assert_eq!(decoded.job, h.job);
    assert_eq!(decoded.name, h.name);
    assert_eq!(decoded.mod_map[2], h.mod_map[2]);
    assert_eq!(decoded.mod_ver[2], 1);
}

#[test]
fn test_header_bad_magic() {
    let mut bytes = empty_header().encode();
    bytes[9] ^= 0xff;
    assert!(matches!(
        Header::decode(&bytes),
        Err(LogError::Format(_))
    ));
}

#[test]
fn test_header_truncated() {
    let bytes = empty_header().encode();
    assert!(matches!(
        Header::decode(&bytes[..100]),
        Err(LogError::Format(_))
    ));
}

#[test]
fn test_header_unsupported_version() {
    let mut h = empty_header();
    h.version = "9.9".to_string();
    assert!(matches!(
        Header::decode(&h.encode()),
        Err(LogError::UnsupportedVersion(v)) if v == "9.9"
    ));
}
