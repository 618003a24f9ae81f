//! Opening and slicing the log container.
//!
//! A log is read into memory whole: every region is compressed and small, and slicing a byte
//! vector beats seek bookkeeping.  Region extents are validated once at open so later slicing
//! cannot run out of bounds.

use crate::error::{LogError, Result};
use crate::header::{CompressionKind, Header, Region};
use crate::module::ModuleId;
use crate::namehash::{MountEntry, MountTable, PathTable};
use std::fs;
use std::io::Read;
use ustr::Ustr;

/// Job-level information from the log's job region.
#[derive(Debug)]
pub struct Job {
    pub uid: u64,
    pub jobid: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub nprocs: u64,
    /// Newline-separated key=value lines, verbatim from the runtime.
    pub metadata: String,
    pub exe: String,
}

impl Job {
    pub fn run_time(&self) -> u64 {
        if self.end_time >= self.start_time {
            self.end_time - self.start_time + 1
        } else {
            0
        }
    }
}

/// An open log file: validated header plus the raw container bytes.
pub struct LogFile {
    header: Header,
    data: Vec<u8>,
}

impl LogFile {
    pub fn open(path: &str) -> Result<LogFile> {
        let data = fs::read(path).map_err(|source| LogError::Open {
            path: path.to_string(),
            source,
        })?;
        let header = Header::decode(&data)?;

        let file_len = data.len() as u64;
        let check = |r: Region| -> Result<()> {
            let end = r
                .offset
                .checked_add(r.len)
                .ok_or_else(|| LogError::Format("region extent overflows".to_string()))?;
            if end > file_len {
                return Err(LogError::Format(format!(
                    "region [{}, {}) extends past end of file ({} bytes)",
                    r.offset, end, file_len
                )));
            }
            Ok(())
        };
        check(header.job)?;
        check(header.name)?;
        for r in header.mod_map.iter() {
            check(*r)?;
        }

        Ok(LogFile { header, data })
    }

    pub fn version(&self) -> &str {
        &self.header.version
    }

    pub fn compression(&self) -> CompressionKind {
        self.header.compression
    }

    pub fn job_region_len(&self) -> u64 {
        self.header.job.len
    }

    pub fn name_region_len(&self) -> u64 {
        self.header.name.len
    }

    pub fn module_len(&self, module: ModuleId) -> u64 {
        self.header.mod_map[module].len
    }

    pub fn module_version(&self, module: ModuleId) -> u32 {
        self.header.mod_ver[module]
    }

    pub fn is_partial(&self, module: ModuleId) -> bool {
        self.header.is_partial(module)
    }

    fn decompressed(&self, region: Region) -> Result<Vec<u8>> {
        if region.len == 0 {
            return Ok(Vec::new());
        }
        let raw = &self.data[region.offset as usize..(region.offset + region.len) as usize];
        decompress(self.header.compression, raw)
    }

    /// Decode the job region into the job information and the mount table.
    pub fn job(&self) -> Result<(Job, MountTable)> {
        let buf = self.decompressed(self.header.job)?;
        let mut off = 0;
        let uid = get_u64(&buf, &mut off)?;
        let jobid = get_u64(&buf, &mut off)?;
        let start_time = get_u64(&buf, &mut off)?;
        let end_time = get_u64(&buf, &mut off)?;
        let nprocs = get_u64(&buf, &mut off)?;
        let metadata = get_string(&buf, &mut off)?;
        let exe = get_string(&buf, &mut off)?;
        let mount_count = get_u32(&buf, &mut off)? as usize;
        let mut entries = Vec::with_capacity(mount_count);
        for _ in 0..mount_count {
            let path = get_string(&buf, &mut off)?;
            let fs_type = get_string(&buf, &mut off)?;
            entries.push(MountEntry {
                path: Ustr::from(&path),
                fs_type: Ustr::from(&fs_type),
            });
        }
        Ok((
            Job {
                uid,
                jobid,
                start_time,
                end_time,
                nprocs,
                metadata,
                exe,
            },
            MountTable::new(entries),
        ))
    }

    /// Decode the name region into the record-id-to-path table.
    pub fn name_table(&self) -> Result<PathTable> {
        PathTable::decode(&self.decompressed(self.header.name)?)
    }

    /// The decompressed record stream of one module.
    pub fn module_data(&self, module: ModuleId) -> Result<Vec<u8>> {
        self.decompressed(self.header.mod_map[module])
    }
}

fn decompress(kind: CompressionKind, raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match kind {
        CompressionKind::Zlib => {
            flate2::read::ZlibDecoder::new(raw)
                .read_to_end(&mut out)
                .map_err(|e| LogError::Format(format!("zlib region: {}", e)))?;
        }
        CompressionKind::Bzip2 => {
            bzip2::read::BzDecoder::new(raw)
                .read_to_end(&mut out)
                .map_err(|e| LogError::Format(format!("bzip2 region: {}", e)))?;
        }
        CompressionKind::None => out.extend_from_slice(raw),
        CompressionKind::Unknown => {
            return Err(LogError::Format("unknown compression method".to_string()))
        }
    }
    Ok(out)
}

fn get_u32(buf: &[u8], off: &mut usize) -> Result<u32> {
    if buf.len() - *off < 4 {
        return Err(LogError::Format("truncated job region".to_string()));
    }
    let v = u32::from_le_bytes(buf[*off..*off + 4].try_into().unwrap());
    *off += 4;
    Ok(v)
}

fn get_u64(buf: &[u8], off: &mut usize) -> Result<u64> {
    if buf.len() - *off < 8 {
        return Err(LogError::Format("truncated job region".to_string()));
    }
    let v = u64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(v)
}

fn get_string(buf: &[u8], off: &mut usize) -> Result<String> {
    let len = get_u32(buf, off)? as usize;
    if buf.len() - *off < len {
        return Err(LogError::Format("truncated job region".to_string()));
    }
    let s = std::str::from_utf8(&buf[*off..*off + len])
        .map_err(|_| LogError::Format("job region string is not UTF-8".to_string()))?
        .to_string();
    *off += len;
    Ok(s)
}

/// Test support: builds syntactically valid logs, the inverse of the decode path.  Not shipped.
#[cfg(test)]
pub(crate) mod testlog {
    use super::*;
    use crate::header::{empty_header, MAX_MODS};
    use std::io::Write;

    pub(crate) struct LogBuilder {
        pub version: String,
        pub compression: CompressionKind,
        pub uid: u64,
        pub jobid: u64,
        pub start_time: u64,
        pub end_time: u64,
        pub nprocs: u64,
        pub metadata: String,
        pub exe: String,
        pub mounts: Vec<(String, String)>,
        pub names: Vec<(u64, String)>,
        pub modules: Vec<(ModuleId, u32, Vec<u8>)>,
        pub partial: Vec<ModuleId>,
    }

    impl LogBuilder {
        pub(crate) fn new() -> LogBuilder {
            LogBuilder {
                version: "1.2".to_string(),
                compression: CompressionKind::Zlib,
                uid: 1000,
                jobid: 42,
                start_time: 1_600_000_000,
                end_time: 1_600_000_099,
                nprocs: 1,
                metadata: String::new(),
                exe: "/usr/bin/app".to_string(),
                mounts: vec![],
                names: vec![],
                modules: vec![],
                partial: vec![],
            }
        }

        fn job_blob(&self) -> Vec<u8> {
            let mut out = Vec::new();
            for v in [self.uid, self.jobid, self.start_time, self.end_time, self.nprocs] {
                out.extend_from_slice(&v.to_le_bytes());
            }
            put_string(&mut out, &self.metadata);
            put_string(&mut out, &self.exe);
            out.extend_from_slice(&(self.mounts.len() as u32).to_le_bytes());
            for (path, fs) in &self.mounts {
                put_string(&mut out, path);
                put_string(&mut out, fs);
            }
            out
        }

        fn name_blob(&self) -> Vec<u8> {
            let mut out = Vec::new();
            for (id, path) in &self.names {
                out.extend_from_slice(&id.to_le_bytes());
                put_string(&mut out, path);
            }
            out
        }

        fn compress(&self, blob: &[u8]) -> Vec<u8> {
            match self.compression {
                CompressionKind::Zlib => {
                    let mut enc = flate2::write::ZlibEncoder::new(
                        Vec::new(),
                        flate2::Compression::default(),
                    );
                    enc.write_all(blob).unwrap();
                    enc.finish().unwrap()
                }
                CompressionKind::Bzip2 => {
                    let mut enc =
                        bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
                    enc.write_all(blob).unwrap();
                    enc.finish().unwrap()
                }
                _ => blob.to_vec(),
            }
        }

        pub(crate) fn build(&self) -> Vec<u8> {
            let mut header = empty_header();
            header.version = self.version.clone();
            header.compression = self.compression;
            for m in &self.partial {
                header = header.with_partial(*m);
            }

            let mut payload = Vec::new();
            let place = |blob: &[u8], payload: &mut Vec<u8>| -> Region {
                let r = Region {
                    offset: (crate::header::HEADER_SIZE + payload.len()) as u64,
                    len: blob.len() as u64,
                };
                payload.extend_from_slice(blob);
                r
            };
            header.job = place(&self.compress(&self.job_blob()), &mut payload);
            header.name = place(&self.compress(&self.name_blob()), &mut payload);
            for (m, ver, blob) in &self.modules {
                assert!(*m < MAX_MODS);
                header.mod_map[*m] = place(&self.compress(blob), &mut payload);
                header.mod_ver[*m] = *ver;
            }

            let mut out = header.encode();
            out.extend_from_slice(&payload);
            out
        }

        pub(crate) fn write_to_temp(&self) -> tempfile::NamedTempFile {
            let f = tempfile::NamedTempFile::new().unwrap();
            std::fs::write(f.path(), self.build()).unwrap();
            f
        }
    }

    fn put_string(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::testlog::LogBuilder;
    use super::*;
    use crate::module::{encode_record, schema_for, POSIX_MOD, STDIO_MOD};
    use crate::Rank;

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            LogFile::open("/no/such/dir/x.spor"),
            Err(LogError::Open { .. })
        ));
    }

    #[test]
    fn test_open_and_read_job() {
        let mut b = LogBuilder::new();
        b.nprocs = 8;
        b.metadata = "lib_ver=3.4.1\nh=romio_no_indep_rw=true;cb_nodes=4\n".to_string();
        b.mounts = vec![
            ("/".to_string(), "ext4".to_string()),
            ("/scratch".to_string(), "lustre".to_string()),
        ];
        b.names = vec![(11, "/scratch/out.dat".to_string())];
        let f = b.write_to_temp();

        let log = LogFile::open(f.path().to_str().unwrap()).unwrap();
        assert_eq!(log.version(), "1.2");
        assert_eq!(log.compression(), CompressionKind::Zlib);
        let (job, mounts) = log.job().unwrap();
        assert_eq!(job.nprocs, 8);
        assert_eq!(job.exe, "/usr/bin/app");
        assert_eq!(job.run_time(), 100);
        assert_eq!(mounts.entries().len(), 2);
        assert_eq!(mounts.resolve("/scratch/out.dat"), ("/scratch", "lustre"));
        let names = log.name_table().unwrap();
        assert_eq!(names.lookup(11), Some("/scratch/out.dat"));
    }

    #[test]
    fn test_all_compression_kinds() {
        for kind in [
            CompressionKind::Zlib,
            CompressionKind::Bzip2,
            CompressionKind::None,
        ] {
            let mut b = LogBuilder::new();
            b.compression = kind;
            b.names = vec![(5, "/a".to_string())];
            let f = b.write_to_temp();
            let log = LogFile::open(f.path().to_str().unwrap()).unwrap();
            assert_eq!(log.compression(), kind);
            assert_eq!(log.name_table().unwrap().lookup(5), Some("/a"));
        }
    }

    #[test]
    fn test_module_region_decode() {
        let schema = schema_for(POSIX_MOD).unwrap();
        let n = schema.counter_names().len();
        let m = schema.fcounter_names().len();
        let mut blob = encode_record(11, 0, &vec![1; n], &vec![0.5; m]);
        blob.extend(encode_record(11, 3, &vec![2; n], &vec![0.25; m]));

        let mut b = LogBuilder::new();
        b.modules = vec![(POSIX_MOD, 2, blob)];
        let f = b.write_to_temp();
        let log = LogFile::open(f.path().to_str().unwrap()).unwrap();
        assert!(log.module_len(POSIX_MOD) > 0);
        assert_eq!(log.module_len(STDIO_MOD), 0);
        assert_eq!(log.module_version(POSIX_MOD), 2);
        assert!(!log.is_partial(POSIX_MOD));

        let data = log.module_data(POSIX_MOD).unwrap();
        let mut cursor = 0;
        let r1 = schema.decode_one(&data, &mut cursor, 2).unwrap().unwrap();
        let r2 = schema.decode_one(&data, &mut cursor, 2).unwrap().unwrap();
        assert_eq!(r1.base.rank, Rank::PerRank(0));
        assert_eq!(r2.base.rank, Rank::PerRank(3));
        assert!(schema.decode_one(&data, &mut cursor, 2).unwrap().is_none());
    }

    #[test]
    fn test_partial_flag_roundtrip() {
        let mut b = LogBuilder::new();
        b.partial = vec![POSIX_MOD];
        let f = b.write_to_temp();
        let log = LogFile::open(f.path().to_str().unwrap()).unwrap();
        assert!(log.is_partial(POSIX_MOD));
        assert_eq!(log.module_len(POSIX_MOD), 0);
        assert!(!log.is_partial(STDIO_MOD));
    }

    #[test]
    fn test_region_past_end_of_file() {
        let mut bytes = LogBuilder::new().build();
        // Grow the job region length beyond the file.
        bytes[32..40].copy_from_slice(&u64::MAX.to_le_bytes());
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), &bytes).unwrap();
        assert!(matches!(
            LogFile::open(f.path().to_str().unwrap()),
            Err(LogError::Format(_))
        ));
    }

    #[test]
    fn test_corrupt_compressed_region() {
        let mut b = LogBuilder::new();
        b.names = vec![(5, "/a".to_string())];
        let mut bytes = b.build();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), &bytes).unwrap();
        let log = LogFile::open(f.path().to_str().unwrap()).unwrap();
        assert!(log.name_table().is_err());
    }
}
