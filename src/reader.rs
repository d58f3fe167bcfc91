//! Reader state machine: locates the EOCD by scanning from the tail,
//! follows the ZIP64 locator when required, parses the central directory,
//! and extracts individual entries on demand.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::compress::{self, Method};
use crate::error::{ZipError, ZipResult};
use crate::extra::{self, ExtraRecord, Zip64Extra};
use crate::primitives::DosTime;
use crate::record::{
    CdrEntry, Zip64Eocd, EOCD_SIG, LOCAL_FILE_HEADER_SIG, SENTINEL_16, SENTINEL_32,
    ZIP64_EOCD_LOCATOR_SIG,
};

/// Largest possible EOCD + comment span the tail scan needs to cover:
/// 22-byte fixed record plus a maximum 65535-byte comment.
const MAX_EOCD_TAIL: u64 = 22 + 65535;

/// A read-side view of one archive member. Immutable once constructed;
/// `local_extras` are fetched lazily and memoized.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: Vec<u8>,
    pub method: u16,
    pub dos_time: DosTime,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub local_header_offset: u64,
    pub comment: Vec<u8>,
    pub external_attr: u32,
    pub internal_attr: u16,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub cdr_extras: Vec<ExtraRecord>,
    local_extras: std::cell::RefCell<Option<Vec<ExtraRecord>>>,
}

impl Entry {
    pub fn is_directory(&self) -> bool {
        self.external_attr & 0x10 != 0 || self.path.ends_with(b"/")
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    pub fn method(&self) -> Option<Method> {
        Method::from_u16(self.method)
    }

    pub fn path_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }
}

/// Read-side archive: an ordered list of entries, an archive comment, and a
/// path index (first occurrence wins on duplicate paths).
pub struct Archive<S> {
    stream: S,
    entries: Vec<Entry>,
    index: HashMap<Vec<u8>, usize>,
    comment: Vec<u8>,
}

/// Open a reader session over a seekable `stream`, locating and parsing the
/// central directory.
pub fn open_reader<S: Read + Seek>(mut stream: S) -> ZipResult<Archive<S>> {
    let end_pos = stream.seek(SeekFrom::End(0))?;
    if end_pos < 22 {
        return Err(ZipError::EocdNotFound);
    }

    let (eocd_pos, eocd) = find_eocd(&mut stream, end_pos)?;
    log::trace!("reader: EOCD found at offset {eocd_pos}");

    if eocd.this_disk != eocd.cdr_disk || eocd.disk_entries != eocd.total_entries {
        return Err(ZipError::MultiDiskUnsupported);
    }

    let needs_zip64 = eocd.disk_entries == SENTINEL_16
        || eocd.total_entries == SENTINEL_16
        || eocd.cdr_length == SENTINEL_32
        || eocd.cdr_offset == SENTINEL_32;

    let (total_entries, cdr_offset, cdr_length) = if needs_zip64 {
        log::debug!("reader: EOCD sentinels present, chasing ZIP64 locator");
        let zip64 = chase_zip64(&mut stream, eocd_pos)?;
        (zip64.total_entries, zip64.cdr_offset, zip64.cdr_length)
    } else {
        (
            eocd.total_entries as u64,
            eocd.cdr_offset as u64,
            eocd.cdr_length as u64,
        )
    };

    let cdr_end = cdr_offset.checked_add(cdr_length).ok_or_else(|| {
        ZipError::FormatViolation("central directory offset/length overflow".into())
    })?;
    if cdr_end >= end_pos {
        return Err(ZipError::FormatViolation(
            "central directory offset + length leaves no room for the EOCD".into(),
        ));
    }

    stream.seek(SeekFrom::Start(cdr_offset))?;
    let mut entries = Vec::with_capacity(total_entries.min(1 << 20) as usize);

    for _ in 0..total_entries {
        let cdr = CdrEntry::read(&mut stream)?
            .ok_or_else(|| ZipError::FormatViolation("expected CDR entry, found none".into()))?;
        let pos = stream.stream_position()?;
        if pos > cdr_end {
            return Err(ZipError::FormatViolation("read past CDR".into()));
        }

        if cdr.disk_start != 0 {
            return Err(ZipError::MultiDiskUnsupported);
        }

        let cdr_extras = extra::parse_extras(&cdr.extras)?;
        let (uncompressed_size, compressed_size, local_header_offset) = promote_sizes(
            &cdr_extras,
            cdr.uncompressed_size,
            cdr.compressed_size,
            cdr.local_header_offset,
        )?;

        entries.push(Entry {
            path: cdr.name,
            method: cdr.method,
            dos_time: DosTime {
                date: cdr.dos_date,
                time: cdr.dos_time,
            },
            crc32: cdr.crc32,
            uncompressed_size,
            compressed_size,
            local_header_offset,
            comment: cdr.comment,
            external_attr: cdr.external_attr,
            internal_attr: cdr.internal_attr,
            version_made_by: cdr.version_made_by,
            version_needed: cdr.version_needed,
            cdr_extras,
            local_extras: std::cell::RefCell::new(None),
        });
    }

    let mut index = HashMap::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        index.entry(entry.path.clone()).or_insert(i);
    }

    Ok(Archive {
        stream,
        entries,
        index,
        comment: eocd.comment,
    })
}

fn promote_sizes(
    extras: &[ExtraRecord],
    uncompressed_size_32: u32,
    compressed_size_32: u32,
    local_header_offset_32: u32,
) -> ZipResult<(u64, u64, u64)> {
    let need_u = uncompressed_size_32 == SENTINEL_32;
    let need_c = compressed_size_32 == SENTINEL_32;
    let need_o = local_header_offset_32 == SENTINEL_32;

    if !(need_u || need_c || need_o) {
        return Ok((
            uncompressed_size_32 as u64,
            compressed_size_32 as u64,
            local_header_offset_32 as u64,
        ));
    }

    let zip64_extra = extras
        .iter()
        .find(|e| e.code == extra::ZIP64_EXTRA_ID)
        .ok_or_else(|| {
            ZipError::FormatViolation("sentinelized field but no ZIP64 extra present".into())
        })?;

    let parsed = Zip64Extra::decode(&zip64_extra.payload, need_u, need_c, need_o, false)
        .map_err(|_| ZipError::FormatViolation("malformed ZIP64 extra field".into()))?;

    let uncompressed_size = if need_u {
        parsed.uncompressed_size.ok_or_else(|| {
            ZipError::FormatViolation("ZIP64 extra missing uncompressed size".into())
        })?
    } else {
        uncompressed_size_32 as u64
    };
    let compressed_size = if need_c {
        parsed.compressed_size.ok_or_else(|| {
            ZipError::FormatViolation("ZIP64 extra missing compressed size".into())
        })?
    } else {
        compressed_size_32 as u64
    };
    let local_header_offset = if need_o {
        parsed.local_header_offset.ok_or_else(|| {
            ZipError::FormatViolation("ZIP64 extra missing local header offset".into())
        })?
    } else {
        local_header_offset_32 as u64
    };

    Ok((uncompressed_size, compressed_size, local_header_offset))
}

/// Tail-scan for the EOCD signature, honoring the comment-length check so a
/// comment that happens to contain EOCD-magic bytes cannot shadow the real
/// record.
fn find_eocd<S: Read + Seek>(stream: &mut S, end_pos: u64) -> ZipResult<(u64, ParsedEocd)> {
    let tail_start = end_pos.saturating_sub(MAX_EOCD_TAIL.min(end_pos));
    stream.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0u8; (end_pos - tail_start) as usize];
    stream.read_exact(&mut tail)?;

    let sig = EOCD_SIG.to_le_bytes();
    // Scan backward so the match closest to EOF wins when the comment
    // contains bytes that happen to look like the EOCD signature.
    for i in (0..=tail.len().saturating_sub(22)).rev() {
        if tail[i..i + 4] != sig {
            continue;
        }
        let candidate = tail_start + i as u64;
        let comment_len = u16::from_le_bytes([tail[i + 20], tail[i + 21]]) as u64;
        if candidate + 22 + comment_len == end_pos {
            let parsed = parse_eocd(&tail[i..])?;
            return Ok((candidate, parsed));
        }
    }

    Err(ZipError::EocdNotFound)
}

struct ParsedEocd {
    this_disk: u16,
    cdr_disk: u16,
    disk_entries: u16,
    total_entries: u16,
    cdr_length: u32,
    cdr_offset: u32,
    comment: Vec<u8>,
}

fn parse_eocd(buf: &[u8]) -> ZipResult<ParsedEocd> {
    let mut cursor = std::io::Cursor::new(buf);
    let sig = crate::primitives::read_u32(&mut cursor)?;
    if sig != EOCD_SIG {
        return Err(ZipError::BadMagic {
            expected: EOCD_SIG,
            found: sig,
            offset: 0,
        });
    }
    let this_disk = crate::primitives::read_u16(&mut cursor)?;
    let cdr_disk = crate::primitives::read_u16(&mut cursor)?;
    let disk_entries = crate::primitives::read_u16(&mut cursor)?;
    let total_entries = crate::primitives::read_u16(&mut cursor)?;
    let cdr_length = crate::primitives::read_u32(&mut cursor)?;
    let cdr_offset = crate::primitives::read_u32(&mut cursor)?;
    let comment_len = crate::primitives::read_u16(&mut cursor)? as usize;
    let mut comment = vec![0u8; comment_len];
    cursor
        .read_exact(&mut comment)
        .map_err(|_| ZipError::Truncated("EOCD comment"))?;
    Ok(ParsedEocd {
        this_disk,
        cdr_disk,
        disk_entries,
        total_entries,
        cdr_length,
        cdr_offset,
        comment,
    })
}

struct ResolvedZip64 {
    total_entries: u64,
    cdr_offset: u64,
    cdr_length: u64,
}

/// Scan backward from the EOCD position for the ZIP64 EOCD locator, then
/// follow it to the ZIP64 EOCD record.
fn chase_zip64<S: Read + Seek>(stream: &mut S, eocd_pos: u64) -> ZipResult<ResolvedZip64> {
    // The locator immediately precedes the EOCD in every archive this
    // writer produces, but a third-party producer may pad between them, so
    // scan backward within a bounded window rather than assuming adjacency.
    let window_start = eocd_pos.saturating_sub(4096);
    stream.seek(SeekFrom::Start(window_start))?;
    let mut buf = vec![0u8; (eocd_pos - window_start) as usize];
    stream.read_exact(&mut buf)?;

    let sig = ZIP64_EOCD_LOCATOR_SIG.to_le_bytes();
    let locator_pos = (0..=buf.len().saturating_sub(20))
        .rev()
        .find(|&i| buf[i..i + 4] == sig)
        .ok_or(ZipError::Zip64LocatorNotFound)?;

    let zip64_eocd_offset =
        u64::from_le_bytes(buf[locator_pos + 8..locator_pos + 16].try_into().unwrap());

    stream.seek(SeekFrom::Start(zip64_eocd_offset))?;
    let record = Zip64Eocd::read(stream, zip64_eocd_offset)?;

    if record.this_disk != 0 || record.cdr_disk != 0 || record.disk_entries != record.total_entries
    {
        return Err(ZipError::MultiDiskUnsupported);
    }

    Ok(ResolvedZip64 {
        total_entries: record.total_entries,
        cdr_offset: record.cdr_offset,
        cdr_length: record.cdr_length,
    })
}

impl<S: Read + Seek> Archive<S> {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, path: &[u8]) -> Option<&Entry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Extract `entry`'s decompressed body into `sink`, returning the
    /// number of uncompressed bytes written.
    pub fn extract(&mut self, entry: &Entry, sink: &mut impl Write) -> ZipResult<u64> {
        let method = entry
            .method()
            .ok_or(ZipError::UnsupportedMethod(entry.method))?;

        self.stream
            .seek(SeekFrom::Start(entry.local_header_offset))?;
        let mut sig_buf = [0u8; 4];
        self.stream
            .read_exact(&mut sig_buf)
            .map_err(|_| ZipError::Truncated("local header signature"))?;
        let sig = u32::from_le_bytes(sig_buf);
        if sig != LOCAL_FILE_HEADER_SIG {
            return Err(ZipError::BadMagic {
                expected: LOCAL_FILE_HEADER_SIG,
                found: sig,
                offset: entry.local_header_offset,
            });
        }
        self.stream.seek(SeekFrom::Current(22))?;
        let name_len = crate::primitives::read_u16(&mut self.stream)? as i64;
        let extras_len = crate::primitives::read_u16(&mut self.stream)? as i64;
        self.stream.seek(SeekFrom::Current(name_len + extras_len))?;

        compress::decompress_stream(
            method,
            &mut self.stream,
            sink,
            entry.compressed_size,
            entry.uncompressed_size,
            entry.crc32,
        )
    }

    /// Fetch and memoize `entry`'s local-header extra records.
    pub fn local_extras(&mut self, entry: &Entry) -> ZipResult<Vec<ExtraRecord>> {
        if let Some(cached) = entry.local_extras.borrow().as_ref() {
            return Ok(cached.clone());
        }

        self.stream
            .seek(SeekFrom::Start(entry.local_header_offset + 26))?;
        let name_len = crate::primitives::read_u16(&mut self.stream)? as i64;
        let extras_len = crate::primitives::read_u16(&mut self.stream)? as usize;
        self.stream.seek(SeekFrom::Current(name_len))?;
        let mut buf = vec![0u8; extras_len];
        self.stream
            .read_exact(&mut buf)
            .map_err(|_| ZipError::Truncated("local extras"))?;
        let parsed = extra::parse_extras(&buf)?;
        *entry.local_extras.borrow_mut() = Some(parsed.clone());
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{open_writer, AddOptions, WriterOptions};
    use std::io::Cursor;

    fn build_archive() -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = open_writer(&mut buf, WriterOptions::default()).unwrap();
        writer
            .add_bytes(
                b"foo.txt",
                b"foo",
                AddOptions {
                    method: Some(Method::Deflate),
                    ..Default::default()
                },
            )
            .unwrap();
        writer
            .add_bytes(
                b"bar.txt",
                b"bar",
                AddOptions {
                    method: Some(Method::Store),
                    ..Default::default()
                },
            )
            .unwrap();
        writer
            .add_dir(b"example-dir/", AddOptions::default())
            .unwrap();
        writer.close().unwrap();
        buf
    }

    #[test]
    fn mixed_archive_with_directory() {
        let buf = build_archive();
        let mut archive = open_reader(Cursor::new(buf)).unwrap();
        assert_eq!(archive.entries().len(), 3);

        assert!(!archive.entries()[0].is_directory());
        assert!(!archive.entries()[1].is_directory());
        assert!(archive.entries()[2].is_directory());

        let foo = archive.get(b"foo.txt").unwrap().clone();
        let mut out = Vec::new();
        archive.extract(&foo, &mut out).unwrap();
        assert_eq!(out, b"foo");

        let bar = archive.get(b"bar.txt").unwrap().clone();
        let mut out = Vec::new();
        archive.extract(&bar, &mut out).unwrap();
        assert_eq!(out, b"bar");
    }

    #[test]
    fn comment_containing_eocd_magic_does_not_confuse_tail_scan() {
        let mut comment = vec![0x50, 0x4B, 0x05, 0x06];
        comment.extend(std::iter::repeat(b'x').take(50));

        let mut buf = Vec::new();
        let mut writer = open_writer(
            &mut buf,
            WriterOptions {
                comment: comment.clone(),
                ..Default::default()
            },
        )
        .unwrap();
        writer.close().unwrap();

        let archive = open_reader(Cursor::new(buf)).unwrap();
        assert_eq!(archive.entries().len(), 0);
        assert_eq!(archive.comment(), comment.as_slice());
    }

    #[test]
    fn empty_archive_has_no_entries() {
        let mut buf = Vec::new();
        let writer = open_writer(&mut buf, WriterOptions::default()).unwrap();
        drop(writer); // dropped without close: incomplete archive
        let err = open_reader(Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ZipError::EocdNotFound));
    }

    #[test]
    fn rejects_zip64_eocd_spanning_multiple_disks() {
        use crate::record::{Zip64Eocd, Zip64EocdLocator};

        let mut buf = Vec::new();
        {
            let mut writer = open_writer(&mut buf, WriterOptions::default()).unwrap();
            writer
                .add_bytes(b"a.txt", b"hi", AddOptions::default())
                .unwrap();
            writer.close().unwrap();
        }

        // Splice in a ZIP64 EOCD + locator claiming a second disk, then a
        // trailing classic EOCD with sentinel counts so the reader chases
        // the locator. `disk_entries != total_entries` must be rejected the
        // same way a non-ZIP64 EOCD with that mismatch would be.
        let zip64_eocd_offset = buf.len() as u64;
        let bogus = Zip64Eocd {
            version_made_by: 0,
            version_needed: crate::primitives::Version::ZIP64.to_u16(),
            this_disk: 0,
            cdr_disk: 0,
            disk_entries: 1,
            total_entries: 2,
            cdr_length: 0,
            cdr_offset: 0,
        };
        bogus.write(&mut buf).unwrap();
        let locator = Zip64EocdLocator {
            zip64_eocd_offset,
        };
        locator.write(&mut buf).unwrap();

        buf.extend_from_slice(&EOCD_SIG.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // this disk
        buf.extend_from_slice(&0u16.to_le_bytes()); // cdr disk
        buf.extend_from_slice(&SENTINEL_16.to_le_bytes());
        buf.extend_from_slice(&SENTINEL_16.to_le_bytes());
        buf.extend_from_slice(&SENTINEL_32.to_le_bytes());
        buf.extend_from_slice(&SENTINEL_32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // comment length

        let err = open_reader(Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ZipError::MultiDiskUnsupported));
    }
}
