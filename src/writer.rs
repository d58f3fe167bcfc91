//! Writer state machine: accepts members, streams compressed bodies,
//! and finalizes the archive with the central directory, optional ZIP64
//! trailer, and EOCD.

use std::io::{Read, Seek, Write};

use chrono::{DateTime, Utc};

use crate::compress::{self, Method};
use crate::error::{ZipError, ZipResult};
use crate::primitives::{DosTime, Version};
use crate::record::{
    self, flags, CdrEntry, DataDescriptor, Eocd, LocalFileHeader, Zip64Eocd, Zip64EocdLocator,
    SENTINEL_16, SENTINEL_32,
};

const MAX_PATH_LEN: usize = 65534;
const MAX_COMMENT_LEN: usize = 65535;

/// Kind of member being written: a regular file body, or an empty
/// directory marker. Tagged variant in place of the base/subtype split the
/// teacher's helper types used.
enum MemberBody<'a> {
    File(&'a mut dyn Read),
    Directory,
}

/// Options accepted by [`Writer::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub method: Option<Method>,
    pub modified_time: Option<DateTime<Utc>>,
    pub comment: Vec<u8>,
    pub zip64: bool,
}

/// Options accepted by [`open_writer`].
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub comment: Vec<u8>,
    pub made_by_version: Option<Version>,
    pub starting_offset: u64,
}

/// A member recorded for central-directory emission once its body has been
/// streamed and its data descriptor written.
struct RecordedMember {
    name: Vec<u8>,
    method: Method,
    dos_time: DosTime,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    comment: Vec<u8>,
    is_directory: bool,
    zip64: bool,
}

/// Streaming ZIP writer over any `Write` backing stream. The writer never
/// seeks backward to patch the local header — sizes and CRC are carried in
/// the data-descriptor footer instead — which is what makes it safe to
/// point at an unseekable pipe as well as a file.
pub struct Writer<W: Write> {
    output: W,
    entries: Vec<RecordedMember>,
    current_offset: u64,
    comment: Vec<u8>,
    made_by_version: Version,
    starting_offset: u64,
    closed: bool,
}

/// Open a writer session over `output`. `output` is owned exclusively by
/// the writer until [`Writer::close`].
pub fn open_writer<W: Write>(output: W, options: WriterOptions) -> ZipResult<Writer<W>> {
    if options.comment.len() > MAX_COMMENT_LEN {
        return Err(ZipError::InvalidInput(
            "archive comment exceeds 65535 bytes".into(),
        ));
    }
    Ok(Writer {
        output,
        entries: Vec::new(),
        current_offset: 0,
        comment: options.comment,
        made_by_version: options.made_by_version.unwrap_or(Version::new(0, 0, 0)),
        starting_offset: options.starting_offset,
        closed: false,
    })
}

impl<W: Write> Writer<W> {
    fn check_open(&self) -> ZipResult<()> {
        if self.closed {
            Err(ZipError::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    fn validate_path(path: &[u8]) -> ZipResult<()> {
        if path.is_empty() {
            return Err(ZipError::InvalidInput("path must not be empty".into()));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(ZipError::InvalidInput(format!(
                "path exceeds {MAX_PATH_LEN} bytes"
            )));
        }
        if path.starts_with(b"/") {
            return Err(ZipError::InvalidInput(
                "path must not start with '/'".into(),
            ));
        }
        Ok(())
    }

    /// Total bytes written to the backing stream so far.
    pub fn bytes_written(&self) -> u64 {
        self.current_offset
    }

    /// Add a file member, streaming `input` through the compression
    /// pipeline. Returns the number of bytes written for this member
    /// (header + body + footer).
    pub fn add<R: Read>(
        &mut self,
        path: &[u8],
        input: &mut R,
        options: AddOptions,
    ) -> ZipResult<u64> {
        self.add_member(path, MemberBody::File(input), options)
    }

    /// Add a file member from an in-memory payload. `method` defaults to
    /// DEFLATE.
    pub fn add_bytes(
        &mut self,
        path: &[u8],
        payload: &[u8],
        options: AddOptions,
    ) -> ZipResult<u64> {
        let mut cursor = std::io::Cursor::new(payload);
        self.add_member(path, MemberBody::File(&mut cursor), options)
    }

    /// Add a directory entry (empty body, method forced to STORE).
    pub fn add_dir(&mut self, path: &[u8], options: AddOptions) -> ZipResult<u64> {
        self.add_member(path, MemberBody::Directory, options)
    }

    fn add_member(
        &mut self,
        path: &[u8],
        body: MemberBody<'_>,
        options: AddOptions,
    ) -> ZipResult<u64> {
        self.check_open()?;
        Self::validate_path(path)?;
        if options.comment.len() > MAX_COMMENT_LEN {
            return Err(ZipError::InvalidInput(
                "member comment exceeds 65535 bytes".into(),
            ));
        }

        let is_directory = matches!(body, MemberBody::Directory);
        let method = if is_directory {
            Method::Store
        } else {
            options.method.unwrap_or(Method::Deflate)
        };

        let local_header_offset = self.current_offset;
        let start_written = self.current_offset;

        let caller_zip64 = options.zip64;
        let zip64 =
            caller_zip64 || self.starting_offset + local_header_offset >= SENTINEL_32 as u64;

        log::trace!(
            "writer: add member path_len={} method={:?} zip64_hint={}",
            path.len(),
            method,
            zip64
        );

        let dos_time = DosTime::encode(&options.modified_time.unwrap_or_else(Utc::now));

        let member_flags = flags::FOOTER | flags::EFS;

        let header_extras = if zip64 {
            let extra = crate::extra::Zip64Extra {
                uncompressed_size: Some(0),
                compressed_size: Some(0),
                local_header_offset: None,
                disk_start: None,
            };
            record::extras_bytes(&[crate::extra::zip64_extra_record(extra)])
        } else {
            Vec::new()
        };

        let header = LocalFileHeader {
            version_needed: if zip64 {
                Version::ZIP64.to_u16()
            } else {
                Version::CLASSIC.to_u16()
            },
            flags: member_flags,
            method: method.to_u16(),
            dos_time: dos_time.time,
            dos_date: dos_time.date,
            crc32: 0,
            compressed_size: if zip64 { SENTINEL_32 } else { 0 },
            uncompressed_size: if zip64 { SENTINEL_32 } else { 0 },
            name: path.to_vec(),
            extras: header_extras,
        };
        header.write(&mut self.output)?;
        self.current_offset += 30 + header.name.len() as u64 + header.extras.len() as u64;

        let (crc32, uncompressed_size, compressed_size) = match body {
            MemberBody::Directory => (0u32, 0u64, 0u64),
            MemberBody::File(reader) => {
                let out = compress::compress_stream(method, reader, &mut self.output)?;
                (out.crc32, out.uncompressed_size, out.compressed_size)
            }
        };
        self.current_offset += compressed_size;

        let final_zip64 = zip64
            || uncompressed_size >= SENTINEL_32 as u64
            || compressed_size >= SENTINEL_32 as u64;

        let descriptor = DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
            zip64: final_zip64,
        };
        descriptor.write(&mut self.output)?;
        self.current_offset += if final_zip64 { 24 } else { 16 };

        self.entries.push(RecordedMember {
            name: path.to_vec(),
            method,
            dos_time,
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            comment: options.comment,
            is_directory,
            zip64: final_zip64,
        });

        Ok(self.current_offset - start_written)
    }

    /// Finalize the archive: write the central directory, optional ZIP64
    /// trailer, and EOCD. Idempotent in the sense that it is safe to call
    /// exactly once; calling it again after a prior `close` fails with
    /// `already closed`, matching every other post-close operation.
    pub fn close(&mut self) -> ZipResult<u64> {
        self.check_open()?;
        self.closed = true;

        let cdr_start = self.current_offset;
        for entry in std::mem::take(&mut self.entries) {
            self.write_cdr_entry(&entry)?;
            self.entries.push(entry);
        }
        let cdr_len = self.current_offset - cdr_start;

        let need_zip64 = cdr_start >= SENTINEL_32 as u64
            || cdr_len >= SENTINEL_32 as u64
            || self.entries.len() >= SENTINEL_16 as usize;

        if need_zip64 {
            log::debug!(
                "writer: emitting ZIP64 EOCD (entries={}, cdr_len={}, cdr_start={})",
                self.entries.len(),
                cdr_len,
                cdr_start
            );
            let zip64_eocd = Zip64Eocd {
                version_made_by: self.made_by_version.to_u16(),
                version_needed: Version::ZIP64.to_u16(),
                this_disk: 0,
                cdr_disk: 0,
                disk_entries: self.entries.len() as u64,
                total_entries: self.entries.len() as u64,
                cdr_length: cdr_len,
                cdr_offset: cdr_start,
            };
            zip64_eocd.write(&mut self.output)?;
            self.current_offset += 12 + 44;

            let locator = Zip64EocdLocator {
                zip64_eocd_offset: cdr_start + cdr_len,
            };
            locator.write(&mut self.output)?;
            self.current_offset += 20;
        }

        let entry_count = self.entries.len();
        let eocd = Eocd {
            disk_entries: if entry_count >= SENTINEL_16 as usize {
                SENTINEL_16
            } else {
                entry_count as u16
            },
            total_entries: if entry_count >= SENTINEL_16 as usize {
                SENTINEL_16
            } else {
                entry_count as u16
            },
            cdr_length: if cdr_len >= SENTINEL_32 as u64 {
                SENTINEL_32
            } else {
                cdr_len as u32
            },
            cdr_offset: if cdr_start >= SENTINEL_32 as u64 {
                SENTINEL_32
            } else {
                cdr_start as u32
            },
            comment: self.comment.clone(),
        };
        eocd.write(&mut self.output)?;
        self.current_offset += 22 + eocd.comment.len() as u64;

        self.output.flush()?;
        Ok(self.current_offset)
    }

    fn write_cdr_entry(&mut self, entry: &RecordedMember) -> ZipResult<()> {
        let (u_size, c_size, offset, extra_records) = record::sentinelize(
            entry.uncompressed_size,
            entry.compressed_size,
            entry.local_header_offset,
            entry.zip64,
        );
        let extras = record::extras_bytes(&extra_records);

        let external_attr = if entry.is_directory { 0x10 } else { 0 };
        let version_needed = if extra_records.is_empty() {
            Version::CLASSIC.to_u16()
        } else {
            Version::ZIP64.to_u16()
        };

        let cdr = CdrEntry {
            version_made_by: self.made_by_version.to_u16(),
            version_needed,
            flags: flags::FOOTER | flags::EFS,
            method: entry.method.to_u16(),
            dos_time: entry.dos_time.time,
            dos_date: entry.dos_time.date,
            crc32: entry.crc32,
            compressed_size: c_size,
            uncompressed_size: u_size,
            disk_start: 0,
            internal_attr: 0,
            external_attr,
            local_header_offset: offset,
            name: entry.name.clone(),
            extras,
            comment: entry.comment.clone(),
        };
        cdr.write(&mut self.output)?;
        self.current_offset +=
            46 + cdr.name.len() as u64 + cdr.extras.len() as u64 + cdr.comment.len() as u64;
        Ok(())
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Available when the backing stream happens to be seekable; not
    /// required by the streaming contract but convenient for callers who
    /// already have one.
    pub fn stream_position(&mut self) -> std::io::Result<u64> {
        self.output.stream_position()
    }
}
