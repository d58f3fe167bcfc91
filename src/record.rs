//! Binary layout of the local file header, data descriptor, central
//! directory entry, EOCD, and ZIP64 EOCD record/locator. All fields are
//! little-endian; this module has no knowledge of compression or streaming.

use std::io::{self, Read, Write};

use crate::error::{ZipError, ZipResult};
use crate::extra::{write_extras, ExtraRecord};
use crate::primitives::{read_u16, read_u32, read_u64, write_u16, write_u32, write_u64};

pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
pub const CDR_ENTRY_SIG: u32 = 0x0201_4b50;
pub const EOCD_SIG: u32 = 0x0605_4b50;
pub const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
pub const ZIP64_EOCD_LOCATOR_SIG: u32 = 0x0706_4b50;

pub const SENTINEL_16: u16 = 0xFFFF;
pub const SENTINEL_32: u32 = 0xFFFF_FFFF;

/// General-purpose bit flags used by this codec.
pub mod flags {
    /// Bit 3: CRC-32 and sizes are zero in the local header and carried in
    /// the data descriptor footer instead.
    pub const FOOTER: u16 = 1 << 3;
    /// Bit 11: filenames and comment are UTF-8 (EFS — "language encoding
    /// flag").
    pub const EFS: u16 = 1 << 11;
}

/// Local file header, fixed 30-byte portion plus name and extras.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: Vec<u8>,
    pub extras: Vec<u8>,
}

impl LocalFileHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, LOCAL_FILE_HEADER_SIG)?;
        write_u16(w, self.version_needed)?;
        write_u16(w, self.flags)?;
        write_u16(w, self.method)?;
        write_u16(w, self.dos_time)?;
        write_u16(w, self.dos_date)?;
        write_u32(w, self.crc32)?;
        write_u32(w, self.compressed_size)?;
        write_u32(w, self.uncompressed_size)?;
        write_u16(w, self.name.len() as u16)?;
        write_u16(w, self.extras.len() as u16)?;
        w.write_all(&self.name)?;
        w.write_all(&self.extras)?;
        Ok(())
    }

    /// Read and verify the fixed 30-byte header at the current position,
    /// returning the header with `name`/`extras` populated from the bytes
    /// that follow.
    pub fn read<R: Read>(r: &mut R, offset: u64) -> ZipResult<Self> {
        let sig = read_u32(r).map_err(ZipError::Io)?;
        if sig != LOCAL_FILE_HEADER_SIG {
            return Err(ZipError::BadMagic {
                expected: LOCAL_FILE_HEADER_SIG,
                found: sig,
                offset,
            });
        }
        let version_needed = read_u16(r)?;
        let flags = read_u16(r)?;
        let method = read_u16(r)?;
        let dos_time = read_u16(r)?;
        let dos_date = read_u16(r)?;
        let crc32 = read_u32(r)?;
        let compressed_size = read_u32(r)?;
        let uncompressed_size = read_u32(r)?;
        let name_len = read_u16(r)? as usize;
        let extras_len = read_u16(r)? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)
            .map_err(|_| ZipError::Truncated("local header name"))?;
        let mut extras = vec![0u8; extras_len];
        r.read_exact(&mut extras)
            .map_err(|_| ZipError::Truncated("local header extras"))?;
        Ok(Self {
            version_needed,
            flags,
            method,
            dos_time,
            dos_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extras,
        })
    }
}

/// Data descriptor footer: 16 bytes (non-ZIP64) or 24 bytes (ZIP64).
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub zip64: bool,
}

impl DataDescriptor {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, DATA_DESCRIPTOR_SIG)?;
        write_u32(w, self.crc32)?;
        if self.zip64 {
            write_u64(w, self.compressed_size)?;
            write_u64(w, self.uncompressed_size)?;
        } else {
            write_u32(w, self.compressed_size as u32)?;
            write_u32(w, self.uncompressed_size as u32)?;
        }
        Ok(())
    }
}

/// A single central-directory entry, fixed 46-byte portion plus name,
/// extras, and comment.
#[derive(Debug, Clone)]
pub struct CdrEntry {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_start: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub local_header_offset: u32,
    pub name: Vec<u8>,
    pub extras: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CdrEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, CDR_ENTRY_SIG)?;
        write_u16(w, self.version_made_by)?;
        write_u16(w, self.version_needed)?;
        write_u16(w, self.flags)?;
        write_u16(w, self.method)?;
        write_u16(w, self.dos_time)?;
        write_u16(w, self.dos_date)?;
        write_u32(w, self.crc32)?;
        write_u32(w, self.compressed_size)?;
        write_u32(w, self.uncompressed_size)?;
        write_u16(w, self.name.len() as u16)?;
        write_u16(w, self.extras.len() as u16)?;
        write_u16(w, self.comment.len() as u16)?;
        write_u16(w, self.disk_start)?;
        write_u16(w, self.internal_attr)?;
        write_u32(w, self.external_attr)?;
        write_u32(w, self.local_header_offset)?;
        w.write_all(&self.name)?;
        w.write_all(&self.extras)?;
        w.write_all(&self.comment)?;
        Ok(())
    }

    /// Read one CDR entry at the current position. Returns `None` if the
    /// signature does not match (caller decides whether that is EOF or an
    /// error).
    pub fn read<R: Read>(r: &mut R) -> ZipResult<Option<Self>> {
        let mut sig_buf = [0u8; 4];
        r.read_exact(&mut sig_buf)
            .map_err(|_| ZipError::Truncated("CDR entry signature"))?;
        let sig = u32::from_le_bytes(sig_buf);
        if sig != CDR_ENTRY_SIG {
            return Ok(None);
        }
        let version_made_by = read_u16(r)?;
        let version_needed = read_u16(r)?;
        let flags = read_u16(r)?;
        let method = read_u16(r)?;
        let dos_time = read_u16(r)?;
        let dos_date = read_u16(r)?;
        let crc32 = read_u32(r)?;
        let compressed_size = read_u32(r)?;
        let uncompressed_size = read_u32(r)?;
        let name_len = read_u16(r)? as usize;
        let extras_len = read_u16(r)? as usize;
        let comment_len = read_u16(r)? as usize;
        let disk_start = read_u16(r)?;
        let internal_attr = read_u16(r)?;
        let external_attr = read_u32(r)?;
        let local_header_offset = read_u32(r)?;

        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)
            .map_err(|_| ZipError::Truncated("CDR entry name"))?;
        let mut extras = vec![0u8; extras_len];
        r.read_exact(&mut extras)
            .map_err(|_| ZipError::Truncated("CDR entry extras"))?;
        let mut comment = vec![0u8; comment_len];
        r.read_exact(&mut comment)
            .map_err(|_| ZipError::Truncated("CDR entry comment"))?;

        Ok(Some(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            dos_time,
            dos_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_start,
            internal_attr,
            external_attr,
            local_header_offset,
            name,
            extras,
            comment,
        }))
    }
}

/// End of central directory record, fixed 22-byte portion plus comment.
pub struct Eocd {
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cdr_length: u32,
    pub cdr_offset: u32,
    pub comment: Vec<u8>,
}

impl Eocd {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, EOCD_SIG)?;
        write_u16(w, 0)?; // this disk
        write_u16(w, 0)?; // disk with CDR
        write_u16(w, self.disk_entries)?;
        write_u16(w, self.total_entries)?;
        write_u32(w, self.cdr_length)?;
        write_u32(w, self.cdr_offset)?;
        write_u16(w, self.comment.len() as u16)?;
        w.write_all(&self.comment)?;
        Ok(())
    }
}

/// ZIP64 end of central directory record (fixed portion; this codec never
/// emits extensible data).
pub struct Zip64Eocd {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub this_disk: u32,
    pub cdr_disk: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cdr_length: u64,
    pub cdr_offset: u64,
}

impl Zip64Eocd {
    /// Size of the record past the 12-byte (signature + size) preamble.
    const REMAINDER_SIZE: u64 = 44;

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, ZIP64_EOCD_SIG)?;
        write_u64(w, Self::REMAINDER_SIZE)?;
        write_u16(w, self.version_made_by)?;
        write_u16(w, self.version_needed)?;
        write_u32(w, self.this_disk)?;
        write_u32(w, self.cdr_disk)?;
        write_u64(w, self.disk_entries)?;
        write_u64(w, self.total_entries)?;
        write_u64(w, self.cdr_length)?;
        write_u64(w, self.cdr_offset)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R, offset: u64) -> ZipResult<Self> {
        let sig = read_u32(r).map_err(ZipError::Io)?;
        if sig != ZIP64_EOCD_SIG {
            return Err(ZipError::BadMagic {
                expected: ZIP64_EOCD_SIG,
                found: sig,
                offset,
            });
        }
        let remainder = read_u64(r)?;
        let version_made_by = read_u16(r)?;
        let version_needed = read_u16(r)?;
        let this_disk = read_u32(r)?;
        let cdr_disk = read_u32(r)?;
        let disk_entries = read_u64(r)?;
        let total_entries = read_u64(r)?;
        let cdr_length = read_u64(r)?;
        let cdr_offset = read_u64(r)?;
        if remainder >= Self::REMAINDER_SIZE {
            let extra_len = remainder - Self::REMAINDER_SIZE;
            io::copy(&mut r.take(extra_len), &mut io::sink())
                .map_err(|_| ZipError::Truncated("ZIP64 EOCD extensible data"))?;
        }
        Ok(Self {
            version_made_by,
            version_needed,
            this_disk,
            cdr_disk,
            disk_entries,
            total_entries,
            cdr_length,
            cdr_offset,
        })
    }
}

/// ZIP64 EOCD locator, fixed 20 bytes.
pub struct Zip64EocdLocator {
    pub zip64_eocd_offset: u64,
}

impl Zip64EocdLocator {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u32(w, ZIP64_EOCD_LOCATOR_SIG)?;
        write_u32(w, 0)?; // disk with ZIP64 EOCD
        write_u64(w, self.zip64_eocd_offset)?;
        write_u32(w, 1)?; // total disks
        Ok(())
    }
}

/// Build the (possibly empty) ZIP64 extra-field bytes and sentinel-adjusted
/// 32-bit fields for a CDR entry or local header, given the true 64-bit
/// values and whether the caller forced ZIP64 treatment of the *size*
/// fields. `local_header_offset` is only sentinelized when it independently
/// overflows — a caller forcing ZIP64 on a small member must not drag its
/// (small) offset into the extra, matching a forced member whose offset
/// still fits: the CDR extra then carries sizes only.
pub(crate) fn sentinelize(
    uncompressed_size: u64,
    compressed_size: u64,
    local_header_offset: u64,
    force_sizes: bool,
) -> (u32, u32, u32, Vec<ExtraRecord>) {
    let over_u = force_sizes || uncompressed_size >= SENTINEL_32 as u64;
    let over_c = force_sizes || compressed_size >= SENTINEL_32 as u64;
    let over_o = local_header_offset >= SENTINEL_32 as u64;

    if !(over_u || over_c || over_o) {
        return (
            uncompressed_size as u32,
            compressed_size as u32,
            local_header_offset as u32,
            Vec::new(),
        );
    }

    let extra = crate::extra::Zip64Extra {
        uncompressed_size: if over_u { Some(uncompressed_size) } else { None },
        compressed_size: if over_c { Some(compressed_size) } else { None },
        local_header_offset: if over_o {
            Some(local_header_offset)
        } else {
            None
        },
        disk_start: None,
    };
    let records = vec![crate::extra::zip64_extra_record(extra)];

    let u32_u = if over_u {
        SENTINEL_32
    } else {
        uncompressed_size as u32
    };
    let u32_c = if over_c {
        SENTINEL_32
    } else {
        compressed_size as u32
    };
    let u32_o = if over_o {
        SENTINEL_32
    } else {
        local_header_offset as u32
    };
    (u32_u, u32_c, u32_o, records)
}

/// Serialize `records` into a fresh buffer (convenience used by the writer
/// when the extras are the entire extras block, e.g. local headers).
pub(crate) fn extras_bytes(records: &[ExtraRecord]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_extras(&mut buf, records).expect("writing to Vec<u8> is infallible");
    buf
}
