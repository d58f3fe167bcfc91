//! TLV extra-field codec and the typed ZIP64 extra record (code 0x0001).

use std::io::{self, Read, Write};

use crate::primitives::{read_u16, read_u32, read_u64, write_u16, write_u32, write_u64};

pub(crate) const ZIP64_EXTRA_ID: u16 = 0x0001;

/// A single `code, size, payload` TLV, opaque unless it is the ZIP64 extra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraRecord {
    pub code: u16,
    pub payload: Vec<u8>,
}

/// Which fixed-record fields were sentinelized and therefore carried here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Extra {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub local_header_offset: Option<u64>,
    pub disk_start: Option<u32>,
}

impl Zip64Extra {
    pub(crate) fn encode(self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(v) = self.uncompressed_size {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if let Some(v) = self.compressed_size {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if let Some(v) = self.local_header_offset {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if let Some(v) = self.disk_start {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Parse payload against the three/four fixed-record fields that were
    /// sentinelized, in the fixed order APPNOTE mandates: uncompressed size,
    /// compressed size, local header offset, disk start.
    pub(crate) fn decode(
        payload: &[u8],
        need_uncompressed: bool,
        need_compressed: bool,
        need_offset: bool,
        need_disk: bool,
    ) -> io::Result<Self> {
        let mut cursor = io::Cursor::new(payload);
        let mut out = Zip64Extra::default();
        if need_uncompressed && (cursor.position() as usize) + 8 <= payload.len() {
            out.uncompressed_size = Some(read_u64(&mut cursor)?);
        }
        if need_compressed && (cursor.position() as usize) + 8 <= payload.len() {
            out.compressed_size = Some(read_u64(&mut cursor)?);
        }
        if need_offset && (cursor.position() as usize) + 8 <= payload.len() {
            out.local_header_offset = Some(read_u64(&mut cursor)?);
        }
        if need_disk && (cursor.position() as usize) + 4 <= payload.len() {
            out.disk_start = Some(read_u32(&mut cursor)?);
        }
        if cursor.position() as usize != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "ZIP64 extra payload length does not match the fields it carries",
            ));
        }
        Ok(out)
    }
}

/// Serialize a sequence of extra records back-to-back, filling the extras
/// region exactly (no padding, no trailing bytes).
pub(crate) fn write_extras<W: Write>(w: &mut W, records: &[ExtraRecord]) -> io::Result<()> {
    for rec in records {
        write_u16(w, rec.code)?;
        write_u16(w, rec.payload.len() as u16)?;
        w.write_all(&rec.payload)?;
    }
    Ok(())
}

/// Parse a raw extras block into its TLV records. Unrecognized codes are
/// preserved opaquely; this never invents records absent from the bytes.
pub fn parse_extras(buf: &[u8]) -> io::Result<Vec<ExtraRecord>> {
    let mut records = Vec::new();
    let mut cursor = io::Cursor::new(buf);
    loop {
        let remaining = buf.len() as u64 - cursor.position();
        if remaining == 0 {
            break;
        }
        if remaining < 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated extra-field TLV header",
            ));
        }
        let code = read_u16(&mut cursor)?;
        let size = read_u16(&mut cursor)? as usize;
        let mut payload = vec![0u8; size];
        cursor.read_exact(&mut payload)?;
        records.push(ExtraRecord { code, payload });
    }
    Ok(records)
}

/// Build the single ZIP64 extra record for those fields that were
/// sentinelized in the fixed record. Writer emits only fields actually
/// overflowed — never invents placeholders for fields that fit.
pub(crate) fn zip64_extra_record(extra: Zip64Extra) -> ExtraRecord {
    ExtraRecord {
        code: ZIP64_EXTRA_ID,
        payload: extra.encode(),
    }
}
