//! Streaming STORE/DEFLATE pipeline: chunked I/O with running CRC-32 and
//! byte-count tracking. The DEFLATE algorithm itself is delegated to
//! `flate2`'s raw (no zlib wrapper) deflate/inflate streams; the CRC-32
//! primitive is delegated to `crc32fast`.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{ZipError, ZipResult};

/// Internal chunk size for every streaming copy in this module.
pub(crate) const CHUNK_SIZE: usize = 8 * 1024;

/// Compression method as carried in the local header / CDR entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Store,
    Deflate,
}

impl Method {
    pub(crate) fn to_u16(self) -> u16 {
        match self {
            Method::Store => 0,
            Method::Deflate => 8,
        }
    }

    pub(crate) fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Method::Store),
            8 => Some(Method::Deflate),
            _ => None,
        }
    }
}

/// CRC-32 of `a` concatenated with `b`, given `crc_a` (CRC of `a`), `crc_b`
/// (CRC of `b` computed independently) and `len_b` (length of `b` in bytes).
///
/// This is the textbook zlib `crc32_combine` construction: GF(2) polynomial
/// exponentiation of the CRC shift-register state by `len_b * 8` bits. It is
/// a pure integer transform over values `crc32fast` already produced, not a
/// checksum implementation of its own.
pub(crate) fn crc32_combine(crc_a: u32, crc_b: u32, len_b: u64) -> u32 {
    const POLY: u32 = 0xEDB88320;

    fn gf2_matrix_times(mat: &[u32; 32], mut vec: u32) -> u32 {
        let mut sum = 0u32;
        let mut i = 0;
        while vec != 0 {
            if vec & 1 != 0 {
                sum ^= mat[i];
            }
            vec >>= 1;
            i += 1;
        }
        sum
    }

    fn gf2_matrix_square(square: &mut [u32; 32], mat: &[u32; 32]) {
        for n in 0..32 {
            square[n] = gf2_matrix_times(mat, mat[n]);
        }
    }

    if len_b == 0 {
        return crc_a;
    }

    // `odd` is the operator that advances the CRC register by a single zero
    // bit; `even` by two. Each squaring doubles the number of zero bits the
    // operator advances by, so iterating the bits of `len_b` (LSB first)
    // composes the right power via repeated squaring.
    let mut odd = [0u32; 32];
    odd[0] = POLY;
    {
        let mut row = 1u32;
        for n in 1..32 {
            odd[n] = row;
            row <<= 1;
        }
    }

    let mut even = [0u32; 32];
    gf2_matrix_square(&mut even, &odd);
    gf2_matrix_square(&mut odd, &even);

    let mut crc1 = crc_a;
    let mut len = len_b;

    loop {
        gf2_matrix_square(&mut even, &odd);
        if len & 1 != 0 {
            crc1 = gf2_matrix_times(&even, crc1);
        }
        len >>= 1;
        if len == 0 {
            break;
        }
        gf2_matrix_square(&mut odd, &even);
        if len & 1 != 0 {
            crc1 = gf2_matrix_times(&odd, crc1);
        }
        len >>= 1;
        if len == 0 {
            break;
        }
    }

    crc1 ^ crc_b
}

/// Running CRC-32 accumulator that combines per-chunk CRCs rather than
/// feeding one `Hasher` the whole stream, matching the spec's required
/// "CRC-32 policy": per-chunk CRC combined into a running value, with the
/// empty running state handled as a direct assignment.
#[derive(Debug, Default)]
pub(crate) struct RunningCrc {
    state: Option<(u32, u64)>,
}

impl RunningCrc {
    pub(crate) fn new() -> Self {
        Self { state: None }
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        let chunk_crc = crc32fast::hash(chunk);
        self.state = Some(match self.state {
            None => (chunk_crc, chunk.len() as u64),
            Some((running, running_len)) => (
                crc32_combine(running, chunk_crc, chunk.len() as u64),
                running_len + chunk.len() as u64,
            ),
        });
    }

    pub(crate) fn finalize(&self) -> u32 {
        self.state.map(|(crc, _)| crc).unwrap_or(0)
    }
}

/// Outcome of streaming a member's body through the pipeline.
pub(crate) struct PipelineOutput {
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

/// Stream `input` through `method`, writing compressed bytes to `output`,
/// tracking CRC-32 and both byte counts. Used by the writer state machine.
pub(crate) fn compress_stream<R: Read + ?Sized, W: Write>(
    method: Method,
    input: &mut R,
    output: &mut W,
) -> ZipResult<PipelineOutput> {
    let mut crc = RunningCrc::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut uncompressed_size = 0u64;

    match method {
        Method::Store => {
            let mut compressed_size = 0u64;
            loop {
                let n = input.read(&mut buf).map_err(ZipError::Io)?;
                if n == 0 {
                    break;
                }
                crc.update(&buf[..n]);
                uncompressed_size += n as u64;
                output.write_all(&buf[..n]).map_err(ZipError::Io)?;
                compressed_size += n as u64;
            }
            Ok(PipelineOutput {
                crc32: crc.finalize(),
                uncompressed_size,
                compressed_size,
            })
        }
        Method::Deflate => {
            let counting = CountingWriter::new(output);
            let mut encoder = DeflateEncoder::new(counting, Compression::default());
            loop {
                let n = input.read(&mut buf).map_err(ZipError::Io)?;
                if n == 0 {
                    break;
                }
                crc.update(&buf[..n]);
                uncompressed_size += n as u64;
                encoder
                    .write_all(&buf[..n])
                    .map_err(|_| ZipError::CodecInitFailed)?;
            }
            let counting = encoder.finish().map_err(|_| ZipError::CodecInitFailed)?;
            Ok(PipelineOutput {
                crc32: crc.finalize(),
                uncompressed_size,
                compressed_size: counting.count(),
            })
        }
    }
}

/// Stream exactly `compressed_size` bytes of `input` through `method`'s
/// decoder into `sink`, asserting the known sizes match; verify CRC-32
/// against `expected_crc` on completion.
pub(crate) fn decompress_stream<R: Read, W: Write>(
    method: Method,
    input: &mut R,
    sink: &mut W,
    compressed_size: u64,
    uncompressed_size: u64,
    expected_crc: u32,
) -> ZipResult<u64> {
    let limited = input.take(compressed_size);
    let mut crc = RunningCrc::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut out_count = 0u64;

    match method {
        Method::Store => {
            let mut limited = limited;
            loop {
                let n = limited.read(&mut buf).map_err(ZipError::Io)?;
                if n == 0 {
                    break;
                }
                crc.update(&buf[..n]);
                out_count += n as u64;
                sink.write_all(&buf[..n]).map_err(ZipError::Io)?;
            }
            if out_count != uncompressed_size {
                return Err(ZipError::Truncated("stored member body"));
            }
        }
        Method::Deflate => {
            let mut decoder = DeflateDecoder::new(limited);
            loop {
                let n = decoder.read(&mut buf).map_err(|e| {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        ZipError::Truncated("deflate body")
                    } else {
                        ZipError::DecodeError(e.to_string())
                    }
                })?;
                if n == 0 {
                    break;
                }
                crc.update(&buf[..n]);
                out_count += n as u64;
                sink.write_all(&buf[..n]).map_err(ZipError::Io)?;
            }
            if out_count != uncompressed_size {
                return Err(ZipError::LengthMismatch {
                    expected: uncompressed_size,
                    actual: out_count,
                });
            }
            // The loop above stops once the DEFLATE stream's final block is
            // seen, which can be short of `compressed_size` if the CDR/local
            // header lied about the compressed length (trailing garbage
            // sitting before the declared boundary). `total_in` is flate2's
            // own count of bytes actually fed through the inflate state, so
            // comparing it against the declared `compressed_size` catches
            // that independently of `total_out`.
            let total_in = decoder.total_in();
            if total_in != compressed_size {
                return Err(ZipError::LengthMismatch {
                    expected: compressed_size,
                    actual: total_in,
                });
            }
        }
    }

    let actual_crc = crc.finalize();
    if actual_crc != expected_crc {
        return Err(ZipError::CrcMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    Ok(out_count)
}

/// Wraps a `Write` and counts bytes passed through it, so the deflate
/// encoder's compressed byte count can be observed without seeking.
struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_combine_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog, repeatedly, many times over";
        let one_shot = crc32fast::hash(data);

        for split in [0, 1, 17, data.len() / 2, data.len() - 1, data.len()] {
            let (a, b) = data.split_at(split);
            let crc_a = crc32fast::hash(a);
            let crc_b = crc32fast::hash(b);
            let combined = crc32_combine(crc_a, crc_b, b.len() as u64);
            assert_eq!(combined, one_shot, "split at {split}");
        }
    }

    #[test]
    fn running_crc_matches_one_shot_across_chunk_boundaries() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for chunk_size in [1usize, 7, 64, 4096, 10_000] {
            let mut running = RunningCrc::new();
            for chunk in data.chunks(chunk_size) {
                running.update(chunk);
            }
            assert_eq!(running.finalize(), crc32fast::hash(&data));
        }
    }

    #[test]
    fn store_roundtrip() {
        let data = b"bar";
        let mut compressed = Vec::new();
        let out = compress_stream(Method::Store, &mut &data[..], &mut compressed).unwrap();
        assert_eq!(out.crc32, 0x76FF_8CAA);
        assert_eq!(out.uncompressed_size, 3);
        assert_eq!(out.compressed_size, 3);

        let mut decompressed = Vec::new();
        let n = decompress_stream(
            Method::Store,
            &mut &compressed[..],
            &mut decompressed,
            out.compressed_size,
            out.uncompressed_size,
            out.crc32,
        )
        .unwrap();
        assert_eq!(n, 3);
        assert_eq!(decompressed, data);
    }

    #[test]
    fn deflate_roundtrip_small() {
        let data = b"bar";
        let mut compressed = Vec::new();
        let out = compress_stream(Method::Deflate, &mut &data[..], &mut compressed).unwrap();
        assert!(out.compressed_size as usize <= data.len() + 11);

        let mut decompressed = Vec::new();
        decompress_stream(
            Method::Deflate,
            &mut &compressed[..],
            &mut decompressed,
            out.compressed_size,
            out.uncompressed_size,
            out.crc32,
        )
        .unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn deflate_empty_body() {
        let data: &[u8] = b"";
        let mut compressed = Vec::new();
        let out = compress_stream(Method::Deflate, &mut &data[..], &mut compressed).unwrap();
        assert_eq!(out.uncompressed_size, 0);

        let mut decompressed = Vec::new();
        decompress_stream(
            Method::Deflate,
            &mut &compressed[..],
            &mut decompressed,
            out.compressed_size,
            out.uncompressed_size,
            out.crc32,
        )
        .unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn decompress_rejects_crc_mismatch() {
        let data = b"bar";
        let mut compressed = Vec::new();
        let out = compress_stream(Method::Store, &mut &data[..], &mut compressed).unwrap();

        let mut sink = Vec::new();
        let err = decompress_stream(
            Method::Store,
            &mut &compressed[..],
            &mut sink,
            out.compressed_size,
            out.uncompressed_size,
            out.crc32 ^ 1,
        )
        .unwrap_err();
        assert!(matches!(err, ZipError::CrcMismatch { .. }));
    }
}
