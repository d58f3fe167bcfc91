//! # zipcore: streaming ZIP codec core
//!
//! `zipcore` implements the PKWARE APPNOTE.TXT record layouts — local file
//! header, data descriptor, central directory, EOCD and its ZIP64
//! extensions — over abstract `Read`/`Write`/`Seek` streams, with a
//! STORE/DEFLATE compression pipeline and CRC-32 tracking in between.
//!
//! ## Features
//!
//! - **Streaming write**: entries are never patched in place; sizes and
//!   CRC-32 are carried in a trailing data-descriptor footer, so the writer
//!   works over an unseekable sink.
//! - **ZIP64 on demand**: 32-bit fields are only promoted to their ZIP64
//!   extra-field counterparts when a value actually overflows, or when the
//!   caller asks for it up front.
//! - **Tail-scan reader**: locates the end-of-central-directory record by
//!   scanning backward from EOF, validating against the comment length so a
//!   comment that happens to contain EOCD-looking bytes can't misdirect it.
//!
//! ## Quick start
//!
//! ### Writing an archive
//!
//! ```no_run
//! use std::fs::File;
//! use zipcore::{open_writer, AddOptions, WriterOptions};
//!
//! let file = File::create("output.zip")?;
//! let mut writer = open_writer(file, WriterOptions::default())?;
//! writer.add_bytes(b"hello.txt", b"hello, world", AddOptions::default())?;
//! writer.close()?;
//! # Ok::<(), zipcore::ZipError>(())
//! ```
//!
//! ### Reading an archive
//!
//! ```no_run
//! use std::fs::File;
//! use zipcore::open_reader;
//!
//! let file = File::open("archive.zip")?;
//! let mut archive = open_reader(file)?;
//! for entry in archive.entries().to_vec() {
//!     println!("{}: {} bytes", entry.path_str(), entry.uncompressed_size);
//! }
//! # Ok::<(), zipcore::ZipError>(())
//! ```

mod compress;
mod extra;
mod primitives;
mod record;

pub mod error;
pub mod reader;
pub mod writer;

pub use compress::Method;
pub use error::{Result, ZipError, ZipResult};
pub use extra::ExtraRecord;
pub use primitives::{DosTime, Version};
pub use reader::{open_reader, Archive, Entry};
pub use writer::{open_writer, AddOptions, Writer, WriterOptions};
