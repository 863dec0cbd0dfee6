//! ZIP archive parsing.
//!
//! - `structures`: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - `parser`: Parsing of those structures and streaming of entry data
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Listing reads the EOCD and the Central Directory only. Entry data is
//! streamed on demand with positional reads, so members can be visited in
//! order without buffering whole files.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE compression methods
//! - Unix permissions and extended timestamps
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod parser;
mod structures;

pub use parser::{EntryIntegrityError, ZipParser};
pub use structures::*;
