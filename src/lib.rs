//! # bamdb: SAM/BAM alignment records as text reports or SQLite databases.
//!
//! This crate converts SAM and BAM files into either a human-readable report or rows in an SQLite database.
//! Files are read with `noodles` (see [`bam`]), and SAM records are stored in their BAM encoding.
//! The database is intended for fast lookups of reads by linked-read barcode (tag `BX`) or by read name.
//!
//! ### Tag decoding
//!
//! Every BAM record ends with a block of auxiliary tags.
//! The block is self-describing but has no overall length or end-of-entry markers.
//! See [`tags`] for decoding the block into `TAG:TYPE:VALUE` strings.
//! Decoding is lenient: a malformed entry ends decoding for that record, but the conversion continues.
//!
//! ### Reports
//!
//! [`report`] renders the fixed fields of a record together with the decoded tags.
//!
//! ### Databases
//!
//! Each record corresponds to a row in table `seq`, with the read name, the barcode, and the serialized record.
//! Records are loaded in a single transaction, and the barcode and read name indexes are built after loading.
//! A truncated input rolls the transaction back.
//! See [`SqliteSink`] for loading and [`BamBase`] for queries.
//!
//! ### Conversion
//!
//! [`convert`] drives the whole process, as used by the `bamdb` binary.

pub mod bam;
pub mod convert;
pub mod db;
pub mod error;
pub mod report;
pub mod tags;
pub mod utils;

#[cfg(test)]
pub(crate) mod internal;

pub use bam::{BamReader, Header, Record};
pub use convert::{Config, OutputMode};
pub use db::{BamBase, Durability, SinkParams, SinkState, SqliteSink};
pub use error::{BamDbError, Result};
pub use tags::{TagEntry, TagValue};
