//! Reading alignment files with `noodles`.
//!
//! The input is detected from its first bytes:
//!
//! * BAM, BGZF-compressed or uncompressed, is read with [`noodles::bam`].
//! * SAM text with a header, which may be BGZF- or gzip-compressed, is read with [`noodles::sam`].
//!
//! [`Record`] owns the serialized BAM record: the bytes after `block_size`, which is also the form stored in the database.
//! Records read from BAM keep the bytes from the file, while records read from SAM are encoded into BAM.
//! Field accessors use the `noodles` record.
//!
//! ```text
//! offset  size  field
//! 0       4     ref_id (i32)
//! 4       4     pos (i32), 0-based
//! 8       1     l_read_name (u8), including NUL
//! 9       1     mapq (u8)
//! 10      2     bin (u16)
//! 12      2     n_cigar_op (u16)
//! 14      2     flag (u16)
//! 16      4     l_seq (u32)
//! 20      4     next_ref_id (i32)
//! 24      4     next_pos (i32)
//! 28      4     tlen (i32)
//! 32      var   read_name, cigar, seq, qual, tags
//! ```

use crate::error::{BamDbError, Result};
use crate::{tags, utils};

use std::fmt;
use std::io::{self, BufRead, ErrorKind, Read};
use std::mem;
use std::path::Path;

use noodles::bam;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::cigar::op::Kind;

pub use noodles::sam::Header;


//-----------------------------------------------------------------------------

/// BAM magic bytes at the start of the decompressed stream.
pub const BAM_MAGIC: [u8; 4] = *b"BAM\x01";

/// Tag for the linked-read barcode.
pub const BARCODE_TAG: [u8; 2] = *b"BX";

/// Largest accepted `block_size` for a single record.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

//-----------------------------------------------------------------------------

/// Returns the name of the reference sequence with the given id, or `*` if there is no such reference.
pub fn reference_name(header: &Header, id: Option<usize>) -> &[u8] {
    id.and_then(|id| header.reference_sequences().get_index(id))
        .map_or(&b"*"[..], |(name, _)| name.as_slice())
}

fn kind_to_char(kind: Kind) -> char {
    match kind {
        Kind::Match => 'M',
        Kind::Insertion => 'I',
        Kind::Deletion => 'D',
        Kind::Skip => 'N',
        Kind::SoftClip => 'S',
        Kind::HardClip => 'H',
        Kind::Pad => 'P',
        Kind::SequenceMatch => '=',
        Kind::SequenceMismatch => 'X',
    }
}

// 0-based position, or -1 if missing.
fn zero_based(position: Option<io::Result<Position>>) -> i64 {
    match position {
        Some(Ok(position)) => usize::from(position) as i64 - 1,
        _ => -1,
    }
}

//-----------------------------------------------------------------------------

/// An alignment record with its serialized BAM form.
///
/// The constructors check the layout of the variable-length fields, so the accessors never read out of bounds.
/// The tag block is not decoded until requested; see [`crate::tags`].
/// A default record is an empty buffer for [`BamReader::read_record`].
#[derive(Clone, Default)]
pub struct Record {
    inner: bam::Record,
    data: Vec<u8>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &String::from_utf8_lossy(self.name()))
            .field("data", &self.data)
            .finish()
    }
}

impl Record {
    /// Creates a record from the serialized form.
    ///
    /// Returns an error if the fields do not fit in the data.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mut record = Record::default();
        record.set_bytes(&data).map_err(|x| BamDbError::InvalidRecord(x.to_string()))?;
        Ok(record)
    }

    // Parses the record with `noodles` by framing it as a single-record BAM stream.
    fn set_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        let block_size = u32::try_from(data.len()).map_err(|_| {
            io::Error::new(ErrorKind::InvalidData, format!("Record size {} does not fit in block_size", data.len()))
        })?;
        let mut framed: Vec<u8> = Vec::with_capacity(data.len() + 4);
        framed.extend_from_slice(&block_size.to_le_bytes());
        framed.extend_from_slice(data);

        let mut reader = bam::io::Reader::from(&framed[..]);
        if reader.read_record(&mut self.inner)? == 0 {
            return Err(io::Error::new(ErrorKind::InvalidData, "Empty record"));
        }
        self.data.clear();
        self.data.extend_from_slice(data);
        Ok(())
    }

    /// Returns the serialized form of the record.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the reference sequence id, or [`None`] for unplaced reads.
    pub fn ref_id(&self) -> Option<usize> {
        self.inner.reference_sequence_id().and_then(|id| id.ok())
    }

    /// Returns the 0-based leftmost position, or -1 if there is no position.
    pub fn pos(&self) -> i64 {
        zero_based(self.inner.alignment_start())
    }

    /// Returns the mapping quality, with 255 for a missing value.
    pub fn mapq(&self) -> u8 {
        self.inner.mapping_quality().map_or(255, |mapq| mapq.get())
    }

    /// Returns the bitwise flags.
    pub fn flag(&self) -> u16 {
        u16::from(self.inner.flags())
    }

    /// Returns the reference sequence id of the mate.
    pub fn next_ref_id(&self) -> Option<usize> {
        self.inner.mate_reference_sequence_id().and_then(|id| id.ok())
    }

    /// Returns the 0-based position of the mate, or -1 if there is no position.
    pub fn next_pos(&self) -> i64 {
        zero_based(self.inner.mate_alignment_start())
    }

    /// Returns the observed template length.
    pub fn tlen(&self) -> i32 {
        self.inner.template_length()
    }

    /// Returns the read name, or `*` if the name is missing.
    pub fn name(&self) -> &[u8] {
        match self.inner.name() {
            Some(name) => name.as_ref(),
            None => b"*",
        }
    }

    /// Returns the CIGAR string, or `*` if there are no operations.
    ///
    /// Stops at the first operation that cannot be decoded.
    pub fn cigar_string(&self) -> String {
        let mut result = String::new();
        for op in self.inner.cigar().iter() {
            let Ok(op) = op else {
                break;
            };
            result.push_str(&op.len().to_string());
            result.push(kind_to_char(op.kind()));
        }
        if result.is_empty() {
            result.push('*');
        }
        result
    }

    /// Returns the length of the read sequence.
    pub fn seq_len(&self) -> usize {
        self.inner.sequence().len()
    }

    /// Returns the read sequence, or `*` if the sequence is empty.
    pub fn sequence_string(&self) -> String {
        let sequence = self.inner.sequence();
        if sequence.is_empty() {
            return String::from("*");
        }
        sequence.iter().map(char::from).collect()
    }

    /// Returns the base qualities as a Phred+33 string, or `*` if the qualities are missing.
    pub fn quality_string(&self) -> String {
        let scores = self.inner.quality_scores();
        let scores: &[u8] = scores.as_ref();
        if scores.is_empty() || scores[0] == 0xFF {
            return String::from("*");
        }
        scores.iter().map(|q| q.saturating_add(33) as char).collect()
    }

    /// Returns the auxiliary tag block.
    pub fn aux_data(&self) -> &[u8] {
        let len = self.inner.data().as_ref().len();
        &self.data[self.data.len().saturating_sub(len)..]
    }

    /// Returns the linked-read barcode from the `BX` tag, if present.
    pub fn barcode(&self) -> Option<&[u8]> {
        match tags::find_tag(self.aux_data(), BARCODE_TAG)?.value {
            tags::TagValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the barcode as a string, or an empty string if there is no barcode.
    pub fn barcode_string(&self) -> String {
        self.barcode().map(|x| String::from_utf8_lossy(x).into_owned()).unwrap_or_default()
    }
}

//-----------------------------------------------------------------------------

// Passes the decompressed stream to the BAM reader.
// While framing records, keeps a copy of everything read since the last `clear` and rejects oversized records
// as soon as `block_size` has been read.
struct RecordTap {
    inner: Box<dyn BufRead>,
    framing: bool,
    captured: Vec<u8>,
}

impl RecordTap {
    fn new(inner: Box<dyn BufRead>) -> Self {
        RecordTap { inner, framing: false, captured: Vec::new() }
    }

    fn start_framing(&mut self) {
        self.framing = true;
        self.captured.clear();
    }

    fn clear(&mut self) {
        self.captured.clear();
    }

    fn block_size(&self) -> Option<usize> {
        let bytes = self.captured.get(0..4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    // The whole record has been read.
    fn is_complete(&self) -> bool {
        self.block_size().is_some_and(|size| self.captured.len() == size + 4)
    }
}

impl Read for RecordTap {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.inner.read(buf)?;
        if !self.framing {
            return Ok(len);
        }
        let before = self.captured.len();
        self.captured.extend_from_slice(&buf[..len]);
        if before < 4 {
            if let Some(size) = self.block_size() {
                if size > MAX_RECORD_SIZE {
                    return Err(io::Error::new(
                        ErrorKind::InvalidData,
                        format!("Record size {} exceeds the limit of {} bytes", size, MAX_RECORD_SIZE)
                    ));
                }
            }
        }
        Ok(len)
    }
}

//-----------------------------------------------------------------------------

enum Input {
    Pending(Box<dyn BufRead>),
    Bam(bam::io::Reader<RecordTap>),
    Sam {
        reader: sam::io::Reader<Box<dyn BufRead>>,
        header: Box<Header>,
        buffer: RecordBuf,
        encoder: bam::io::Writer<Vec<u8>>,
    },
    Closed,
}

/// A streaming reader for SAM and BAM files.
///
/// The reader must read the header with [`BamReader::read_header`] before reading records with [`BamReader::read_record`].
///
/// # Examples
///
/// ```no_run
/// use bamdb::bam::{self, BamReader, Record};
///
/// let mut reader = BamReader::open("sample.bam").unwrap();
/// let header = reader.read_header().unwrap();
/// let mut record = Record::default();
/// while reader.read_record(&mut record).unwrap() {
///     let rname = bam::reference_name(&header, record.ref_id());
///     println!("{} {}", String::from_utf8_lossy(record.name()), String::from_utf8_lossy(rname));
/// }
/// ```
pub struct BamReader {
    input: Input,
    source_name: String,
    records: usize,
}

impl BamReader {
    /// Opens an alignment file.
    ///
    /// BGZF-compressed, gzip-compressed, and uncompressed files are supported.
    pub fn open<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let reader = utils::open_file(&filename).map_err(|source| BamDbError::Open {
            path: filename.as_ref().display().to_string(), source,
        })?;
        Ok(Self::new(reader, filename.as_ref().display().to_string()))
    }

    /// Creates a reader over a decompressed SAM or BAM stream.
    ///
    /// The name of the source is used in error messages.
    pub fn new(reader: Box<dyn BufRead>, source_name: String) -> Self {
        BamReader { input: Input::Pending(reader), source_name, records: 0 }
    }

    /// Returns the name of the source.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Returns the number of records read so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Returns `true` if the input is BAM rather than SAM.
    ///
    /// The format is known after reading the header.
    pub fn is_bam(&self) -> bool {
        matches!(self.input, Input::Bam(_))
    }

    fn header_error(&self, reason: String) -> BamDbError {
        BamDbError::Header { source_name: self.source_name.clone(), reason }
    }

    /// Reads the header and detects the input format.
    ///
    /// Returns an error if the header has already been read or if it is missing or malformed.
    /// SAM input without header lines is treated as a missing header.
    pub fn read_header(&mut self) -> Result<Header> {
        let mut reader = match mem::replace(&mut self.input, Input::Closed) {
            Input::Pending(reader) => reader,
            other => {
                self.input = other;
                return Err(BamDbError::InvalidState(String::from("The header has already been read")));
            },
        };

        let start = reader.fill_buf().map_err(|x| self.header_error(format!("Cannot read the input: {}", x)))?;
        if start.is_empty() {
            return Err(self.header_error(String::from("Empty input")));
        }
        let is_bam = start.starts_with(&BAM_MAGIC);
        let is_sam = start[0] == b'@';

        if is_bam {
            let mut reader = bam::io::Reader::from(RecordTap::new(reader));
            let header = reader.read_header().map_err(|x| self.header_error(x.to_string()))?;
            reader.get_mut().start_framing();
            self.input = Input::Bam(reader);
            Ok(header)
        } else if is_sam {
            let mut reader = sam::io::Reader::new(reader);
            let header = reader.read_header().map_err(|x| self.header_error(x.to_string()))?;
            self.input = Input::Sam {
                reader,
                header: Box::new(header.clone()),
                buffer: RecordBuf::default(),
                encoder: bam::io::Writer::from(Vec::new()),
            };
            Ok(header)
        } else {
            Err(self.header_error(String::from("Not a BAM file or a SAM file with a header")))
        }
    }

    fn read_error(&self, err: io::Error) -> BamDbError {
        match err.kind() {
            ErrorKind::UnexpectedEof => BamDbError::Truncated(
                format!("{} after {} records: {}", self.source_name, self.records, err)
            ),
            ErrorKind::InvalidData | ErrorKind::InvalidInput => BamDbError::InvalidRecord(
                format!("{} record {}: {}", self.source_name, self.records, err)
            ),
            _ => BamDbError::Io(err),
        }
    }

    /// Reads the next record into the given buffer.
    ///
    /// Returns `Ok(true)` if a record was read and `Ok(false)` at the end of the stream.
    /// Returns [`BamDbError::Truncated`] if the stream ends in the middle of a record.
    /// The contents of the buffer are unspecified after an error.
    pub fn read_record(&mut self, record: &mut Record) -> Result<bool> {
        let result = match &mut self.input {
            Input::Pending(_) | Input::Closed => {
                return Err(BamDbError::InvalidState(String::from("The header must be read before records")));
            },
            Input::Bam(reader) => Self::read_bam_record(reader, record),
            Input::Sam { reader, header, buffer, encoder } => {
                Self::read_sam_record(reader, header, buffer, encoder, record)
            },
        };
        match result {
            Ok(true) => {
                self.records += 1;
                Ok(true)
            },
            Ok(false) => Ok(false),
            Err(err) => Err(self.read_error(err)),
        }
    }

    fn read_bam_record(reader: &mut bam::io::Reader<RecordTap>, record: &mut Record) -> io::Result<bool> {
        reader.get_mut().clear();
        let result = reader.read_record(&mut record.inner);
        let tap = reader.get_mut();
        match result {
            Ok(0) => match tap.captured.len() {
                0 => Ok(false),
                n => Err(io::Error::new(ErrorKind::UnexpectedEof, format!("record size has {} of 4 bytes", n))),
            },
            Ok(_) => {
                let body = tap.captured.get(4..).ok_or_else(|| {
                    io::Error::new(ErrorKind::InvalidData, "Record without block_size")
                })?;
                record.data.clear();
                record.data.extend_from_slice(body);
                Ok(true)
            },
            // The record was read in full, so the problem is in the record itself.
            Err(err) if tap.is_complete() => Err(io::Error::new(ErrorKind::InvalidData, err)),
            Err(err) => Err(err),
        }
    }

    fn read_sam_record(
        reader: &mut sam::io::Reader<Box<dyn BufRead>>,
        header: &Header,
        buffer: &mut RecordBuf,
        encoder: &mut bam::io::Writer<Vec<u8>>,
        record: &mut Record
    ) -> io::Result<bool> {
        if reader.read_record_buf(header, buffer)? == 0 {
            return Ok(false);
        }
        encoder.get_mut().clear();
        encoder.write_alignment_record(header, &*buffer)?;
        let body = encoder.get_ref().get(4..).ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidData, "Encoded record without block_size")
        })?;
        record.set_bytes(body)?;
        Ok(true)
    }
}

//-----------------------------------------------------------------------------
