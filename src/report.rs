//! Human-readable reports for alignment records.
//!
//! Each record is written as a block of labeled fields:
//!
//! ```text
//! Row 0:
//! 	QNAME: read1
//! 	FLAG: 99
//! 	RNAME: chr1
//! 	POS: 100
//! 	MAPQ: 60
//! 	CIGAR: 4M
//! 	RNEXT: chr1
//! 	PNEXT: 201
//! 	TLEN: 150
//! 	SEQ: ACGT
//! 	QUAL: ?@AB
//! 	BX: AAAA-1
//! 	TAGs: NM:i:1	BX:Z:AAAA-1	RG:Z:group1
//! ```
//!
//! `POS` is the stored 0-based position, while `PNEXT` is the 1-based mate position.

use crate::bam::{self, Header, Record};
use crate::tags;

use std::io::{self, Write};

use log::debug;


//-----------------------------------------------------------------------------

/// Writes the report for the record with the given row number.
///
/// Every field is rendered into its own buffer before writing.
pub fn write_record<W: Write>(record: &Record, header: &Header, row: usize, output: &mut W) -> io::Result<()> {
    let mut buffer: Vec<u8> = Vec::new();

    writeln!(buffer, "Row {}:", row)?;
    buffer.extend_from_slice(b"\tQNAME: ");
    buffer.extend_from_slice(record.name());
    buffer.push(b'\n');
    writeln!(buffer, "\tFLAG: {}", record.flag())?;
    buffer.extend_from_slice(b"\tRNAME: ");
    buffer.extend_from_slice(bam::reference_name(header, record.ref_id()));
    buffer.push(b'\n');
    writeln!(buffer, "\tPOS: {}", record.pos())?;
    writeln!(buffer, "\tMAPQ: {}", record.mapq())?;
    writeln!(buffer, "\tCIGAR: {}", record.cigar_string())?;
    buffer.extend_from_slice(b"\tRNEXT: ");
    buffer.extend_from_slice(bam::reference_name(header, record.next_ref_id()));
    buffer.push(b'\n');
    writeln!(buffer, "\tPNEXT: {}", record.next_pos() + 1)?;
    writeln!(buffer, "\tTLEN: {}", record.tlen())?;
    writeln!(buffer, "\tSEQ: {}", record.sequence_string())?;
    writeln!(buffer, "\tQUAL: {}", record.quality_string())?;
    buffer.extend_from_slice(b"\tBX: ");
    if let Some(barcode) = record.barcode() {
        buffer.extend_from_slice(barcode);
    }
    buffer.push(b'\n');

    buffer.extend_from_slice(b"\tTAGs: ");
    let decoded = tags::append_tags(&mut buffer, record.aux_data());
    buffer.push(b'\n');
    if decoded.is_malformed() || decoded.offset() < record.aux_data().len() {
        debug!(
            "Row {}: decoded {} of {} bytes in the tag block",
            row, decoded.offset(), record.aux_data().len()
        );
    }

    output.write_all(&buffer)
}

/// Returns the report for the record as a string.
pub fn render(record: &Record, header: &Header, row: usize) -> String {
    let mut buffer: Vec<u8> = Vec::new();
    // Writing to a vector cannot fail.
    let _ = write_record(record, header, row, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

//-----------------------------------------------------------------------------
