use crate::bam::{Header, Record};

use std::fs::File;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;

use bstr::BString;
use noodles::bam;
use noodles::bgzf;
use noodles::core::Position;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::{Flags, MappingQuality};
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record_buf::{Cigar, QualityScores, Sequence};
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::ReferenceSequence;

//-----------------------------------------------------------------------------

// Building records.

pub(crate) struct RecordFields<'a> {
    pub name: &'a str,
    pub flag: u16,
    pub ref_id: i32,
    pub pos: i32,
    pub mapq: u8,
    pub cigar: Vec<(usize, u8)>,
    pub next_ref_id: i32,
    pub next_pos: i32,
    pub tlen: i32,
    pub seq: &'a [u8],
    pub qual: Vec<u8>,
    pub aux: Vec<u8>,
}

impl Default for RecordFields<'_> {
    fn default() -> Self {
        RecordFields {
            name: "read",
            flag: 0,
            ref_id: 0,
            pos: 0,
            mapq: 60,
            cigar: Vec::new(),
            next_ref_id: -1,
            next_pos: -1,
            tlen: 0,
            seq: b"",
            qual: Vec::new(),
            aux: Vec::new(),
        }
    }
}

fn op_kind(op: u8) -> Kind {
    match op {
        b'M' => Kind::Match,
        b'I' => Kind::Insertion,
        b'D' => Kind::Deletion,
        b'N' => Kind::Skip,
        b'S' => Kind::SoftClip,
        b'H' => Kind::HardClip,
        b'P' => Kind::Pad,
        b'=' => Kind::SequenceMatch,
        b'X' => Kind::SequenceMismatch,
        _ => panic!("Invalid CIGAR operation {}", op as char),
    }
}

fn position(pos: i32) -> Option<Position> {
    usize::try_from(pos + 1).ok().and_then(|pos| Position::try_from(pos).ok())
}

fn record_buf(fields: &RecordFields) -> RecordBuf {
    let cigar: Vec<Op> = fields.cigar.iter().map(|(len, op)| Op::new(op_kind(*op), *len)).collect();
    let mut builder = RecordBuf::builder()
        .set_name(BString::from(fields.name))
        .set_flags(Flags::from(fields.flag))
        .set_cigar(Cigar::from(cigar))
        .set_template_length(fields.tlen)
        .set_sequence(Sequence::from(fields.seq.to_vec()))
        .set_quality_scores(QualityScores::from(fields.qual.clone()));
    if let Some(mapq) = MappingQuality::new(fields.mapq) {
        builder = builder.set_mapping_quality(mapq);
    }
    if let Ok(id) = usize::try_from(fields.ref_id) {
        builder = builder.set_reference_sequence_id(id);
    }
    if let Some(pos) = position(fields.pos) {
        builder = builder.set_alignment_start(pos);
    }
    if let Ok(id) = usize::try_from(fields.next_ref_id) {
        builder = builder.set_mate_reference_sequence_id(id);
    }
    if let Some(pos) = position(fields.next_pos) {
        builder = builder.set_mate_alignment_start(pos);
    }
    builder.build()
}

// Serializes the fields with `noodles` and appends the raw tag block, which may be malformed.
pub(crate) fn encode_record(fields: &RecordFields) -> Record {
    let header = test_header();
    let mut writer = bam::io::Writer::from(Vec::new());
    writer.write_alignment_record(&header, &record_buf(fields)).unwrap();
    let mut data = writer.get_ref()[4..].to_vec();
    data.extend_from_slice(&fields.aux);

    let record = Record::from_bytes(data);
    assert!(record.is_ok(), "Failed to encode a record: {}", record.unwrap_err());
    record.unwrap()
}

// A `Z` tag entry.
pub(crate) fn string_tag(tag: &[u8; 2], value: &str) -> Vec<u8> {
    let mut result = tag.to_vec();
    result.push(b'Z');
    result.extend_from_slice(value.as_bytes());
    result.push(0);
    result
}

// A `C` tag entry.
pub(crate) fn uint8_tag(tag: &[u8; 2], value: u8) -> Vec<u8> {
    let mut result = tag.to_vec();
    result.push(b'C');
    result.push(value);
    result
}

/// A simple read with a barcode and some other tags.
pub(crate) fn barcoded_read(name: &str, barcode: Option<&str>, pos: i32) -> Record {
    let mut aux = uint8_tag(b"NM", 1);
    if let Some(barcode) = barcode {
        aux.extend(string_tag(b"BX", barcode));
    }
    aux.extend(string_tag(b"RG", "group1"));
    encode_record(&RecordFields {
        name,
        flag: 99,
        pos,
        cigar: vec![(4, b'M')],
        next_ref_id: 0,
        next_pos: pos + 100,
        tlen: 150,
        seq: b"ACGT",
        qual: vec![30, 31, 32, 33],
        aux,
        ..Default::default()
    })
}

//-----------------------------------------------------------------------------

// Building files.

pub(crate) fn test_header() -> Header {
    let chr1 = Map::<ReferenceSequence>::new(NonZeroUsize::new(1000).unwrap());
    let chr2 = Map::<ReferenceSequence>::new(NonZeroUsize::new(2000).unwrap());
    Header::builder()
        .add_reference_sequence("chr1", chr1)
        .add_reference_sequence("chr2", chr2)
        .build()
}

// Uncompressed BAM stream.
pub(crate) fn bam_bytes(header: &Header, records: &[Record]) -> Vec<u8> {
    let mut writer = bam::io::Writer::from(Vec::new());
    writer.write_header(header).unwrap();
    let mut data = std::mem::take(writer.get_mut());
    for record in records.iter() {
        data.extend_from_slice(&(record.as_bytes().len() as u32).to_le_bytes());
        data.extend_from_slice(record.as_bytes());
    }
    data
}

// SAM text with the header.
pub(crate) fn sam_text(header: &Header, lines: &[&str]) -> Vec<u8> {
    let mut data: Vec<u8> = Vec::new();
    for (name, reference) in header.reference_sequences().iter() {
        writeln!(data, "@SQ\tSN:{}\tLN:{}", name, reference.length()).unwrap();
    }
    for line in lines.iter() {
        writeln!(data, "{}", line).unwrap();
    }
    data
}

// Writes the data as a BGZF file.
pub(crate) fn write_compressed(filename: &Path, data: &[u8]) {
    let file = File::create(filename);
    assert!(file.is_ok(), "Failed to create {}: {}", filename.display(), file.unwrap_err());
    let mut writer = bgzf::io::Writer::new(file.unwrap());
    writer.write_all(data).unwrap();
    let result = writer.finish();
    assert!(result.is_ok(), "Failed to write {}: {}", filename.display(), result.unwrap_err());
}

pub(crate) fn write_bam(filename: &Path, header: &Header, records: &[Record]) {
    write_compressed(filename, &bam_bytes(header, records));
}

//-----------------------------------------------------------------------------
