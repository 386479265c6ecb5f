//! Utility functions.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::io::{self, BufRead, BufReader, Read};

use flate2::read::MultiGzDecoder;
use noodles::bgzf;

//-----------------------------------------------------------------------------

// Utilities for working with files.

const SIZE_UNITS: [(f64, &str); 6] = [
    (1.0, "B"),
    (1024.0, "KiB"),
    (1024.0 * 1024.0, "MiB"),
    (1024.0 * 1024.0 * 1024.0, "GiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0, "TiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0, "PiB"),
];

/// Returns a human-readable representation of the given number of bytes.
pub fn human_readable_size(bytes: usize) -> String {
    let mut unit = 0;
    let value = bytes as f64;
    while unit + 1 < SIZE_UNITS.len() && value >= SIZE_UNITS[unit + 1].0 {
        unit += 1;
    }
    format!("{:.3} {}", value / SIZE_UNITS[unit].0, SIZE_UNITS[unit].1)
}

/// Returns a human-readable size of the file.
pub fn file_size<P: AsRef<Path>>(filename: P) -> Option<String> {
    let metadata = fs::metadata(filename).ok()?;
    Some(human_readable_size(metadata.len() as usize))
}

/// Returns `true` if the file exists.
pub fn file_exists<P: AsRef<Path>>(filename: P) -> bool {
    fs::metadata(filename).is_ok()
}

// Reads up to `buf.len()` bytes from the start of the file.
fn read_prefix<P: AsRef<Path>>(filename: P, buf: &mut [u8]) -> Option<usize> {
    let mut file = File::open(filename).ok()?;
    let mut len = 0;
    while len < buf.len() {
        match file.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(_) => return None,
        }
    }
    Some(len)
}

/// Returns `true` if the file appears to be gzip-compressed.
///
/// BGZF files are gzip files with an extra field, so they are also detected as gzip-compressed.
pub fn is_gzipped<P: AsRef<Path>>(filename: P) -> bool {
    let mut magic = [0; 2];
    read_prefix(filename, &mut magic) == Some(2) && magic == [0x1F, 0x8B]
}

/// Returns `true` if the file appears to be BGZF-compressed.
///
/// The first gzip member must have the `BC` extra subfield.
pub fn is_bgzf<P: AsRef<Path>>(filename: P) -> bool {
    let mut header = [0; 14];
    read_prefix(filename, &mut header) == Some(14)
        && header[0..2] == [0x1F, 0x8B]
        && header[3] & 0x04 != 0
        && &header[12..14] == b"BC"
}

/// Returns a buffered reader for the file, which may be BGZF- or gzip-compressed.
///
/// BGZF files are decompressed with `noodles`, and other multi-member gzip files as a single stream.
pub fn open_file<P: AsRef<Path>>(filename: P) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(&filename)?;
    if is_bgzf(&filename) {
        Ok(Box::new(bgzf::io::Reader::new(file)))
    } else if is_gzipped(&filename) {
        let inner = MultiGzDecoder::new(BufReader::new(file));
        Ok(Box::new(BufReader::new(inner)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

//-----------------------------------------------------------------------------

/// Extension used for databases with a derived name.
pub const DB_EXTENSION: &str = "db";

/// Returns the default database name for the input file.
///
/// The file name is cut at the last `.` and `.db` is appended.
/// If there is no `.`, `.db` is appended to the full name.
///
/// # Examples
///
/// ```
/// use bamdb::utils;
/// use std::path::PathBuf;
///
/// assert_eq!(utils::default_db_name("sample.bam"), PathBuf::from("sample.db"));
/// assert_eq!(utils::default_db_name("a.b.bam"), PathBuf::from("a.b.db"));
/// assert_eq!(utils::default_db_name(".bam"), PathBuf::from(".db"));
/// assert_eq!(utils::default_db_name("data/reads"), PathBuf::from("data/reads.db"));
/// ```
pub fn default_db_name<P: AsRef<Path>>(filename: P) -> PathBuf {
    let filename = filename.as_ref();
    let stem = filename.file_name().and_then(|name| name.to_str()).and_then(|name| {
        name.rfind('.').map(|dot| &name[..dot])
    });
    match stem {
        Some(stem) => filename.with_file_name(format!("{}.{}", stem, DB_EXTENSION)),
        None => filename.with_extension(DB_EXTENSION),
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn default_names() {
        assert_eq!(default_db_name("sample.bam"), PathBuf::from("sample.db"));
        assert_eq!(default_db_name("a.b.bam"), PathBuf::from("a.b.db"));
        assert_eq!(default_db_name("/tmp/run.1/sample.bam"), PathBuf::from("/tmp/run.1/sample.db"));
        assert_eq!(default_db_name("sample"), PathBuf::from("sample.db"));
        assert_eq!(default_db_name(".bam"), PathBuf::from(".db"));
        assert_eq!(default_db_name("data/.bam"), PathBuf::from("data/.db"));
        assert_eq!(default_db_name("sample."), PathBuf::from("sample.db"));
    }

    #[test]
    fn size_formatting() {
        assert_eq!(human_readable_size(0), "0.000 B");
        assert_eq!(human_readable_size(1536), "1.500 KiB");
        assert_eq!(human_readable_size(3 * 1024 * 1024), "3.000 MiB");
    }

    #[test]
    fn plain_and_gzipped_files() {
        let content = b"first member";
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("plain.txt");
        fs::write(&plain, content).unwrap();
        assert!(!is_gzipped(&plain), "Plain file detected as gzip-compressed");

        // Two gzip members, as in BGZF.
        let compressed = dir.path().join("compressed.gz");
        let mut data: Vec<u8> = Vec::new();
        for part in [&content[..6], &content[6..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            data.extend(encoder.finish().unwrap());
        }
        fs::write(&compressed, data).unwrap();
        assert!(is_gzipped(&compressed), "Compressed file not detected as gzip-compressed");
        assert!(!is_bgzf(&compressed), "Plain gzip file detected as BGZF");

        for filename in [&plain, &compressed] {
            let reader = open_file(filename);
            assert!(reader.is_ok(), "Failed to open {}: {}", filename.display(), reader.err().unwrap());
            let mut buffer: Vec<u8> = Vec::new();
            let result = reader.unwrap().read_to_end(&mut buffer);
            assert!(result.is_ok(), "Failed to read {}", filename.display());
            assert_eq!(&buffer, content, "Wrong content in {}", filename.display());
        }
        assert!(file_exists(&plain), "Existing file reported as missing");
        assert!(!file_exists(dir.path().join("missing.txt")), "Missing file reported as existing");
    }

    #[test]
    fn bgzf_files() {
        let content = b"BGZF blocks are gzip members";
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("blocks.bgz");
        let mut writer = bgzf::io::Writer::new(File::create(&filename).unwrap());
        writer.write_all(content).unwrap();
        writer.finish().unwrap();

        assert!(is_gzipped(&filename), "BGZF file not detected as gzip-compressed");
        assert!(is_bgzf(&filename), "BGZF file not detected");

        let reader = open_file(&filename);
        assert!(reader.is_ok(), "Failed to open {}: {}", filename.display(), reader.err().unwrap());
        let mut buffer: Vec<u8> = Vec::new();
        let result = reader.unwrap().read_to_end(&mut buffer);
        assert!(result.is_ok(), "Failed to read {}", filename.display());
        assert_eq!(&buffer, content, "Wrong content in {}", filename.display());
    }
}

//-----------------------------------------------------------------------------
