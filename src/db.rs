//! SQLite databases storing BAM records.
//!
//! The database contains a single table:
//!
//! ```text
//! seq (
//!     id INTEGER PRIMARY KEY,
//!     qname TEXT,
//!     bx TEXT,
//!     bam_record BLOB
//! )
//! ```
//!
//! Column `bam_record` stores the serialized record (see [`Record::as_bytes`]).
//! Column `bx` stores the value of the `BX` tag or NULL if the record has no barcode.
//! Indexes `seq_bx_idx` and `seq_qname_idx` are created after all records have been inserted.
//!
//! [`SqliteSink`] loads records into a database, and [`BamBase`] queries a finished database.

use crate::bam::{BamReader, Record};
use crate::error::{BamDbError, Result};
use crate::utils;

use std::fmt::Display;
use std::path::{Path, PathBuf};

use log::{info, warn};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Statement};


//-----------------------------------------------------------------------------

/// Durability settings for bulk loading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Durability {
    /// Trades crash safety for throughput.
    ///
    /// Sets `PRAGMA synchronous = OFF` and `PRAGMA journal_mode = MEMORY`.
    /// The database will likely be corrupted if the machine or the process crashes during loading.
    /// The rollback journal is kept in memory, so a failed load can still be rolled back.
    #[default]
    Fast,

    /// Keeps the SQLite defaults.
    Safe,
}

/// Parameters for loading records into a database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkParams {
    /// Durability settings during the load.
    pub durability: Durability,

    /// Log progress after every this many rows. No progress is logged if this is 0.
    pub progress_interval: usize,
}

impl SinkParams {
    /// Default interval for progress messages.
    pub const PROGRESS_INTERVAL: usize = 100_000;
}

impl Default for SinkParams {
    fn default() -> Self {
        SinkParams {
            durability: Durability::default(),
            progress_interval: Self::PROGRESS_INTERVAL,
        }
    }
}

//-----------------------------------------------------------------------------

/// The state of a [`SqliteSink`].
///
/// ```text
/// SchemaReady -> Loading -> Committed -> Indexed
///                        \-> Aborted
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkState {
    /// The table exists and the sink is ready for loading.
    SchemaReady,
    /// A load transaction is in progress.
    Loading,
    /// All records were inserted and the transaction was committed.
    Committed,
    /// Secondary indexes have been built.
    Indexed,
    /// Loading failed and the transaction was rolled back.
    Aborted,
}

impl Display for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SinkState::SchemaReady => "schema ready",
            SinkState::Loading => "loading",
            SinkState::Committed => "committed",
            SinkState::Indexed => "indexed",
            SinkState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Bulk loader for a database of BAM records.
///
/// All records from the input are inserted in a single transaction.
/// If the input is truncated or an insert fails, the transaction is rolled back and the sink enters [`SinkState::Aborted`].
/// Indexes are built with [`SqliteSink::finalize`] after a successful load.
///
/// # Examples
///
/// ```no_run
/// use bamdb::bam::BamReader;
/// use bamdb::db::{SinkParams, SinkState, SqliteSink};
///
/// let mut reader = BamReader::open("sample.bam").unwrap();
/// let mut sink = SqliteSink::open("sample.db", &SinkParams::default()).unwrap();
/// reader.read_header().unwrap();
/// let rows = sink.load(&mut reader).unwrap();
/// sink.finalize().unwrap();
/// assert_eq!(sink.state(), SinkState::Indexed);
/// println!("Inserted {} rows", rows);
/// ```
#[derive(Debug)]
pub struct SqliteSink {
    connection: Connection,
    filename: PathBuf,
    params: SinkParams,
    state: SinkState,
    rows: usize,
}

impl SqliteSink {
    /// Name of the table.
    pub const TABLE: &'static str = "seq";

    /// Name of the barcode index.
    pub const BARCODE_INDEX: &'static str = "seq_bx_idx";

    /// Name of the read name index.
    pub const NAME_INDEX: &'static str = "seq_qname_idx";

    /// Opens or creates the database and creates the table if it does not exist.
    ///
    /// Applies the durability settings from the parameters.
    /// Passes through any database errors.
    pub fn open<P: AsRef<Path>>(filename: P, params: &SinkParams) -> Result<Self> {
        let connection = Connection::open(&filename)?;
        connection.execute(
            "CREATE TABLE IF NOT EXISTS seq (
                id INTEGER PRIMARY KEY,
                qname TEXT,
                bx TEXT,
                bam_record BLOB
            )",
            (),
        )?;

        if params.durability == Durability::Fast {
            connection.pragma_update(None, "synchronous", "OFF")?;
            let mode: String = connection.pragma_update_and_check(None, "journal_mode", "MEMORY", |row| row.get(0))?;
            if !mode.eq_ignore_ascii_case("memory") {
                warn!("Could not set journal mode to MEMORY; using {}", mode);
            }
        }

        Ok(SqliteSink {
            connection,
            filename: filename.as_ref().to_path_buf(),
            params: params.clone(),
            state: SinkState::SchemaReady,
            rows: 0,
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Returns the name of the database file.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Returns the number of rows inserted by [`SqliteSink::load`].
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn require_state(&self, expected: SinkState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(BamDbError::InvalidState(format!(
                "Cannot {} in state {} (expected {})", operation, self.state, expected
            )));
        }
        Ok(())
    }

    /// Inserts all remaining records from the reader in a single transaction.
    ///
    /// The header must have already been read.
    /// Returns the number of inserted rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink is not in [`SinkState::SchemaReady`].
    /// If reading or inserting fails, the transaction is rolled back, the sink becomes [`SinkState::Aborted`], and the original error is returned.
    pub fn load(&mut self, reader: &mut BamReader) -> Result<usize> {
        self.require_state(SinkState::SchemaReady, "load records")?;
        self.state = SinkState::Loading;

        match Self::insert_records(&mut self.connection, reader, &self.params) {
            Ok(rows) => {
                self.rows = rows;
                self.state = SinkState::Committed;
                info!("Inserted {} rows", rows);
                Ok(rows)
            },
            Err(err) => {
                self.state = SinkState::Aborted;
                Err(err)
            },
        }
    }

    fn insert_records(connection: &mut Connection, reader: &mut BamReader, params: &SinkParams) -> Result<usize> {
        let transaction = connection.transaction()?;
        let result = {
            let mut insert = transaction.prepare(
                "INSERT INTO seq(qname, bx, bam_record) VALUES (?1, ?2, ?3)"
            )?;
            Self::insert_loop(&mut insert, reader, params)
        };

        match result {
            Ok(rows) => {
                transaction.commit()?;
                Ok(rows)
            },
            Err(err) => {
                warn!("Rolling back the transaction after {} records: {}", reader.records(), err);
                if let Err(rollback_err) = transaction.rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            },
        }
    }

    // Every execution binds all parameters, which replaces the bindings from the previous row.
    fn insert_loop(insert: &mut Statement, reader: &mut BamReader, params: &SinkParams) -> Result<usize> {
        let mut record = Record::default();
        let mut inserted = 0;
        while reader.read_record(&mut record)? {
            let name = String::from_utf8_lossy(record.name()).into_owned();
            let barcode: Option<String> = record.barcode().map(|x| String::from_utf8_lossy(x).into_owned());
            insert.execute((name, barcode, record.as_bytes()))?;
            inserted += 1;
            if params.progress_interval > 0 && inserted % params.progress_interval == 0 {
                info!("{} rows inserted", inserted);
            }
        }
        Ok(inserted)
    }

    /// Builds the barcode and read name indexes.
    ///
    /// Returns an error if the sink is not in [`SinkState::Committed`].
    /// Passes through any database errors.
    pub fn finalize(&mut self) -> Result<()> {
        self.require_state(SinkState::Committed, "build indexes")?;
        info!("Building indexes");
        self.connection.execute(
            "CREATE INDEX IF NOT EXISTS seq_bx_idx ON seq(bx)",
            (),
        )?;
        self.connection.execute(
            "CREATE INDEX IF NOT EXISTS seq_qname_idx ON seq(qname)",
            (),
        )?;
        self.state = SinkState::Indexed;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// A read-only connection to a database of BAM records.
///
/// # Examples
///
/// ```no_run
/// use bamdb::BamBase;
///
/// let database = BamBase::open("sample.db").unwrap();
/// for record in database.records_by_barcode("AAACCTGAGAAACCAT-1").unwrap() {
///     println!("{}", String::from_utf8_lossy(record.name()));
/// }
/// ```
#[derive(Debug)]
pub struct BamBase {
    connection: Connection,
    rows: usize,
}

impl BamBase {
    /// Opens a connection to the database in the given file.
    ///
    /// Passes through any database errors.
    pub fn open<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(filename, flags)?;
        let rows: usize = connection.query_row("SELECT COUNT(*) FROM seq", (), |row| row.get(0))?;
        Ok(BamBase { connection, rows })
    }

    /// Loads the SAM/BAM file into the database and builds the indexes.
    ///
    /// Creates the database if it does not exist; otherwise the records are appended to the existing table.
    /// Returns the number of inserted rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be opened, the header cannot be read, or the input is truncated.
    /// Passes through any database errors.
    pub fn create_from_file<P: AsRef<Path>, Q: AsRef<Path>>(bam_file: P, db_file: Q, params: &SinkParams) -> Result<usize> {
        let mut reader = BamReader::open(&bam_file)?;
        info!(
            "Attempting to convert alignment file {} into SQLite database {}",
            bam_file.as_ref().display(), db_file.as_ref().display()
        );
        let mut sink = SqliteSink::open(&db_file, params)?;
        reader.read_header()?;
        let rows = sink.load(&mut reader)?;
        sink.finalize()?;
        Ok(rows)
    }

    /// Returns the filename of the database or [`None`] if there is no filename.
    pub fn filename(&self) -> Option<&str> {
        self.connection.path()
    }

    /// Returns the size of the database file in a human-readable format.
    pub fn file_size(&self) -> Option<String> {
        let filename = self.filename()?;
        utils::file_size(filename)
    }

    /// Returns the number of rows in the database.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns `true` if an index with the given name exists.
    pub fn has_index(&self, name: &str) -> Result<bool> {
        let count: usize = self.connection.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
            (name,),
            |row| row.get(0)
        )?;
        Ok(count > 0)
    }

    /// Returns the record with the given row id, or [`None`] if there is no such row.
    pub fn get_record(&self, id: usize) -> Result<Option<Record>> {
        let bytes: Option<Vec<u8>> = self.connection.query_row(
            "SELECT bam_record FROM seq WHERE id = ?1",
            (id,),
            |row| row.get(0)
        ).optional()?;
        bytes.map(Record::from_bytes).transpose()
    }

    fn records_where(&self, sql: &str, value: &str) -> Result<Vec<Record>> {
        let mut statement = self.connection.prepare_cached(sql)?;
        let mut rows = statement.query((value,))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let bytes: Vec<u8> = row.get(0)?;
            result.push(Record::from_bytes(bytes)?);
        }
        Ok(result)
    }

    /// Returns all records with the given barcode in insertion order.
    pub fn records_by_barcode(&self, barcode: &str) -> Result<Vec<Record>> {
        self.records_where("SELECT bam_record FROM seq WHERE bx = ?1 ORDER BY id", barcode)
    }

    /// Returns all records with the given read name in insertion order.
    pub fn records_by_name(&self, name: &str) -> Result<Vec<Record>> {
        self.records_where("SELECT bam_record FROM seq WHERE qname = ?1 ORDER BY id", name)
    }
}

//-----------------------------------------------------------------------------
