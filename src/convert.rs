//! Converting SAM/BAM files into text reports or SQLite databases.
//!
//! The conversion reads the header, then streams the records one at a time into the selected output.
//! A missing header or a truncated input stops the conversion with an error.

use crate::bam::{BamReader, Header, Record};
use crate::db::{BamBase, Durability, SinkParams};
use crate::error::{BamDbError, Result};
use crate::{report, utils};

use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use getopts::Options;
use log::info;


//-----------------------------------------------------------------------------

/// Output format for the conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable report.
    #[default]
    Text,
    /// SQLite database.
    Sqlite,
}

impl FromStr for OutputMode {
    type Err = BamDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(OutputMode::Text),
            "sqlite" => Ok(OutputMode::Sqlite),
            _ => Err(BamDbError::InvalidMode(s.to_string())),
        }
    }
}

impl Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Text => write!(f, "text"),
            OutputMode::Sqlite => write!(f, "sqlite"),
        }
    }
}

//-----------------------------------------------------------------------------

/// Conversion settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Input SAM/BAM file.
    pub input: PathBuf,
    /// Output format.
    pub mode: OutputMode,
    /// Database file, or [`None`] for a name derived from the input.
    pub output: Option<PathBuf>,
    /// Remove an existing database before loading.
    pub overwrite: bool,
    /// Parameters for loading the database.
    pub params: SinkParams,
}

impl Config {
    /// Creates a configuration with default settings for the input file.
    pub fn new<P: Into<PathBuf>>(input: P) -> Self {
        Config {
            input: input.into(),
            mode: OutputMode::default(),
            output: None,
            overwrite: false,
            params: SinkParams::default(),
        }
    }

    /// Creates a configuration from command line arguments, excluding the program name.
    ///
    /// A positional input file takes precedence over `-f`.
    /// Returns [`None`] if help was requested.
    ///
    /// # Errors
    ///
    /// Returns [`BamDbError::Usage`] for unknown options or a missing input file and [`BamDbError::InvalidMode`] for an unknown output type.
    ///
    /// # Examples
    ///
    /// ```
    /// use bamdb::convert::{Config, OutputMode};
    /// use std::path::PathBuf;
    ///
    /// let args: Vec<String> = ["-t", "sqlite", "sample.bam"].iter().map(|s| s.to_string()).collect();
    /// let config = Config::from_args(&args).unwrap().unwrap();
    /// assert_eq!(config.mode, OutputMode::Sqlite);
    /// assert_eq!(config.db_file(), PathBuf::from("sample.db"));
    /// ```
    pub fn from_args(args: &[String]) -> Result<Option<Self>> {
        let opts = options();
        let matches = opts.parse(args).map_err(|x| BamDbError::Usage(x.to_string()))?;
        if matches.opt_present("h") {
            return Ok(None);
        }

        let input = if let Some(s) = matches.free.first() {
            PathBuf::from(s)
        } else if let Some(s) = matches.opt_str("f") {
            PathBuf::from(s)
        } else {
            return Err(BamDbError::Usage(String::from("No input file")));
        };

        let mut config = Config::new(input);
        if let Some(s) = matches.opt_str("t") {
            config.mode = s.parse::<OutputMode>()?;
        }
        if let Some(s) = matches.opt_str("o") {
            config.output = Some(PathBuf::from(s));
        }
        config.overwrite = matches.opt_present("overwrite");
        if matches.opt_present("safe") {
            config.params.durability = Durability::Safe;
        }

        Ok(Some(config))
    }

    /// Returns the database file name.
    ///
    /// Uses the explicit output name if there is one and derives the name from the input otherwise.
    pub fn db_file(&self) -> PathBuf {
        match &self.output {
            Some(filename) => filename.clone(),
            None => utils::default_db_name(&self.input),
        }
    }
}

/// Returns the command line options accepted by [`Config::from_args`].
pub fn options() -> Options {
    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help");
    opts.optopt("t", "type", "output type: text or sqlite (default: text)", "TYPE");
    opts.optopt("f", "file", "input SAM/BAM file (a positional argument takes precedence)", "FILE");
    opts.optopt("o", "output", "database file name (default: <input without extension>.db)", "FILE");
    opts.optflag("", "overwrite", "remove the database file if it exists");
    opts.optflag("", "safe", "keep SQLite crash safety during loading (slower)");
    opts
}

//-----------------------------------------------------------------------------

/// Writes a report for each remaining record in the reader.
///
/// The header must have already been read.
/// Returns the number of records.
pub fn print_records<W: Write>(reader: &mut BamReader, header: &Header, output: &mut W) -> Result<usize> {
    let mut record = Record::default();
    let mut rows = 0;
    while reader.read_record(&mut record)? {
        report::write_record(&record, header, rows, output)?;
        rows += 1;
    }
    output.flush()?;
    Ok(rows)
}

/// Runs the conversion specified in the configuration.
///
/// Text reports are written to `output`.
/// Returns the number of converted records.
///
/// # Errors
///
/// Returns an error if the input cannot be opened, the header cannot be read, or the input is truncated.
/// In SQLite mode, also passes through database errors.
pub fn convert<W: Write>(config: &Config, output: &mut W) -> Result<usize> {
    match config.mode {
        OutputMode::Text => {
            let mut reader = BamReader::open(&config.input)?;
            let header = reader.read_header()?;
            print_records(&mut reader, &header, output)
        },
        OutputMode::Sqlite => {
            let db_file = config.db_file();
            if config.overwrite && utils::file_exists(&db_file) {
                info!("Overwriting database {}", db_file.display());
                std::fs::remove_file(&db_file).map_err(|source| BamDbError::Open {
                    path: db_file.display().to_string(), source,
                })?;
            }
            let rows = BamBase::create_from_file(&config.input, &db_file, &config.params)?;
            let size = utils::file_size(&db_file).unwrap_or(String::from("unknown"));
            info!("Final database size: {}", size);
            Ok(rows)
        },
    }
}

//-----------------------------------------------------------------------------
