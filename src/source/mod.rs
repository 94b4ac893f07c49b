//! Bet record sources.
//!
//! Defines the `RecordSource` trait the client pulls bets from, and
//! provides a CSV-file implementation plus an in-memory one.
//!
//! CSV layout (no header, first five columns used):
//! `name,surname,personal_id,birth_date,bet_id`. Fields may be quoted.
//! The agency id is not in the file; it is the id of the client reading it.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::{BetRecord, ClientError};

const MIN_COLUMNS: usize = 5;
const BIRTH_DATE_FORMAT: &str = "%Y-%m-%d";

/// Abstraction over where bets come from.
#[cfg_attr(test, mockall::automock)]
pub trait RecordSource {
    /// Next bet in file order, or `Ok(None)` once the source is exhausted.
    fn next_bet(&mut self) -> Result<Option<BetRecord>, ClientError>;
}

// ---------------------------------------------------------------------------
// CSV source
// ---------------------------------------------------------------------------

/// Location of an agency's data file: `<dir>/<prefix><client_id>.csv`.
pub fn data_file_path(dir: impl AsRef<Path>, prefix: &str, client_id: u32) -> PathBuf {
    dir.as_ref().join(format!("{prefix}{client_id}.csv"))
}

/// Headerless reader; rows may carry more than the columns we use.
fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

/// Reads bets row by row from CSV text.
pub struct CsvBetSource<R> {
    reader: csv::Reader<R>,
    record: StringRecord,
    agency_id: u32,
    origin: String,
}

impl CsvBetSource<File> {
    /// Open an agency data file. The file must already exist.
    pub fn open(path: impl AsRef<Path>, agency_id: u32) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ClientError::SourceUnavailable {
            path: path.display().to_string(),
            source,
        })?;
        debug!(action = "open_file", result = "success", path = %path.display(), agency_id);
        Ok(Self::with_origin(file, agency_id, path.display().to_string()))
    }
}

impl<R: Read> CsvBetSource<R> {
    pub fn from_reader(reader: R, agency_id: u32) -> Self {
        Self::with_origin(reader, agency_id, "<reader>".to_string())
    }

    fn with_origin(reader: R, agency_id: u32, origin: String) -> Self {
        Self {
            reader: csv_reader(reader),
            record: StringRecord::new(),
            agency_id,
            origin,
        }
    }

    fn read_error(&self, err: csv::Error) -> ClientError {
        let line = err.position().map_or(0, |pos| pos.line() as usize);
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => ClientError::SourceUnavailable {
                path: self.origin.clone(),
                source,
            },
            _ => ClientError::MalformedRecord { line, reason },
        }
    }
}

impl<R: Read> RecordSource for CsvBetSource<R> {
    fn next_bet(&mut self) -> Result<Option<BetRecord>, ClientError> {
        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                let line = self.record.position().map_or(0, |pos| pos.line() as usize);
                bet_from_record(self.agency_id, &self.record, line).map(Some)
            }
            // Blank lines are skipped by the reader, so this is end of input.
            Ok(false) => Ok(None),
            Err(e) => Err(self.read_error(e)),
        }
    }
}

/// Parse and validate a single CSV row into a bet.
pub fn parse_bet_line(
    agency_id: u32,
    line: &str,
    line_no: usize,
) -> Result<BetRecord, ClientError> {
    let mut record = StringRecord::new();
    match csv_reader(line.as_bytes()).read_record(&mut record) {
        Ok(true) => bet_from_record(agency_id, &record, line_no),
        Ok(false) => Err(ClientError::MalformedRecord {
            line: line_no,
            reason: "empty row".to_string(),
        }),
        Err(e) => Err(ClientError::MalformedRecord {
            line: line_no,
            reason: e.to_string(),
        }),
    }
}

fn bet_from_record(
    agency_id: u32,
    record: &StringRecord,
    line_no: usize,
) -> Result<BetRecord, ClientError> {
    let malformed = |reason: String| ClientError::MalformedRecord {
        line: line_no,
        reason,
    };

    if record.len() < MIN_COLUMNS {
        return Err(malformed(format!(
            "expected {MIN_COLUMNS} columns, found {}",
            record.len()
        )));
    }
    let field = |i: usize| record.get(i).unwrap_or_default();

    let personal_id = field(2)
        .parse::<u64>()
        .map_err(|e| malformed(format!("invalid personal id {:?}: {e}", field(2))))?;
    NaiveDate::parse_from_str(field(3), BIRTH_DATE_FORMAT)
        .map_err(|e| malformed(format!("invalid birth date {:?}: {e}", field(3))))?;
    let bet_id = field(4)
        .parse::<u32>()
        .map_err(|e| malformed(format!("invalid bet id {:?}: {e}", field(4))))?;

    Ok(BetRecord::new(
        agency_id,
        bet_id,
        field(0),
        field(1),
        personal_id,
        field(3),
    ))
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Serves a pre-built list of bets in order.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    bets: VecDeque<BetRecord>,
}

impl From<Vec<BetRecord>> for InMemorySource {
    fn from(bets: Vec<BetRecord>) -> Self {
        Self { bets: bets.into() }
    }
}

impl RecordSource for InMemorySource {
    fn next_bet(&mut self) -> Result<Option<BetRecord>, ClientError> {
        Ok(self.bets.pop_front())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
