use crate::file::{csv::CsvRecordReader, error::FileError, json::JsonRecordReader};
use model::{execution::connection::{FeedFormat, FeedSource}, records::feed::FeedRecord};
use std::path::Path;

pub mod csv;
pub mod error;
pub mod json;

pub type RecordIter = Box<dyn Iterator<Item = Result<FeedRecord, FileError>> + Send>;

/// Opens a downloaded feed file with the parser matching its format.
pub fn open_records(path: &Path, source: &FeedSource) -> Result<RecordIter, FileError> {
    match source.format {
        FeedFormat::Csv => Ok(Box::new(CsvRecordReader::open(
            path,
            source.delimiter,
            source.enclosure,
        )?)),
        FeedFormat::Json => Ok(Box::new(JsonRecordReader::open(
            path,
            source.record_path.as_deref(),
        )?)),
    }
}
