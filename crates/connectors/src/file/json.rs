use crate::file::error::FileError;
use model::records::feed::FeedRecord;
use serde_json::Value;
use std::{fs::File, io::BufReader, path::Path, vec::IntoIter};
use tracing::warn;

/// Reads a JSON feed: an array of objects, either top-level or under a dotted
/// `record_path`. The document is parsed whole, then yielded record by record.
pub struct JsonRecordReader {
    items: IntoIter<Value>,
    position: u64,
}

impl JsonRecordReader {
    pub fn open(path: &Path, record_path: Option<&str>) -> Result<Self, FileError> {
        let file = File::open(path)
            .map_err(|_| FileError::NotFound(path.display().to_string()))?;
        let document: Value = serde_json::from_reader(BufReader::new(file))?;

        let items = match locate(document, record_path)? {
            Value::Array(items) => items,
            other => {
                return Err(FileError::InvalidFormat(format!(
                    "expected an array of records, found {}",
                    kind(&other)
                )));
            }
        };

        Ok(JsonRecordReader {
            items: items.into_iter(),
            position: 0,
        })
    }
}

impl Iterator for JsonRecordReader {
    type Item = Result<FeedRecord, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.items.by_ref() {
            self.position += 1;
            match item {
                Value::Object(fields) => return Some(Ok(FeedRecord::new(self.position, fields))),
                other => {
                    warn!(
                        position = self.position,
                        found = kind(&other),
                        "Skipping JSON feed entry that is not an object"
                    );
                }
            }
        }
        None
    }
}

fn locate(document: Value, record_path: Option<&str>) -> Result<Value, FileError> {
    let Some(path) = record_path.filter(|p| !p.trim().is_empty()) else {
        return Ok(document);
    };

    let mut current = document;
    for segment in path.split('.') {
        current = match current {
            Value::Object(mut map) => map.remove(segment).ok_or_else(|| {
                FileError::InvalidFormat(format!("record path segment '{segment}' not found"))
            })?,
            other => {
                return Err(FileError::InvalidFormat(format!(
                    "record path segment '{segment}' points into {}",
                    kind(&other)
                )));
            }
        };
    }
    Ok(current)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
