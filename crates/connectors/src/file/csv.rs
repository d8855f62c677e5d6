use crate::file::error::FileError;
use model::records::feed::FeedRecord;
use serde_json::{Map, Value};
use std::{fs::File, path::Path};
use tracing::debug;

/// Streams a delimited feed file; the first row names the columns.
pub struct CsvRecordReader {
    headers: Vec<String>,
    records: ::csv::StringRecordsIntoIter<File>,
    position: u64,
}

impl CsvRecordReader {
    pub fn open(path: &Path, delimiter: char, enclosure: char) -> Result<Self, FileError> {
        let delimiter = ascii_byte(delimiter, "delimiter")?;
        let quote = ascii_byte(enclosure, "enclosure")?;

        let file = File::open(path)
            .map_err(|_| FileError::NotFound(path.display().to_string()))?;
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .quote(quote)
            .has_headers(true)
            .flexible(true)
            .trim(::csv::Trim::All)
            .from_reader(file);

        let headers = normalize_headers(reader.headers()?);
        if headers.iter().all(|h| h.is_empty()) {
            return Err(FileError::InvalidFormat("CSV header row is empty".into()));
        }
        debug!(columns = headers.len(), "Opened CSV feed");

        Ok(CsvRecordReader {
            headers,
            records: reader.into_records(),
            position: 0,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for CsvRecordReader {
    type Item = Result<FeedRecord, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.records.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(FileError::CsvError(e))),
            };

            if row.iter().all(|cell| cell.is_empty()) {
                continue;
            }

            self.position += 1;
            let mut fields = Map::with_capacity(self.headers.len());
            for (idx, header) in self.headers.iter().enumerate() {
                let cell = row.get(idx).unwrap_or("");
                fields.insert(header.clone(), Value::String(cell.to_string()));
            }
            return Some(Ok(FeedRecord::new(self.position, fields)));
        }
    }
}

fn ascii_byte(c: char, what: &str) -> Result<u8, FileError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| FileError::InvalidFormat(format!("CSV {what} must be ASCII, got {c:?}")))
}

fn normalize_headers(raw: &::csv::StringRecord) -> Vec<String> {
    raw.iter()
        .enumerate()
        .map(|(idx, h)| {
            let h = h.trim_start_matches('\u{feff}').trim();
            if h.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                h.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_feed(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_records_with_custom_delimiter_and_enclosure() {
        let file = write_feed("\u{feff}id;name;price\n1;'Boot; leather';12,50\n\n2;Sock;3\n");
        let reader = CsvRecordReader::open(file.path(), ';', '\'').unwrap();
        assert_eq!(reader.headers(), ["id", "name", "price"]);

        let records: Vec<_> = reader.map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("name").as_deref(), Some("Boot; leather"));
        assert_eq!(records[1].position, 2);
    }

    #[test]
    fn short_rows_fill_missing_cells() {
        let file = write_feed("id,name,price\n7,Hat\n");
        let records: Vec<_> = CsvRecordReader::open(file.path(), ',', '"')
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records[0].text("price"), None);
    }

    #[test]
    fn rejects_non_ascii_delimiter() {
        let file = write_feed("id\n1\n");
        assert!(matches!(
            CsvRecordReader::open(file.path(), '§', '"'),
            Err(FileError::InvalidFormat(_))
        ));
    }
}
