use crate::file::{RecordIter, error::FileError};
use model::{
    core::identifiers::RunId,
    records::{chunk::ChunkRef, feed::FeedRecord},
};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};
use tracing::debug;

/// Finite, non-restartable sequence of chunk files in source order. Each
/// chunk is written as JSON lines when it is pulled. After the first error
/// the sequence ends.
pub struct FeedChunks {
    records: RecordIter,
    pending: Option<FeedRecord>,
    run_id: RunId,
    dir: PathBuf,
    chunk_size: usize,
    sequence: u32,
    done: bool,
}

impl FeedChunks {
    pub(crate) fn new(
        records: RecordIter,
        first: FeedRecord,
        run_id: RunId,
        dir: PathBuf,
        chunk_size: usize,
    ) -> Self {
        FeedChunks {
            records,
            pending: Some(first),
            run_id,
            dir,
            chunk_size: chunk_size.max(1),
            sequence: 0,
            done: false,
        }
    }

    fn write_chunk(&self, batch: &[FeedRecord]) -> Result<ChunkRef, FileError> {
        let path = self.dir.join(format!("chunk-{:06}.jsonl", self.sequence));
        let mut out = BufWriter::new(File::create(&path)?);
        for record in batch {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        Ok(ChunkRef {
            run_id: self.run_id.clone(),
            sequence: self.sequence,
            path,
            record_count: batch.len(),
        })
    }
}

impl Iterator for FeedChunks {
    type Item = Result<ChunkRef, FileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.chunk_size);
        if let Some(first) = self.pending.take() {
            batch.push(first);
        }
        while batch.len() < self.chunk_size {
            match self.records.next() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            return None;
        }

        let chunk = self.write_chunk(&batch);
        match &chunk {
            Ok(c) => debug!(chunk = %c.label(), records = c.record_count, "Chunk written"),
            Err(_) => self.done = true,
        }
        self.sequence += 1;
        Some(chunk)
    }
}
