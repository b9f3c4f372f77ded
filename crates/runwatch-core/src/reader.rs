use crate::runlog::{FrameError, NdjsonFrameDecoder, DEFAULT_MAX_FRAME_BYTES};
use crate::RunRecord;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on records handed out by one read call.
pub const CHUNK_MAX_RECORDS: usize = 2_000;
const READ_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("run log not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("run log i/o failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReadError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            ReadError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ReadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Expected while a run directory is still being created.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::NotFound { .. })
    }
}

#[derive(Debug, Default)]
pub struct RecordBatch {
    pub records: Vec<RunRecord>,
    /// More backlog is buffered or unread.
    pub has_more: bool,
    pub decode_errors: Vec<FrameError>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.decode_errors.is_empty()
    }
}

/// An open run log. Dropping the reader closes it.
pub trait LogReader: Send {
    fn path(&self) -> &Path;

    /// Reads the next bounded piece of backlog.
    fn read_chunk(&mut self) -> Result<RecordBatch, ReadError>;

    /// Reads whatever has been appended since the last call.
    fn read_available(&mut self) -> Result<RecordBatch, ReadError>;
}

pub trait LogSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LogReader>, ReadError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlLogSource;

impl LogSource for JsonlLogSource {
    fn open(&self, path: &Path) -> Result<Box<dyn LogReader>, ReadError> {
        Ok(Box::new(JsonlLogReader::open(path)?))
    }
}

pub struct JsonlLogReader {
    path: PathBuf,
    file: File,
    decoder: NdjsonFrameDecoder<RunRecord>,
    buffered: VecDeque<RunRecord>,
    max_records: usize,
}

impl JsonlLogReader {
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        let file = File::open(path).map_err(|err| ReadError::from_io(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            decoder: NdjsonFrameDecoder::new(DEFAULT_MAX_FRAME_BYTES),
            buffered: VecDeque::new(),
            max_records: CHUNK_MAX_RECORDS,
        })
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    /// Fills the record buffer until it holds a full batch or the file is
    /// exhausted. Returns whether end of file was reached.
    fn fill(&mut self, errors: &mut Vec<FrameError>) -> Result<bool, ReadError> {
        let mut buf = vec![0u8; READ_BUFFER_BYTES];
        while self.buffered.len() < self.max_records {
            let read = match self.file.read(&mut buf) {
                Ok(0) => return Ok(true),
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(ReadError::from_io(&self.path, err)),
            };
            let report = self.decoder.push_chunk(&buf[..read]);
            self.buffered.extend(report.frames);
            errors.extend(report.errors);
        }
        Ok(false)
    }

    fn drain_batch(&mut self, errors: Vec<FrameError>, eof: bool) -> RecordBatch {
        let take = self.buffered.len().min(self.max_records);
        let records: Vec<RunRecord> = self.buffered.drain(..take).collect();
        RecordBatch {
            records,
            has_more: !self.buffered.is_empty() || !eof,
            decode_errors: errors,
        }
    }
}

impl LogReader for JsonlLogReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_chunk(&mut self) -> Result<RecordBatch, ReadError> {
        let mut errors = Vec::new();
        let eof = self.fill(&mut errors)?;
        Ok(self.drain_batch(errors, eof))
    }

    fn read_available(&mut self) -> Result<RecordBatch, ReadError> {
        // Same bounded read; at end of file this is a single zero-length read.
        self.read_chunk()
    }
}
