//! Sequential-append output sinks.

use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Destination a table builder writes into.
///
/// The builder only ever appends and flushes; it never seeks, syncs, or
/// closes. Slices passed to `append` must be fully consumed before the
/// call returns - the sink must not retain the pointer.
pub trait TableSink {
    /// Appends `data` at the current end of the sink.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Pushes buffered bytes toward the underlying medium.
    fn flush(&mut self) -> Result<()>;
}

/// Buffered file sink.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Creates (truncating) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self { writer: BufWriter::new(file) })
    }
}

impl TableSink for FileSink {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory sink; handy for tests and for building tables that are
/// shipped elsewhere.
impl TableSink for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
