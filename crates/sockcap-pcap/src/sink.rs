use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom, Write};

/// A byte sink that can be cut back to an earlier length.
///
/// The writer uses this to drop a partially written record so the container
/// always ends on a record boundary.
pub trait RecordSink: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl RecordSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

impl RecordSink for Vec<u8> {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.truncate(usize::try_from(len).unwrap_or(usize::MAX));
        Ok(())
    }
}

impl RecordSink for Cursor<Vec<u8>> {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.get_mut()
            .truncate(usize::try_from(len).unwrap_or(usize::MAX));
        self.set_position(len);
        Ok(())
    }
}

impl<T: RecordSink + ?Sized> RecordSink for &mut T {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate_to(len)
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate_to(len)
    }
}

/// Collects what the container encoder writes for one record and hands it to
/// the sink in a single `write_all` on [`StagedSink::commit`].
///
/// A failed commit cuts the sink back to the end of the last committed record.
#[derive(Debug)]
pub(crate) struct StagedSink<W> {
    sink: W,
    staged: Vec<u8>,
    committed_len: u64,
}

impl<W: RecordSink> StagedSink<W> {
    pub(crate) const fn new(sink: W) -> Self {
        Self {
            sink,
            staged: Vec::new(),
            committed_len: 0,
        }
    }

    pub(crate) const fn committed_len(&self) -> u64 {
        self.committed_len
    }

    /// Writes and flushes the staged bytes, returning the committed length.
    pub(crate) fn commit(&mut self) -> io::Result<u64> {
        let staged = self.staged.len() as u64;
        let result = self
            .sink
            .write_all(&self.staged)
            .and_then(|()| self.sink.flush());
        self.staged.clear();

        match result {
            Ok(()) => {
                self.committed_len += staged;
                Ok(self.committed_len)
            }
            Err(error) => {
                let _ = self.sink.truncate_to(self.committed_len);
                Err(error)
            }
        }
    }

    pub(crate) fn discard(&mut self) {
        self.staged.clear();
    }

    pub(crate) fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: RecordSink> Write for StagedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.staged.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
