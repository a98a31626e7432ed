//! Byte-counting writer for dump streams.
//!
//! Every TOC entry's end offset is read from this counter, so all statement
//! output for one dump file must go through a single `ByteCountWriter`.

use std::io::{self, Write};

/// Writer wrapper that tracks how many bytes the inner writer accepted
pub struct ByteCountWriter<W> {
    inner: W,
    byte_count: u64,
}

impl<W: Write> ByteCountWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            byte_count: 0,
        }
    }

    /// Total bytes written so far
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ByteCountWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.byte_count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_every_write() -> io::Result<()> {
        let mut writer = ByteCountWriter::new(Vec::new());
        assert_eq!(writer.byte_count(), 0);

        writer.write_all(b"CREATE SCHEMA sales;\n")?;
        assert_eq!(writer.byte_count(), 21);

        write!(writer, "\n\n-- comment\n")?;
        assert_eq!(writer.byte_count(), 34);
        assert_eq!(writer.get_ref().len(), 34);

        Ok(())
    }
}
