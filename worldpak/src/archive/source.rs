//! Byte-range sources backing archive readers.
//!
//! Extraction runs concurrently from loader threads, so sources expose
//! positional reads with no shared cursor.

use std::fs::File;
use std::io;
use std::path::Path;

use bytes::Bytes;

/// A random-access byte source.
///
/// Implementations must support concurrent `read_at` calls from multiple
/// threads without interior seeking.
pub trait ByteRangeReader: Send + Sync {
    /// Total length of the source in bytes.
    fn len(&self) -> u64;

    /// Fill `buf` exactly with the bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// File-backed source using the platform's positional read primitive.
#[derive(Debug)]
pub struct FileRangeReader {
    file: File,
    len: u64,
}

impl FileRangeReader {
    /// Open a file for positional reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ByteRangeReader for FileRangeReader {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .file
                .seek_read(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "read past end of archive",
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

/// In-memory source, used for nested payloads and tests.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl ByteRangeReader for MemoryRangeReader {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "offset out of range"))?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of archive")
            })?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}
