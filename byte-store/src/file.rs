use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::ByteStore;

/// A disk image on the host filesystem.
#[derive(Debug)]
pub struct FileStore {
    inner: File,
}

impl FileStore {
    pub fn new(fd: File) -> Self {
        Self { inner: fd }
    }

    /// Opens an existing image for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::new(fd))
    }

    /// Creates the image, discarding whatever was there before.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(fd))
    }
}

impl ByteStore for FileStore {
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf)
    }

    fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(buf)
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    fn resize(&mut self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.sync_data()
    }
}
