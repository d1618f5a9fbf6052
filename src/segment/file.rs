//! Positional reads over a segment file shared by many iterators.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A read-only segment file.
///
/// The handle is shared by every column reader and iterator of a segment;
/// each read seeks and reads under the handle's lock.
#[derive(Debug)]
pub struct FileReader {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileReader {
    /// Opens `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self { path, file: Mutex::new(file), size })
    }

    /// Reads exactly `len` bytes at `offset`.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(Error::corruption(format!(
                "read of {} bytes at offset {} is past the end of {} ({} bytes)",
                len,
                offset,
                self.path.display(),
                self.size
            )));
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_at() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let reader = FileReader::open(tmp.path()).unwrap();
        assert_eq!(reader.size(), 10);
        assert_eq!(reader.read_at(3, 4).unwrap(), b"3456");
        assert_eq!(reader.read_at(10, 0).unwrap(), b"");
        assert!(reader.read_at(8, 3).unwrap_err().is_corruption());
        assert!(reader.read_at(u64::MAX, 2).is_err());
    }
}
