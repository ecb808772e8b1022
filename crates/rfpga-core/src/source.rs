//! Bitstream sources
//!
//! A [`BitstreamSource`] hands the loader `size()` up front and then yields
//! bytes on demand. `read` reports how many bytes it produced; it never
//! errors. A source that cannot fill a request returns a short count and the
//! sequencer decides that this is fatal mid-stream -- the contract is that
//! `size()` equals the total number of bytes the source will yield.

use crate::error::{LoadError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Abstract byte source for one load operation
pub trait BitstreamSource {
    /// Total number of bytes this source will yield across all reads
    fn size(&self) -> usize;

    /// Fill `buf` from the source, returning the number of bytes produced
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

/// Source over a caller-owned, in-memory byte range.
///
/// Reads are all-or-nothing: if fewer bytes remain than requested the read
/// yields 0 rather than a partial copy, so a size mismatch is detected on
/// the chunk boundary where it occurs.
#[derive(Debug)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemorySource<'a> {
    /// Wrap a byte region. An empty region is rejected as invalid input.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(LoadError::InvalidInput(
                "empty bitstream region".to_string(),
            ));
        }
        Ok(MemorySource { data, pos: 0 })
    }

    /// Wrap a sub-range `[start, end)` of a caller-owned region
    pub fn from_range(region: &'a [u8], start: usize, end: usize) -> Result<Self> {
        if start >= end || end > region.len() {
            return Err(LoadError::InvalidInput(format!(
                "invalid range {}..{} in {}-byte region",
                start,
                end,
                region.len()
            )));
        }
        Ok(MemorySource {
            data: &region[start..end],
            pos: 0,
        })
    }
}

impl BitstreamSource for MemorySource<'_> {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.pos + buf.len() > self.data.len() {
            return 0;
        }
        buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        buf.len()
    }
}

/// Source over sequential file storage.
///
/// The file length is read once at open; short reads before that many bytes
/// have been yielded are propagated as-is for the sequencer to reject.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    size: usize,
}

impl FileSource {
    /// Open a bitstream file, recording its length as the source size
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            LoadError::InvalidInput(format!("cannot open {}: {}", path.display(), e))
        })?;
        let size = file
            .metadata()
            .map_err(|e| {
                LoadError::InvalidInput(format!("cannot stat {}: {}", path.display(), e))
            })?
            .len() as usize;
        Ok(FileSource { file, size })
    }
}

impl BitstreamSource for FileSource {
    fn size(&self) -> usize {
        self.size
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("bitstream file read failed: {}", e);
                    break;
                }
            }
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_source_reads_exact_chunks() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut src = MemorySource::new(&data).unwrap();
        assert_eq!(src.size(), 100);

        let mut buf = [0u8; 40];
        assert_eq!(src.read(&mut buf), 40);
        assert_eq!(buf[0], 0);
        assert_eq!(src.read(&mut buf), 40);
        assert_eq!(buf[0], 40);

        let mut rest = [0u8; 20];
        assert_eq!(src.read(&mut rest), 20);
        assert_eq!(rest[19], 99);
    }

    #[test]
    fn memory_source_refuses_partial_reads() {
        let data = [0u8; 10];
        let mut src = MemorySource::new(&data).unwrap();
        let mut buf = [0u8; 16];
        // More than remains: nothing is copied.
        assert_eq!(src.read(&mut buf), 0);
    }

    #[test]
    fn empty_region_is_invalid() {
        assert!(matches!(
            MemorySource::new(&[]),
            Err(LoadError::InvalidInput(_))
        ));
    }

    #[test]
    fn inverted_range_is_invalid() {
        let data = [0u8; 10];
        assert!(matches!(
            MemorySource::from_range(&data, 8, 4),
            Err(LoadError::InvalidInput(_))
        ));
        assert!(matches!(
            MemorySource::from_range(&data, 0, 11),
            Err(LoadError::InvalidInput(_))
        ));
        let src = MemorySource::from_range(&data, 2, 8).unwrap();
        assert_eq!(src.size(), 6);
    }

    #[test]
    fn file_source_reports_length_and_streams() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0x5A; 300]).unwrap();

        let mut src = FileSource::open(tmp.path()).unwrap();
        assert_eq!(src.size(), 300);

        let mut buf = [0u8; 256];
        assert_eq!(src.read(&mut buf), 256);
        assert_eq!(src.read(&mut buf), 44);
        assert_eq!(src.read(&mut buf), 0);
    }

    #[test]
    fn missing_file_is_invalid_input() {
        assert!(matches!(
            FileSource::open("/nonexistent/bitstream.bin"),
            Err(LoadError::InvalidInput(_))
        ));
    }
}
