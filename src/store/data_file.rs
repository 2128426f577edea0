//! Positional I/O over the single data file
//!
//! All reads and writes address the file by absolute offset, so
//! concurrent operations are safe as long as their regions do not
//! overlap. Header fields are big-endian; the choice is pinned here and
//! must not change, it is what makes existing files readable.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::slot::{Slot, HEADER_SIZE, KEYLEN_POS};

/// 4-byte tag identifying the file format, at offset 0.
pub const MAGIC: [u8; 4] = *b"FCS1";

/// Offset of the first record, immediately after the magic.
pub const DATA_START: u64 = MAGIC.len() as u64;

const ZERO_KEYLEN: [u8; 4] = [0, 0, 0, 0];

/// The fixed header decoded from the first 20 bytes of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub size: u32,
    pub key_len: u32,
    pub data_len: u32,
    pub expiry_time: i64,
}

impl RecordHeader {
    /// Decode a header from its on-disk representation.
    pub fn decode(buf: &[u8; HEADER_SIZE as usize]) -> Self {
        Self {
            size: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            key_len: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_len: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            expiry_time: i64::from_be_bytes([
                buf[12], buf[13], buf[14], buf[15], buf[16], buf[17], buf[18], buf[19],
            ]),
        }
    }
}

/// Encode a full record (header + key + value) into one buffer so it can
/// be written with a single positional write. The `size` field is taken
/// from the slot and may exceed the buffer length when the slot was
/// carved from a larger free region.
pub fn encode_record(slot: &Slot, key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE as usize + key.len() + data.len());
    buf.extend_from_slice(&slot.size.to_be_bytes());
    buf.extend_from_slice(&slot.key_len.to_be_bytes());
    buf.extend_from_slice(&slot.data_len.to_be_bytes());
    buf.extend_from_slice(&slot.expiry_time.to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(data);
    buf
}

/// The data file backing a store.
pub struct DataFile {
    file: File,
    path: PathBuf,
}

impl DataFile {
    /// Open or create the data file. Existing content is preserved.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self { file, path })
    }

    /// Path this file was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }

    #[cfg(unix)]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.write_at(buf, offset)
    }

    #[cfg(windows)]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_write(buf, offset)
    }

    /// Read as many bytes as the file holds at `offset`, up to `buf.len()`.
    /// Returns the number of bytes read; a short count means end of file.
    pub fn read_full_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            match self.read_at(&mut buf[read..], offset + read as u64) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(read)
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let read = self.read_full_at(buf, offset)?;
        if read < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read at offset {}: {} of {} bytes", offset, read, buf.len()),
            ));
        }
        Ok(())
    }

    /// Write all of `buf` at `offset`.
    pub fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write_at(&buf[written..], offset + written as u64) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole record",
                    ))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Check whether the file starts with the format magic.
    pub fn has_magic(&self) -> io::Result<bool> {
        let mut header = [0u8; MAGIC.len()];
        let read = self.read_full_at(&mut header, 0)?;
        Ok(read == MAGIC.len() && header == MAGIC)
    }

    /// Write the format magic at offset 0.
    pub fn write_magic(&self) -> io::Result<()> {
        self.write_all_at(&MAGIC, 0)
    }

    /// Invalidate the record at `offset` by zeroing only its `key_len`
    /// field. The rest of the header stays intact so an index rebuild
    /// can still walk the file.
    pub fn mark_free(&self, offset: u64) -> io::Result<()> {
        self.write_all_at(&ZERO_KEYLEN, offset + KEYLEN_POS)
    }

    /// Truncate the file to zero length.
    pub fn truncate(&self) -> io::Result<()> {
        self.file.set_len(0)
    }

    /// Flush file content and metadata to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }
}
