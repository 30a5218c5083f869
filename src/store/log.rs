//! Value Log
//!
//! Per-partition, append-only file of value records:
//!
//! ```text
//! [0x00 reserved] [varint len][value] [varint len][value] ...
//!  offset 0        offset 1
//! ```
//!
//! Offsets handed out by `append` are positions inside this file. Tombstones
//! never reach the log; the index records them as offset 0.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{PalError, Result};
use crate::varint::{self, MAX_PACKED_LEN};

use super::RESERVED_LOG_BYTE;

/// Append-only value log backed by a staging file
pub struct ValueLog {
    /// Backing file path
    path: PathBuf,
    /// Buffered writer for appends
    writer: BufWriter<File>,
    /// Next append position, also the log size
    next_offset: u64,
    /// Offset of the most recent record (0 when empty)
    last_offset: u64,
    /// Records appended so far
    num_records: u64,
}

impl ValueLog {
    /// Create (or truncate) a log at `path`, reserving offset 0
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&[RESERVED_LOG_BYTE])?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            next_offset: 1,
            last_offset: 0,
            num_records: 0,
        })
    }

    /// Append a value, returning the offset of its record
    pub fn append(&mut self, value: &[u8]) -> Result<u64> {
        let offset = self.next_offset;

        let mut len_buf = [0u8; MAX_PACKED_LEN];
        let len_size = varint::pack_into(value.len() as u64, &mut len_buf);
        self.writer.write_all(&len_buf[..len_size])?;
        self.writer.write_all(value)?;

        self.next_offset += (len_size + value.len()) as u64;
        self.last_offset = offset;
        self.num_records += 1;
        Ok(offset)
    }

    /// Flush buffered appends to the backing file
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Copy the whole log (reserved byte included) into `dst`
    pub fn copy_to<W: Write>(&mut self, dst: &mut W) -> Result<u64> {
        self.flush()?;
        let mut file = File::open(&self.path)?;
        let copied = io::copy(&mut file, dst)?;
        if copied != self.next_offset {
            return Err(PalError::Corruption(format!(
                "value log {} holds {} bytes, expected {}",
                self.path.display(),
                copied,
                self.next_offset
            )));
        }
        Ok(copied)
    }

    /// Log size in bytes
    pub fn len(&self) -> u64 {
        self.next_offset
    }

    /// True when no record has been appended
    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Largest offset handed out so far
    pub fn max_offset(&self) -> u64 {
        self.last_offset
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay the records of a flushed log file in append order
    pub fn replay(path: &Path) -> Result<LogReplay> {
        let file = File::open(path)?;
        Ok(LogReplay {
            reader: BufReader::new(file),
            offset: 0,
            finished: false,
        })
    }
}

/// Sequential reader over a value log file
pub struct LogReplay {
    reader: BufReader<File>,
    /// Position of the next unread byte
    offset: u64,
    finished: bool,
}

impl LogReplay {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.offset += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        if self.offset == 0 {
            match self.read_byte()? {
                None => return Ok(None),
                Some(RESERVED_LOG_BYTE) => {}
                Some(other) => {
                    return Err(PalError::Corruption(format!(
                        "value log starts with 0x{:02x} instead of the reserved byte",
                        other
                    )))
                }
            }
        }

        let record_offset = self.offset;
        let mut len_buf = [0u8; MAX_PACKED_LEN];
        let mut len_size = 0;
        loop {
            let byte = match self.read_byte()? {
                Some(byte) => byte,
                None if len_size == 0 => return Ok(None),
                None => {
                    return Err(PalError::Corruption(format!(
                        "truncated record length at offset {}",
                        record_offset
                    )))
                }
            };
            if len_size == MAX_PACKED_LEN {
                return Err(PalError::Corruption(format!(
                    "record length at offset {} is too wide",
                    record_offset
                )));
            }
            len_buf[len_size] = byte;
            len_size += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }

        let (len, _) = varint::unpack(&len_buf[..len_size], 0)?;
        let mut value = vec![0u8; len as usize];
        self.reader.read_exact(&mut value).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => PalError::Corruption(format!(
                "truncated value of {} bytes at offset {}",
                len, record_offset
            )),
            _ => PalError::Io(e),
        })?;
        self.offset += len;

        Ok(Some((record_offset, value)))
    }
}

impl Iterator for LogReplay {
    /// (record offset, value)
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
