//! Record-numbered logs of checksummed frames.
//!
//! A [`FrameLog`] is a file (or buffer) of [`gendb_codec`] frames that all
//! carry the same magic. Frames are addressed by record number, starting at
//! zero; the log keeps an index of where each one starts. The undo journal
//! and the legacy engine's table files are both frame logs.

use crate::error::{StorageError, StorageResult};
use gendb_codec::{decode_frame, decode_frame_header, encode_frame, FRAME_HEADER_LEN};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

enum Sink {
    Memory(Vec<u8>),
    File(Mutex<File>),
}

/// Append-only log of frames with one magic.
pub struct FrameLog {
    magic: [u8; 4],
    sink: Sink,
    /// Start and length of every frame, by record number.
    index: Vec<(u64, usize)>,
    end: u64,
    read_only: bool,
}

/// Indexes the whole frames at the front of `bytes`.
///
/// Returns the index and the length of the valid prefix. A frame whose
/// header is intact but whose body runs past the end is a torn tail and
/// stops the scan; a frame that fails its checksum is an error.
fn scan(magic: [u8; 4], bytes: &[u8]) -> StorageResult<(Vec<(u64, usize)>, u64)> {
    let mut index = Vec::new();
    let mut offset = 0usize;
    while bytes.len() - offset >= FRAME_HEADER_LEN {
        let header = decode_frame_header(magic, &bytes[offset..])?;
        let len = header.frame_len();
        if offset + len > bytes.len() {
            break;
        }
        decode_frame(magic, &bytes[offset..offset + len])?;
        index.push((offset as u64, len));
        offset += len;
    }
    Ok((index, offset as u64))
}

impl FrameLog {
    /// Creates an empty log held in memory.
    #[must_use]
    pub const fn in_memory(magic: [u8; 4]) -> Self {
        Self {
            magic,
            sink: Sink::Memory(Vec::new()),
            index: Vec::new(),
            end: 0,
            read_only: false,
        }
    }

    /// Creates the log file at `path`, discarding any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or truncated.
    pub fn create(path: &Path, magic: [u8; 4]) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            magic,
            sink: Sink::File(Mutex::new(file)),
            index: Vec::new(),
            end: 0,
            read_only: false,
        })
    }

    /// Opens the log file at `path` for appending, creating it if needed.
    ///
    /// Existing frames keep their record numbers. A torn tail is cut off so
    /// the next frame lands on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if an existing frame is damaged.
    pub fn append_to(path: &Path, magic: [u8; 4]) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (index, end) = scan(magic, &bytes)?;
        if end < bytes.len() as u64 {
            tracing::warn!(
                path = %path.display(),
                dropped = bytes.len() as u64 - end,
                "cutting torn frame from end of log"
            );
            file.set_len(end)?;
        }
        Ok(Self {
            magic,
            sink: Sink::File(Mutex::new(file)),
            index,
            end,
            read_only: false,
        })
    }

    /// Loads the log file at `path` for reading only.
    ///
    /// A torn tail is ignored and the file is left as it is.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and
    /// [`StorageError::Corrupted`] if a frame is damaged.
    pub fn open_read_only(path: &Path, magic: [u8; 4]) -> StorageResult<Self> {
        let mut bytes = std::fs::read(path)?;
        let (index, end) = scan(magic, &bytes)?;
        if end < bytes.len() as u64 {
            tracing::warn!(path = %path.display(), offset = end, "ignoring torn frame at end of log");
            bytes.truncate(end as usize);
        }
        Ok(Self {
            magic,
            sink: Sink::Memory(bytes),
            index,
            end,
            read_only: true,
        })
    }

    /// Appends a frame and returns its record number.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] for a read-only log, or an error
    /// if the frame cannot be encoded or written.
    pub fn append(&mut self, kind: u8, payload: &[u8]) -> StorageResult<u64> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let frame = encode_frame(self.magic, kind, payload)?;
        match &mut self.sink {
            Sink::Memory(buf) => buf.extend_from_slice(&frame),
            Sink::File(file) => {
                let file = file.get_mut();
                file.seek(SeekFrom::Start(self.end))?;
                file.write_all(&frame)?;
            }
        }
        let number = self.index.len() as u64;
        self.index.push((self.end, frame.len()));
        self.end += frame.len() as u64;
        Ok(number)
    }

    /// Reads the frame with record number `number`, returning its kind and
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] for an unknown record and
    /// [`StorageError::Corrupted`] if the frame fails its checksum.
    pub fn read(&self, number: u64) -> StorageResult<(u8, Vec<u8>)> {
        let &(offset, len) = usize::try_from(number)
            .ok()
            .and_then(|n| self.index.get(n))
            .ok_or_else(|| StorageError::ReadPastEnd {
                record: number,
                len: self.len(),
            })?;
        let (kind, payload) = match &self.sink {
            Sink::Memory(buf) => {
                let start = offset as usize;
                let (kind, payload) = decode_frame(self.magic, &buf[start..start + len])?;
                (kind, payload.to_vec())
            }
            Sink::File(file) => {
                let mut frame = vec![0u8; len];
                {
                    let mut file = file.lock();
                    file.seek(SeekFrom::Start(offset))?;
                    file.read_exact(&mut frame)?;
                }
                let (kind, payload) = decode_frame(self.magic, &frame)?;
                (kind, payload.to_vec())
            }
        };
        Ok((kind, payload))
    }

    /// Every frame in record order.
    pub fn frames(&self) -> impl Iterator<Item = StorageResult<(u8, Vec<u8>)>> + '_ {
        (0..self.len()).map(move |n| self.read(n))
    }

    /// Number of frames in the log.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.index.len() as u64
    }

    /// Whether the log holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Flushes and syncs appended frames to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> StorageResult<()> {
        if let Sink::File(file) = &mut self.sink {
            let file = file.get_mut();
            file.flush()?;
            file.sync_data()?;
        }
        Ok(())
    }

    /// Drops every frame.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] for a read-only log, or an error
    /// if the file cannot be truncated.
    pub fn clear(&mut self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        match &mut self.sink {
            Sink::Memory(buf) => buf.clear(),
            Sink::File(file) => file.get_mut().set_len(0)?,
        }
        self.index.clear();
        self.end = 0;
        Ok(())
    }
}

impl std::fmt::Debug for FrameLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLog")
            .field("magic", &String::from_utf8_lossy(&self.magic))
            .field("frames", &self.index.len())
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MAGIC: [u8; 4] = *b"TEST";

    #[test]
    fn records_are_numbered_from_zero() {
        let mut log = FrameLog::in_memory(MAGIC);
        assert!(log.is_empty());
        assert_eq!(log.append(1, b"first").unwrap(), 0);
        assert_eq!(log.append(2, b"").unwrap(), 1);
        assert_eq!(log.read(0).unwrap(), (1, b"first".to_vec()));
        assert_eq!(log.read(1).unwrap(), (2, Vec::new()));
        assert!(matches!(log.read(2), Err(StorageError::ReadPastEnd { .. })));

        log.clear().unwrap();
        assert!(log.is_empty());
        assert_eq!(log.append(3, b"again").unwrap(), 0);
    }

    #[test]
    fn reopening_keeps_numbers_and_cuts_a_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.db");
        {
            let mut log = FrameLog::append_to(&path, MAGIC).unwrap();
            log.append(1, b"kept").unwrap();
            log.sync().unwrap();
        }
        let whole = fs::metadata(&path).unwrap().len();
        let torn = encode_frame(MAGIC, 1, b"lost").unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&torn[..torn.len() - 2]);
        fs::write(&path, bytes).unwrap();

        let mut log = FrameLog::append_to(&path, MAGIC).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), whole);
        assert_eq!(log.append(1, b"next").unwrap(), 1);
        log.sync().unwrap();

        let view = FrameLog::open_read_only(&path, MAGIC).unwrap();
        let payloads: Vec<_> = view.frames().map(|f| f.unwrap().1).collect();
        assert_eq!(payloads, vec![b"kept".to_vec(), b"next".to_vec()]);
    }

    #[test]
    fn read_only_view_ignores_torn_tail_and_refuses_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.db");
        let mut bytes = encode_frame(MAGIC, 1, b"whole").unwrap();
        let torn = encode_frame(MAGIC, 1, b"torn").unwrap();
        bytes.extend_from_slice(&torn[..FRAME_HEADER_LEN + 1]);
        fs::write(&path, &bytes).unwrap();

        let mut view = FrameLog::open_read_only(&path, MAGIC).unwrap();
        assert_eq!(view.len(), 1);
        assert!(matches!(view.append(1, b"x"), Err(StorageError::ReadOnly)));
        assert!(matches!(view.clear(), Err(StorageError::ReadOnly)));
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn damaged_frame_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.db");
        let mut bytes = encode_frame(MAGIC, 1, b"payload").unwrap();
        bytes[FRAME_HEADER_LEN + 2] ^= 0x0f;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            FrameLog::open_read_only(&path, MAGIC),
            Err(StorageError::Corrupted(_))
        ));
        assert!(matches!(
            FrameLog::append_to(&path, MAGIC),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn create_discards_previous_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("undo.log");
        {
            let mut log = FrameLog::create(&path, MAGIC).unwrap();
            log.append(1, b"old").unwrap();
            log.sync().unwrap();
        }
        let log = FrameLog::create(&path, MAGIC).unwrap();
        assert!(log.is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }
}
