use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::state::Mutation;

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every committed batch.
    EveryWrite,
    /// Flush to the OS and rely on page-cache buffering.
    #[default]
    OsDefault,
}

/// Journal configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Byte destination of journal frames.
trait FrameSink: Write + Send {
    /// Cut the destination back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;
}

impl FrameSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

struct JournalWriter {
    sink: Box<dyn FrameSink>,
    /// Current end of the journal file.
    offset: u64,
    /// Set when a failed append could not be rolled back. The file may
    /// end in a partial frame, so further appends are refused.
    poisoned: bool,
}

impl JournalWriter {
    /// Write one complete frame at the current offset.
    ///
    /// On failure the file is cut back to the frame start so no partial
    /// frame can precede a later one.
    fn write_frame(&mut self, frame: &[u8], sync: bool) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(
                "journal is poisoned by an earlier failed append",
            ));
        }

        let result = self
            .sink
            .write_all(frame)
            .and_then(|()| self.sink.flush())
            .and_then(|()| if sync { self.sink.sync() } else { Ok(()) });

        if let Err(e) = result {
            if let Err(rollback) = self.sink.truncate(self.offset) {
                warn!(offset = self.offset, error = %rollback, "journal rollback failed; refusing further appends");
                self.poisoned = true;
            }
            return Err(e);
        }
        self.offset += frame.len() as u64;
        Ok(())
    }
}

/// Append-only, crash-recoverable mutation journal.
///
/// Each committed store operation is written as one frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON array of mutations)]
/// ```
/// A frame is the unit of atomicity. On recovery, frames failing the CRC
/// check are skipped and a torn frame at the tail ends the replay.
pub(crate) struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    config: JournalConfig,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, config: JournalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                sink: Box::new(file),
                offset,
                poisoned: false,
            }),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> StoreResult<u64> {
        Ok(self.lock()?.offset)
    }

    /// Append one batch of mutations as a single frame. Returns the byte
    /// offset of the frame.
    ///
    /// Either the whole frame is in the file afterwards or none of it is.
    pub fn append(&self, batch: &[Mutation]) -> StoreResult<u64> {
        let frame = encode_frame(batch)?;

        let mut w = self.lock()?;
        let frame_offset = w.offset;
        w.write_frame(&frame, self.config.sync_mode == SyncMode::EveryWrite)?;

        debug!(offset = frame_offset, mutations = batch.len(), "journal append");
        Ok(frame_offset)
    }

    /// Read every valid frame, front to back.
    pub fn recover(&self) -> StoreResult<Vec<Vec<Mutation>>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut frames = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "torn journal frame; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal frame; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset += HEADER_SIZE as u64 + length as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping journal frame"
                );
                continue;
            }

            match serde_json::from_slice::<Vec<Mutation>>(&payload) {
                Ok(batch) => frames.push(batch),
                Err(e) => warn!(offset, error = %e, "undecodable journal frame; skipping"),
            }
        }

        debug!(frames = frames.len(), "journal recovery complete");
        Ok(frames)
    }

    /// Atomically replace the journal contents with the given frames.
    ///
    /// The new journal is written to a temporary file in the same
    /// directory and renamed over the old one.
    pub fn rewrite(&self, frames: &[Vec<Mutation>]) -> StoreResult<()> {
        let mut w = self.lock()?;
        w.sink.flush()?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        let mut written: u64 = 0;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for batch in frames.iter().filter(|b| !b.is_empty()) {
                let frame = encode_frame(batch)?;
                out.write_all(&frame)?;
                written += frame.len() as u64;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.sink = Box::new(file);
        w.offset = written;
        w.poisoned = false;

        debug!(frames = frames.len(), bytes = written, "journal rewritten");
        Ok(())
    }

    /// Flush buffered data and `fsync` the file.
    pub fn sync(&self) -> StoreResult<()> {
        let mut w = self.lock()?;
        w.sink.flush()?;
        w.sink.sync()?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, JournalWriter>> {
        self.writer.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Length and CRC header followed by the JSON payload.
fn encode_frame(batch: &[Mutation]) -> StoreResult<Vec<u8>> {
    let payload =
        serde_json::to_vec(batch).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len()).map_err(|_| {
        StoreError::Serialization(format!("journal frame of {} bytes", payload.len()))
    })?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            warn!(path = %self.path.display(), error = %e, "journal sync on close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_types::{ActivityId, EntityId};

    fn batch(n: usize) -> Vec<Mutation> {
        (0..n).map(|_| Mutation::DeleteEntity(EntityId::new())).collect()
    }

    #[test]
    fn append_and_recover_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(&dir.path().join("j.log"), JournalConfig::default()).unwrap();

        let first = batch(1);
        let second = vec![
            Mutation::DeleteActivity(ActivityId::new()),
            Mutation::DeleteEntity(EntityId::new()),
        ];
        journal.append(&first).unwrap();
        journal.append(&second).unwrap();

        let frames = journal.recover().unwrap();
        assert_eq!(frames, vec![first, second]);
    }

    #[test]
    fn recover_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(&dir.path().join("empty.log"), JournalConfig::default()).unwrap();
        assert!(journal.recover().unwrap().is_empty());
        assert_eq!(journal.offset().unwrap(), 0);
    }

    #[test]
    fn crc_mismatch_skips_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.log");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        journal.append(&batch(1)).unwrap();
        let survivor = batch(2);
        journal.append(&survivor).unwrap();
        drop(journal);

        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        assert_eq!(journal.recover().unwrap(), vec![survivor]);
    }

    #[test]
    fn torn_tail_stops_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.log");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        let kept = batch(1);
        journal.append(&kept).unwrap();
        journal.append(&batch(1)).unwrap();
        let total = journal.offset().unwrap();
        drop(journal);

        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(total - 4)
            .unwrap();

        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        assert_eq!(journal.recover().unwrap(), vec![kept]);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compact.log");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        for _ in 0..5 {
            journal.append(&batch(3)).unwrap();
        }
        let before = journal.offset().unwrap();

        let snapshot = batch(2);
        journal.rewrite(&[snapshot.clone()]).unwrap();
        assert!(journal.offset().unwrap() < before);

        let after = batch(1);
        journal.append(&after).unwrap();
        assert_eq!(journal.recover().unwrap(), vec![snapshot, after]);
    }

    /// File sink that fails after writing a set number of bytes.
    struct FailingSink {
        file: File,
        fail_after: Option<usize>,
        fail_truncate: bool,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let Some(allowed) = self.fail_after else {
                return self.file.write(buf);
            };
            if allowed == 0 {
                self.fail_after = None;
                return Err(io::Error::other("no space left on device"));
            }
            let written = self.file.write(&buf[..buf.len().min(allowed)])?;
            self.fail_after = Some(allowed - written);
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl FrameSink for FailingSink {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::other("read-only file system"));
            }
            self.file.set_len(len)
        }

        fn sync(&mut self) -> io::Result<()> {
            self.file.sync_all()
        }
    }

    /// Swap the journal's sink for one that fails after `bytes` bytes.
    fn arm(journal: &Journal, bytes: usize, fail_truncate: bool) {
        let file = OpenOptions::new().append(true).open(&journal.path).unwrap();
        journal.lock().unwrap().sink = Box::new(FailingSink {
            file,
            fail_after: Some(bytes),
            fail_truncate,
        });
    }

    #[test]
    fn failed_append_leaves_no_partial_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faulty.log");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();

        let first = batch(1);
        journal.append(&first).unwrap();
        let end = journal.offset().unwrap();

        arm(&journal, 5, false);
        assert!(journal.append(&batch(2)).is_err());
        assert_eq!(journal.offset().unwrap(), end);
        assert_eq!(fs::metadata(&path).unwrap().len(), end);

        let second = batch(1);
        journal.append(&second).unwrap();
        assert_eq!(journal.recover().unwrap(), vec![first, second]);
    }

    #[test]
    fn failed_rollback_poisons_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poisoned.log");
        let journal = Journal::open(&path, JournalConfig::default()).unwrap();
        arm(&journal, 3, true);

        assert!(journal.append(&batch(1)).is_err());
        assert!(journal.lock().unwrap().poisoned);
        assert!(matches!(journal.append(&batch(1)), Err(StoreError::Io(_))));

        journal.rewrite(&[]).unwrap();
        let kept = batch(1);
        journal.append(&kept).unwrap();
        assert_eq!(journal.recover().unwrap(), vec![kept]);
    }

    #[test]
    fn every_write_sync_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config: JournalConfig = toml::from_str(r#"sync_mode = "every_write""#).unwrap();
        assert_eq!(config.sync_mode, SyncMode::EveryWrite);

        let journal = Journal::open(&dir.path().join("sync.log"), config).unwrap();
        journal.append(&batch(1)).unwrap();
        assert_eq!(journal.recover().unwrap().len(), 1);
    }
}
