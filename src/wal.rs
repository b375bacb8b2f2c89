use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Record;

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record(writer: &mut impl Write, record: &Record) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only Write-Ahead Log.
///
/// Format per entry: `[u32: len][bincode: Record][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - Truncated last entry (crash) is safely discarded via length-prefix + CRC check.
///   An owner's batch decision is one entry, so a crash mid-write loses the whole
///   batch rather than half of it.
///
/// Appends are staged in memory and written by `flush_sync` as one unit. A failed
/// flush cuts the file back to its last synced length, so none of the staged
/// entries survive to replay.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Encoded entries not yet written.
    staged: Vec<u8>,
    staged_records: u64,
    /// File length after the last successful sync.
    synced_len: u64,
    appends_since_compact: u64,
    #[cfg(test)]
    fail_next_flush: Option<usize>,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            staged: Vec::new(),
            staged_records: 0,
            synced_len,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_next_flush: None,
        })
    }

    /// Append a single record and fsync. Used by tests only;
    /// production code uses `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, record: &Record) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Stage a record for the next `flush_sync`.
    pub fn append_buffered(&mut self, record: &Record) -> io::Result<()> {
        encode_record(&mut self.staged, record)?;
        self.staged_records += 1;
        Ok(())
    }

    /// Forget staged records without writing them.
    pub fn discard_staged(&mut self) {
        self.staged.clear();
        self.staged_records = 0;
    }

    /// Write all staged records and fsync. On error nothing staged remains on disk.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        match self.write_staged() {
            Ok(()) => {
                self.synced_len += self.staged.len() as u64;
                self.appends_since_compact += self.staged_records;
                self.discard_staged();
                Ok(())
            }
            Err(e) => {
                self.discard_staged();
                if let Err(te) = self.rollback() {
                    tracing::warn!(path = %self.path.display(), "WAL rollback to {} bytes failed: {te}", self.synced_len);
                }
                Err(e)
            }
        }
    }

    fn write_staged(&mut self) -> io::Result<()> {
        #[cfg(test)]
        self.simulated_failure()?;
        self.file.write_all(&self.staged)?;
        self.file.sync_all()
    }

    #[cfg(test)]
    fn simulated_failure(&mut self) -> io::Result<()> {
        let Some(written) = self.fail_next_flush.take() else {
            return Ok(());
        };
        let written = written.min(self.staged.len());
        self.file.write_all(&self.staged[..written])?;
        Err(io::Error::other("simulated write failure"))
    }

    /// Cut the file back to the last synced length. The file is in append mode,
    /// so the next write lands at the new end.
    fn rollback(&mut self) -> io::Result<()> {
        self.file.set_len(self.synced_len)?;
        self.file.sync_all()
    }

    /// Make the next `flush_sync` write `written` bytes and then fail.
    #[cfg(test)]
    pub fn fail_next_flush(&mut self, written: usize) {
        self.fail_next_flush = Some(written);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write compacted records to a temp file and fsync.
    pub fn write_compact_file(path: &Path, records: &[Record]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            encode_record(&mut writer, record)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename temp file over the WAL and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        // Anything still staged belongs to the old file.
        self.flush_sync()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.synced_len = self.file.metadata()?.len();
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, records: &[Record]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the WAL from disk, returning all valid records.
    ///
    /// A truncated or corrupt tail is cut off the file, so appends made after
    /// reopening are not stranded behind it.
    pub fn replay(path: &Path) -> io::Result<Vec<Record>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if valid_len + 8 + len as u64 > file_len {
                break; // truncated
            }

            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload)?;
            let mut crc_buf = [0u8; 4];
            reader.read_exact(&mut crc_buf)?;

            let stored_crc = u32::from_le_bytes(crc_buf);
            if stored_crc != crc32fast::hash(&payload) {
                tracing::warn!(path = %path.display(), "WAL entry failed CRC check, stopping replay");
                break;
            }

            match bincode::deserialize::<Record>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            valid_len += 8 + len as u64;
        }

        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                "discarding {} trailing WAL bytes",
                file_len - valid_len
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }
        Ok(records)
    }
}
