//! # Log Storage
//!
//! Trait abstraction over the append-only log destination, plus the file
//! backed implementation used on the host.
//!
//! The log writers need a single write call that may accept fewer bytes than
//! offered, a way to move the write cursor back over a partial record, a
//! durability flush, and an estimate of how many bytes the medium can take
//! right now without blocking. Erasing works by path ([`erase_log`]) since it
//! runs when the file could not be opened.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::HaltReason;

/// Trait for log storage operations
pub trait Storage {
    /// Write once; returns how many bytes were accepted (possibly fewer than offered).
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Move the write cursor back by `bytes`, discarding them.
    fn rewind(&mut self, bytes: usize) -> io::Result<()>;

    /// Make everything written so far durable.
    fn flush(&mut self) -> io::Result<()>;

    /// Bytes the medium can accept right now without blocking.
    fn available_for_write(&self) -> usize;
}

/// File-backed log.
///
/// Opened for writing at the end of any existing content, so a restarted
/// session appends to the previous stream.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
    path: PathBuf,
    write_window: usize,
}

impl FileStorage {
    /// Open (or create) the log file
    ///
    /// # Arguments
    ///
    /// * `path` - Log file path
    /// * `write_window` - Bytes reported by `available_for_write`
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, write_window: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let end = file.seek(SeekFrom::End(0))?;
        debug!("Opened log {} at offset {}", path.display(), end);

        Ok(Self {
            file,
            path,
            write_window,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.file.write(bytes)
    }

    fn rewind(&mut self, bytes: usize) -> io::Result<()> {
        let position = self.file.stream_position()?;
        let target = position.saturating_sub(bytes as u64);
        self.file.set_len(target)?;
        self.file.seek(SeekFrom::Start(target))?;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }

    fn available_for_write(&self) -> usize {
        self.write_window
    }
}

/// Open the session log at boot.
///
/// If the file cannot be opened and the operator is holding the erase
/// combination, the file is removed instead and the session halts with
/// [`HaltReason::RecoveryErase`]; otherwise it halts with
/// [`HaltReason::StorageInit`].
pub fn open_log<P: AsRef<Path>>(
    path: P,
    write_window: usize,
    erase_requested: bool,
) -> std::result::Result<FileStorage, HaltReason> {
    let path = path.as_ref();
    match FileStorage::open(path, write_window) {
        Ok(storage) => {
            info!("Logging to {}", path.display());
            Ok(storage)
        }
        Err(e) if erase_requested => {
            warn!("Failed to open {} ({}), erase requested", path.display(), e);
            let erased = erase_log(path).is_ok();
            Err(HaltReason::RecoveryErase { erased })
        }
        Err(e) => Err(HaltReason::StorageInit(format!("{}: {}", path.display(), e))),
    }
}

/// Remove a log file by path.
pub fn erase_log<P: AsRef<Path>>(path: P) -> io::Result<()> {
    fs::remove_file(path.as_ref())?;
    info!("Erased {}", path.as_ref().display());
    Ok(())
}
