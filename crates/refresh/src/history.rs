//! Time-series history of segment speeds.
//!
//! One CSV file per segment per month: `<dir>/<MM-yyyy>-<index>.csv`, header
//! `time,speed`, one row per refresh cycle. The month is taken at write time,
//! so files roll over on their own.

use chrono::{DateTime, Local};
use common::{SegmentId, Snapshot};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

pub const LOG_FILE_EXT: &str = "csv";
pub const HEADER: &str = "time,speed";

const FILE_MONTH_FORMAT: &str = "%m-%Y";
const ROW_TIME_FORMAT: &str = "%Y-%m-%d:%H:%M:%S";

/// Result of one logging attempt, as observed by the refresh cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Written,
    Failed,
    TimedOut,
}

/// `<MM-yyyy>-<index>`, the file stem for a segment index in a given month.
pub fn file_key(at: &DateTime<Local>, index: usize) -> String {
    format!("{}-{}", at.format(FILE_MONTH_FORMAT), index)
}

pub fn file_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, LOG_FILE_EXT))
}

/// Appends snapshot rows to the per-segment monthly files.
#[derive(Debug)]
pub struct HistoryLogger {
    dir: PathBuf,
    segments: Vec<SegmentId>,
    // Serializes whole cycles so rows from two logs never interleave.
    write_lock: Mutex<()>,
}

impl HistoryLogger {
    pub fn new(dir: impl Into<PathBuf>, segments: Vec<SegmentId>) -> Self {
        Self {
            dir: dir.into(),
            segments,
            write_lock: Mutex::new(()),
        }
    }

    /// Append one row per segment, stamped with the current local time.
    pub fn log(&self, snapshot: &Snapshot) -> bool {
        self.log_at(snapshot, Local::now())
    }

    /// Append one row per segment, stamped with `now`.
    ///
    /// Returns false without writing if the snapshot layout differs from the
    /// configured segments or if any file could not be opened. Every opened
    /// file is closed regardless.
    pub fn log_at(&self, snapshot: &Snapshot, now: DateTime<Local>) -> bool {
        if !snapshot.ids().eq(self.segments.iter().copied()) {
            warn!(
                "Snapshot layout {:?} does not match configured segments {:?}; not logging",
                snapshot.ids().collect::<Vec<_>>(),
                self.segments
            );
            return false;
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut writers: Vec<(PathBuf, File)> = Vec::with_capacity(self.segments.len());
        let mut all_opened = true;
        for index in 0..self.segments.len() {
            let path = file_path(&self.dir, &file_key(&now, index));
            match self.open(&path) {
                Ok(file) => writers.push((path, file)),
                Err(e) => {
                    all_opened = false;
                    warn!("file creation error: {} {}", path.display(), e);
                }
            }
        }
        if !all_opened {
            close_all(writers);
            return false;
        }

        let stamp = now.format(ROW_TIME_FORMAT).to_string();
        let mut ok = true;
        for ((path, file), (_, record)) in writers.iter_mut().zip(snapshot.iter()) {
            if let Err(e) = writeln!(file, "{},{}", stamp, record.speed) {
                ok = false;
                warn!("write to {} failed: {}", path.display(), e);
            }
        }

        let closed = close_all(writers);
        debug!("Logged {} rows at {}", self.segments.len(), stamp);
        ok && closed
    }

    /// Block every `log` call until the guard drops.
    #[cfg(test)]
    pub(crate) fn hold_write_lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open for append, creating the file with its header on first use.
    fn open(&self, path: &Path) -> io::Result<File> {
        create_dir_all(&self.dir)?;
        match OpenOptions::new().append(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", HEADER)?;
                Ok(file)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                OpenOptions::new().append(true).open(path)
            }
            Err(e) => Err(e),
        }
    }
}

/// Flush and close every writer, continuing past failures.
fn close_all(writers: Vec<(PathBuf, File)>) -> bool {
    let mut ok = true;
    for (path, file) in writers {
        if let Err(e) = file.sync_all() {
            ok = false;
            warn!("close of {} failed: {}", path.display(), e);
        }
    }
    ok
}
